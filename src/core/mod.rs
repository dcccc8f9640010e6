mod aggregation;
mod config;
mod engine;
mod error;
mod executor;
mod market;
mod projection;
mod risk;
mod sensitivity;
mod types;
mod validation;

pub use aggregation::{aggregate, percentile};
pub use config::{EngineConfig, SensitivityConfig};
pub use engine::{Assessment, SimulationEngine, run_simulation};
pub use error::{ConfigError, EngineError};
pub use executor::{CancellationToken, Execution, ProgressCallback, RunExecutor, RunSet, RunSummary};
pub use market::{ReturnPath, ReturnPathGenerator, derive_seed};
pub use projection::ProjectionEngine;
pub use risk::{
    InflationThresholds, LevelBands, LongevityThresholds, RiskClassifier, RiskThresholds,
    SequenceThresholds,
};
pub use sensitivity::{SensitivityAnalyzer, sample_points};
pub use types::{
    AssetClassAssumption, AssetKind, DEFAULT_SWEEP_STEPS, FailureYearStats, Mitigation,
    ParameterSweep, Percentiles, PotentialImpact, ProbabilityRange, ProgressStage, ProgressUpdate,
    RiskFactor, RiskLevel, RiskMetrics, RiskRating, ScenarioInput, SensitivityParameter,
    SensitivityResult, SensitivitySample, SequenceDiagnostics, SimulationOutcome,
    SimulationResult, SimulationRun, YearlyPercentileBand, YearlyPortfolioState,
};
pub use validation::{MIN_SIMULATION_COUNT, validate_scenario};
