use std::time::Instant;

use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{info, warn};

use super::aggregation::aggregate;
use super::config::EngineConfig;
use super::error::EngineError;
use super::executor::{CancellationToken, ProgressCallback, RunExecutor};
use super::market::resolve_seed;
use super::risk::RiskClassifier;
use super::sensitivity::SensitivityAnalyzer;
use super::types::{
    ParameterSweep, ProgressStage, ProgressUpdate, RiskMetrics, ScenarioInput, SensitivityResult,
    SimulationOutcome, SimulationResult,
};
use super::validation::validate_scenario;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub result: SimulationResult,
    pub risk: RiskMetrics,
}

pub struct SimulationEngine {
    config: EngineConfig,
    classifier: RiskClassifier,
    pool: Option<ThreadPool>,
}

impl Default for SimulationEngine {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            classifier: RiskClassifier::new(config.risk_thresholds),
            config,
            pool: None,
        }
    }
}

impl SimulationEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let pool = if config.worker_threads == 0 {
            None
        } else {
            Some(
                ThreadPoolBuilder::new()
                    .num_threads(config.worker_threads)
                    .thread_name(|idx| format!("runway-worker-{idx}"))
                    .build()
                    .map_err(|e| EngineError::ThreadPool(e.to_string()))?,
            )
        };
        Ok(Self {
            classifier: RiskClassifier::new(config.risk_thresholds),
            config,
            pool,
        })
    }

    pub fn run_simulation(&self, scenario: &ScenarioInput) -> Result<SimulationResult, EngineError> {
        validate_scenario(scenario)?;
        let started = Instant::now();
        let seed = resolve_seed(scenario.random_seed);
        log_start(scenario, seed);

        let executor = RunExecutor::new(scenario, seed, self.config.batch_size);
        let execution = self.install(|| executor.execute(None, None));
        let result = aggregate(&execution.runs, elapsed_ms(started), true);
        log_finish(&result);
        Ok(result)
    }

    /// Runs from batches completed before cancellation come back as a partial
    /// result marked incomplete.
    pub fn run_simulation_with(
        &self,
        scenario: &ScenarioInput,
        cancel: &CancellationToken,
        progress: Option<ProgressCallback<'_>>,
    ) -> Result<SimulationOutcome, EngineError> {
        validate_scenario(scenario)?;
        let started = Instant::now();
        let seed = resolve_seed(scenario.random_seed);
        log_start(scenario, seed);

        let executor = RunExecutor::new(scenario, seed, self.config.batch_size);
        let execution = self.install(|| executor.execute(Some(cancel), progress));
        let completed_runs = execution.runs.len() as u32;

        if execution.cancelled {
            warn!(
                completed_runs,
                total = scenario.simulation_count,
                "simulation cancelled"
            );
            let partial = (!execution.runs.is_empty())
                .then(|| aggregate(&execution.runs, elapsed_ms(started), false));
            return Ok(SimulationOutcome::Cancelled {
                completed_runs,
                partial,
            });
        }

        notify(progress, completed_runs, scenario.simulation_count, ProgressStage::Aggregating);
        let result = aggregate(&execution.runs, elapsed_ms(started), true);
        notify(progress, completed_runs, scenario.simulation_count, ProgressStage::Complete);
        log_finish(&result);
        Ok(SimulationOutcome::Completed(result))
    }

    pub fn classify_risk(&self, scenario: &ScenarioInput, result: &SimulationResult) -> RiskMetrics {
        self.classifier.classify(scenario, result)
    }

    pub fn assess(&self, scenario: &ScenarioInput) -> Result<Assessment, EngineError> {
        let result = self.run_simulation(scenario)?;
        let risk = self.classify_risk(scenario, &result);
        Ok(Assessment { result, risk })
    }

    // steps == 0 means the configured default
    pub fn analyze_sensitivity(
        &self,
        scenario: &ScenarioInput,
        sweeps: &[ParameterSweep],
    ) -> Result<Vec<SensitivityResult>, EngineError> {
        let sweeps: Vec<ParameterSweep> = sweeps
            .iter()
            .map(|sweep| ParameterSweep {
                steps: if sweep.steps == 0 {
                    self.config.sensitivity.steps
                } else {
                    sweep.steps
                },
                ..*sweep
            })
            .collect();
        let analyzer = SensitivityAnalyzer::new(
            self.config.sensitivity.simulation_count,
            self.config.batch_size,
        );
        let started = Instant::now();
        let results = self.install(|| analyzer.analyze(scenario, &sweeps))?;
        info!(
            parameters = results.len(),
            elapsed_ms = elapsed_ms(started),
            "sensitivity analysis complete"
        );
        Ok(results)
    }

    fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

pub fn run_simulation(scenario: &ScenarioInput) -> Result<SimulationResult, EngineError> {
    SimulationEngine::default().run_simulation(scenario)
}

fn notify(progress: Option<ProgressCallback<'_>>, current: u32, total: u32, stage: ProgressStage) {
    if let Some(report) = progress {
        report(ProgressUpdate {
            current_simulation: current,
            total_simulations: total,
            stage,
        });
    }
}

fn log_start(scenario: &ScenarioInput, seed: u64) {
    info!(
        simulations = scenario.simulation_count,
        horizon_years = scenario.time_horizon_years,
        seed,
        "starting simulation"
    );
}

fn log_finish(result: &SimulationResult) {
    info!(
        success_rate = result.success_rate,
        median_final_wealth = result.median_final_wealth,
        elapsed_ms = result.execution_time_ms,
        "simulation complete"
    );
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
