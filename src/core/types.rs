use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetKind {
    Equity,
    Bond,
    Cash,
    Property,
    Alternative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetClassAssumption {
    pub name: String,
    pub kind: AssetKind,
    pub expected_return: f64,
    pub volatility: f64,
    pub weight: f64,
}

/// Rates are decimal fractions; asset `weight`s must sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioInput {
    pub initial_portfolio_value: f64,
    pub time_horizon_years: u32,
    pub annual_withdrawal: f64,
    #[serde(default)]
    pub withdrawal_growth_rate: f64,
    #[serde(default)]
    pub withdrawal_start_year: u32,
    #[serde(default)]
    pub current_age: Option<u32>,
    pub inflation_rate_mean: f64,
    pub inflation_rate_volatility: f64,
    pub asset_classes: Vec<AssetClassAssumption>,
    pub simulation_count: u32,
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl ScenarioInput {
    pub fn withdrawal_rate(&self) -> f64 {
        if self.initial_portfolio_value > 0.0 {
            self.annual_withdrawal / self.initial_portfolio_value
        } else if self.annual_withdrawal > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyPortfolioState {
    pub year: u32,
    pub opening_value: f64,
    pub gross_return: f64,
    pub inflation: f64,
    pub withdrawal: f64,
    pub inflation_adjusted_withdrawal: f64,
    pub closing_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRun {
    pub run_index: u32,
    pub seed: u64,
    pub initial_value: f64,
    pub states: Vec<YearlyPortfolioState>,
    pub depletion_year: Option<u32>,
}

impl SimulationRun {
    pub fn terminal_value(&self) -> f64 {
        self.states
            .last()
            .map(|s| s.closing_value)
            .unwrap_or(self.initial_value)
    }

    // percent
    pub fn max_drawdown(&self) -> f64 {
        let mut peak = self.initial_value;
        let mut worst = 0.0_f64;
        for state in &self.states {
            let value = state.closing_value;
            if value > peak {
                peak = value;
            } else if peak > 0.0 {
                worst = worst.max((peak - value) / peak * 100.0);
            }
        }
        worst
    }

    pub fn early_return_mean(&self, window: usize) -> f64 {
        let take = window.min(self.states.len());
        if take == 0 {
            return 0.0;
        }
        self.states[..take]
            .iter()
            .map(|s| s.gross_return)
            .sum::<f64>()
            / take as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Percentiles {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyPercentileBand {
    pub year: u32,
    pub mean: f64,
    #[serde(flatten)]
    pub percentiles: Percentiles,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureYearStats {
    pub failed_runs: u32,
    pub earliest_depletion_year: Option<u32>,
    pub mean_depletion_year: Option<f64>,
    pub median_depletion_year: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceDiagnostics {
    pub window_years: u32,
    pub failed_runs: u32,
    pub succeeded_runs: u32,
    pub failed_mean_return: f64,
    pub failed_return_std_dev: f64,
    pub succeeded_mean_return: f64,
    pub succeeded_return_std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub success_rate: f64,
    pub success_confidence_half_width: f64,
    pub failure_risk: f64,
    pub percentiles: Percentiles,
    pub average_final_wealth: f64,
    pub median_final_wealth: f64,
    pub max_drawdown: f64,
    pub yearly_percentile_series: Vec<YearlyPercentileBand>,
    pub survival_curve: Vec<f64>,
    pub failure_years: FailureYearStats,
    pub sequence_diagnostics: SequenceDiagnostics,
    pub execution_time_ms: u64,
    pub simulation_count: u32,
    pub time_horizon_years: u32,
    pub seed: u64,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationOutcome {
    Completed(SimulationResult),
    Cancelled {
        completed_runs: u32,
        partial: Option<SimulationResult>,
    },
}

impl SimulationOutcome {
    pub fn into_result(self) -> Option<SimulationResult> {
        match self {
            SimulationOutcome::Completed(result) => Some(result),
            SimulationOutcome::Cancelled { .. } => None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStage {
    Simulating,
    Aggregating,
    Complete,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub current_simulation: u32,
    pub total_simulations: u32,
    pub stage: ProgressStage,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn escalate(self) -> Self {
        match self {
            RiskLevel::Low => RiskLevel::Medium,
            RiskLevel::Medium | RiskLevel::High => RiskLevel::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityRange {
    pub low: f64,
    pub high: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskFactor {
    HighFailureRate,
    ElevatedFailureRate,
    LongPlanningHorizon,
    ShortPlanningHorizon,
    LateHorizonAttrition,
    HighWithdrawalRate,
    VolatileInflation,
    RisingExpenses,
    PoorEarlyReturns,
    HighPortfolioVolatility,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PotentialImpact {
    Minimal,
    Moderate,
    Severe,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mitigation {
    ReviewPlanAnnually,
    ReduceWithdrawals,
    AdoptGuardrails,
    DeferRetirement,
    ExtendPlanningHorizon,
    ConsiderAnnuity,
    IndexLinkedAssets,
    HoldCashBuffer,
    ReduceEarlyEquityExposure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRating {
    pub level: RiskLevel,
    pub score: f64,
    pub probability_range: ProbabilityRange,
    pub factors: Vec<RiskFactor>,
    pub potential_impact: PotentialImpact,
    pub mitigation_strategies: Vec<Mitigation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskMetrics {
    pub shortfall_risk: RiskRating,
    pub longevity_risk: RiskRating,
    pub inflation_risk: RiskRating,
    pub sequence_risk: RiskRating,
    pub thresholds_version: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensitivityParameter {
    InflationRate,
    EquityReturn,
    WithdrawalRate,
    RetirementAge,
    ExpenseGrowth,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSweep {
    pub parameter: SensitivityParameter,
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_sweep_steps")]
    pub steps: u32,
}

pub const DEFAULT_SWEEP_STEPS: u32 = 5;

fn default_sweep_steps() -> u32 {
    DEFAULT_SWEEP_STEPS
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivitySample {
    pub value: f64,
    pub final_portfolio_value: f64,
    pub success_probability: f64,
    pub sustainability_years: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityResult {
    pub parameter_id: SensitivityParameter,
    pub baseline_value: Option<f64>,
    pub samples: Vec<SensitivitySample>,
}
