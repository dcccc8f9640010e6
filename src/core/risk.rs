//! Categorical risk ratings derived from an aggregated simulation.
//!
//! Every cutoff lives in [`RiskThresholds`], a versioned table that can be
//! loaded from configuration, so the classification is data rather than
//! scattered conditionals.

use serde::Deserialize;

use super::types::{
    Mitigation, PotentialImpact, ProbabilityRange, RiskFactor, RiskLevel, RiskMetrics, RiskRating,
    ScenarioInput, SimulationResult,
};

/// `value < low_below` is Low, `value > high_above` is High, otherwise Medium.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LevelBands {
    pub low_below: f64,
    pub high_above: f64,
}

impl LevelBands {
    pub fn level(&self, value: f64) -> RiskLevel {
        if value < self.low_below {
            RiskLevel::Low
        } else if value > self.high_above {
            RiskLevel::High
        } else {
            RiskLevel::Medium
        }
    }

    /// Display range of a level on a 0..100 percentage scale.
    pub fn range(&self, level: RiskLevel) -> ProbabilityRange {
        match level {
            RiskLevel::Low => ProbabilityRange {
                low: 0.0,
                high: self.low_below,
            },
            RiskLevel::Medium => ProbabilityRange {
                low: self.low_below,
                high: self.high_above,
            },
            RiskLevel::High => ProbabilityRange {
                low: self.high_above,
                high: 100.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct LongevityThresholds {
    /// Years beyond the horizon the client might live.
    pub extension_years: u32,
    /// Trailing years of the survival curve used for the attrition slope.
    pub attrition_window_years: u32,
    /// Bands over the projected failure percentage at the extended horizon.
    pub projected_failure: LevelBands,
    pub short_horizon_years: u32,
    pub long_horizon_years: u32,
    /// Percentage points of survival lost per year that count as attrition.
    pub attrition_per_year: f64,
}

impl Default for LongevityThresholds {
    fn default() -> Self {
        Self {
            extension_years: 5,
            attrition_window_years: 5,
            projected_failure: LevelBands {
                low_below: 15.0,
                high_above: 30.0,
            },
            short_horizon_years: 20,
            long_horizon_years: 30,
            attrition_per_year: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct InflationThresholds {
    /// Bands over inflation volatility (%) times withdrawal rate (%).
    pub exposure: LevelBands,
    pub volatile_inflation_above: f64,
}

impl Default for InflationThresholds {
    fn default() -> Self {
        Self {
            exposure: LevelBands {
                low_below: 5.0,
                high_above: 12.0,
            },
            volatile_inflation_above: 0.02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SequenceThresholds {
    /// Bands over the separation (in pooled standard deviations) between the
    /// early-year returns of succeeded and failed runs.
    pub separation: LevelBands,
    /// Below this failure percentage there is too little signal to rate.
    pub min_failure_share: f64,
    /// Failed-run dispersion above this multiple of succeeded-run dispersion
    /// is flagged.
    pub dispersion_ratio: f64,
}

impl Default for SequenceThresholds {
    fn default() -> Self {
        Self {
            separation: LevelBands {
                low_below: 0.5,
                high_above: 1.0,
            },
            min_failure_share: 2.0,
            dispersion_ratio: 1.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    pub version: u32,
    /// Bands over `failure_risk` (%).
    pub shortfall: LevelBands,
    pub longevity: LongevityThresholds,
    pub inflation: InflationThresholds,
    pub sequence: SequenceThresholds,
    /// Display ranges for ratings whose score is not itself a percentage.
    pub likelihood: LevelBands,
    pub high_withdrawal_rate: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            version: 1,
            shortfall: LevelBands {
                low_below: 10.0,
                high_above: 25.0,
            },
            longevity: LongevityThresholds::default(),
            inflation: InflationThresholds::default(),
            sequence: SequenceThresholds::default(),
            likelihood: LevelBands {
                low_below: 20.0,
                high_above: 50.0,
            },
            high_withdrawal_rate: 0.05,
        }
    }
}

impl RiskThresholds {
    pub fn validate(&self) -> Result<(), String> {
        let bands = [
            ("shortfall", self.shortfall),
            ("longevity.projected_failure", self.longevity.projected_failure),
            ("inflation.exposure", self.inflation.exposure),
            ("sequence.separation", self.sequence.separation),
            ("likelihood", self.likelihood),
        ];
        for (name, band) in bands {
            if !band.low_below.is_finite() || !band.high_above.is_finite() {
                return Err(format!("{name} bands must be finite"));
            }
            if band.low_below > band.high_above {
                return Err(format!("{name}: low_below must be <= high_above"));
            }
        }
        if self.longevity.attrition_window_years == 0 {
            return Err("longevity.attrition_window_years must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RiskClassifier {
    thresholds: RiskThresholds,
}

impl RiskClassifier {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }

    pub fn classify(&self, scenario: &ScenarioInput, result: &SimulationResult) -> RiskMetrics {
        RiskMetrics {
            shortfall_risk: self.shortfall(scenario, result),
            longevity_risk: self.longevity(scenario, result),
            inflation_risk: self.inflation(scenario),
            sequence_risk: self.sequence(result),
            thresholds_version: self.thresholds.version,
        }
    }

    fn shortfall(&self, scenario: &ScenarioInput, result: &SimulationResult) -> RiskRating {
        let bands = self.thresholds.shortfall;
        let level = bands.level(result.failure_risk);

        let mut factors = Vec::new();
        match level {
            RiskLevel::High => factors.push(RiskFactor::HighFailureRate),
            RiskLevel::Medium => factors.push(RiskFactor::ElevatedFailureRate),
            RiskLevel::Low => {}
        }
        if scenario.withdrawal_rate() > self.thresholds.high_withdrawal_rate {
            factors.push(RiskFactor::HighWithdrawalRate);
        }

        let mitigation_strategies = match level {
            RiskLevel::Low => vec![Mitigation::ReviewPlanAnnually],
            RiskLevel::Medium => vec![Mitigation::ReviewPlanAnnually, Mitigation::AdoptGuardrails],
            RiskLevel::High => vec![
                Mitigation::ReduceWithdrawals,
                Mitigation::DeferRetirement,
                Mitigation::AdoptGuardrails,
            ],
        };

        rating(
            level,
            result.failure_risk,
            bands.range(level),
            factors,
            mitigation_strategies,
        )
    }

    /// Projects success past the horizon using the recent slope of the
    /// survival curve.
    fn longevity(&self, scenario: &ScenarioInput, result: &SimulationResult) -> RiskRating {
        let t = self.thresholds.longevity;
        let slope = attrition_slope(&result.survival_curve, t.attrition_window_years as usize);
        let projected_success =
            (result.success_rate - slope * t.extension_years as f64).clamp(0.0, 100.0);
        let projected_failure = 100.0 - projected_success;

        let mut level = t.projected_failure.level(projected_failure);
        let mut factors = Vec::new();
        let mut mitigation_strategies = Vec::new();

        if scenario.time_horizon_years < t.short_horizon_years {
            level = level.escalate();
            factors.push(RiskFactor::ShortPlanningHorizon);
            mitigation_strategies.push(Mitigation::ExtendPlanningHorizon);
        } else if scenario.time_horizon_years >= t.long_horizon_years {
            factors.push(RiskFactor::LongPlanningHorizon);
        }
        if slope > t.attrition_per_year {
            factors.push(RiskFactor::LateHorizonAttrition);
        }
        match level {
            RiskLevel::Low => mitigation_strategies.push(Mitigation::ReviewPlanAnnually),
            RiskLevel::Medium => mitigation_strategies.push(Mitigation::ConsiderAnnuity),
            RiskLevel::High => {
                mitigation_strategies.push(Mitigation::ConsiderAnnuity);
                mitigation_strategies.push(Mitigation::ReduceWithdrawals);
            }
        }

        rating(
            level,
            projected_failure,
            t.projected_failure.range(level),
            factors,
            mitigation_strategies,
        )
    }

    fn inflation(&self, scenario: &ScenarioInput) -> RiskRating {
        let t = self.thresholds.inflation;
        let rate = scenario.withdrawal_rate();
        // an empty portfolio with spending due withdraws its whole value
        let withdrawal_share = rate.min(1.0);
        let exposure = if scenario.inflation_rate_volatility == 0.0 || withdrawal_share == 0.0 {
            0.0
        } else {
            scenario.inflation_rate_volatility * 100.0 * withdrawal_share * 100.0
        };
        let level = t.exposure.level(exposure);

        let mut factors = Vec::new();
        if scenario.inflation_rate_volatility > t.volatile_inflation_above {
            factors.push(RiskFactor::VolatileInflation);
        }
        if rate > self.thresholds.high_withdrawal_rate {
            factors.push(RiskFactor::HighWithdrawalRate);
        }
        if scenario.withdrawal_growth_rate > 0.0 {
            factors.push(RiskFactor::RisingExpenses);
        }

        let mitigation_strategies = match level {
            RiskLevel::Low => vec![Mitigation::ReviewPlanAnnually],
            RiskLevel::Medium => vec![Mitigation::IndexLinkedAssets],
            RiskLevel::High => vec![Mitigation::IndexLinkedAssets, Mitigation::ReduceWithdrawals],
        };

        rating(
            level,
            exposure,
            self.thresholds.likelihood.range(level),
            factors,
            mitigation_strategies,
        )
    }

    fn sequence(&self, result: &SimulationResult) -> RiskRating {
        let t = self.thresholds.sequence;
        let d = result.sequence_diagnostics;

        let separation = if result.failure_risk < t.min_failure_share || d.succeeded_runs == 0 {
            0.0
        } else {
            let pooled = ((d.failed_return_std_dev.powi(2) + d.succeeded_return_std_dev.powi(2))
                / 2.0)
                .sqrt();
            if pooled > 0.0 {
                ((d.succeeded_mean_return - d.failed_mean_return) / pooled).max(0.0)
            } else {
                0.0
            }
        };
        let level = t.separation.level(separation);

        let mut factors = Vec::new();
        if level != RiskLevel::Low {
            factors.push(RiskFactor::PoorEarlyReturns);
        }
        if d.failed_runs > 1
            && d.succeeded_runs > 1
            && d.failed_return_std_dev > d.succeeded_return_std_dev * t.dispersion_ratio
        {
            factors.push(RiskFactor::HighPortfolioVolatility);
        }

        let mitigation_strategies = match level {
            RiskLevel::Low => vec![Mitigation::ReviewPlanAnnually],
            RiskLevel::Medium => vec![Mitigation::HoldCashBuffer, Mitigation::AdoptGuardrails],
            RiskLevel::High => vec![
                Mitigation::HoldCashBuffer,
                Mitigation::ReduceEarlyEquityExposure,
                Mitigation::AdoptGuardrails,
            ],
        };

        rating(
            level,
            separation,
            self.thresholds.likelihood.range(level),
            factors,
            mitigation_strategies,
        )
    }
}

fn rating(
    level: RiskLevel,
    score: f64,
    probability_range: ProbabilityRange,
    factors: Vec<RiskFactor>,
    mitigation_strategies: Vec<Mitigation>,
) -> RiskRating {
    RiskRating {
        level,
        score,
        probability_range,
        factors,
        potential_impact: match level {
            RiskLevel::Low => PotentialImpact::Minimal,
            RiskLevel::Medium => PotentialImpact::Moderate,
            RiskLevel::High => PotentialImpact::Severe,
        },
        mitigation_strategies,
    }
}

/// Survival percentage points lost per year over the trailing window.
fn attrition_slope(survival: &[f64], window: usize) -> f64 {
    if survival.is_empty() {
        return 0.0;
    }
    let horizon = survival.len();
    let window = window.min(horizon).max(1);
    let end = survival[horizon - 1];
    let start = if horizon > window {
        survival[horizon - 1 - window]
    } else {
        100.0
    };
    ((start - end) / window as f64).max(0.0)
}
