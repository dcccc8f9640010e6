use super::error::EngineError;
use super::types::ScenarioInput;

pub const MIN_SIMULATION_COUNT: u32 = 100;
pub const MAX_SIMULATION_COUNT: u32 = 1_000_000;
pub const MAX_HORIZON_YEARS: u32 = 80;
pub const ALLOCATION_TOLERANCE: f64 = 1e-6;

/// Checks every `ScenarioInput` invariant before any simulation work starts.
///
/// A zero starting portfolio is accepted so that the degenerate
/// "nothing in, nothing out" plan still produces a result.
pub fn validate_scenario(scenario: &ScenarioInput) -> Result<(), EngineError> {
    check(scenario).map_err(EngineError::InvalidScenario)
}

fn check(s: &ScenarioInput) -> Result<(), String> {
    if !s.initial_portfolio_value.is_finite() || s.initial_portfolio_value < 0.0 {
        return Err("initialPortfolioValue must be a finite, non-negative amount".to_string());
    }
    if !(1..=MAX_HORIZON_YEARS).contains(&s.time_horizon_years) {
        return Err(format!(
            "timeHorizonYears must be between 1 and {MAX_HORIZON_YEARS}"
        ));
    }
    if !s.annual_withdrawal.is_finite() || s.annual_withdrawal < 0.0 {
        return Err("annualWithdrawal must be >= 0".to_string());
    }
    if !s.withdrawal_growth_rate.is_finite() || s.withdrawal_growth_rate <= -1.0 {
        return Err("withdrawalGrowthRate must be > -100%".to_string());
    }
    if s.withdrawal_start_year >= s.time_horizon_years && s.annual_withdrawal > 0.0 {
        return Err("withdrawalStartYear must be < timeHorizonYears".to_string());
    }
    if !s.inflation_rate_mean.is_finite() {
        return Err("inflationRateMean must be finite".to_string());
    }
    if !s.inflation_rate_volatility.is_finite() || s.inflation_rate_volatility < 0.0 {
        return Err("inflationRateVolatility must be >= 0".to_string());
    }
    if s.simulation_count < MIN_SIMULATION_COUNT {
        return Err(format!(
            "simulationCount must be >= {MIN_SIMULATION_COUNT}"
        ));
    }
    if s.simulation_count > MAX_SIMULATION_COUNT {
        return Err(format!(
            "simulationCount must be <= {MAX_SIMULATION_COUNT}"
        ));
    }
    if s.asset_classes.is_empty() {
        return Err("at least one asset class is required".to_string());
    }

    let mut weight_sum = 0.0;
    for asset in &s.asset_classes {
        if !asset.expected_return.is_finite() {
            return Err(format!("expectedReturn for {} must be finite", asset.name));
        }
        if !asset.volatility.is_finite() || asset.volatility < 0.0 {
            return Err(format!("volatility for {} must be >= 0", asset.name));
        }
        if !asset.weight.is_finite() || asset.weight < 0.0 {
            return Err(format!("weight for {} must be >= 0", asset.name));
        }
        weight_sum += asset.weight;
    }
    if (weight_sum - 1.0).abs() > ALLOCATION_TOLERANCE {
        return Err(format!(
            "asset allocation weights must sum to 1 (got {weight_sum})"
        ));
    }

    Ok(())
}
