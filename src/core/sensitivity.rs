use rayon::prelude::*;
use tracing::debug;

use super::aggregation::aggregate;
use super::error::EngineError;
use super::executor::RunExecutor;
use super::market::resolve_seed;
use super::types::{
    AssetKind, ParameterSweep, ScenarioInput, SensitivityParameter, SensitivityResult,
    SensitivitySample,
};
use super::validation::{MIN_SIMULATION_COUNT, validate_scenario};

/// One-at-a-time parameter sweeps over the full simulation pipeline.
///
/// Every sample reuses the scenario's base seed, so all points on a curve see
/// the same market paths and differ only by the swept parameter.
#[derive(Debug, Clone, Copy)]
pub struct SensitivityAnalyzer {
    simulation_count: u32,
    batch_size: usize,
}

impl SensitivityAnalyzer {
    pub fn new(simulation_count: u32, batch_size: usize) -> Self {
        Self {
            simulation_count: simulation_count.max(MIN_SIMULATION_COUNT),
            batch_size,
        }
    }

    fn runs_for(&self, scenario: &ScenarioInput) -> u32 {
        self.simulation_count
            .min(scenario.simulation_count)
            .max(MIN_SIMULATION_COUNT)
    }

    pub fn analyze(
        &self,
        scenario: &ScenarioInput,
        sweeps: &[ParameterSweep],
    ) -> Result<Vec<SensitivityResult>, EngineError> {
        validate_scenario(scenario)?;
        for sweep in sweeps {
            validate_sweep(scenario, sweep)?;
        }

        let mut base = scenario.clone();
        base.random_seed = Some(resolve_seed(scenario.random_seed));
        base.simulation_count = self.runs_for(scenario);

        sweeps
            .par_iter()
            .map(|sweep| self.sweep(&base, sweep))
            .collect()
    }

    fn sweep(
        &self,
        base: &ScenarioInput,
        sweep: &ParameterSweep,
    ) -> Result<SensitivityResult, EngineError> {
        let mut samples = Vec::with_capacity(sweep.steps as usize + 1);
        for value in sample_points(sweep) {
            samples.push(self.evaluate_candidate(base, sweep.parameter, value)?);
        }
        debug!(parameter = ?sweep.parameter, samples = samples.len(), "sensitivity sweep finished");

        Ok(SensitivityResult {
            parameter_id: sweep.parameter,
            baseline_value: baseline_value(base, sweep.parameter),
            samples,
        })
    }

    fn evaluate_candidate(
        &self,
        base: &ScenarioInput,
        parameter: SensitivityParameter,
        value: f64,
    ) -> Result<SensitivitySample, EngineError> {
        let scenario = apply_parameter(base, parameter, value)?;
        validate_scenario(&scenario)?;

        let seed = scenario.random_seed.unwrap_or_default();
        let execution = RunExecutor::new(&scenario, seed, self.batch_size).execute(None, None);
        let result = aggregate(&execution.runs, 0, true);

        Ok(SensitivitySample {
            value,
            final_portfolio_value: result.median_final_wealth,
            success_probability: result.success_rate,
            sustainability_years: result
                .failure_years
                .mean_depletion_year
                .unwrap_or(scenario.time_horizon_years as f64),
        })
    }
}

/// `steps + 1` evenly spaced values from `min` to `max`, both inclusive.
pub fn sample_points(sweep: &ParameterSweep) -> Vec<f64> {
    let steps = sweep.steps.max(1);
    (0..=steps)
        .map(|i| {
            if i == steps {
                sweep.max
            } else {
                let value = sweep.min + (sweep.max - sweep.min) * i as f64 / steps as f64;
                value.clamp(sweep.min, sweep.max)
            }
        })
        .collect()
}

fn apply_parameter(
    base: &ScenarioInput,
    parameter: SensitivityParameter,
    value: f64,
) -> Result<ScenarioInput, EngineError> {
    let mut scenario = base.clone();
    match parameter {
        SensitivityParameter::InflationRate => scenario.inflation_rate_mean = value,
        SensitivityParameter::EquityReturn => {
            for asset in scenario
                .asset_classes
                .iter_mut()
                .filter(|a| a.kind == AssetKind::Equity)
            {
                asset.expected_return = value;
            }
        }
        SensitivityParameter::WithdrawalRate => {
            scenario.annual_withdrawal = value * scenario.initial_portfolio_value;
        }
        SensitivityParameter::RetirementAge => {
            let current_age = scenario.current_age.ok_or_else(|| {
                EngineError::InvalidSweep("retirement-age sweep requires currentAge".to_string())
            })?;
            scenario.withdrawal_start_year = (value.round() as u32).saturating_sub(current_age);
        }
        SensitivityParameter::ExpenseGrowth => scenario.withdrawal_growth_rate = value,
    }
    Ok(scenario)
}

fn baseline_value(scenario: &ScenarioInput, parameter: SensitivityParameter) -> Option<f64> {
    match parameter {
        SensitivityParameter::InflationRate => Some(scenario.inflation_rate_mean),
        SensitivityParameter::EquityReturn => scenario
            .asset_classes
            .iter()
            .find(|a| a.kind == AssetKind::Equity)
            .map(|a| a.expected_return),
        SensitivityParameter::WithdrawalRate => Some(scenario.withdrawal_rate()),
        SensitivityParameter::RetirementAge => scenario
            .current_age
            .map(|age| (age + scenario.withdrawal_start_year) as f64),
        SensitivityParameter::ExpenseGrowth => Some(scenario.withdrawal_growth_rate),
    }
}

fn validate_sweep(scenario: &ScenarioInput, sweep: &ParameterSweep) -> Result<(), EngineError> {
    check_sweep(scenario, sweep).map_err(EngineError::InvalidSweep)
}

fn check_sweep(scenario: &ScenarioInput, sweep: &ParameterSweep) -> Result<(), String> {
    let name = format!("{:?}", sweep.parameter);
    if !sweep.min.is_finite() || !sweep.max.is_finite() {
        return Err(format!("{name}: bounds must be finite"));
    }
    if sweep.max < sweep.min {
        return Err(format!("{name}: max must be >= min"));
    }
    if sweep.steps == 0 {
        return Err(format!("{name}: steps must be > 0"));
    }

    match sweep.parameter {
        SensitivityParameter::InflationRate => {}
        SensitivityParameter::EquityReturn => {
            if !scenario
                .asset_classes
                .iter()
                .any(|a| a.kind == AssetKind::Equity)
            {
                return Err(format!("{name}: scenario has no equity asset class"));
            }
        }
        SensitivityParameter::WithdrawalRate => {
            if sweep.min < 0.0 {
                return Err(format!("{name}: min must be >= 0"));
            }
        }
        SensitivityParameter::RetirementAge => {
            let Some(current_age) = scenario.current_age else {
                return Err(format!("{name}: scenario has no currentAge"));
            };
            if sweep.min < current_age as f64 {
                return Err(format!(
                    "{name}: min must be >= currentAge ({current_age})"
                ));
            }
            let latest_start = (sweep.max.round() as u32).saturating_sub(current_age);
            if latest_start >= scenario.time_horizon_years {
                return Err(format!(
                    "{name}: max must leave at least one drawdown year in the horizon"
                ));
            }
        }
        SensitivityParameter::ExpenseGrowth => {
            if sweep.min <= -1.0 {
                return Err(format!("{name}: min must be > -100%"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AssetClassAssumption, DEFAULT_SWEEP_STEPS};
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    fn scenario() -> ScenarioInput {
        ScenarioInput {
            initial_portfolio_value: 600_000.0,
            time_horizon_years: 25,
            annual_withdrawal: 30_000.0,
            withdrawal_growth_rate: 0.0,
            withdrawal_start_year: 0,
            current_age: Some(62),
            inflation_rate_mean: 0.025,
            inflation_rate_volatility: 0.01,
            asset_classes: vec![
                AssetClassAssumption {
                    name: "Equity".to_string(),
                    kind: AssetKind::Equity,
                    expected_return: 0.07,
                    volatility: 0.15,
                    weight: 0.6,
                },
                AssetClassAssumption {
                    name: "Bonds".to_string(),
                    kind: AssetKind::Bond,
                    expected_return: 0.03,
                    volatility: 0.05,
                    weight: 0.4,
                },
            ],
            simulation_count: 2_000,
            random_seed: Some(8),
        }
    }

    fn sweep(parameter: SensitivityParameter, min: f64, max: f64) -> ParameterSweep {
        ParameterSweep {
            parameter,
            min,
            max,
            steps: DEFAULT_SWEEP_STEPS,
        }
    }

    #[test]
    fn produces_steps_plus_one_samples_within_bounds() {
        let analyzer = SensitivityAnalyzer::new(200, 64);
        let sweeps = [
            sweep(SensitivityParameter::InflationRate, 0.01, 0.05),
            sweep(SensitivityParameter::EquityReturn, 0.03, 0.09),
            sweep(SensitivityParameter::WithdrawalRate, 0.03, 0.06),
            sweep(SensitivityParameter::RetirementAge, 62.0, 67.0),
            sweep(SensitivityParameter::ExpenseGrowth, 0.0, 0.02),
        ];
        let results = analyzer.analyze(&scenario(), &sweeps).expect("valid sweeps");
        assert_eq!(results.len(), 5);
        for (result, sweep) in results.iter().zip(&sweeps) {
            assert_eq!(result.parameter_id, sweep.parameter);
            assert_eq!(result.samples.len(), 6);
            for sample in &result.samples {
                assert!(sample.value >= sweep.min && sample.value <= sweep.max);
                assert!((0.0..=100.0).contains(&sample.success_probability));
                assert!(sample.sustainability_years <= 25.0);
            }
        }
    }

    #[test]
    fn higher_withdrawal_rate_never_improves_success() {
        let analyzer = SensitivityAnalyzer::new(300, 64);
        let results = analyzer
            .analyze(
                &scenario(),
                &[sweep(SensitivityParameter::WithdrawalRate, 0.02, 0.08)],
            )
            .expect("valid sweep");
        let samples = &results[0].samples;
        for pair in samples.windows(2) {
            assert!(pair[1].success_probability <= pair[0].success_probability);
            assert!(pair[1].final_portfolio_value <= pair[0].final_portfolio_value);
        }
    }

    #[test]
    fn later_retirement_never_reduces_success() {
        let analyzer = SensitivityAnalyzer::new(300, 64);
        let results = analyzer
            .analyze(
                &scenario(),
                &[sweep(SensitivityParameter::RetirementAge, 62.0, 72.0)],
            )
            .expect("valid sweep");
        let samples = &results[0].samples;
        for pair in samples.windows(2) {
            assert!(pair[1].success_probability >= pair[0].success_probability);
        }
        assert_eq!(results[0].baseline_value, Some(62.0));
    }

    #[test]
    fn sweeps_are_reproducible() {
        let analyzer = SensitivityAnalyzer::new(150, 64);
        let sweeps = [sweep(SensitivityParameter::InflationRate, 0.0, 0.06)];
        let a = analyzer.analyze(&scenario(), &sweeps).expect("valid");
        let b = analyzer.analyze(&scenario(), &sweeps).expect("valid");
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_retirement_sweep_without_age() {
        let mut s = scenario();
        s.current_age = None;
        let err = SensitivityAnalyzer::new(100, 64)
            .analyze(&s, &[sweep(SensitivityParameter::RetirementAge, 60.0, 65.0)])
            .expect_err("needs age");
        assert!(matches!(err, EngineError::InvalidSweep(_)));
    }

    #[test]
    fn rejects_retirement_age_below_current_age() {
        let err = SensitivityAnalyzer::new(100, 64)
            .analyze(
                &scenario(),
                &[sweep(SensitivityParameter::RetirementAge, 50.0, 60.0)],
            )
            .expect_err("already 62");
        assert!(matches!(err, EngineError::InvalidSweep(_)));
        assert!(err.to_string().contains("currentAge"));
    }

    #[test]
    fn sample_runs_never_exceed_baseline_count() {
        let mut s = scenario();
        s.simulation_count = 150;
        assert_eq!(SensitivityAnalyzer::new(500, 64).runs_for(&s), 150);
        assert_eq!(SensitivityAnalyzer::new(120, 64).runs_for(&s), 120);
        assert_eq!(SensitivityAnalyzer::new(10, 64).runs_for(&s), MIN_SIMULATION_COUNT);

        let capped = SensitivityAnalyzer::new(500, 64)
            .analyze(&s, &[sweep(SensitivityParameter::InflationRate, 0.02, 0.03)])
            .expect("valid");
        let direct = SensitivityAnalyzer::new(150, 64)
            .analyze(&s, &[sweep(SensitivityParameter::InflationRate, 0.02, 0.03)])
            .expect("valid");
        assert_eq!(capped, direct);
    }

    #[test]
    fn rejects_equity_sweep_without_equity() {
        let mut s = scenario();
        s.asset_classes[0].kind = AssetKind::Property;
        let err = SensitivityAnalyzer::new(100, 64)
            .analyze(&s, &[sweep(SensitivityParameter::EquityReturn, 0.02, 0.08)])
            .expect_err("needs equity");
        assert!(err.to_string().contains("equity"));
    }

    #[test]
    fn rejects_inverted_bounds_and_invalid_scenario() {
        let analyzer = SensitivityAnalyzer::new(100, 64);
        let err = analyzer
            .analyze(
                &scenario(),
                &[sweep(SensitivityParameter::InflationRate, 0.05, 0.01)],
            )
            .expect_err("inverted");
        assert!(matches!(err, EngineError::InvalidSweep(_)));

        let mut s = scenario();
        s.simulation_count = 10;
        let err = analyzer
            .analyze(&s, &[sweep(SensitivityParameter::InflationRate, 0.01, 0.05)])
            .expect_err("invalid scenario");
        assert!(matches!(err, EngineError::InvalidScenario(_)));
    }

    #[test]
    fn sustainability_is_full_horizon_without_failures() {
        let mut s = scenario();
        s.annual_withdrawal = 0.0;
        let results = SensitivityAnalyzer::new(100, 64)
            .analyze(&s, &[sweep(SensitivityParameter::InflationRate, 0.0, 0.04)])
            .expect("valid");
        for sample in &results[0].samples {
            assert_eq!(sample.sustainability_years, 25.0);
            assert_eq!(sample.success_probability, 100.0);
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_sample_points_cover_bounds(
            min in -10.0f64..10.0,
            width in 0.0f64..20.0,
            steps in 1u32..12,
        ) {
            let s = ParameterSweep {
                parameter: SensitivityParameter::InflationRate,
                min,
                max: min + width,
                steps,
            };
            let points = sample_points(&s);
            prop_assert_eq!(points.len(), steps as usize + 1);
            prop_assert_eq!(points[0], s.min);
            prop_assert_eq!(points[steps as usize], s.max);
            for pair in points.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
            for p in &points {
                prop_assert!(*p >= s.min && *p <= s.max);
            }
        }
    }
}
