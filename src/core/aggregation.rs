use super::executor::{EARLY_RETURN_WINDOW, RunSet, RunSummary};
use super::types::{
    FailureYearStats, Percentiles, SequenceDiagnostics, SimulationResult, YearlyPercentileBand,
};

pub fn aggregate(runs: &RunSet, execution_time_ms: u64, complete: bool) -> SimulationResult {
    let summaries = runs.summaries();
    let n = summaries.len();

    let failed = summaries
        .iter()
        .filter(|s| s.depletion_year.is_some())
        .count();
    let succeeded = summaries
        .iter()
        .filter(|s| s.terminal_value >= 0.0 && s.depletion_year.is_none())
        .count();
    let success_share = share(succeeded, n);

    let mut terminal = runs.terminal_values();
    sort_values(&mut terminal);
    let percentiles = percentiles_of_sorted(&terminal);

    SimulationResult {
        success_rate: success_share * 100.0,
        success_confidence_half_width: binomial_ci_half_width(success_share, n) * 100.0,
        failure_risk: share(failed, n) * 100.0,
        percentiles,
        average_final_wealth: mean(&terminal),
        median_final_wealth: percentiles.p50,
        max_drawdown: summaries
            .iter()
            .map(|s| s.max_drawdown)
            .fold(0.0, f64::max),
        yearly_percentile_series: yearly_bands(runs),
        survival_curve: survival_curve(runs),
        failure_years: failure_year_stats(runs),
        sequence_diagnostics: sequence_diagnostics(runs),
        execution_time_ms,
        simulation_count: n as u32,
        time_horizon_years: runs.horizon_years,
        seed: runs.seed,
        complete,
    }
}

fn yearly_bands(runs: &RunSet) -> Vec<YearlyPercentileBand> {
    let initial = runs.initial_value;
    let mut bands = Vec::with_capacity(runs.horizon_years as usize + 1);
    bands.push(YearlyPercentileBand {
        year: 0,
        mean: initial,
        percentiles: Percentiles {
            p10: initial,
            p25: initial,
            p50: initial,
            p75: initial,
            p90: initial,
        },
    });

    if runs.is_empty() {
        return bands;
    }

    for year in 1..=runs.horizon_years {
        let mut values = runs.closing_values(year).to_vec();
        sort_values(&mut values);
        bands.push(YearlyPercentileBand {
            year,
            mean: mean(&values),
            percentiles: percentiles_of_sorted(&values),
        });
    }
    bands
}

fn survival_curve(runs: &RunSet) -> Vec<f64> {
    let n = runs.len();
    (1..=runs.horizon_years)
        .map(|year| {
            let alive = runs
                .summaries()
                .iter()
                .filter(|s| s.depletion_year.is_none_or(|d| d > year))
                .count();
            share(alive, n) * 100.0
        })
        .collect()
}

fn failure_year_stats(runs: &RunSet) -> FailureYearStats {
    let mut years: Vec<f64> = runs
        .summaries()
        .iter()
        .filter_map(|s| s.depletion_year)
        .map(f64::from)
        .collect();
    if years.is_empty() {
        return FailureYearStats::default();
    }
    sort_values(&mut years);

    FailureYearStats {
        failed_runs: years.len() as u32,
        earliest_depletion_year: Some(years[0] as u32),
        mean_depletion_year: Some(mean(&years)),
        median_depletion_year: Some(percentile_sorted(&years, 50.0)),
    }
}

fn sequence_diagnostics(runs: &RunSet) -> SequenceDiagnostics {
    let (failed, succeeded): (Vec<&RunSummary>, Vec<&RunSummary>) = runs
        .summaries()
        .iter()
        .partition(|s| s.depletion_year.is_some());
    let failed: Vec<f64> = failed.iter().map(|s| s.early_return_mean).collect();
    let succeeded: Vec<f64> = succeeded.iter().map(|s| s.early_return_mean).collect();

    SequenceDiagnostics {
        window_years: (EARLY_RETURN_WINDOW as u32).min(runs.horizon_years),
        failed_runs: failed.len() as u32,
        succeeded_runs: succeeded.len() as u32,
        failed_mean_return: mean(&failed),
        failed_return_std_dev: std_dev(&failed),
        succeeded_mean_return: mean(&succeeded),
        succeeded_return_std_dev: std_dev(&succeeded),
    }
}

fn share(count: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    count as f64 / n as f64
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

fn binomial_ci_half_width(p: f64, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = p.clamp(0.0, 1.0);
    1.96 * (p * (1.0 - p) / n as f64).sqrt()
}

fn sort_values(values: &mut [f64]) {
    values.sort_by(|a, b| a.total_cmp(b));
}

fn percentiles_of_sorted(sorted: &[f64]) -> Percentiles {
    Percentiles {
        p10: percentile_sorted(sorted, 10.0),
        p25: percentile_sorted(sorted, 25.0),
        p50: percentile_sorted(sorted, 50.0),
        p75: percentile_sorted(sorted, 75.0),
        p90: percentile_sorted(sorted, 90.0),
    }
}

/// Linear interpolation between order statistics (R-7).
pub fn percentile(values: &mut [f64], p: f64) -> f64 {
    sort_values(values);
    percentile_sorted(values, p)
}

fn percentile_sorted(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
