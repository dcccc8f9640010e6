use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::debug;

use super::market::{ReturnPathGenerator, derive_seed};
use super::projection::ProjectionEngine;
use super::types::{ProgressStage, ProgressUpdate, ScenarioInput, SimulationRun};

/// Years at the start of each run used for sequence-of-returns diagnostics.
pub const EARLY_RETURN_WINDOW: usize = 5;

pub const DEFAULT_BATCH_SIZE: usize = 256;

pub type ProgressCallback<'a> = &'a (dyn Fn(ProgressUpdate) + Sync);

/// Cooperative cancellation flag, checked between run batches.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub run_index: u32,
    pub terminal_value: f64,
    pub depletion_year: Option<u32>,
    pub max_drawdown: f64,
    pub early_return_mean: f64,
}

/// Outcomes of every completed run, in run-index order.
///
/// Only the closing value per year is kept from each run's state series.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSet {
    pub seed: u64,
    pub horizon_years: u32,
    pub initial_value: f64,
    summaries: Vec<RunSummary>,
    yearly_closing: Vec<Vec<f64>>,
}

impl RunSet {
    pub fn new(seed: u64, horizon_years: u32, initial_value: f64, expected_runs: usize) -> Self {
        Self {
            seed,
            horizon_years,
            initial_value,
            summaries: Vec::with_capacity(expected_runs),
            yearly_closing: (0..horizon_years)
                .map(|_| Vec::with_capacity(expected_runs))
                .collect(),
        }
    }

    pub fn push(&mut self, run: SimulationRun) {
        for (idx, state) in run.states.iter().enumerate() {
            self.yearly_closing[idx].push(state.closing_value);
        }
        self.summaries.push(RunSummary {
            run_index: run.run_index,
            terminal_value: run.terminal_value(),
            depletion_year: run.depletion_year,
            max_drawdown: run.max_drawdown(),
            early_return_mean: run.early_return_mean(EARLY_RETURN_WINDOW),
        });
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    pub fn summaries(&self) -> &[RunSummary] {
        &self.summaries
    }

    pub fn terminal_values(&self) -> Vec<f64> {
        self.summaries.iter().map(|s| s.terminal_value).collect()
    }

    pub fn closing_values(&self, year: u32) -> &[f64] {
        &self.yearly_closing[(year - 1) as usize]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub runs: RunSet,
    pub cancelled: bool,
}

pub struct RunExecutor {
    generator: ReturnPathGenerator,
    projection: ProjectionEngine,
    simulation_count: u32,
    horizon_years: u32,
    initial_value: f64,
    seed: u64,
    batch_size: usize,
}

impl RunExecutor {
    pub fn new(scenario: &ScenarioInput, seed: u64, batch_size: usize) -> Self {
        Self {
            generator: ReturnPathGenerator::new(scenario),
            projection: ProjectionEngine::new(scenario),
            simulation_count: scenario.simulation_count,
            horizon_years: scenario.time_horizon_years,
            initial_value: scenario.initial_portfolio_value,
            seed,
            batch_size: batch_size.max(1),
        }
    }

    pub fn run_one(&self, run_index: u32) -> SimulationRun {
        let run_seed = derive_seed(self.seed, run_index);
        let path = self.generator.generate(run_seed);
        self.projection.project(run_index, run_seed, &path)
    }

    /// Executes all runs batch by batch on the current rayon pool. Runs inside
    /// a batch finish before a cancellation request is honoured.
    pub fn execute(
        &self,
        cancel: Option<&CancellationToken>,
        progress: Option<ProgressCallback<'_>>,
    ) -> Execution {
        let total = self.simulation_count;
        let mut runs = RunSet::new(
            self.seed,
            self.horizon_years,
            self.initial_value,
            total as usize,
        );

        let mut start = 0_u32;
        while start < total {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Execution {
                    runs,
                    cancelled: true,
                };
            }

            let end = (start + self.batch_size as u32).min(total);
            let batch: Vec<SimulationRun> = (start..end)
                .into_par_iter()
                .map(|run_index| self.run_one(run_index))
                .collect();
            for run in batch {
                runs.push(run);
            }
            debug!(completed = end, total, "run batch finished");

            if let Some(report) = progress {
                report(ProgressUpdate {
                    current_simulation: end,
                    total_simulations: total,
                    stage: ProgressStage::Simulating,
                });
            }
            start = end;
        }

        Execution {
            runs,
            cancelled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AssetClassAssumption, AssetKind};
    use std::sync::Mutex;

    fn scenario(count: u32) -> ScenarioInput {
        ScenarioInput {
            initial_portfolio_value: 250_000.0,
            time_horizon_years: 20,
            annual_withdrawal: 15_000.0,
            withdrawal_growth_rate: 0.0,
            withdrawal_start_year: 0,
            current_age: None,
            inflation_rate_mean: 0.025,
            inflation_rate_volatility: 0.01,
            asset_classes: vec![AssetClassAssumption {
                name: "Equity".to_string(),
                kind: AssetKind::Equity,
                expected_return: 0.06,
                volatility: 0.18,
                weight: 1.0,
            }],
            simulation_count: count,
            random_seed: Some(21),
        }
    }

    #[test]
    fn collects_every_run_in_index_order() {
        let s = scenario(300);
        let execution = RunExecutor::new(&s, 21, 64).execute(None, None);
        assert!(!execution.cancelled);
        assert_eq!(execution.runs.len(), 300);
        for (idx, summary) in execution.runs.summaries().iter().enumerate() {
            assert_eq!(summary.run_index, idx as u32);
        }
        assert_eq!(execution.runs.closing_values(20).len(), 300);
    }

    #[test]
    fn batch_size_does_not_change_results() {
        let s = scenario(200);
        let a = RunExecutor::new(&s, 21, 7).execute(None, None);
        let b = RunExecutor::new(&s, 21, 500).execute(None, None);
        assert_eq!(a, b);
    }

    #[test]
    fn adding_runs_preserves_earlier_terminal_values() {
        let small = RunExecutor::new(&scenario(150), 21, 32).execute(None, None);
        let large = RunExecutor::new(&scenario(600), 21, 32).execute(None, None);
        let small_values = small.runs.terminal_values();
        let large_values = large.runs.terminal_values();
        assert_eq!(&large_values[..150], &small_values[..]);
    }

    #[test]
    fn pre_cancelled_token_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let execution = RunExecutor::new(&scenario(300), 21, 64).execute(Some(&token), None);
        assert!(execution.cancelled);
        assert!(execution.runs.is_empty());
    }

    #[test]
    fn cancellation_takes_effect_after_current_batch() {
        let token = CancellationToken::new();
        let cancel_after_first = |update: ProgressUpdate| {
            if update.current_simulation >= 100 {
                token.cancel();
            }
        };
        let executor = RunExecutor::new(&scenario(1_000), 21, 100);
        let execution = executor.execute(Some(&token), Some(&cancel_after_first));
        assert!(execution.cancelled);
        assert_eq!(execution.runs.len(), 100);
    }

    #[test]
    fn progress_reports_each_batch() {
        let seen = Mutex::new(Vec::new());
        let record = |update: ProgressUpdate| {
            seen.lock().expect("progress lock").push(update.current_simulation);
        };
        RunExecutor::new(&scenario(250), 21, 100).execute(None, Some(&record));
        assert_eq!(*seen.lock().expect("progress lock"), vec![100, 200, 250]);
    }
}
