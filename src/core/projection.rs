use super::market::ReturnPath;
use super::types::{ScenarioInput, SimulationRun, YearlyPortfolioState};

/// Advances one portfolio through a fixed return path.
///
/// Each year the blended return is applied to the opening balance, the grown
/// balance is floored at zero, then the inflation-adjusted withdrawal is
/// taken. A withdrawal that cannot be covered depletes the run; the balance
/// stays at zero for the remaining years so every run has a full series.
#[derive(Debug, Clone)]
pub struct ProjectionEngine {
    weights: Vec<f64>,
    initial_value: f64,
    annual_withdrawal: f64,
    withdrawal_growth_rate: f64,
    withdrawal_start_year: u32,
}

impl ProjectionEngine {
    pub fn new(scenario: &ScenarioInput) -> Self {
        Self {
            weights: scenario.asset_classes.iter().map(|a| a.weight).collect(),
            initial_value: scenario.initial_portfolio_value,
            annual_withdrawal: scenario.annual_withdrawal,
            withdrawal_growth_rate: scenario.withdrawal_growth_rate,
            withdrawal_start_year: scenario.withdrawal_start_year,
        }
    }

    pub fn project(&self, run_index: u32, seed: u64, path: &ReturnPath) -> SimulationRun {
        let mut states = Vec::with_capacity(path.years());
        let mut balance = self.initial_value;
        let mut spending_index = 1.0;
        let mut depletion_year = None;

        for year in 0..path.years() {
            let opening = balance;
            let gross_return = path.blended_return(year, &self.weights);
            let inflation = path.inflation(year);

            let withdrawal = if year as u32 >= self.withdrawal_start_year {
                self.annual_withdrawal
            } else {
                0.0
            };
            let adjusted_withdrawal = withdrawal * spending_index;

            let grown = guard_balance(opening * (1.0 + gross_return));
            let closing = if adjusted_withdrawal > 0.0 && adjusted_withdrawal > grown {
                if depletion_year.is_none() {
                    depletion_year = Some(year as u32 + 1);
                }
                0.0
            } else {
                grown - adjusted_withdrawal
            };

            states.push(YearlyPortfolioState {
                year: year as u32 + 1,
                opening_value: opening,
                gross_return,
                inflation,
                withdrawal,
                inflation_adjusted_withdrawal: adjusted_withdrawal,
                closing_value: closing,
            });

            balance = closing;
            spending_index = guard_balance(
                spending_index * (1.0 + inflation) * (1.0 + self.withdrawal_growth_rate),
            );
        }

        SimulationRun {
            run_index,
            seed,
            initial_value: self.initial_value,
            states,
            depletion_year,
        }
    }
}

/// Floors at zero and keeps compounding finite.
fn guard_balance(value: f64) -> f64 {
    if value.is_nan() || value <= 0.0 {
        0.0
    } else {
        value.min(f64::MAX)
    }
}
