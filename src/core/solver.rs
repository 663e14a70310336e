use serde::Serialize;

use super::engine::run_simulation;
use super::error::SimulationError;
use super::types::{PolicyInputs, PopulationModel};

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakEvenConfig {
    pub search_min: f64,
    pub search_max: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
}

impl Default for BreakEvenConfig {
    fn default() -> Self {
        Self {
            search_min: 0.0,
            search_max: 2_000.0,
            tolerance: 0.01,
            max_iterations: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakEvenIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate_monthly_amount: f64,
    pub budget_balance: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakEvenResult {
    pub config: BreakEvenConfig,
    pub solved_monthly_amount: Option<f64>,
    pub balance_at_solution: Option<f64>,
    pub iterations: Vec<BreakEvenIteration>,
    pub converged: bool,
    pub feasible: bool,
    pub message: String,
}

/// Largest monthly UBI in the search range that the given tax mix still pays
/// for. Only `ubi_monthly_amount` varies; rates and target stay as given.
pub fn solve_break_even_ubi(
    inputs: &PolicyInputs,
    model: &PopulationModel,
    config: BreakEvenConfig,
) -> Result<BreakEvenResult, SimulationError> {
    validate_config(config)?;

    let low_balance = evaluate_candidate(inputs, model, config.search_min)?;
    let high_balance = evaluate_candidate(inputs, model, config.search_max)?;

    let mut iterations = Vec::new();
    let mut solved_monthly_amount = None;
    let mut converged = false;
    let feasible;
    let message;

    if low_balance < 0.0 {
        feasible = false;
        message = "Budget runs a deficit even at the lower UBI bound.".to_string();
    } else if high_balance >= 0.0 {
        solved_monthly_amount = Some(config.search_max);
        converged = true;
        feasible = true;
        message =
            "Upper UBI bound is still affordable; increase search max for a higher amount."
                .to_string();
    } else {
        let mut lo = config.search_min;
        let mut hi = config.search_max;
        let mut it = 0;
        while it < config.max_iterations {
            it += 1;
            let mid = (lo + hi) * 0.5;
            let balance = evaluate_candidate(inputs, model, mid)?;
            iterations.push(BreakEvenIteration {
                iteration: it,
                lower_bound: lo,
                upper_bound: hi,
                candidate_monthly_amount: mid,
                budget_balance: balance,
            });

            if balance >= 0.0 {
                lo = mid;
            } else {
                hi = mid;
            }

            if (hi - lo).abs() <= config.tolerance {
                converged = true;
                break;
            }
        }
        solved_monthly_amount = Some(lo);
        feasible = true;
        message = if converged {
            "Solved break-even UBI.".to_string()
        } else {
            "Reached max iterations before tolerance was met; returning best estimate."
                .to_string()
        };
    }

    let balance_at_solution = match solved_monthly_amount {
        Some(amount) => Some(evaluate_candidate(inputs, model, amount)?),
        None => None,
    };

    tracing::debug!(
        ubi_target = inputs.ubi_target.label(),
        iterations = iterations.len(),
        ?solved_monthly_amount,
        converged,
        feasible,
        "break-even search finished"
    );

    Ok(BreakEvenResult {
        config,
        solved_monthly_amount,
        balance_at_solution,
        iterations,
        converged,
        feasible,
        message,
    })
}

fn evaluate_candidate(
    base_inputs: &PolicyInputs,
    model: &PopulationModel,
    monthly_amount: f64,
) -> Result<f64, SimulationError> {
    let inputs = PolicyInputs {
        ubi_monthly_amount: monthly_amount,
        ..base_inputs.clone()
    };
    Ok(run_simulation(&inputs, model)?.budget_balance)
}

fn validate_config(config: BreakEvenConfig) -> Result<(), SimulationError> {
    if !config.search_min.is_finite() || !config.search_max.is_finite() {
        return Err(SimulationError::invalid("search bounds must be finite"));
    }
    if config.search_min < 0.0 {
        return Err(SimulationError::invalid("search_min must be >= 0"));
    }
    if config.search_max <= config.search_min {
        return Err(SimulationError::invalid(
            "search_max must be greater than search_min",
        ));
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err(SimulationError::invalid("tolerance must be > 0"));
    }
    if config.max_iterations == 0 {
        return Err(SimulationError::invalid("max_iterations must be > 0"));
    }
    Ok(())
}
