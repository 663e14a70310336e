mod engine;
mod error;
mod solver;
mod types;

pub use engine::run_simulation;
pub use error::SimulationError;
pub use solver::{BreakEvenConfig, BreakEvenIteration, BreakEvenResult, solve_break_even_ubi};
pub use types::{
    BracketKind, BracketOutcome, ConsumptionSplit, IncomeBracket, PolicyInputs, PopulationModel,
    SimulationResult, TOTAL_POPULATION, UbiTarget,
};
