//! Error taxonomy for calibration, solving, and simulation

use thiserror::Error;

/// Errors surfaced by the solver and simulator
///
/// Configuration problems are rejected up front, before any solving starts.
/// Numerical-boundary conditions (corner policies) and fixed-point
/// non-convergence are NOT errors: corners are valid solutions and
/// non-convergence is reported through [`crate::solver::ConvergenceDiagnostics`].
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid grid for {name}: count {count} (need >= 2), max {max} (need > 0)")]
    InvalidGrid { name: &'static str, count: usize, max: f64 },

    #[error("{name} = {value} is not a probability in [0, 1]")]
    InvalidProbability { name: &'static str, value: f64 },

    #[error("{name} must be positive, got {value}")]
    NonPositiveParameter { name: &'static str, value: f64 },

    #[error("age-varying {name} has {got} entries but the horizon has {expected} periods")]
    ScheduleLengthMismatch { name: &'static str, got: usize, expected: usize },

    #[error("horizon misconfiguration: {0}")]
    InvalidHorizon(String),

    #[error("simulation requests {requested} periods but the finite solve covers {available}")]
    SimulationHorizonExceeded { requested: usize, available: usize },

    #[error("calibration table error: {0}")]
    TableLoad(String),
}
