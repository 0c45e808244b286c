//! Lifecycle Portfolio - solver and simulator for a two-asset savings model
//! with an income-contribution scheme
//!
//! This library provides:
//! - Backward-induction solution of a three-stage consumption/contribution/
//!   rebalancing problem over normalized risk-free and risky assets
//! - Finite (life-cycle) and infinite-horizon (fixed-point) drivers
//! - Gauss-Hermite shock discretization with unemployment and mortality
//! - Forward Monte-Carlo population simulation with full histories
//! - Batch scenario runs across friction parametrizations

pub mod calibration;
pub mod error;
pub mod grids;
pub mod interp;
pub mod scenario;
pub mod shocks;
pub mod simulate;
pub mod solver;

// Re-export commonly used types
pub use calibration::Calibration;
pub use error::ModelError;
pub use grids::{GridSpec, StateGrids};
pub use scenario::ScenarioRunner;
pub use simulate::{simulate, SimConfig, SimHistory};
pub use solver::{solve, Branch, SolvedModel, StageKind};
