//! Backward-induction dynamic-programming core
//!
//! Within a period the agent decides Rebalancing -> Share -> Consumption;
//! numerically each stage needs the next stage's value function, so
//! construction runs in the opposite order. Across periods the recursion is
//! strictly backward: one operator, applied once per age (finite horizon) or
//! iterated to a fixed point (infinite horizon).

mod period;
mod solution;
mod stages;
mod utility;

pub use period::{
    solve, solve_with_guess, Branch, ConvergenceDiagnostics, PeriodSolver, PolicyFunc,
    SolvedModel, StageKind, ValueFunc,
};
pub use solution::{
    rebalance_assets, AdjustStages, CnsStageSolution, NoAdjustStages, PeriodSolution,
    RebStageSolution, ShaStageSolution,
};
pub use stages::{solve_consumption_stage, solve_rebalancing_stage, solve_share_stage};
pub use utility::{inv_marginal_utility, marginal_utility, utility, utility_inv};
