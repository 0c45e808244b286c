//! Period orchestration and the two solve drivers
//!
//! A single backward operator builds one period's solution from the next
//! period's. The finite-horizon driver applies it once per age, from the
//! terminal period back to the first; the infinite-horizon driver iterates
//! it to a fixed point. Both share [`PeriodSolver::solve_period`].

use log::{debug, info, warn};

use crate::calibration::{Calibration, Horizon, Preferences, ShareChoice};
use crate::error::ModelError;
use crate::grids::StateGrids;
use crate::shocks::{ShockModel, ShockNodes};

use super::solution::{
    AdjustStages, CnsStageSolution, NoAdjustStages, PeriodSolution, RebStageSolution,
    ShaStageSolution,
};
use super::stages::{solve_consumption_stage, solve_rebalancing_stage, solve_share_stage};

/// Orchestrates the three stages of one period
pub struct PeriodSolver<'a> {
    grids: &'a StateGrids,
    prefs: &'a Preferences,
    rfree: f64,
    share_choice: ShareChoice,
}

impl<'a> PeriodSolver<'a> {
    pub fn new(
        grids: &'a StateGrids,
        prefs: &'a Preferences,
        rfree: f64,
        share_choice: ShareChoice,
    ) -> Self {
        Self { grids, prefs, rfree, share_choice }
    }

    /// Closed-form terminal solution for the period's friction parameters
    pub fn terminal(&self, nodes: &ShockNodes) -> PeriodSolution {
        PeriodSolution::terminal(self.grids, nodes.adjust_prb, nodes.tau, self.prefs.crra)
    }

    /// Build this period's solution from the next period's.
    ///
    /// Construction runs Consumption -> Share -> Rebalancing; the finished
    /// period is only assembled (published) once all three stages are done.
    pub fn solve_period(&self, nodes: &ShockNodes, next: &PeriodSolution) -> PeriodSolution {
        let cns = solve_consumption_stage(self.grids, self.prefs, self.rfree, nodes, next);
        let sha = solve_share_stage(self.grids, self.prefs, &cns, &self.share_choice);
        let reb = solve_rebalancing_stage(self.grids, self.prefs, &sha, nodes.tau);
        PeriodSolution::new(
            AdjustStages { reb, sha, cns: cns.clone() },
            NoAdjustStages { cns },
            nodes.adjust_prb,
            nodes.tau,
            self.prefs.crra,
        )
    }
}

/// Outcome of an infinite-horizon fixed-point iteration
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceDiagnostics {
    pub converged: bool,
    pub iterations: usize,
    /// Final sup-norm distance between successive value arrays, in
    /// consumption-equivalent units
    pub residual: f64,
}

/// Which realization of the rebalancing-opportunity shock a stage belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Adjust,
    NoAdjust,
}

/// The three within-period stage kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Consumption,
    Share,
    Rebalancing,
}

/// A policy function handle for one (period, branch, stage) key
#[derive(Debug, Clone, Copy)]
pub enum PolicyFunc<'a> {
    /// Consumption over (m-tilde, n-tilde, share)
    Consumption(&'a CnsStageSolution),
    /// Contribution share over (m-tilde, n-tilde)
    Share(&'a ShaStageSolution),
    /// Normalized rebalancing flow over (m, n)
    Rebalancing(&'a RebStageSolution),
}

impl PolicyFunc<'_> {
    /// Evaluate the policy at a state point; the slice length must match
    /// the stage's state dimension
    pub fn eval(&self, state: &[f64]) -> f64 {
        match self {
            PolicyFunc::Consumption(cns) => {
                debug_assert_eq!(state.len(), 3);
                cns.consumption(state[0], state[1], state[2])
            }
            PolicyFunc::Share(sha) => {
                debug_assert_eq!(state.len(), 2);
                sha.share(state[0], state[1])
            }
            PolicyFunc::Rebalancing(reb) => {
                debug_assert_eq!(state.len(), 2);
                reb.dfrac(state[0], state[1])
            }
        }
    }
}

/// A value function handle for one (period, branch, stage) key
#[derive(Debug, Clone, Copy)]
pub enum ValueFunc<'a> {
    Consumption(&'a CnsStageSolution),
    Share(&'a ShaStageSolution),
    Rebalancing(&'a RebStageSolution),
}

impl ValueFunc<'_> {
    pub fn eval(&self, state: &[f64]) -> f64 {
        match self {
            ValueFunc::Consumption(cns) => {
                debug_assert_eq!(state.len(), 3);
                cns.value(state[0], state[1], state[2])
            }
            ValueFunc::Share(sha) => {
                debug_assert_eq!(state.len(), 2);
                sha.value(state[0], state[1])
            }
            ValueFunc::Rebalancing(reb) => {
                debug_assert_eq!(state.len(), 2);
                reb.value(state[0], state[1])
            }
        }
    }
}

/// A finished solve: one period solution per age (finite horizon) or a
/// single converged solution (infinite horizon, with diagnostics)
#[derive(Debug, Clone)]
pub struct SolvedModel {
    periods: Vec<PeriodSolution>,
    diagnostics: Option<ConvergenceDiagnostics>,
}

impl SolvedModel {
    /// Solution applying at period `t`; an infinite-horizon model returns
    /// its single stationary solution for every `t`
    pub fn period(&self, t: usize) -> &PeriodSolution {
        &self.periods[t.min(self.periods.len() - 1)]
    }

    /// Number of distinct period solutions
    pub fn period_count(&self) -> usize {
        self.periods.len()
    }

    /// Fixed-point diagnostics; present only for infinite-horizon solves
    pub fn diagnostics(&self) -> Option<&ConvergenceDiagnostics> {
        self.diagnostics.as_ref()
    }

    /// Policy function keyed by (period, branch, stage). The non-adjusting
    /// branch has no Share or Rebalancing stage, so those keys return None.
    pub fn policy(&self, t: usize, branch: Branch, stage: StageKind) -> Option<PolicyFunc<'_>> {
        let p = self.period(t);
        match (branch, stage) {
            (Branch::Adjust, StageKind::Consumption) => {
                Some(PolicyFunc::Consumption(&p.adjust.cns))
            }
            (Branch::Adjust, StageKind::Share) => Some(PolicyFunc::Share(&p.adjust.sha)),
            (Branch::Adjust, StageKind::Rebalancing) => {
                Some(PolicyFunc::Rebalancing(&p.adjust.reb))
            }
            (Branch::NoAdjust, StageKind::Consumption) => {
                Some(PolicyFunc::Consumption(&p.no_adjust.cns))
            }
            (Branch::NoAdjust, _) => None,
        }
    }

    /// Value function keyed by (period, branch, stage)
    pub fn value(&self, t: usize, branch: Branch, stage: StageKind) -> Option<ValueFunc<'_>> {
        let p = self.period(t);
        match (branch, stage) {
            (Branch::Adjust, StageKind::Consumption) => Some(ValueFunc::Consumption(&p.adjust.cns)),
            (Branch::Adjust, StageKind::Share) => Some(ValueFunc::Share(&p.adjust.sha)),
            (Branch::Adjust, StageKind::Rebalancing) => Some(ValueFunc::Rebalancing(&p.adjust.reb)),
            (Branch::NoAdjust, StageKind::Consumption) => {
                Some(ValueFunc::Consumption(&p.no_adjust.cns))
            }
            (Branch::NoAdjust, _) => None,
        }
    }
}

/// Sup-norm distance between two period solutions' consumption-stage value
/// arrays, in consumption-equivalent units
fn sup_norm_distance(a: &PeriodSolution, b: &PeriodSolution) -> f64 {
    a.no_adjust
        .cns
        .v_nvrs_values()
        .iter()
        .zip(b.no_adjust.cns.v_nvrs_values())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// Solve the model described by `cal`.
///
/// Finite horizons produce one [`PeriodSolution`] per age, terminal last.
/// Infinite horizons iterate from a terminal-like guess; non-convergence is
/// reported through the diagnostics, never as an error.
pub fn solve(cal: &Calibration) -> Result<SolvedModel, ModelError> {
    cal.validate()?;
    let grids = StateGrids::build(&cal.grid)?;
    let shocks = ShockModel::from_calibration(cal)?;
    let solver = PeriodSolver::new(&grids, &cal.prefs, cal.returns.rfree, cal.share_choice.clone());

    match cal.horizon {
        Horizon::Finite { periods } => {
            let mut stack = Vec::with_capacity(periods);
            stack.push(solver.terminal(shocks.nodes(periods - 1)));
            for t in (0..periods - 1).rev() {
                let next = stack.last().expect("terminal pushed first");
                let sol = solver.solve_period(shocks.nodes(t), next);
                debug!("solved period {t}");
                stack.push(sol);
            }
            stack.reverse();
            info!("finite-horizon solve complete: {periods} periods");
            Ok(SolvedModel { periods: stack, diagnostics: None })
        }
        Horizon::Infinite { tol, max_iter } => {
            let guess = solver.terminal(shocks.nodes(0));
            solve_fixed_point(&solver, shocks.nodes(0), guess, tol, max_iter)
        }
    }
}

/// Infinite-horizon solve starting from a caller-supplied guess.
///
/// Exposed so convergence can be checked from different starting points;
/// [`solve`] uses the terminal-like guess.
pub fn solve_with_guess(
    cal: &Calibration,
    guess: PeriodSolution,
) -> Result<SolvedModel, ModelError> {
    cal.validate()?;
    let (tol, max_iter) = match cal.horizon {
        Horizon::Infinite { tol, max_iter } => (tol, max_iter),
        Horizon::Finite { .. } => {
            return Err(ModelError::InvalidHorizon(
                "solve_with_guess applies only to infinite horizons".into(),
            ))
        }
    };
    let grids = StateGrids::build(&cal.grid)?;
    let shocks = ShockModel::from_calibration(cal)?;
    let solver = PeriodSolver::new(&grids, &cal.prefs, cal.returns.rfree, cal.share_choice.clone());
    solve_fixed_point(&solver, shocks.nodes(0), guess, tol, max_iter)
}

fn solve_fixed_point(
    solver: &PeriodSolver<'_>,
    nodes: &ShockNodes,
    guess: PeriodSolution,
    tol: f64,
    max_iter: usize,
) -> Result<SolvedModel, ModelError> {
    let mut current = guess;
    let mut residual = f64::INFINITY;

    for iteration in 1..=max_iter {
        let next = solver.solve_period(nodes, &current);
        residual = sup_norm_distance(&next, &current);
        current = next;
        debug!("fixed-point iteration {iteration}: residual {residual:.3e}");
        if residual < tol {
            info!("fixed point converged after {iteration} iterations (residual {residual:.3e})");
            return Ok(SolvedModel {
                periods: vec![current],
                diagnostics: Some(ConvergenceDiagnostics {
                    converged: true,
                    iterations: iteration,
                    residual,
                }),
            });
        }
    }

    warn!("fixed point did not converge after {max_iter} iterations (residual {residual:.3e})");
    Ok(SolvedModel {
        periods: vec![current],
        diagnostics: Some(ConvergenceDiagnostics {
            converged: false,
            iterations: max_iter,
            residual,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grids::GridSpec;
    use crate::solver::solution::rebalance_assets;
    use std::sync::OnceLock;

    fn small_grid() -> GridSpec {
        GridSpec {
            m_count: 10,
            m_max: 20.0,
            n_count: 10,
            n_max: 20.0,
            a_count: 10,
            a_max: 20.0,
            share_count: 6,
            nest_fac: 3,
        }
    }

    fn quick_infinite() -> Calibration {
        let mut cal = Calibration::infinite_base();
        cal.grid = small_grid();
        cal.income.perm_shk_count = 3;
        cal.income.tran_shk_count = 3;
        cal.returns.risky_count = 3;
        cal.horizon = Horizon::Infinite { tol: 1e-3, max_iter: 150 };
        cal
    }

    /// One shared stationary solve for the read-only property tests
    fn solved_quick() -> &'static SolvedModel {
        static SOLVED: OnceLock<SolvedModel> = OnceLock::new();
        SOLVED.get_or_init(|| solve(&quick_infinite()).unwrap())
    }

    #[test]
    fn infinite_horizon_converges() {
        let solved = solved_quick();
        let diag = solved.diagnostics().expect("infinite solve carries diagnostics");
        assert!(diag.converged, "residual {} after {} iters", diag.residual, diag.iterations);
        assert!(diag.residual < 1e-3);
        assert_eq!(solved.period_count(), 1);
    }

    #[test]
    fn fixed_point_is_independent_of_the_initial_guess() {
        // Tighter tolerance so the geometric tail past the stopping point is
        // negligible relative to the comparison threshold
        let mut cal = quick_infinite();
        cal.horizon = Horizon::Infinite { tol: 1e-5, max_iter: 400 };
        let from_terminal = solve(&cal).unwrap();
        assert!(from_terminal.diagnostics().unwrap().converged);

        // Start instead from a once-iterated terminal guess
        let grids = StateGrids::build(&cal.grid).unwrap();
        let shocks = ShockModel::from_calibration(&cal).unwrap();
        let solver =
            PeriodSolver::new(&grids, &cal.prefs, cal.returns.rfree, cal.share_choice.clone());
        let other_guess = solver.solve_period(shocks.nodes(0), &solver.terminal(shocks.nodes(0)));
        let from_iterated = solve_with_guess(&cal, other_guess).unwrap();
        assert!(from_iterated.diagnostics().unwrap().converged);

        let dist = sup_norm_distance(from_terminal.period(0), from_iterated.period(0));
        // Both runs land within the configured tolerance of the same point
        assert!(dist < 1e-3, "fixed points differ by {dist}");
    }

    #[test]
    fn max_iteration_cutoff_reports_non_convergence() {
        let mut cal = quick_infinite();
        cal.horizon = Horizon::Infinite { tol: 1e-12, max_iter: 2 };
        let solved = solve(&cal).unwrap();
        let diag = solved.diagnostics().unwrap();
        assert!(!diag.converged);
        assert_eq!(diag.iterations, 2);
        assert!(diag.residual.is_finite());
    }

    #[test]
    fn no_adjust_branch_has_no_share_or_rebalancing_policy() {
        let solved = solved_quick();
        assert!(solved.policy(0, Branch::NoAdjust, StageKind::Share).is_none());
        assert!(solved.policy(0, Branch::NoAdjust, StageKind::Rebalancing).is_none());
        assert!(solved.policy(0, Branch::Adjust, StageKind::Share).is_some());
        assert!(solved.policy(0, Branch::NoAdjust, StageKind::Consumption).is_some());
    }

    #[test]
    fn value_functions_are_monotone_in_assets() {
        let solved = solved_quick();
        let p = solved.period(0);
        let ms = [0.5, 1.0, 2.0, 5.0, 10.0];
        let ns = [0.0, 1.0, 5.0, 10.0];
        for &s in &[0.0, 0.5, 1.0] {
            for &n in &ns {
                for w in ms.windows(2) {
                    assert!(
                        p.no_adjust.cns.value_nvrs(w[1], n, s)
                            >= p.no_adjust.cns.value_nvrs(w[0], n, s) - 1e-9,
                        "value not monotone in m at n = {n}, s = {s}"
                    );
                }
            }
            for &m in &ms {
                for w in ns.windows(2) {
                    assert!(
                        p.adjust.reb.value_nvrs(m, w[1]) >= p.adjust.reb.value_nvrs(m, w[0]) - 1e-9,
                        "value not monotone in n at m = {m}"
                    );
                }
            }
        }
    }

    #[test]
    fn frictionless_rebalancing_is_interior_with_ample_resources() {
        // AdjustPrb = 1 and tau = 0: an agent holding everything in one
        // account moves some but not all of it
        let solved = solved_quick();
        let reb = solved.period(0).adjust.reb.clone();
        let d = reb.dfrac(10.0, 10.0);
        let (mt, nt) = rebalance_assets(d, 10.0, 10.0, 0.0);
        assert!(mt > 0.0, "all risk-free assets moved at a corner: d = {d}");
        assert!(nt > 0.0);
    }

    #[test]
    fn lifecycle_scenario_solves_with_monotone_consumption() {
        // Concrete scenario: crra 5, R 1.03, beta 0.9, UnempPrb 0.05,
        // IncUnemp 0.3, risky 1.08/0.18, AdjustPrb 1, tau 0, 20x20x20
        // grids, ages 25-90
        let mut cal = Calibration::lifecycle(25, 65, 90);
        cal.grid = GridSpec {
            m_count: 20,
            m_max: 50.0,
            n_count: 20,
            n_max: 50.0,
            a_count: 20,
            a_max: 50.0,
            share_count: 10,
            nest_fac: 3,
        };
        cal.income.perm_shk_count = 3;
        cal.income.tran_shk_count = 3;
        cal.returns.risky_count = 3;
        let solved = solve(&cal).expect("life-cycle solve must not fail");
        assert_eq!(solved.period_count(), 66);

        // Consumption non-decreasing in m at fixed n and share, every period
        let ms: Vec<f64> = (0..30).map(|i| i as f64).collect();
        for t in [0, 20, 40, 64] {
            let cns = &solved.period(t).adjust.cns;
            for &n in &[0.0, 5.0, 20.0] {
                for &s in &[0.0, 0.5] {
                    for w in ms.windows(2) {
                        let c0 = cns.consumption(w[0], n, s);
                        let c1 = cns.consumption(w[1], n, s);
                        assert!(
                            c1 >= c0 - 1e-9,
                            "consumption decreasing at t = {t}, m = {}, n = {n}, s = {s}",
                            w[1]
                        );
                    }
                }
            }
        }

        // Terminal consumption is exactly m-tilde
        let terminal = &solved.period(65).no_adjust.cns;
        for &m in &[0.0, 1.0, 7.5, 30.0] {
            assert!((terminal.consumption(m, 3.0, 0.2) - m).abs() < 1e-9);
        }
    }
}
