//! Solved stage, branch, and period objects
//!
//! A period's solution is assembled from three stage solutions on the
//! adjusting branch (Rebalancing, Contribution-Share, Consumption) and a
//! consumption stage alone on the non-adjusting branch, where the incoming
//! contribution share carries over unchanged. Once constructed, a
//! [`PeriodSolution`] is immutable and shared read-only.

use crate::grids::StateGrids;
use crate::interp::{Interp2D, Interp3D};
use super::utility::{marginal_utility, utility, utility_inv};

/// Post-rebalancing asset positions implied by the normalized flow `d`.
///
/// `d >= 0` deposits `d * m` into the risky account; `d < 0` liquidates
/// `|d| * n` of the risky account, of which the fraction `tau` is taxed away
/// before it reaches the risk-free account.
pub fn rebalance_assets(d: f64, m: f64, n: f64, tau: f64) -> (f64, f64) {
    if d >= 0.0 {
        (m - d * m, n + d * m)
    } else {
        (m - d * n * (1.0 - tau), n + d * n)
    }
}

/// Consumption-stage solution over (m-tilde, n-tilde, share)
#[derive(Debug, Clone)]
pub struct CnsStageSolution {
    c_func: Interp3D,
    v_nvrs: Interp3D,
    crra: f64,
}

impl CnsStageSolution {
    pub fn new(c_func: Interp3D, v_nvrs: Interp3D, crra: f64) -> Self {
        Self { c_func, v_nvrs, crra }
    }

    /// Terminal-period closed form: consume all risk-free resources
    pub fn terminal(grids: &StateGrids, crra: f64) -> Self {
        let (nm, nn, ns) = (grids.m.len(), grids.n.len(), grids.share.len());
        let mut c = Vec::with_capacity(nm * nn * ns);
        for &m in &grids.m {
            for _ in 0..nn * ns {
                c.push(m);
            }
        }
        let c_func = Interp3D::new(grids.m.clone(), grids.n.clone(), grids.share.clone(), c.clone());
        let v_nvrs = Interp3D::new(grids.m.clone(), grids.n.clone(), grids.share.clone(), c);
        Self { c_func, v_nvrs, crra }
    }

    /// Optimal consumption at (m, n, share), clamped to feasibility
    pub fn consumption(&self, m: f64, n: f64, share: f64) -> f64 {
        self.c_func.eval(m, n, share).clamp(0.0, m.max(0.0))
    }

    /// Stage value in consumption-equivalent (inverse-utility) units
    pub fn value_nvrs(&self, m: f64, n: f64, share: f64) -> f64 {
        self.v_nvrs.eval(m, n, share).max(0.0)
    }

    /// Stage value in utility levels
    pub fn value(&self, m: f64, n: f64, share: f64) -> f64 {
        utility(self.value_nvrs(m, n, share), self.crra)
    }

    /// Raw inverse-utility value array (fixed-point distance checks)
    pub(crate) fn v_nvrs_values(&self) -> &[f64] {
        self.v_nvrs.values()
    }
}

/// Contribution-share stage solution over (m-tilde, n-tilde)
#[derive(Debug, Clone)]
pub struct ShaStageSolution {
    share_func: Interp2D,
    v_nvrs: Interp2D,
    crra: f64,
}

impl ShaStageSolution {
    pub fn new(share_func: Interp2D, v_nvrs: Interp2D, crra: f64) -> Self {
        Self { share_func, v_nvrs, crra }
    }

    /// Terminal: the share is irrelevant (nothing is earned after the final
    /// period), resolved to the lowest candidate
    pub fn terminal(grids: &StateGrids, crra: f64) -> Self {
        let (nm, nn) = (grids.m.len(), grids.n.len());
        let share = vec![0.0; nm * nn];
        let mut v = Vec::with_capacity(nm * nn);
        for &m in &grids.m {
            for _ in 0..nn {
                v.push(m);
            }
        }
        Self {
            share_func: Interp2D::new(grids.m.clone(), grids.n.clone(), share),
            v_nvrs: Interp2D::new(grids.m.clone(), grids.n.clone(), v),
            crra,
        }
    }

    pub fn share(&self, m: f64, n: f64) -> f64 {
        self.share_func.eval(m, n).clamp(0.0, 1.0)
    }

    pub fn value_nvrs(&self, m: f64, n: f64) -> f64 {
        self.v_nvrs.eval(m, n).max(0.0)
    }

    pub fn value(&self, m: f64, n: f64) -> f64 {
        utility(self.value_nvrs(m, n), self.crra)
    }
}

/// Rebalancing stage solution over (m, n)
#[derive(Debug, Clone)]
pub struct RebStageSolution {
    dfrac_func: Interp2D,
    v_nvrs: Interp2D,
    crra: f64,
}

impl RebStageSolution {
    pub fn new(dfrac_func: Interp2D, v_nvrs: Interp2D, crra: f64) -> Self {
        Self { dfrac_func, v_nvrs, crra }
    }

    /// Terminal: liquidate the risky account entirely and eat the tax
    pub fn terminal(grids: &StateGrids, tau: f64, crra: f64) -> Self {
        let (nm, nn) = (grids.m.len(), grids.n.len());
        let dfrac = vec![-1.0; nm * nn];
        let mut v = Vec::with_capacity(nm * nn);
        for &m in &grids.m {
            for &n in &grids.n {
                v.push(m + n * (1.0 - tau));
            }
        }
        Self {
            dfrac_func: Interp2D::new(grids.m.clone(), grids.n.clone(), dfrac),
            v_nvrs: Interp2D::new(grids.m.clone(), grids.n.clone(), v),
            crra,
        }
    }

    /// Normalized rebalancing flow at (m, n), clamped to [-1, 1]
    pub fn dfrac(&self, m: f64, n: f64) -> f64 {
        self.dfrac_func.eval(m, n).clamp(-1.0, 1.0)
    }

    pub fn value_nvrs(&self, m: f64, n: f64) -> f64 {
        self.v_nvrs.eval(m, n).max(0.0)
    }

    pub fn value(&self, m: f64, n: f64) -> f64 {
        utility(self.value_nvrs(m, n), self.crra)
    }
}

/// Stage solutions for the adjusting branch, in decision order
#[derive(Debug, Clone)]
pub struct AdjustStages {
    pub reb: RebStageSolution,
    pub sha: ShaStageSolution,
    pub cns: CnsStageSolution,
}

/// The non-adjusting branch only solves consumption; the incoming share is a
/// state, not a choice
#[derive(Debug, Clone)]
pub struct NoAdjustStages {
    pub cns: CnsStageSolution,
}

/// One period's complete solution: both realization branches of the
/// rebalancing-opportunity shock plus the friction parameters that applied
#[derive(Debug, Clone)]
pub struct PeriodSolution {
    pub adjust: AdjustStages,
    pub no_adjust: NoAdjustStages,
    /// Probability the adjust branch is drawn this period
    pub adjust_prb: f64,
    /// Withdrawal tax this period
    pub tau: f64,
    crra: f64,
}

impl PeriodSolution {
    pub fn new(
        adjust: AdjustStages,
        no_adjust: NoAdjustStages,
        adjust_prb: f64,
        tau: f64,
        crra: f64,
    ) -> Self {
        Self { adjust, no_adjust, adjust_prb, tau, crra }
    }

    /// Terminal-period solution: everything is liquidated and consumed
    pub fn terminal(grids: &StateGrids, adjust_prb: f64, tau: f64, crra: f64) -> Self {
        let cns = CnsStageSolution::terminal(grids, crra);
        Self {
            adjust: AdjustStages {
                reb: RebStageSolution::terminal(grids, tau, crra),
                sha: ShaStageSolution::terminal(grids, crra),
                cns: cns.clone(),
            },
            no_adjust: NoAdjustStages { cns },
            adjust_prb,
            tau,
            crra,
        }
    }

    /// Consumption realized on the adjust branch, composed through the
    /// rebalancing and share policies
    pub fn consumption_adjust(&self, m: f64, n: f64) -> f64 {
        let d = self.adjust.reb.dfrac(m, n);
        let (mt, nt) = rebalance_assets(d, m, n, self.tau);
        let share = self.adjust.sha.share(mt, nt);
        self.adjust.cns.consumption(mt, nt, share)
    }

    /// Beginning-of-period marginal value of risk-free resources, weighted
    /// across the two branches. By the envelope theorem each branch's
    /// marginal value is the marginal utility of its realized consumption.
    pub fn marginal_value_m(&self, m: f64, n: f64, share: f64) -> f64 {
        let w = self.adjust_prb;
        let mut dv = 0.0;
        if w > 0.0 {
            dv += w * marginal_utility(self.consumption_adjust(m, n), self.crra);
        }
        if w < 1.0 {
            dv += (1.0 - w)
                * marginal_utility(self.no_adjust.cns.consumption(m, n, share), self.crra);
        }
        dv
    }

    /// Beginning-of-period value, weighted across the two branches
    pub fn value(&self, m: f64, n: f64, share: f64) -> f64 {
        let w = self.adjust_prb;
        let mut v = 0.0;
        if w > 0.0 {
            v += w * self.adjust.reb.value(m, n);
        }
        if w < 1.0 {
            v += (1.0 - w) * self.no_adjust.cns.value(m, n, share);
        }
        v
    }

    /// Beginning-of-period value in consumption-equivalent units
    pub fn value_nvrs(&self, m: f64, n: f64, share: f64) -> f64 {
        utility_inv(self.value(m, n, share), self.crra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grids::{GridSpec, StateGrids};
    use approx::assert_relative_eq;

    fn grids() -> StateGrids {
        StateGrids::build(&GridSpec::default()).unwrap()
    }

    #[test]
    fn rebalance_deposits_and_withdrawals() {
        // Deposit half the risk-free account
        let (mt, nt) = rebalance_assets(0.5, 10.0, 4.0, 0.1);
        assert_relative_eq!(mt, 5.0);
        assert_relative_eq!(nt, 9.0);

        // Liquidate the whole risky account; tax hits the proceeds
        let (mt, nt) = rebalance_assets(-1.0, 10.0, 4.0, 0.1);
        assert_relative_eq!(mt, 10.0 + 4.0 * 0.9);
        assert_relative_eq!(nt, 0.0);
    }

    #[test]
    fn rebalance_bounds_keep_assets_non_negative() {
        for d in [-1.0, -0.5, 0.0, 0.5, 1.0] {
            for (m, n) in [(0.0, 0.0), (0.0, 5.0), (5.0, 0.0), (3.0, 7.0)] {
                let (mt, nt) = rebalance_assets(d, m, n, 0.1);
                assert!(mt >= 0.0, "mt = {mt} at d = {d}, m = {m}, n = {n}");
                assert!(nt >= 0.0, "nt = {nt} at d = {d}, m = {m}, n = {n}");
            }
        }
    }

    #[test]
    fn terminal_consumption_is_everything() {
        let g = grids();
        let sol = PeriodSolution::terminal(&g, 1.0, 0.0, 5.0);
        for &m in &g.m {
            assert_relative_eq!(sol.no_adjust.cns.consumption(m, 3.0, 0.5), m);
        }
    }

    #[test]
    fn terminal_adjust_branch_liquidates_risky_assets() {
        let g = grids();
        let tau = 0.1;
        let sol = PeriodSolution::terminal(&g, 1.0, tau, 5.0);
        assert_relative_eq!(sol.adjust.reb.dfrac(5.0, 5.0), -1.0);
        // Composite consumption picks up the after-tax liquidation value
        assert_relative_eq!(
            sol.consumption_adjust(5.0, 4.0),
            5.0 + 4.0 * (1.0 - tau),
            epsilon = 1e-9
        );
    }

    #[test]
    fn terminal_value_is_monotone_in_both_assets() {
        let g = grids();
        let sol = PeriodSolution::terminal(&g, 1.0, 0.0, 5.0);
        let v = |m: f64, n: f64| sol.adjust.reb.value_nvrs(m, n);
        assert!(v(2.0, 1.0) > v(1.0, 1.0));
        assert!(v(1.0, 2.0) > v(1.0, 1.0));
    }
}
