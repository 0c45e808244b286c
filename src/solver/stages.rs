//! The three within-period decision stages
//!
//! Numerically a period is solved in reverse decision order: the consumption
//! stage first (against next period's value functions), then the
//! contribution-share stage over the consumption-stage value, then the
//! rebalancing stage over the share-stage value.
//!
//! Optimizers here never fail: a maximum that cannot be improved away from a
//! boundary IS the solution (a binding constraint), so every search falls
//! back to the best candidate it saw.

use rayon::prelude::*;

use crate::calibration::{Preferences, ShareChoice};
use crate::grids::StateGrids;
use crate::interp::{Interp1D, Interp2D, Interp3D};
use crate::shocks::ShockNodes;

use super::solution::{
    rebalance_assets, CnsStageSolution, PeriodSolution, RebStageSolution, ShaStageSolution,
};
use super::utility::{inv_marginal_utility, utility, utility_inv};

const INVPHI: f64 = 0.618_033_988_749_894_8;

/// Golden-section search for the maximum of `f` on `[lo, hi]`
///
/// Returns the best point seen; on a flat or boundary-dominated objective
/// that is simply an endpoint of the shrinking bracket.
fn golden_max(f: impl Fn(f64) -> f64, mut lo: f64, mut hi: f64, tol: f64) -> (f64, f64) {
    let mut x1 = hi - INVPHI * (hi - lo);
    let mut x2 = lo + INVPHI * (hi - lo);
    let mut f1 = f(x1);
    let mut f2 = f(x2);
    while hi - lo > tol {
        if f1 >= f2 {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - INVPHI * (hi - lo);
            f1 = f(x1);
        } else {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + INVPHI * (hi - lo);
            f2 = f(x2);
        }
    }
    let xm = 0.5 * (lo + hi);
    (xm, f(xm))
}

/// Solve the consumption stage by the endogenous-grid method.
///
/// For every (n-tilde, share) pair, marginal continuation value is computed
/// on the end-of-period asset grid and inverted through u' to get the
/// consumption that satisfies the first-order condition; the implied
/// endogenous resource points `m = a + c` are then re-gridded onto the
/// exogenous m grid. Below the lowest endogenous point the borrowing
/// constraint binds and consumption equals resources.
pub fn solve_consumption_stage(
    grids: &StateGrids,
    prefs: &Preferences,
    rfree: f64,
    nodes: &ShockNodes,
    next: &PeriodSolution,
) -> CnsStageSolution {
    let crra = prefs.crra;
    let discount = prefs.disc_fac * nodes.liv_prb;

    // No continuation (certain death): consume everything, as in the
    // terminal period
    if discount <= 0.0 {
        return CnsStageSolution::terminal(grids, crra);
    }

    let (nm, nn, ns) = (grids.m.len(), grids.n.len(), grids.share.len());
    let slabs: Vec<(usize, usize)> = (0..nn)
        .flat_map(|j| (0..ns).map(move |k| (j, k)))
        .collect();

    let solved: Vec<(usize, usize, Vec<f64>, Vec<f64>)> = slabs
        .par_iter()
        .map(|&(j, k)| {
            let n_eop = grids.n[j];
            let s = grids.share[k];
            let na = grids.a.len();

            let mut m_endog = Vec::with_capacity(na);
            let mut c_endog = Vec::with_capacity(na);
            let mut w_nvrs = Vec::with_capacity(na);

            for &a in &grids.a {
                let mut exp_dvda = 0.0;
                let mut exp_v = 0.0;
                for (psi, p_psi) in nodes.perm.iter() {
                    let growth = nodes.perm_gro_fac * psi;
                    let g_mu = growth.powf(-crra);
                    let g_v = growth.powf(1.0 - crra);
                    for (theta, p_theta) in nodes.tran.iter() {
                        let m_next = rfree * a / growth + (1.0 - s) * theta;
                        let p_income = p_psi * p_theta;
                        for (risky, p_risky) in nodes.risky.iter() {
                            let n_next = risky * n_eop / growth + s * theta;
                            let p = p_income * p_risky;
                            exp_dvda += p * g_mu * next.marginal_value_m(m_next, n_next, s);
                            exp_v += p * g_v * next.value(m_next, n_next, s);
                        }
                    }
                }
                let dvda = discount * rfree * exp_dvda;
                let c = inv_marginal_utility(dvda, crra);
                m_endog.push(a + c);
                c_endog.push(c);
                w_nvrs.push(utility_inv(discount * exp_v, crra));
            }

            // Continuation value over end-of-period assets
            let w_func = Interp1D::new(grids.a.clone(), w_nvrs);

            // Endogenous consumption function, anchored at the constrained
            // corner (0, 0); with a[0] = 0 the first segment has unit slope,
            // so c = m exactly where the constraint binds
            let mut xs = Vec::with_capacity(na + 1);
            let mut ys = Vec::with_capacity(na + 1);
            xs.push(0.0);
            ys.push(0.0);
            for (x, y) in m_endog.into_iter().zip(c_endog) {
                if x > xs.last().unwrap() + 1e-12 {
                    xs.push(x);
                    ys.push(y);
                }
            }
            let c_func = if xs.len() >= 2 {
                Interp1D::new(xs, ys)
            } else {
                // Degenerate: every endogenous point collapsed onto the
                // corner, so the constraint binds everywhere
                Interp1D::new(vec![0.0, 1.0], vec![0.0, 1.0])
            };

            let mut c_row = Vec::with_capacity(nm);
            let mut v_row = Vec::with_capacity(nm);
            for &m in &grids.m {
                let c = c_func.eval(m).clamp(0.0, m);
                let w = utility(w_func.eval(m - c).max(0.0), crra);
                c_row.push(c);
                v_row.push(utility_inv(utility(c, crra) + w, crra));
            }
            (j, k, c_row, v_row)
        })
        .collect();

    let mut c_vals = vec![0.0; nm * nn * ns];
    let mut v_vals = vec![0.0; nm * nn * ns];
    for (j, k, c_row, v_row) in solved {
        for i in 0..nm {
            let idx = (i * nn + j) * ns + k;
            c_vals[idx] = c_row[i];
            v_vals[idx] = v_row[i];
        }
    }

    CnsStageSolution::new(
        Interp3D::new(grids.m.clone(), grids.n.clone(), grids.share.clone(), c_vals),
        Interp3D::new(grids.m.clone(), grids.n.clone(), grids.share.clone(), v_vals),
        crra,
    )
}

/// Solve the contribution-share stage: the envelope of the consumption-stage
/// value over the share choice.
///
/// A coarse scan over the share grid picks the best candidate (ties resolve
/// to the lowest share); under a continuous choice the scan winner's
/// neighborhood is refined by golden-section search.
pub fn solve_share_stage(
    grids: &StateGrids,
    prefs: &Preferences,
    cns: &CnsStageSolution,
    share_choice: &ShareChoice,
) -> ShaStageSolution {
    let (nm, nn) = (grids.m.len(), grids.n.len());
    let candidates: Vec<f64> = match share_choice {
        ShareChoice::Discrete { count } => {
            let step = 1.0 / (*count as f64 - 1.0);
            (0..*count).map(|k| k as f64 * step).collect()
        }
        ShareChoice::Continuous => grids.share.clone(),
    };

    let points: Vec<(usize, usize)> = (0..nm)
        .flat_map(|i| (0..nn).map(move |j| (i, j)))
        .collect();

    let solved: Vec<(f64, f64)> = points
        .par_iter()
        .map(|&(i, j)| {
            let m = grids.m[i];
            let n = grids.n[j];
            let objective = |s: f64| cns.value_nvrs(m, n, s);

            let mut best_idx = 0;
            let mut best_s = candidates[0];
            let mut best_v = objective(best_s);
            for (k, &s) in candidates.iter().enumerate().skip(1) {
                let v = objective(s);
                if v > best_v {
                    best_idx = k;
                    best_s = s;
                    best_v = v;
                }
            }

            if matches!(share_choice, ShareChoice::Continuous) {
                let lo = if best_idx > 0 { candidates[best_idx - 1] } else { 0.0 };
                let hi = if best_idx + 1 < candidates.len() {
                    candidates[best_idx + 1]
                } else {
                    1.0
                };
                let (s_ref, v_ref) = golden_max(objective, lo, hi, 1e-6);
                if v_ref > best_v {
                    best_s = s_ref;
                    best_v = v_ref;
                }
            }

            (best_s, best_v)
        })
        .collect();

    let mut share_vals = Vec::with_capacity(nm * nn);
    let mut v_vals = Vec::with_capacity(nm * nn);
    for (s, v) in solved {
        share_vals.push(s);
        v_vals.push(v);
    }

    ShaStageSolution::new(
        Interp2D::new(grids.m.clone(), grids.n.clone(), share_vals),
        Interp2D::new(grids.m.clone(), grids.n.clone(), v_vals),
        prefs.crra,
    )
}

/// Candidate rebalancing fractions scanned before refinement; includes the
/// no-trade point and both full-liquidation corners
const DFRAC_SCAN_STEPS: usize = 40;

/// Solve the rebalancing stage: choose the normalized flow d in [-1, 1]
/// maximizing the share-stage value at the post-transfer position.
///
/// The objective has a kink at d = 0 when tau > 0, so a grid scan locates
/// the best region before golden-section refinement. The feasible interval
/// degenerates gracefully when either account is empty: flows against an
/// empty account change nothing and the no-trade point wins the tie.
pub fn solve_rebalancing_stage(
    grids: &StateGrids,
    prefs: &Preferences,
    sha: &ShaStageSolution,
    tau: f64,
) -> RebStageSolution {
    let (nm, nn) = (grids.m.len(), grids.n.len());
    let points: Vec<(usize, usize)> = (0..nm)
        .flat_map(|i| (0..nn).map(move |j| (i, j)))
        .collect();

    let step = 2.0 / DFRAC_SCAN_STEPS as f64;

    let solved: Vec<(f64, f64)> = points
        .par_iter()
        .map(|&(i, j)| {
            let m = grids.m[i];
            let n = grids.n[j];
            let objective = |d: f64| {
                let (mt, nt) = rebalance_assets(d, m, n, tau);
                sha.value_nvrs(mt, nt)
            };

            // No-trade first so flat objectives resolve to d = 0
            let mut best_d = 0.0;
            let mut best_v = objective(0.0);
            for k in 0..=DFRAC_SCAN_STEPS {
                let d = -1.0 + step * k as f64;
                if d == 0.0 {
                    continue;
                }
                let v = objective(d);
                if v > best_v {
                    best_d = d;
                    best_v = v;
                }
            }

            let lo = (best_d - step).max(-1.0);
            let hi = (best_d + step).min(1.0);
            let (d_ref, v_ref) = golden_max(objective, lo, hi, 1e-6);
            if v_ref > best_v {
                best_d = d_ref;
                best_v = v_ref;
            }

            (best_d, best_v)
        })
        .collect();

    let mut d_vals = Vec::with_capacity(nm * nn);
    let mut v_vals = Vec::with_capacity(nm * nn);
    for (d, v) in solved {
        d_vals.push(d);
        v_vals.push(v);
    }

    RebStageSolution::new(
        Interp2D::new(grids.m.clone(), grids.n.clone(), d_vals),
        Interp2D::new(grids.m.clone(), grids.n.clone(), v_vals),
        prefs.crra,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Calibration;
    use crate::grids::{GridSpec, StateGrids};
    use crate::shocks::ShockModel;
    use approx::assert_relative_eq;

    fn small_setup() -> (Calibration, StateGrids, ShockModel) {
        let mut cal = Calibration::infinite_base();
        cal.grid = GridSpec {
            m_count: 12,
            m_max: 20.0,
            n_count: 12,
            n_max: 20.0,
            a_count: 12,
            a_max: 20.0,
            share_count: 8,
            nest_fac: 3,
        };
        cal.income.perm_shk_count = 3;
        cal.income.tran_shk_count = 3;
        cal.returns.risky_count = 3;
        let grids = StateGrids::build(&cal.grid).unwrap();
        let shocks = ShockModel::from_calibration(&cal).unwrap();
        (cal, grids, shocks)
    }

    #[test]
    fn golden_max_finds_interior_peak() {
        let (x, v) = golden_max(|x| -(x - 0.3) * (x - 0.3), 0.0, 1.0, 1e-8);
        assert_relative_eq!(x, 0.3, epsilon = 1e-6);
        assert_relative_eq!(v, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn consumption_respects_resources_everywhere() {
        let (cal, grids, shocks) = small_setup();
        let terminal = PeriodSolution::terminal(&grids, 1.0, 0.0, cal.prefs.crra);
        let cns = solve_consumption_stage(
            &grids,
            &cal.prefs,
            cal.returns.rfree,
            shocks.nodes(0),
            &terminal,
        );
        for &m in &grids.m {
            for &n in &grids.n {
                for &s in &grids.share {
                    let c = cns.consumption(m, n, s);
                    assert!(c >= 0.0 && c <= m + 1e-12, "c = {c} at m = {m}");
                }
            }
        }
    }

    #[test]
    fn consumption_is_interior_away_from_the_constraint() {
        // Against a one-period continuation the consumer saves something at
        // high resources
        let (cal, grids, shocks) = small_setup();
        let terminal = PeriodSolution::terminal(&grids, 1.0, 0.0, cal.prefs.crra);
        let cns = solve_consumption_stage(
            &grids,
            &cal.prefs,
            cal.returns.rfree,
            shocks.nodes(0),
            &terminal,
        );
        let m = *grids.m.last().unwrap();
        let c = cns.consumption(m, 0.0, 0.0);
        assert!(c < m, "expected interior consumption, got c = {c} at m = {m}");
        assert!(c > 0.0);
    }

    #[test]
    fn share_stage_value_is_envelope_of_consumption_value() {
        let (cal, grids, shocks) = small_setup();
        let terminal = PeriodSolution::terminal(&grids, 1.0, 0.0, cal.prefs.crra);
        let cns = solve_consumption_stage(
            &grids,
            &cal.prefs,
            cal.returns.rfree,
            shocks.nodes(0),
            &terminal,
        );
        let sha = solve_share_stage(&grids, &cal.prefs, &cns, &cal.share_choice);
        for &m in grids.m.iter().step_by(3) {
            for &n in grids.n.iter().step_by(3) {
                let v_sha = sha.value_nvrs(m, n);
                for &s in &grids.share {
                    assert!(
                        v_sha >= cns.value_nvrs(m, n, s) - 1e-9,
                        "envelope violated at m = {m}, n = {n}, s = {s}"
                    );
                }
            }
        }
    }

    #[test]
    fn rebalancing_keeps_post_transfer_assets_feasible() {
        let (cal, grids, shocks) = small_setup();
        let terminal = PeriodSolution::terminal(&grids, 1.0, 0.1, cal.prefs.crra);
        let cns = solve_consumption_stage(
            &grids,
            &cal.prefs,
            cal.returns.rfree,
            shocks.nodes(0),
            &terminal,
        );
        let sha = solve_share_stage(&grids, &cal.prefs, &cns, &cal.share_choice);
        let reb = solve_rebalancing_stage(&grids, &cal.prefs, &sha, 0.1);
        for &m in &grids.m {
            for &n in &grids.n {
                let d = reb.dfrac(m, n);
                assert!((-1.0..=1.0).contains(&d));
                let (mt, nt) = rebalance_assets(d, m, n, 0.1);
                assert!(mt >= -1e-12 && nt >= -1e-12);
            }
        }
    }

    #[test]
    fn empty_accounts_degenerate_to_no_trade() {
        let (cal, grids, shocks) = small_setup();
        let terminal = PeriodSolution::terminal(&grids, 1.0, 0.0, cal.prefs.crra);
        let cns = solve_consumption_stage(
            &grids,
            &cal.prefs,
            cal.returns.rfree,
            shocks.nodes(0),
            &terminal,
        );
        let sha = solve_share_stage(&grids, &cal.prefs, &cns, &cal.share_choice);
        let reb = solve_rebalancing_stage(&grids, &cal.prefs, &sha, 0.0);
        // With nothing in either account every flow is a no-op and the tie
        // resolves to d = 0
        assert_relative_eq!(reb.dfrac(0.0, 0.0), 0.0);
    }
}
