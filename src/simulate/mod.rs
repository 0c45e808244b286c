//! Forward Monte-Carlo population simulation
//!
//! Applies solved policy functions to pseudo-random income, return,
//! adjustment, and survival draws. Agents are independent, so the population
//! is simulated in parallel; each agent owns a deterministic RNG stream
//! derived from the master seed, which keeps runs reproducible regardless of
//! thread scheduling.

mod history;

pub use history::{AgeProfileRow, SimHistory, SimRow};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use crate::calibration::{Calibration, Horizon};
use crate::error::ModelError;
use crate::shocks::ShockModel;
use crate::solver::{rebalance_assets, SolvedModel};

/// Simulation configuration: population size, horizon, and the initial-state
/// distributions (log-space means and standard deviations)
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub agent_count: usize,
    pub periods: usize,
    pub seed: u64,
    /// Mean of log initial permanent income
    pub p_lvl_init_mean: f64,
    pub p_lvl_init_std: f64,
    /// Mean of log initial normalized risk-free assets; the default is a
    /// large negative number, i.e. agents start with nothing
    pub m_nrm_init_mean: f64,
    pub m_nrm_init_std: f64,
    /// Whether survival draws deactivate agents
    pub mortality: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            agent_count: 100,
            periods: 50,
            seed: 42,
            p_lvl_init_mean: 0.0,
            p_lvl_init_std: 0.1,
            m_nrm_init_mean: -50.0,
            m_nrm_init_std: 0.0,
            mortality: true,
        }
    }
}

/// Simulate a population through the solved model.
///
/// Newborns hold no risky assets and a zero contribution share; permanent
/// income and risk-free assets are drawn from the configured lognormals.
/// Returns one row per agent per period; simulating zero periods returns
/// exactly the initial-state sample.
pub fn simulate(
    solved: &SolvedModel,
    cal: &Calibration,
    config: &SimConfig,
) -> Result<SimHistory, ModelError> {
    if let Horizon::Finite { periods } = cal.horizon {
        if config.periods > periods {
            return Err(ModelError::SimulationHorizonExceeded {
                requested: config.periods,
                available: periods,
            });
        }
    }
    if config.p_lvl_init_std < 0.0 || config.m_nrm_init_std < 0.0 {
        return Err(ModelError::NonPositiveParameter {
            name: "init_std",
            value: config.p_lvl_init_std.min(config.m_nrm_init_std),
        });
    }

    let shocks = ShockModel::from_calibration(cal)?;
    let rfree = cal.returns.rfree;

    let per_agent: Vec<Vec<SimRow>> = (0..config.agent_count)
        .into_par_iter()
        .map(|id| {
            let mut rng = agent_rng(config.seed, id);
            simulate_agent(id, solved, &shocks, rfree, config, &mut rng)
        })
        .collect();

    Ok(SimHistory {
        rows: per_agent.into_iter().flatten().collect(),
        agent_count: config.agent_count,
        periods: config.periods,
    })
}

/// Independent, reproducible RNG stream for one agent
fn agent_rng(seed: u64, agent_id: usize) -> StdRng {
    StdRng::seed_from_u64(seed ^ (agent_id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn draw_lognormal<R: Rng>(rng: &mut R, log_mean: f64, log_std: f64) -> f64 {
    if log_std <= 0.0 {
        return log_mean.exp();
    }
    let z: f64 = StandardNormal.sample(rng);
    (log_mean + log_std * z).exp()
}

fn simulate_agent(
    id: usize,
    solved: &SolvedModel,
    shocks: &ShockModel,
    rfree: f64,
    config: &SimConfig,
    rng: &mut StdRng,
) -> Vec<SimRow> {
    let mut rows = Vec::with_capacity(config.periods.max(1));

    // Initial states
    let p0 = draw_lognormal(rng, config.p_lvl_init_mean, config.p_lvl_init_std);
    let m0 = draw_lognormal(rng, config.m_nrm_init_mean, config.m_nrm_init_std);

    if config.periods == 0 {
        // State-only sample: no decisions were simulated
        let mut row = SimRow::dead(id, 0);
        row.alive = true;
        row.p_lvl = p0;
        row.m_nrm = m0;
        row.n_nrm = 0.0;
        row.share = 0.0;
        rows.push(row);
        return rows;
    }

    let mut p_lvl = p0;
    let mut m = m0;
    let mut n = 0.0;
    let mut share = 0.0;

    // Carried between periods: end-of-period savings and risky holdings
    let mut a_nrm = 0.0;
    let mut n_tilde = 0.0;

    for t in 0..config.periods {
        let (perm_shk, tran_shk, risky_shk) = if t == 0 {
            (f64::NAN, f64::NAN, f64::NAN)
        } else {
            // Transition from period t-1 into t
            let trans = shocks.nodes(t - 1);
            if config.mortality && !trans.draw_survival(rng) {
                for dead_t in t..config.periods {
                    rows.push(SimRow::dead(id, dead_t));
                }
                return rows;
            }
            let psi = trans.draw_perm(rng);
            let theta = trans.draw_tran(rng);
            let risky = trans.draw_risky(rng);
            let growth = trans.perm_gro_fac * psi;
            p_lvl *= growth;
            m = rfree * a_nrm / growth + (1.0 - share) * theta;
            n = risky * n_tilde / growth + share * theta;
            (psi, theta, risky)
        };

        // Period-t decisions
        let nodes = shocks.nodes(t);
        let sol = solved.period(t);
        let adjust = nodes.draw_adjust(rng);

        let (d_nrm, m_tilde, new_n_tilde, new_share, c_nrm) = if adjust {
            let d = sol.adjust.reb.dfrac(m, n);
            let (mt, nt) = rebalance_assets(d, m, n, sol.tau);
            let s = sol.adjust.sha.share(mt, nt);
            let c = sol.adjust.cns.consumption(mt, nt, s);
            (d, mt, nt, s, c)
        } else {
            let c = sol.no_adjust.cns.consumption(m, n, share);
            (0.0, m, n, share, c)
        };

        a_nrm = m_tilde - c_nrm;
        n_tilde = new_n_tilde;
        share = new_share;

        rows.push(SimRow {
            agent_id: id,
            period: t,
            alive: true,
            adjust,
            perm_shk,
            tran_shk,
            risky_shk,
            p_lvl,
            m_nrm: m,
            n_nrm: n,
            m_tilde,
            n_tilde,
            d_nrm,
            share,
            c_nrm,
            a_nrm,
        });
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{AgeSchedule, Calibration, Horizon};
    use crate::grids::GridSpec;
    use crate::solver::solve;

    /// Short finite-horizon model that solves in well under a second
    fn tiny_calibration() -> Calibration {
        let mut cal = Calibration::infinite_base();
        cal.grid = GridSpec {
            m_count: 10,
            m_max: 20.0,
            n_count: 10,
            n_max: 20.0,
            a_count: 10,
            a_max: 20.0,
            share_count: 6,
            nest_fac: 3,
        };
        cal.income.perm_shk_count = 3;
        cal.income.tran_shk_count = 3;
        cal.returns.risky_count = 3;
        cal.horizon = Horizon::Finite { periods: 6 };
        cal
    }

    fn sim_config(periods: usize) -> SimConfig {
        SimConfig {
            agent_count: 30,
            periods,
            seed: 7,
            p_lvl_init_mean: 0.0,
            p_lvl_init_std: 0.1,
            m_nrm_init_mean: 0.0,
            m_nrm_init_std: 0.2,
            mortality: false,
        }
    }

    #[test]
    fn zero_periods_returns_the_initial_sample() {
        let cal = tiny_calibration();
        let solved = solve(&cal).unwrap();
        let config = sim_config(0);
        let history = simulate(&solved, &cal, &config).unwrap();

        assert_eq!(history.rows.len(), config.agent_count);
        for row in &history.rows {
            assert!(row.alive);
            assert_eq!(row.period, 0);
            assert!(row.p_lvl > 0.0);
            assert!(row.m_nrm >= 0.0);
            assert_eq!(row.n_nrm, 0.0);
            assert_eq!(row.share, 0.0);
            // No decisions were simulated
            assert!(row.c_nrm.is_nan());
        }

        // Same seed redraws the exact same sample
        let again = simulate(&solved, &cal, &config).unwrap();
        for (a, b) in history.rows.iter().zip(&again.rows) {
            assert_eq!(a.p_lvl, b.p_lvl);
            assert_eq!(a.m_nrm, b.m_nrm);
        }
    }

    #[test]
    fn consumption_never_exceeds_resources() {
        let cal = tiny_calibration();
        let solved = solve(&cal).unwrap();
        let history = simulate(&solved, &cal, &sim_config(6)).unwrap();
        for row in history.rows.iter().filter(|r| r.alive) {
            assert!(row.c_nrm >= 0.0);
            assert!(row.c_nrm <= row.m_tilde + 1e-9, "c > m-tilde at {row:?}");
            assert!(row.a_nrm >= -1e-9);
            assert!(row.n_tilde >= 0.0);
        }
    }

    #[test]
    fn share_is_frozen_when_adjustment_never_arrives() {
        let mut cal = tiny_calibration();
        // Adjustment opportunity only in period 0
        cal.frictions.adjust_prb =
            AgeSchedule::ByAge(vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let solved = solve(&cal).unwrap();
        let history = simulate(&solved, &cal, &sim_config(6)).unwrap();

        for id in 0..30 {
            let rows: Vec<_> = history.agent(id).collect();
            let initial_share = rows[0].share;
            for row in rows.iter().skip(1).filter(|r| r.alive) {
                assert!(!row.adjust);
                assert_eq!(
                    row.share, initial_share,
                    "share drifted without an adjustment opportunity"
                );
            }
        }
    }

    #[test]
    fn requesting_more_periods_than_solved_is_an_error() {
        let cal = tiny_calibration();
        let solved = solve(&cal).unwrap();
        let err = simulate(&solved, &cal, &sim_config(7)).unwrap_err();
        assert!(matches!(err, ModelError::SimulationHorizonExceeded { requested: 7, available: 6 }));
    }

    #[test]
    fn dead_agents_stay_dead_and_keep_their_rows() {
        let mut cal = tiny_calibration();
        // Aggressive mortality so some agents die within the window
        cal.survival = AgeSchedule::Constant(0.5);
        let solved = solve(&cal).unwrap();
        let mut config = sim_config(6);
        config.mortality = true;
        let history = simulate(&solved, &cal, &config).unwrap();

        for id in 0..config.agent_count {
            let rows: Vec<_> = history.agent(id).collect();
            assert_eq!(rows.len(), 6, "every agent keeps a full set of rows");
            let mut seen_dead = false;
            for row in rows {
                if seen_dead {
                    assert!(!row.alive, "agent {id} came back to life");
                    assert!(row.p_lvl.is_nan());
                }
                if !row.alive {
                    seen_dead = true;
                }
            }
        }
        // With survival 0.5 over five transitions, some deaths are certain
        assert!(history.rows.iter().any(|r| !r.alive));
    }

    #[test]
    fn age_profiles_cover_every_period() {
        let cal = tiny_calibration();
        let solved = solve(&cal).unwrap();
        let history = simulate(&solved, &cal, &sim_config(6)).unwrap();
        let profiles = history.age_profiles();
        assert_eq!(profiles.len(), 6);
        assert!(profiles.iter().all(|p| p.alive_count == 30));
        assert!(profiles.iter().all(|p| p.p_lvl > 0.0));
        assert!(profiles.iter().all(|p| (0.0..=1.0).contains(&p.risky_share)));
    }
}
