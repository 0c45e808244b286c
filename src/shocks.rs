//! Shock discretization and simulation-time draws
//!
//! The solver consumes discrete approximations of the permanent-income,
//! transitory-income, and risky-return distributions, built once per age by
//! Gauss-Hermite quadrature. The simulator redraws from the same marginal
//! distributions with pseudo-random sampling, never the quadrature nodes.
//!
//! Income shocks and the risky return are treated as contemporaneously
//! independent; see `income_and_return_nodes_are_independent`.

use crate::calibration::{Calibration, Horizon};
use crate::error::ModelError;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution, LogNormal};

/// A discrete distribution: support atoms with matching probabilities
#[derive(Debug, Clone)]
pub struct DiscreteDist {
    pub atoms: Vec<f64>,
    pub probs: Vec<f64>,
}

impl DiscreteDist {
    /// Point mass at `x`
    pub fn degenerate(x: f64) -> Self {
        Self { atoms: vec![x], probs: vec![1.0] }
    }

    /// Mean-one lognormal discretized on `count` Gauss-Hermite nodes
    pub fn lognormal_mean_one(sigma: f64, count: usize) -> Self {
        Self::lognormal_from_logspace(-0.5 * sigma * sigma, sigma, count)
    }

    /// Lognormal with the given mean and standard deviation of the level,
    /// discretized on `count` Gauss-Hermite nodes
    pub fn lognormal_from_moments(mean: f64, std: f64, count: usize) -> Self {
        let (mu, sigma) = lognormal_params(mean, std);
        Self::lognormal_from_logspace(mu, sigma, count)
    }

    fn lognormal_from_logspace(mu: f64, sigma: f64, count: usize) -> Self {
        if sigma <= 0.0 {
            return Self::degenerate(mu.exp());
        }
        let (nodes, weights) = gauss_hermite(count);
        let norm = std::f64::consts::PI.sqrt();
        let atoms = nodes
            .iter()
            .map(|&g| (mu + std::f64::consts::SQRT_2 * sigma * g).exp())
            .collect();
        let probs = weights.iter().map(|&w| w / norm).collect();
        Self { atoms, probs }
    }

    /// Mix in a fixed outcome `x` with probability `p`, rescaling the
    /// existing atoms so the overall mean is unchanged
    pub fn with_outcome_constant_mean(self, p: f64, x: f64) -> Self {
        if p <= 0.0 {
            return self;
        }
        if p >= 1.0 {
            return Self::degenerate(x);
        }
        let scale = (1.0 - p * x) / (1.0 - p);
        let mut atoms = vec![x];
        atoms.extend(self.atoms.iter().map(|&a| a * scale));
        let mut probs = vec![p];
        probs.extend(self.probs.iter().map(|&w| w * (1.0 - p)));
        Self { atoms, probs }
    }

    pub fn mean(&self) -> f64 {
        self.atoms.iter().zip(&self.probs).map(|(a, p)| a * p).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.atoms.iter().copied().zip(self.probs.iter().copied())
    }
}

/// Convert level mean/std of a lognormal into log-space parameters
fn lognormal_params(mean: f64, std: f64) -> (f64, f64) {
    if std <= 0.0 {
        return (mean.ln(), 0.0);
    }
    let sigma_sq = (1.0 + (std / mean).powi(2)).ln();
    (mean.ln() - 0.5 * sigma_sq, sigma_sq.sqrt())
}

/// Gauss-Hermite nodes and weights for integrating against `exp(-x^2)`.
///
/// Newton iteration on the normalized Hermite recurrence, seeded from the
/// standard asymptotic root estimates; nodes are returned in ascending
/// order.
pub fn gauss_hermite(n: usize) -> (Vec<f64>, Vec<f64>) {
    assert!(n >= 1, "quadrature needs at least one node");
    const PIM4: f64 = 0.751_125_544_464_942_5; // pi^(-1/4)
    const EPS: f64 = 3e-14;

    let mut x = vec![0.0; n];
    let mut w = vec![0.0; n];
    let nf = n as f64;

    let mut z = 0.0;
    for i in 0..(n + 1) / 2 {
        z = match i {
            0 => (2.0 * nf + 1.0).sqrt() - 1.85575 * (2.0 * nf + 1.0).powf(-1.0 / 6.0),
            1 => z - 1.14 * nf.powf(0.426) / z,
            2 => 1.86 * z - 0.86 * x[0],
            3 => 1.91 * z - 0.91 * x[1],
            _ => 2.0 * z - x[i - 2],
        };

        let mut pp = 0.0;
        for _ in 0..100 {
            let mut p1 = PIM4;
            let mut p2 = 0.0;
            for j in 0..n {
                let p3 = p2;
                p2 = p1;
                let jf = j as f64;
                p1 = z * (2.0 / (jf + 1.0)).sqrt() * p2 - (jf / (jf + 1.0)).sqrt() * p3;
            }
            pp = (2.0 * nf).sqrt() * p2;
            let z1 = z;
            z = z1 - p1 / pp;
            if (z - z1).abs() <= EPS {
                break;
            }
        }

        x[i] = z;
        x[n - 1 - i] = -z;
        w[i] = 2.0 / (pp * pp);
        w[n - 1 - i] = w[i];
    }

    // The construction fills from the largest root down
    let mut pairs: Vec<(f64, f64)> = x.into_iter().zip(w).collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    pairs.into_iter().unzip()
}

/// Everything the solver and simulator need to know about one period:
/// the discretized transition shocks into the next period plus the
/// within-period friction parameters
#[derive(Debug, Clone)]
pub struct ShockNodes {
    /// Mean-one permanent-income shock
    pub perm: DiscreteDist,
    /// Transitory-income shock (unemployment mixture, overall mean one)
    pub tran: DiscreteDist,
    /// Gross risky return
    pub risky: DiscreteDist,
    /// Permanent income growth factor over the transition
    pub perm_gro_fac: f64,
    /// Probability of surviving the transition
    pub liv_prb: f64,
    /// Probability of a rebalancing opportunity this period
    pub adjust_prb: f64,
    /// Withdrawal tax this period
    pub tau: f64,

    // Marginal parameters for simulation-time redraws
    perm_sigma: f64,
    tran_sigma: f64,
    tran_scale: f64,
    unemp_prb: f64,
    inc_unemp: f64,
    risky_mu: f64,
    risky_sigma: f64,
}

/// Per-age shock structure for a whole solve
#[derive(Debug, Clone)]
pub struct ShockModel {
    by_period: Vec<ShockNodes>,
}

impl ShockModel {
    /// Discretize every period's shocks once, up front
    pub fn from_calibration(cal: &Calibration) -> Result<Self, ModelError> {
        cal.validate()?;
        let periods = cal.period_count();
        let transitions = match cal.horizon {
            Horizon::Finite { periods } => periods - 1,
            Horizon::Infinite { .. } => 1,
        };

        let (risky_mu, risky_sigma) =
            lognormal_params(cal.returns.risky_avg, cal.returns.risky_std);
        let risky = DiscreteDist::lognormal_from_moments(
            cal.returns.risky_avg,
            cal.returns.risky_std,
            cal.returns.risky_count,
        );

        let mut by_period = Vec::with_capacity(periods);
        for t in 0..periods {
            let has_transition = t < transitions || matches!(cal.horizon, Horizon::Infinite { .. });
            let (perm, tran, perm_sigma, tran_sigma, tran_scale, unemp_prb) = if has_transition {
                let perm_sigma = cal.income.perm_shk_std.at(t);
                let tran_sigma = cal.income.tran_shk_std.at(t);
                let unemp_prb = cal.income.unemp_prb.at(t);
                let perm =
                    DiscreteDist::lognormal_mean_one(perm_sigma, cal.income.perm_shk_count);
                let employed =
                    DiscreteDist::lognormal_mean_one(tran_sigma, cal.income.tran_shk_count);
                let tran = employed.with_outcome_constant_mean(unemp_prb, cal.income.inc_unemp);
                let tran_scale = if unemp_prb > 0.0 && unemp_prb < 1.0 {
                    (1.0 - unemp_prb * cal.income.inc_unemp) / (1.0 - unemp_prb)
                } else {
                    1.0
                };
                (perm, tran, perm_sigma, tran_sigma, tran_scale, unemp_prb)
            } else {
                // Terminal period: no transition out of it
                (
                    DiscreteDist::degenerate(1.0),
                    DiscreteDist::degenerate(1.0),
                    0.0,
                    0.0,
                    1.0,
                    0.0,
                )
            };

            by_period.push(ShockNodes {
                perm,
                tran,
                risky: risky.clone(),
                perm_gro_fac: if has_transition { cal.income.perm_gro_fac.at(t) } else { 1.0 },
                liv_prb: if has_transition { cal.survival.at(t) } else { 0.0 },
                adjust_prb: cal.frictions.adjust_prb.at(t),
                tau: cal.frictions.tau.at(t),
                perm_sigma,
                tran_sigma,
                tran_scale,
                unemp_prb,
                inc_unemp: cal.income.inc_unemp,
                risky_mu,
                risky_sigma,
            });
        }

        Ok(Self { by_period })
    }

    /// Shock structure for period `t`; clamps so an infinite-horizon model
    /// can be queried at any simulated period
    pub fn nodes(&self, t: usize) -> &ShockNodes {
        &self.by_period[t.min(self.by_period.len() - 1)]
    }

    pub fn period_count(&self) -> usize {
        self.by_period.len()
    }
}

impl ShockNodes {
    /// Sample a permanent shock from the continuous marginal
    pub fn draw_perm<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.perm_sigma <= 0.0 {
            return 1.0;
        }
        let dist = LogNormal::new(-0.5 * self.perm_sigma * self.perm_sigma, self.perm_sigma)
            .expect("sigma checked positive");
        dist.sample(rng)
    }

    /// Sample a transitory shock: unemployment outcome or scaled lognormal
    pub fn draw_tran<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.unemp_prb > 0.0 && rng.gen::<f64>() < self.unemp_prb {
            return self.inc_unemp;
        }
        if self.tran_sigma <= 0.0 {
            return self.tran_scale;
        }
        let dist = LogNormal::new(-0.5 * self.tran_sigma * self.tran_sigma, self.tran_sigma)
            .expect("sigma checked positive");
        dist.sample(rng) * self.tran_scale
    }

    /// Sample a gross risky return
    pub fn draw_risky<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.risky_sigma <= 0.0 {
            return self.risky_mu.exp();
        }
        let dist =
            LogNormal::new(self.risky_mu, self.risky_sigma).expect("sigma checked positive");
        dist.sample(rng)
    }

    /// Draw the rebalancing-opportunity indicator
    pub fn draw_adjust<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        Bernoulli::new(self.adjust_prb).expect("probability validated").sample(rng)
    }

    /// Draw the survival indicator
    pub fn draw_survival<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        Bernoulli::new(self.liv_prb).expect("probability validated").sample(rng)
    }
}
