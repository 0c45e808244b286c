//! Model calibration: preferences, returns, income process, survival, and frictions
//!
//! A [`Calibration`] is immutable once a solve begins. Defaults reproduce the
//! standard parametrizations of the two-asset contribution model: an
//! infinite-horizon base and a life-cycle version with an age-polynomial
//! income profile and tabulated survival probabilities.

mod frictions;
mod income;
mod survival;
pub mod loader;

pub use frictions::{AgeSchedule, FrictionSchedule};
pub use income::{cgm_income_profile, IncomeProcess};
pub use survival::{cgm_survival_probs, survival_slice, SURVIVAL_TABLE_FIRST_AGE};

use crate::error::ModelError;
use crate::grids::GridSpec;
use serde::{Deserialize, Serialize};

/// Preference parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    /// Coefficient of relative risk aversion
    pub crra: f64,
    /// Time discount factor
    pub disc_fac: f64,
}

/// Return processes for the two assets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsConfig {
    /// Gross risk-free return factor
    pub rfree: f64,
    /// Mean gross risky return factor
    pub risky_avg: f64,
    /// Standard deviation of the gross risky return factor
    pub risky_std: f64,
    /// Quadrature nodes for the risky-return distribution
    pub risky_count: usize,
}

/// Horizon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Horizon {
    /// Life-cycle problem with `periods` ages; the last one is terminal
    Finite { periods: usize },
    /// Stationary problem solved by fixed-point iteration
    Infinite { tol: f64, max_iter: usize },
}

impl Horizon {
    /// Number of distinct period solutions a solve produces
    pub fn period_count(&self) -> usize {
        match self {
            Horizon::Finite { periods } => *periods,
            Horizon::Infinite { .. } => 1,
        }
    }
}

/// Whether the contribution share is optimized over a finite candidate set
/// or as a continuous choice on [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShareChoice {
    Continuous,
    Discrete { count: usize },
}

/// Complete, validated model parametrization
#[derive(Debug, Clone)]
pub struct Calibration {
    pub prefs: Preferences,
    pub returns: ReturnsConfig,
    pub income: IncomeProcess,
    /// Per-transition survival probabilities (constant for infinite horizon)
    pub survival: AgeSchedule,
    pub frictions: FrictionSchedule,
    pub grid: GridSpec,
    pub horizon: Horizon,
    pub share_choice: ShareChoice,
}

impl Calibration {
    /// Stationary base calibration of the contribution model
    pub fn infinite_base() -> Self {
        Self {
            prefs: Preferences { crra: 5.0, disc_fac: 0.90 },
            returns: ReturnsConfig {
                rfree: 1.03,
                risky_avg: 1.08,
                risky_std: 0.18,
                risky_count: 5,
            },
            income: IncomeProcess {
                perm_gro_fac: AgeSchedule::Constant(1.01),
                perm_shk_std: AgeSchedule::Constant(0.10),
                tran_shk_std: AgeSchedule::Constant(0.20),
                unemp_prb: AgeSchedule::Constant(0.05),
                inc_unemp: 0.3,
                perm_shk_count: 7,
                tran_shk_count: 7,
            },
            survival: AgeSchedule::Constant(0.98),
            frictions: FrictionSchedule {
                adjust_prb: AgeSchedule::Constant(1.0),
                tau: AgeSchedule::Constant(0.0),
            },
            grid: GridSpec::default(),
            horizon: Horizon::Infinite { tol: 1e-4, max_iter: 200 },
            share_choice: ShareChoice::Continuous,
        }
    }

    /// Life-cycle calibration over ages `born..=death`, retiring after
    /// `retire`. Income follows the age-polynomial profile; survival comes
    /// from the tabulated probabilities; income shocks switch off in
    /// retirement.
    pub fn lifecycle(born: u32, retire: u32, death: u32) -> Self {
        let periods = (death - born + 1) as usize;
        let transitions = periods - 1;
        let working = (retire - born) as usize; // transitions with labor-income risk

        let (gr_fac, _det_income) = cgm_income_profile(born, retire, death);
        debug_assert_eq!(gr_fac.len(), transitions);

        // Shock stds from the life-cycle literature's estimates; zero after
        // the retirement transition
        let sigma_perm = 0.0106_f64.sqrt();
        let sigma_tran = 0.0738_f64.sqrt();
        let mut perm_std = vec![sigma_perm; transitions];
        let mut tran_std = vec![sigma_tran; transitions];
        let mut unemp = vec![0.05; transitions];
        for t in working..transitions {
            perm_std[t] = 0.0;
            tran_std[t] = 0.0;
            unemp[t] = 0.0;
        }

        Self {
            prefs: Preferences { crra: 5.0, disc_fac: 0.90 },
            returns: ReturnsConfig {
                rfree: 1.03,
                risky_avg: 1.08,
                risky_std: 0.18,
                risky_count: 5,
            },
            income: IncomeProcess {
                perm_gro_fac: AgeSchedule::ByAge(gr_fac),
                perm_shk_std: AgeSchedule::ByAge(perm_std),
                tran_shk_std: AgeSchedule::ByAge(tran_std),
                unemp_prb: AgeSchedule::ByAge(unemp),
                inc_unemp: 0.3,
                perm_shk_count: 7,
                tran_shk_count: 7,
            },
            survival: AgeSchedule::ByAge(survival_slice(born, death)),
            frictions: FrictionSchedule {
                adjust_prb: AgeSchedule::Constant(1.0),
                tau: AgeSchedule::Constant(0.0),
            },
            grid: GridSpec::default(),
            horizon: Horizon::Finite { periods },
            share_choice: ShareChoice::Continuous,
        }
    }

    /// Number of period solutions the configured horizon produces
    pub fn period_count(&self) -> usize {
        self.horizon.period_count()
    }

    /// Reject inconsistent parametrizations before any solving starts
    pub fn validate(&self) -> Result<(), ModelError> {
        self.grid.validate()?;

        if self.prefs.crra <= 0.0 {
            return Err(ModelError::NonPositiveParameter { name: "crra", value: self.prefs.crra });
        }
        if self.prefs.disc_fac <= 0.0 {
            return Err(ModelError::NonPositiveParameter {
                name: "disc_fac",
                value: self.prefs.disc_fac,
            });
        }
        if self.returns.rfree <= 0.0 {
            return Err(ModelError::NonPositiveParameter {
                name: "rfree",
                value: self.returns.rfree,
            });
        }
        if self.returns.risky_avg <= 0.0 {
            return Err(ModelError::NonPositiveParameter {
                name: "risky_avg",
                value: self.returns.risky_avg,
            });
        }
        if self.returns.risky_std < 0.0 {
            return Err(ModelError::NonPositiveParameter {
                name: "risky_std",
                value: self.returns.risky_std,
            });
        }

        match self.horizon {
            Horizon::Finite { periods } => {
                if periods < 2 {
                    return Err(ModelError::InvalidHorizon(format!(
                        "finite horizon needs at least 2 periods, got {periods}"
                    )));
                }
                let transitions = periods - 1;
                self.income.validate(transitions)?;
                self.survival.validate_probability("survival", transitions)?;
                self.frictions.validate(periods)?;
            }
            Horizon::Infinite { tol, max_iter } => {
                if tol <= 0.0 {
                    return Err(ModelError::InvalidHorizon(format!(
                        "convergence tolerance must be positive, got {tol}"
                    )));
                }
                if max_iter == 0 {
                    return Err(ModelError::InvalidHorizon(
                        "max_iter must be at least 1".into(),
                    ));
                }
                for (name, sched) in [
                    ("perm_gro_fac", &self.income.perm_gro_fac),
                    ("perm_shk_std", &self.income.perm_shk_std),
                    ("tran_shk_std", &self.income.tran_shk_std),
                    ("unemp_prb", &self.income.unemp_prb),
                    ("survival", &self.survival),
                    ("adjust_prb", &self.frictions.adjust_prb),
                    ("tau", &self.frictions.tau),
                ] {
                    if !matches!(sched, AgeSchedule::Constant(_)) {
                        return Err(ModelError::InvalidHorizon(format!(
                            "infinite horizon requires a constant {name} schedule"
                        )));
                    }
                }
                self.income.validate(1)?;
                self.survival.validate_probability("survival", 1)?;
                self.frictions.validate(1)?;
            }
        }

        if let ShareChoice::Discrete { count } = self.share_choice {
            if count < 2 {
                return Err(ModelError::InvalidHorizon(format!(
                    "discrete share choice needs at least 2 candidates, got {count}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Calibration::infinite_base().validate().unwrap();
        Calibration::lifecycle(25, 65, 90).validate().unwrap();
    }

    #[test]
    fn lifecycle_has_one_period_per_age() {
        let cal = Calibration::lifecycle(25, 65, 90);
        assert_eq!(cal.period_count(), 66);
    }

    #[test]
    fn rejects_bad_probability() {
        let mut cal = Calibration::infinite_base();
        cal.survival = AgeSchedule::Constant(1.5);
        assert!(matches!(
            cal.validate(),
            Err(ModelError::InvalidProbability { name: "survival", .. })
        ));
    }

    #[test]
    fn rejects_age_varying_schedule_for_infinite_horizon() {
        let mut cal = Calibration::infinite_base();
        cal.frictions.adjust_prb = AgeSchedule::ByAge(vec![1.0, 0.5]);
        assert!(matches!(cal.validate(), Err(ModelError::InvalidHorizon(_))));
    }

    #[test]
    fn rejects_mismatched_schedule_length() {
        let mut cal = Calibration::lifecycle(25, 65, 90);
        cal.frictions.tau = AgeSchedule::ByAge(vec![0.1; 10]);
        assert!(matches!(
            cal.validate(),
            Err(ModelError::ScheduleLengthMismatch { name: "tau", .. })
        ));
    }

    #[test]
    fn retirement_periods_have_no_income_risk() {
        let cal = Calibration::lifecycle(25, 65, 90);
        // Transition 39 is age 64 -> 65 (still working); 40 is 65 -> 66
        assert!(cal.income.tran_shk_std.at(39) > 0.0);
        assert_eq!(cal.income.tran_shk_std.at(40), 0.0);
        assert_eq!(cal.income.unemp_prb.at(64), 0.0);
    }
}
