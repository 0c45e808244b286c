//! Labor-income process: deterministic age profile and shock structure

use super::frictions::AgeSchedule;
use crate::error::ModelError;
use serde::{Deserialize, Serialize};

/// Stochastic labor-income process, normalized by permanent income
///
/// Each transition applies a permanent growth factor, a mean-one permanent
/// shock, and a transitory shock that mixes an unemployment outcome with a
/// mean-preserving lognormal component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeProcess {
    /// Permanent income growth factor per transition
    pub perm_gro_fac: AgeSchedule,
    /// Standard deviation of the log permanent shock per transition
    pub perm_shk_std: AgeSchedule,
    /// Standard deviation of the log transitory shock per transition
    pub tran_shk_std: AgeSchedule,
    /// Probability of the unemployment outcome per transition
    pub unemp_prb: AgeSchedule,
    /// Transitory income received when unemployed (benefit replacement)
    pub inc_unemp: f64,
    /// Quadrature nodes for the permanent shock
    pub perm_shk_count: usize,
    /// Quadrature nodes for the employed transitory shock
    pub tran_shk_count: usize,
}

impl IncomeProcess {
    pub fn validate(&self, transitions: usize) -> Result<(), ModelError> {
        self.perm_gro_fac.validate_non_negative("perm_gro_fac", transitions)?;
        self.perm_shk_std.validate_non_negative("perm_shk_std", transitions)?;
        self.tran_shk_std.validate_non_negative("tran_shk_std", transitions)?;
        self.unemp_prb.validate_probability("unemp_prb", transitions)?;
        if self.inc_unemp < 0.0 {
            return Err(ModelError::NonPositiveParameter {
                name: "inc_unemp",
                value: self.inc_unemp,
            });
        }
        if self.perm_shk_count == 0 || self.tran_shk_count == 0 {
            return Err(ModelError::InvalidHorizon(
                "income shock node counts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Deterministic life-cycle income profile: a cubic polynomial in age for
/// log income while working, then a flat replacement fraction of the last
/// working-age income in retirement.
///
/// Returns `(growth_factors, income_levels)`: `income_levels` has one entry
/// per age in `born..=death`; `growth_factors[t]` is the ratio of income at
/// age `born + t + 1` to income at age `born + t`.
pub fn cgm_income_profile(born: u32, retire: u32, death: u32) -> (Vec<f64>, Vec<f64>) {
    // Cubic log-income coefficients estimated on life-cycle earnings data
    let a = -2.170042 + 2.700381;
    let b1 = 0.16818;
    let b2 = -0.0323371 / 10.0;
    let b3 = 0.0019704 / 100.0;
    let repl_fac = 0.68212;

    let mut income = Vec::with_capacity((death - born + 1) as usize);
    for age in born..=retire {
        let t = age as f64;
        income.push((a + b1 * t + b2 * t * t + b3 * t * t * t).exp());
    }
    let retirement_income = repl_fac * income.last().copied().unwrap_or(1.0);
    for _age in (retire + 1)..=death {
        income.push(retirement_income);
    }

    let growth = income.windows(2).map(|w| w[1] / w[0]).collect();
    (growth, income)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn profile_covers_every_age() {
        let (growth, income) = cgm_income_profile(25, 65, 90);
        assert_eq!(income.len(), 66);
        assert_eq!(growth.len(), 65);
    }

    #[test]
    fn income_drops_to_replacement_at_retirement() {
        let (growth, income) = cgm_income_profile(25, 65, 90);
        // Index 40 is age 65 (last working age), 41 the first retired age
        assert_relative_eq!(income[41] / income[40], 0.68212, epsilon = 1e-12);
        assert_relative_eq!(growth[40], 0.68212, epsilon = 1e-12);
        // Flat afterwards
        assert_relative_eq!(growth[50], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn working_income_is_hump_shaped() {
        let (_, income) = cgm_income_profile(20, 65, 100);
        let peak = income
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        // Earnings peak in middle age, not at either end of working life
        assert!(peak > 10 && peak < 45);
    }
}
