//! Scenario runner for batch solves across friction variants
//!
//! Holds one base calibration and derives the standard parametrizations of
//! the contribution model from it (frictionless base, withdrawal tax,
//! Calvo-style adjustment probability, retirement-locked contributions), so
//! many solves can share the same grids, income profile, and survival table
//! without rebuilding them by hand.

use crate::calibration::{AgeSchedule, Calibration, Horizon};
use crate::error::ModelError;
use crate::solver::{solve, SolvedModel};

/// Pre-loaded scenario runner for batch solves
///
/// # Example
/// ```ignore
/// let runner = ScenarioRunner::lifecycle(25, 65, 90);
/// for (name, solved) in runner.solve_named_variants()? {
///     println!("{name}: {} periods", solved.period_count());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ScenarioRunner {
    base: Calibration,
    /// Index of the first retired period, when the base is a life cycle
    retirement_period: Option<usize>,
}

impl ScenarioRunner {
    /// Runner over the stationary base calibration
    pub fn new(base: Calibration) -> Self {
        Self { base, retirement_period: None }
    }

    /// Runner over a life-cycle base calibration
    pub fn lifecycle(born: u32, retire: u32, death: u32) -> Self {
        Self {
            base: Calibration::lifecycle(born, retire, death),
            retirement_period: Some((retire - born + 1) as usize),
        }
    }

    /// The unmodified base calibration
    pub fn base(&self) -> &Calibration {
        &self.base
    }

    /// Mutable access for customizing the base before deriving variants
    pub fn base_mut(&mut self) -> &mut Calibration {
        &mut self.base
    }

    /// Base with a flat withdrawal tax
    pub fn tax_variant(&self, tau: f64) -> Calibration {
        let mut cal = self.base.clone();
        cal.frictions.tau = AgeSchedule::Constant(tau);
        cal
    }

    /// Base with a Calvo-style adjustment probability
    pub fn calvo_variant(&self, adjust_prb: f64) -> Calibration {
        let mut cal = self.base.clone();
        cal.frictions.adjust_prb = AgeSchedule::Constant(adjust_prb);
        cal
    }

    /// Base where the contribution scheme can be set once at working start
    /// and revisited only from retirement on; unemployment risk switched off.
    /// Only meaningful for life-cycle bases.
    pub fn retirement_variant(&self) -> Result<Calibration, ModelError> {
        let retirement = self.retirement_period.ok_or_else(|| {
            ModelError::InvalidHorizon(
                "retirement variant requires a life-cycle base".into(),
            )
        })?;
        let periods = match self.base.horizon {
            Horizon::Finite { periods } => periods,
            Horizon::Infinite { .. } => {
                return Err(ModelError::InvalidHorizon(
                    "retirement variant requires a finite horizon".into(),
                ))
            }
        };

        let mut adjust = vec![0.0; periods];
        adjust[0] = 1.0;
        for p in adjust.iter_mut().skip(retirement) {
            *p = 1.0;
        }

        let mut cal = self.base.clone();
        cal.frictions.adjust_prb = AgeSchedule::ByAge(adjust);
        cal.income.unemp_prb = AgeSchedule::ByAge(vec![0.0; periods - 1]);
        Ok(cal)
    }

    /// The four standard parametrizations: Base, Tax (tau = 0.1), Calvo
    /// (AdjustPrb = 0.25), and, for life-cycle bases, Retirement
    pub fn named_variants(&self) -> Result<Vec<(&'static str, Calibration)>, ModelError> {
        let mut variants = vec![
            ("Base", self.base.clone()),
            ("Tax", self.tax_variant(0.1)),
            ("Calvo", self.calvo_variant(0.25)),
        ];
        if self.retirement_period.is_some() {
            variants.push(("Retirement", self.retirement_variant()?));
        }
        Ok(variants)
    }

    /// Solve one variant calibration
    pub fn run(&self, cal: &Calibration) -> Result<SolvedModel, ModelError> {
        solve(cal)
    }

    /// Solve every named variant, in order
    pub fn solve_named_variants(
        &self,
    ) -> Result<Vec<(&'static str, SolvedModel)>, ModelError> {
        self.named_variants()?
            .into_iter()
            .map(|(name, cal)| solve(&cal).map(|s| (name, s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_validate() {
        let runner = ScenarioRunner::lifecycle(25, 65, 90);
        for (name, cal) in runner.named_variants().unwrap() {
            cal.validate().unwrap_or_else(|e| panic!("{name} failed: {e}"));
        }
    }

    #[test]
    fn tax_variant_carries_the_tax() {
        let runner = ScenarioRunner::new(Calibration::infinite_base());
        let cal = runner.tax_variant(0.1);
        assert_eq!(cal.frictions.tau.at(0), 0.1);
        // Base untouched
        assert_eq!(runner.base().frictions.tau.at(0), 0.0);
    }

    #[test]
    fn retirement_variant_locks_working_years() {
        let runner = ScenarioRunner::lifecycle(25, 65, 90);
        let cal = runner.retirement_variant().unwrap();
        assert_eq!(cal.frictions.adjust_prb.at(0), 1.0);
        assert_eq!(cal.frictions.adjust_prb.at(1), 0.0);
        assert_eq!(cal.frictions.adjust_prb.at(40), 0.0);
        assert_eq!(cal.frictions.adjust_prb.at(41), 1.0);
        assert_eq!(cal.income.unemp_prb.at(10), 0.0);
    }

    #[test]
    fn retirement_variant_requires_a_life_cycle() {
        let runner = ScenarioRunner::new(Calibration::infinite_base());
        assert!(runner.retirement_variant().is_err());
        // Named variants still work, just without the retirement entry
        let names: Vec<_> =
            runner.named_variants().unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Base", "Tax", "Calvo"]);
    }
}
