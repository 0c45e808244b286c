//! Age-varying parameter schedules and rebalancing frictions

use crate::error::ModelError;
use serde::{Deserialize, Serialize};

/// A scalar parameter that may vary by model period
///
/// Lookups past the end of an age-varying table clamp to the last entry, so
/// a schedule only needs to cover the periods where it actually changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgeSchedule {
    Constant(f64),
    ByAge(Vec<f64>),
}

impl AgeSchedule {
    /// Value applying at period `t`
    pub fn at(&self, t: usize) -> f64 {
        match self {
            AgeSchedule::Constant(v) => *v,
            AgeSchedule::ByAge(v) => v[t.min(v.len() - 1)],
        }
    }

    /// Check every entry lies in [0, 1] and an age-varying table has the
    /// expected number of entries
    pub fn validate_probability(
        &self,
        name: &'static str,
        expected_len: usize,
    ) -> Result<(), ModelError> {
        self.validate_len(name, expected_len)?;
        let check = |value: f64| {
            if !(0.0..=1.0).contains(&value) {
                Err(ModelError::InvalidProbability { name, value })
            } else {
                Ok(())
            }
        };
        match self {
            AgeSchedule::Constant(v) => check(*v),
            AgeSchedule::ByAge(vs) => vs.iter().try_for_each(|&v| check(v)),
        }
    }

    /// Check every entry is non-negative and the table length matches
    pub fn validate_non_negative(
        &self,
        name: &'static str,
        expected_len: usize,
    ) -> Result<(), ModelError> {
        self.validate_len(name, expected_len)?;
        let check = |value: f64| {
            if value < 0.0 {
                Err(ModelError::NonPositiveParameter { name, value })
            } else {
                Ok(())
            }
        };
        match self {
            AgeSchedule::Constant(v) => check(*v),
            AgeSchedule::ByAge(vs) => vs.iter().try_for_each(|&v| check(v)),
        }
    }

    fn validate_len(&self, name: &'static str, expected: usize) -> Result<(), ModelError> {
        if let AgeSchedule::ByAge(vs) = self {
            if vs.len() != expected {
                return Err(ModelError::ScheduleLengthMismatch {
                    name,
                    got: vs.len(),
                    expected,
                });
            }
        }
        Ok(())
    }
}

/// Rebalancing frictions: the probability of drawing an adjustment
/// opportunity and the tax on risky withdrawals, both possibly age-varying
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrictionSchedule {
    /// Probability the agent may rebalance and reset the contribution share
    pub adjust_prb: AgeSchedule,
    /// Proportional tax on net withdrawals from the risky account
    pub tau: AgeSchedule,
}

impl FrictionSchedule {
    pub fn validate(&self, periods: usize) -> Result<(), ModelError> {
        self.adjust_prb.validate_probability("adjust_prb", periods)?;
        self.tau.validate_probability("tau", periods)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_schedule_ignores_period() {
        let s = AgeSchedule::Constant(0.25);
        assert_eq!(s.at(0), 0.25);
        assert_eq!(s.at(100), 0.25);
    }

    #[test]
    fn by_age_schedule_clamps_past_the_end() {
        let s = AgeSchedule::ByAge(vec![1.0, 0.5, 0.0]);
        assert_eq!(s.at(1), 0.5);
        assert_eq!(s.at(2), 0.0);
        assert_eq!(s.at(10), 0.0);
    }

    #[test]
    fn probability_validation_catches_out_of_range() {
        let s = AgeSchedule::ByAge(vec![0.5, 1.2]);
        assert!(s.validate_probability("adjust_prb", 2).is_err());
    }
}
