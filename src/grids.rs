//! State-space grid construction
//!
//! All asset grids use exponentially-nested spacing: points are denser near
//! zero, where policy functions curve hardest against the borrowing
//! constraint, and spread out toward the grid maximum. The contribution-share
//! grid is uniform on [0, 1].

use crate::error::ModelError;

/// How many asset-grid points to request and how far to stretch them
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    /// Points and maximum for the post-rebalancing risk-free grid (m-tilde)
    pub m_count: usize,
    pub m_max: f64,

    /// Points and maximum for the risky-asset grid (n-tilde)
    pub n_count: usize,
    pub n_max: f64,

    /// Points and maximum for the end-of-period savings grid (a)
    pub a_count: usize,
    pub a_max: f64,

    /// Points for the contribution-share grid on [0, 1]
    pub share_count: usize,

    /// Times to nest the log transform when spacing asset grids
    pub nest_fac: u32,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            m_count: 30,
            m_max: 50.0,
            n_count: 30,
            n_max: 50.0,
            a_count: 30,
            a_max: 50.0,
            share_count: 15,
            nest_fac: 3,
        }
    }
}

impl GridSpec {
    /// Check every requested dimension before any grid is built
    pub fn validate(&self) -> Result<(), ModelError> {
        let dims = [
            ("m", self.m_count, self.m_max),
            ("n", self.n_count, self.n_max),
            ("a", self.a_count, self.a_max),
            ("share", self.share_count, 1.0),
        ];
        for (name, count, max) in dims {
            if count < 2 || max <= 0.0 {
                return Err(ModelError::InvalidGrid { name, count, max });
            }
        }
        Ok(())
    }
}

/// Immutable grids shared read-only by every period of a solve
#[derive(Debug, Clone)]
pub struct StateGrids {
    /// Post-rebalancing risk-free assets (m-tilde), strictly increasing from 0
    pub m: Vec<f64>,

    /// Risky assets (n-tilde), strictly increasing from 0
    pub n: Vec<f64>,

    /// End-of-period risk-free savings, strictly increasing from 0
    pub a: Vec<f64>,

    /// Contribution share, uniform on [0, 1]
    pub share: Vec<f64>,
}

impl StateGrids {
    /// Build all grids from a validated spec
    pub fn build(spec: &GridSpec) -> Result<Self, ModelError> {
        spec.validate()?;
        Ok(Self {
            m: exp_nested_grid(0.0, spec.m_max, spec.m_count, spec.nest_fac),
            n: exp_nested_grid(0.0, spec.n_max, spec.n_count, spec.nest_fac),
            a: exp_nested_grid(0.0, spec.a_max, spec.a_count, spec.nest_fac),
            share: uniform_grid(0.0, 1.0, spec.share_count),
        })
    }
}

/// Uniformly spaced grid including both endpoints
pub fn uniform_grid(min: f64, max: f64, count: usize) -> Vec<f64> {
    let step = (max - min) / (count - 1) as f64;
    (0..count).map(|i| min + step * i as f64).collect()
}

/// Exponentially-nested grid: apply `log(x + 1)` to the bounds `nest` times,
/// space uniformly in that transformed scale, then invert with `exp(x) - 1`.
///
/// With `nest = 0` this degenerates to a uniform grid; each extra nesting
/// level concentrates more points near `min`.
pub fn exp_nested_grid(min: f64, max: f64, count: usize, nest: u32) -> Vec<f64> {
    let mut lo = min;
    let mut hi = max;
    for _ in 0..nest {
        lo = (lo + 1.0).ln();
        hi = (hi + 1.0).ln();
    }
    let mut grid = uniform_grid(lo, hi, count);
    for _ in 0..nest {
        for g in grid.iter_mut() {
            *g = g.exp() - 1.0;
        }
    }
    // The round trip can leave the endpoints a few ulps off
    grid[0] = min;
    grid[count - 1] = max;
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn grids_are_strictly_increasing() {
        let grids = StateGrids::build(&GridSpec::default()).unwrap();
        for g in [&grids.m, &grids.n, &grids.a, &grids.share] {
            assert!(g.windows(2).all(|w| w[1] > w[0]));
        }
    }

    #[test]
    fn asset_grids_cover_requested_range() {
        let spec = GridSpec { m_max: 500.0, ..GridSpec::default() };
        let grids = StateGrids::build(&spec).unwrap();
        assert_eq!(grids.m.len(), spec.m_count);
        assert_relative_eq!(grids.m[0], 0.0);
        assert_relative_eq!(*grids.m.last().unwrap(), 500.0);
    }

    #[test]
    fn nesting_concentrates_points_near_zero() {
        let nested = exp_nested_grid(0.0, 100.0, 20, 3);
        let flat = exp_nested_grid(0.0, 100.0, 20, 0);
        // More nested points below 10 than uniform points
        let below = |g: &[f64]| g.iter().filter(|&&x| x < 10.0).count();
        assert!(below(&nested) > below(&flat));
    }

    #[test]
    fn share_grid_spans_unit_interval() {
        let grids = StateGrids::build(&GridSpec::default()).unwrap();
        assert_relative_eq!(grids.share[0], 0.0);
        assert_relative_eq!(*grids.share.last().unwrap(), 1.0);
    }

    #[test]
    fn rejects_degenerate_dimensions() {
        let mut spec = GridSpec::default();
        spec.m_count = 1;
        assert!(matches!(
            StateGrids::build(&spec),
            Err(ModelError::InvalidGrid { name: "m", .. })
        ));

        let mut spec = GridSpec::default();
        spec.n_max = 0.0;
        assert!(StateGrids::build(&spec).is_err());
    }
}
