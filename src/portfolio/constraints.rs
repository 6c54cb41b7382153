//! # Constraints
//!
//! $$
//! \mathbf 1^\top \mathbf w = 1,\qquad \ell_i \le w_i \le u_i
//! $$
//!
//! Full-investment and per-asset box constraints on portfolio weights.

use std::cmp::Ordering;

use nalgebra::DVector;

use crate::error::PortfolioError;
use crate::error::Result;

/// Closed interval for one weight. Either end may be infinite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
  pub lower: f64,
  pub upper: f64,
}

impl Bounds {
  pub fn new(lower: f64, upper: f64) -> Self {
    Self { lower, upper }
  }

  pub fn is_finite(&self) -> bool {
    self.lower.is_finite() && self.upper.is_finite()
  }

  pub fn clamp(&self, w: f64) -> f64 {
    w.max(self.lower).min(self.upper)
  }
}

/// Weight bounds shared by all assets or given per asset.
#[derive(Clone, Debug, PartialEq)]
pub enum WeightBounds {
  Uniform(Bounds),
  PerAsset(Vec<Bounds>),
}

/// Constraint set of an optimization run. Full investment is always imposed.
#[derive(Clone, Debug, PartialEq)]
pub struct Constraints {
  pub bounds: WeightBounds,
}

impl Default for Constraints {
  fn default() -> Self {
    Self::long_only()
  }
}

impl Constraints {
  /// No short-selling, no leverage: `0 <= w_i <= 1`.
  pub fn long_only() -> Self {
    Self::with_bounds(0.0, 1.0)
  }

  /// Shorting allowed up to the full budget: `-1 <= w_i <= 1`.
  pub fn long_short() -> Self {
    Self::with_bounds(-1.0, 1.0)
  }

  /// Full investment only.
  pub fn unbounded() -> Self {
    Self::with_bounds(f64::NEG_INFINITY, f64::INFINITY)
  }

  pub fn with_bounds(lower: f64, upper: f64) -> Self {
    Self {
      bounds: WeightBounds::Uniform(Bounds::new(lower, upper)),
    }
  }

  pub fn per_asset(bounds: Vec<Bounds>) -> Self {
    Self {
      bounds: WeightBounds::PerAsset(bounds),
    }
  }

  /// Expand to `n` per-asset bounds and check that a fully invested portfolio exists.
  pub fn resolve(&self, n: usize) -> Result<Vec<Bounds>> {
    let bounds = match &self.bounds {
      WeightBounds::Uniform(b) => vec![*b; n],
      WeightBounds::PerAsset(b) => {
        if b.len() != n {
          return Err(PortfolioError::DimensionMismatch {
            expected: n,
            found: b.len(),
          });
        }
        b.clone()
      }
    };

    for (i, b) in bounds.iter().enumerate() {
      if b.lower.is_nan() || b.upper.is_nan() {
        return Err(PortfolioError::InfeasibleConstraints(format!(
          "bounds of asset {i} are not numbers"
        )));
      }
      if b.lower > b.upper {
        return Err(PortfolioError::InfeasibleConstraints(format!(
          "lower bound {} exceeds upper bound {} for asset {i}",
          b.lower, b.upper
        )));
      }
      if b.lower == f64::INFINITY || b.upper == f64::NEG_INFINITY {
        return Err(PortfolioError::InfeasibleConstraints(format!(
          "bounds of asset {i} exclude every finite weight"
        )));
      }
    }

    let lower_sum: f64 = bounds.iter().map(|b| b.lower).sum();
    let upper_sum: f64 = bounds.iter().map(|b| b.upper).sum();
    if lower_sum > 1.0 + 1e-12 {
      return Err(PortfolioError::InfeasibleConstraints(format!(
        "lower bounds sum to {lower_sum}, above full investment"
      )));
    }
    if upper_sum < 1.0 - 1e-12 {
      return Err(PortfolioError::InfeasibleConstraints(format!(
        "upper bounds sum to {upper_sum}, below full investment"
      )));
    }

    Ok(bounds)
  }
}

/// Fully invested weights within `bounds` with the largest `mu'w`.
///
/// Fills every floor, then tops up assets in decreasing order of expected
/// return. Returns `None` when some bound is infinite.
pub fn max_return_weights(mu: &DVector<f64>, bounds: &[Bounds]) -> Option<DVector<f64>> {
  if !bounds.iter().all(Bounds::is_finite) {
    return None;
  }

  let mut w = DVector::from_iterator(bounds.len(), bounds.iter().map(|b| b.lower));
  let mut remaining = 1.0 - w.sum();

  let mut order: Vec<usize> = (0..mu.len()).collect();
  order.sort_by(|&a, &b| mu[b].partial_cmp(&mu[a]).unwrap_or(Ordering::Equal));

  for i in order {
    if remaining <= 0.0 {
      break;
    }
    let add = (bounds[i].upper - bounds[i].lower).min(remaining);
    w[i] += add;
    remaining -= add;
  }

  Some(w)
}

/// Largest `mu'w` over fully invested weights within `bounds`, if bounded.
pub fn max_attainable_return(mu: &DVector<f64>, bounds: &[Bounds]) -> Option<f64> {
  max_return_weights(mu, bounds).map(|w| w.dot(mu))
}
