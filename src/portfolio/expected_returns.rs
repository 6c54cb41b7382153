//! # Expected Returns
//!
//! $$
//! \mu_i = \Big(\prod_t (1+r_{i,t})\Big)^{P / n_i} - 1
//! $$
//!
//! Mean-historical-return estimators over a [`PriceTable`].

use nalgebra::DVector;
use tracing::debug;

use super::data::PriceTable;
use super::types::ExpectedReturns;
use super::types::TRADING_DAYS_PER_YEAR;
use crate::error::Result;

/// Estimator of annualized expected returns from prices.
pub trait ReturnEstimator: Send + Sync {
  fn expected_returns(&self, prices: &PriceTable) -> Result<ExpectedReturns>;
}

/// Mean historical return, geometric by default.
#[derive(Clone, Copy, Debug)]
pub struct MeanHistoricalReturn {
  /// Return periods per year used for annualization.
  pub periods_per_year: f64,
  /// Compound returns geometrically; otherwise scale the arithmetic mean.
  pub compounding: bool,
}

impl Default for MeanHistoricalReturn {
  fn default() -> Self {
    Self {
      periods_per_year: TRADING_DAYS_PER_YEAR,
      compounding: true,
    }
  }
}

impl MeanHistoricalReturn {
  pub fn new(periods_per_year: f64, compounding: bool) -> Self {
    Self {
      periods_per_year,
      compounding,
    }
  }
}

impl ReturnEstimator for MeanHistoricalReturn {
  fn expected_returns(&self, prices: &PriceTable) -> Result<ExpectedReturns> {
    prices.ensure_min_observations()?;
    let returns = prices.returns();
    let n = prices.n_assets();

    let mu = DVector::from_iterator(
      n,
      (0..n).map(|asset| {
        let count = returns.observations(asset) as f64;
        if self.compounding {
          // ln of the compounded growth keeps long histories from overflowing
          let log_growth: f64 = returns.series(asset).map(|r| r.ln_1p()).sum();
          (log_growth * self.periods_per_year / count).exp() - 1.0
        } else {
          returns.series(asset).sum::<f64>() / count * self.periods_per_year
        }
      }),
    );

    debug!(
      assets = n,
      periods = returns.n_periods(),
      compounding = self.compounding,
      "estimated expected returns"
    );

    ExpectedReturns::new(prices.universe().clone(), mu)
  }
}
