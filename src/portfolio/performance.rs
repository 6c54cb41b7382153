//! # Portfolio Performance
//!
//! $$
//! \mathbb E[R_p]=\mathbf w^\top\mu,\qquad \sigma_p=\sqrt{\mathbf w^\top\Sigma\mathbf w},\qquad
//! S=\frac{\mathbb E[R_p]-r_f}{\sigma_p}
//! $$
//!

use super::types::CovarianceMatrix;
use super::types::ExpectedReturns;
use super::types::PortfolioPerformance;
use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;

/// Volatility below which the Sharpe ratio is treated as undefined.
pub const MIN_VOLATILITY: f64 = 1e-12;

/// Expected return, volatility and Sharpe ratio of `weights`.
pub fn evaluate(
  weights: &WeightVector,
  mu: &ExpectedReturns,
  cov: &CovarianceMatrix,
  risk_free_rate: f64,
) -> Result<PortfolioPerformance> {
  // same tickers in the same order, otherwise entries would pair up with the wrong asset
  let universe = weights.universe();
  for other in [&mu.universe, &cov.universe] {
    if other != universe {
      return Err(PortfolioError::DimensionMismatch {
        expected: universe.len(),
        found: other.len(),
      });
    }
  }

  let w = weights.values();
  let expected_return = w.dot(&mu.values);
  let variance = w.dot(&(&cov.values * w));
  // tiny negative values are rounding in an otherwise PSD quadratic form
  let volatility = variance.max(0.0).sqrt();

  if volatility < MIN_VOLATILITY {
    return Err(PortfolioError::DegenerateVolatility { volatility });
  }

  Ok(PortfolioPerformance {
    expected_return,
    volatility,
    sharpe_ratio: (expected_return - risk_free_rate) / volatility,
  })
}
