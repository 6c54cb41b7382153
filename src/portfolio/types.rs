//! Universe-bound containers.
//!
//! Expected returns, covariance and weights each carry the [`Universe`] they were
//! built for, so entries are always read in the same ticker order.

use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;

use nalgebra::DMatrix;
use nalgebra::DVector;

use crate::error::PortfolioError;
use crate::error::Result;

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Optimization objective.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Objective {
  /// Minimize portfolio variance over the feasible set.
  MinimizeVariance,
  /// Maximize `(E[R_p] - r_f) / sigma_p` over the feasible set.
  MaximizeSharpe {
    /// Risk-free rate subtracted from the portfolio return.
    risk_free_rate: f64,
  },
}

impl Objective {
  /// Maximum Sharpe objective with a zero risk-free rate.
  pub fn max_sharpe() -> Self {
    Self::MaximizeSharpe {
      risk_free_rate: 0.0,
    }
  }

  /// Parse a string into an [`Objective`].
  pub fn from_str(s: &str, risk_free_rate: f64) -> Option<Self> {
    match s.to_lowercase().as_str() {
      "min-variance" | "minvariance" | "min-vol" | "min_volatility" => Some(Self::MinimizeVariance),
      "max-sharpe" | "maxsharpe" | "max_sharpe" | "tangency" => {
        Some(Self::MaximizeSharpe { risk_free_rate })
      }
      _ => None,
    }
  }
}

impl Display for Objective {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Objective::MinimizeVariance => write!(f, "minimum variance"),
      Objective::MaximizeSharpe { risk_free_rate } => {
        write!(f, "maximum Sharpe (r_f = {risk_free_rate})")
      }
    }
  }
}

/// Ordered set of distinct asset identifiers.
///
/// Cloning is cheap; the tickers are shared behind an [`Arc`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Universe {
  tickers: Arc<[String]>,
}

impl Universe {
  /// Build a universe of at least two distinct tickers.
  pub fn new<I, S>(tickers: I) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let tickers: Vec<String> = tickers.into_iter().map(Into::into).collect();
    if tickers.len() < 2 {
      return Err(PortfolioError::InvalidUniverse(format!(
        "at least 2 assets required, got {}",
        tickers.len()
      )));
    }

    let mut seen = HashSet::with_capacity(tickers.len());
    for ticker in &tickers {
      if !seen.insert(ticker.as_str()) {
        return Err(PortfolioError::InvalidUniverse(format!(
          "duplicate ticker {ticker}"
        )));
      }
    }

    Ok(Self {
      tickers: tickers.into(),
    })
  }

  pub fn len(&self) -> usize {
    self.tickers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tickers.is_empty()
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  pub fn ticker(&self, index: usize) -> Option<&str> {
    self.tickers.get(index).map(String::as_str)
  }

  /// Position of `ticker` in the fixed asset ordering.
  pub fn index_of(&self, ticker: &str) -> Option<usize> {
    self.tickers.iter().position(|t| t == ticker)
  }
}

/// Annualized expected return per asset.
#[derive(Clone, Debug)]
pub struct ExpectedReturns {
  pub universe: Universe,
  pub values: DVector<f64>,
}

impl ExpectedReturns {
  pub fn new(universe: Universe, values: DVector<f64>) -> Result<Self> {
    if values.len() != universe.len() {
      return Err(PortfolioError::DimensionMismatch {
        expected: universe.len(),
        found: values.len(),
      });
    }
    Ok(Self { universe, values })
  }

  pub fn get(&self, ticker: &str) -> Option<f64> {
    self.universe.index_of(ticker).map(|i| self.values[i])
  }
}

/// Annualized covariance matrix over a universe.
#[derive(Clone, Debug)]
pub struct CovarianceMatrix {
  pub universe: Universe,
  pub values: DMatrix<f64>,
}

impl CovarianceMatrix {
  pub fn new(universe: Universe, values: DMatrix<f64>) -> Result<Self> {
    let n = universe.len();
    if values.nrows() != n || values.ncols() != n {
      return Err(PortfolioError::DimensionMismatch {
        expected: n,
        found: if values.nrows() != n {
          values.nrows()
        } else {
          values.ncols()
        },
      });
    }
    Ok(Self { universe, values })
  }

  /// Annualized volatility of each asset.
  pub fn volatilities(&self) -> DVector<f64> {
    self.values.diagonal().map(|v| v.max(0.0).sqrt())
  }
}

/// Portfolio allocation over a universe.
#[derive(Clone, Debug)]
pub struct WeightVector {
  universe: Universe,
  weights: DVector<f64>,
}

impl WeightVector {
  pub fn new(universe: Universe, weights: DVector<f64>) -> Result<Self> {
    if weights.len() != universe.len() {
      return Err(PortfolioError::DimensionMismatch {
        expected: universe.len(),
        found: weights.len(),
      });
    }
    Ok(Self { universe, weights })
  }

  /// Equal allocation `1 / N` to every asset.
  pub fn equal(universe: Universe) -> Self {
    let n = universe.len();
    Self {
      universe,
      weights: DVector::from_element(n, 1.0 / n as f64),
    }
  }

  pub fn universe(&self) -> &Universe {
    &self.universe
  }

  pub fn values(&self) -> &DVector<f64> {
    &self.weights
  }

  pub fn get(&self, ticker: &str) -> Option<f64> {
    self.universe.index_of(ticker).map(|i| self.weights[i])
  }

  pub fn sum(&self) -> f64 {
    self.weights.sum()
  }

  /// Iterate `(ticker, weight)` pairs in universe order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self
      .universe
      .tickers()
      .iter()
      .map(String::as_str)
      .zip(self.weights.iter().copied())
  }

  /// Copy for reporting with weights below `cutoff` in magnitude set to zero.
  ///
  /// Statistics must be computed on the original vector, not on this copy.
  pub fn cleaned(&self, cutoff: f64) -> Self {
    Self {
      universe: self.universe.clone(),
      weights: self
        .weights
        .map(|w| if w.abs() < cutoff { 0.0 } else { w }),
    }
  }
}

/// Summary statistics of a portfolio.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PortfolioPerformance {
  /// Model expected portfolio return (annualized if inputs are annualized).
  pub expected_return: f64,
  /// Model portfolio volatility.
  pub volatility: f64,
  /// Sharpe ratio computed as `(expected_return - risk_free) / volatility`.
  pub sharpe_ratio: f64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn universe_rejects_duplicates_and_singletons() {
    assert!(matches!(
      Universe::new(["AAA"]),
      Err(PortfolioError::InvalidUniverse(_))
    ));
    assert!(matches!(
      Universe::new(["AAA", "BBB", "AAA"]),
      Err(PortfolioError::InvalidUniverse(_))
    ));

    let universe = Universe::new(["AAA", "BBB"]).unwrap();
    assert_eq!(universe.index_of("BBB"), Some(1));
    assert_eq!(universe.index_of("CCC"), None);
  }

  #[test]
  fn cleaned_zeroes_solver_noise_only() {
    let universe = Universe::new(["AAA", "BBB", "CCC"]).unwrap();
    let w = WeightVector::new(universe, DVector::from_vec(vec![0.6, 0.4 - 3e-8, 3e-8])).unwrap();
    let cleaned = w.cleaned(1e-6);

    assert_eq!(cleaned.get("CCC"), Some(0.0));
    assert_eq!(cleaned.get("AAA"), Some(0.6));
    assert_eq!(w.get("CCC"), Some(3e-8));
  }

  #[test]
  fn objective_parses_aliases() {
    assert_eq!(
      Objective::from_str("min-vol", 0.0),
      Some(Objective::MinimizeVariance)
    );
    assert_eq!(
      Objective::from_str("max-sharpe", 0.02),
      Some(Objective::MaximizeSharpe {
        risk_free_rate: 0.02
      })
    );
    assert_eq!(Objective::from_str("hrp", 0.0), None);
  }
}
