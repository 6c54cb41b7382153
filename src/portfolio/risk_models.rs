//! # Risk Models
//!
//! $$
//! \Sigma_{ij} = \frac{P}{n_{ij}-1}\sum_t (r_{i,t}-\bar r_i)(r_{j,t}-\bar r_j)
//! $$
//!
//! Annualized covariance estimators and positive semi-definiteness checks.

use nalgebra::DMatrix;
use nalgebra::SymmetricEigen;
use tracing::debug;
use tracing::warn;

use super::data::PriceTable;
use super::data::ReturnTable;
use super::types::CovarianceMatrix;
use super::types::TRADING_DAYS_PER_YEAR;
use crate::error::PortfolioError;
use crate::error::Result;

/// Estimator of an annualized covariance matrix from prices.
///
/// Implement this to plug in an alternative estimator (e.g. shrinkage) when the
/// sample estimate is rejected as ill-conditioned.
pub trait RiskModel: Send + Sync {
  fn covariance(&self, prices: &PriceTable) -> Result<CovarianceMatrix>;
}

/// Which return rows enter each covariance entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Alignment {
  /// Each pair uses the rows where both returns are defined.
  #[default]
  Pairwise,
  /// Every pair uses the rows where all assets have a defined return.
  CommonWindow,
}

/// Sample covariance with the unbiased `n - 1` denominator.
#[derive(Clone, Copy, Debug)]
pub struct SampleCovariance {
  /// Return periods per year used for annualization.
  pub periods_per_year: f64,
  /// Row selection for partially aligned universes.
  pub alignment: Alignment,
  /// Relative tolerance for negative eigenvalues.
  pub psd_tolerance: f64,
}

impl Default for SampleCovariance {
  fn default() -> Self {
    Self {
      periods_per_year: TRADING_DAYS_PER_YEAR,
      alignment: Alignment::Pairwise,
      psd_tolerance: 1e-10,
    }
  }
}

impl SampleCovariance {
  pub fn new(periods_per_year: f64, alignment: Alignment) -> Self {
    Self {
      periods_per_year,
      alignment,
      ..Self::default()
    }
  }
}

fn pair_covariance(returns: &ReturnTable, i: usize, j: usize, from: usize) -> f64 {
  let start = from.max(returns.first_valid(i)).max(returns.first_valid(j));
  let count = returns.n_periods().saturating_sub(start);
  if count == 0 {
    return 0.0;
  }

  let xi: Vec<f64> = returns.series_from(i, start).collect();
  let xj: Vec<f64> = returns.series_from(j, start).collect();
  let mi = xi.iter().sum::<f64>() / count as f64;
  let mj = xj.iter().sum::<f64>() / count as f64;

  let acc: f64 = xi
    .iter()
    .zip(xj.iter())
    .map(|(a, b)| (a - mi) * (b - mj))
    .sum();

  // a single return has zero deviation from its own mean
  acc / (count.max(2) - 1) as f64
}

impl RiskModel for SampleCovariance {
  fn covariance(&self, prices: &PriceTable) -> Result<CovarianceMatrix> {
    prices.ensure_min_observations()?;
    let returns = prices.returns();
    let n = prices.n_assets();

    let from = match self.alignment {
      Alignment::Pairwise => 0,
      Alignment::CommonWindow => (0..n).map(|a| returns.first_valid(a)).max().unwrap_or(0),
    };

    let mut cov = DMatrix::zeros(n, n);
    for i in 0..n {
      for j in i..n {
        let c = self.periods_per_year * pair_covariance(&returns, i, j, from);
        cov[(i, j)] = c;
        cov[(j, i)] = c;
      }
    }

    debug!(
      assets = n,
      periods = returns.n_periods(),
      alignment = ?self.alignment,
      "estimated sample covariance"
    );

    ensure_positive_semidefinite(&cov, self.psd_tolerance)?;
    CovarianceMatrix::new(prices.universe().clone(), cov)
  }
}

/// Fail with [`PortfolioError::IllConditionedMatrix`] unless `cov` is symmetric PSD.
///
/// An eigenvalue counts as negative when it is below `-tolerance * max(1, max|λ|)`.
pub fn ensure_positive_semidefinite(cov: &DMatrix<f64>, tolerance: f64) -> Result<()> {
  if cov.iter().any(|v| !v.is_finite()) {
    return Err(PortfolioError::IllConditionedMatrix {
      min_eigenvalue: f64::NAN,
      tolerance,
    });
  }

  let eigen = SymmetricEigen::new(cov.clone());
  let min_eigenvalue = eigen.eigenvalues.min();
  let scale = eigen.eigenvalues.amax().max(1.0);

  if min_eigenvalue < -tolerance * scale {
    warn!(min_eigenvalue, "covariance matrix is not positive semi-definite");
    return Err(PortfolioError::IllConditionedMatrix {
      min_eigenvalue,
      tolerance: tolerance * scale,
    });
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::NaiveDate;

  use super::*;
  use crate::portfolio::types::Universe;

  fn table(rows: Vec<Vec<Option<f64>>>) -> PriceTable {
    let start = NaiveDate::from_ymd_opt(2022, 6, 1).unwrap();
    let dates = (0..rows.len())
      .map(|i| start + chrono::Duration::days(i as i64))
      .collect();
    PriceTable::new(Universe::new(["AAA", "BBB"]).unwrap(), dates, rows).unwrap()
  }

  #[test]
  fn sample_covariance_matches_hand_computation() {
    let prices = table(vec![
      vec![Some(100.0), Some(100.0)],
      vec![Some(110.0), Some(105.0)],
      vec![Some(99.0), Some(94.5)],
    ]);
    let cov = SampleCovariance::new(1.0, Alignment::Pairwise)
      .covariance(&prices)
      .unwrap();

    assert_abs_diff_eq!(cov.values[(0, 0)], 0.02, epsilon = 1e-12);
    assert_abs_diff_eq!(cov.values[(1, 1)], 0.01125, epsilon = 1e-12);
    assert_abs_diff_eq!(cov.values[(0, 1)], 0.015, epsilon = 1e-12);
    assert_eq!(cov.values[(0, 1)], cov.values[(1, 0)]);
  }

  #[test]
  fn annualizes_by_periods_per_year() {
    let prices = table(vec![
      vec![Some(100.0), Some(100.0)],
      vec![Some(110.0), Some(105.0)],
      vec![Some(99.0), Some(94.5)],
    ]);
    let cov = SampleCovariance::default().covariance(&prices).unwrap();

    assert_abs_diff_eq!(cov.values[(0, 0)], 0.02 * 252.0, epsilon = 1e-9);
  }

  #[test]
  fn alignment_controls_the_rows_used() {
    let prices = table(vec![
      vec![Some(100.0), None],
      vec![Some(110.0), Some(50.0)],
      vec![Some(121.0), Some(55.0)],
      vec![Some(108.9), Some(60.5)],
    ]);

    let pairwise = SampleCovariance::new(1.0, Alignment::Pairwise)
      .covariance(&prices)
      .unwrap();
    let common = SampleCovariance::new(1.0, Alignment::CommonWindow)
      .covariance(&prices)
      .unwrap();

    // returns of AAA: 0.1, 0.1, -0.1; the common window drops the first
    assert_abs_diff_eq!(pairwise.values[(0, 0)], 0.04 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(common.values[(0, 0)], 0.02, epsilon = 1e-12);
    assert_abs_diff_eq!(pairwise.values[(1, 1)], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(pairwise.values[(0, 1)], 0.0, epsilon = 1e-12);
  }

  #[test]
  fn two_observations_give_a_zero_matrix() {
    let prices = table(vec![
      vec![Some(100.0), Some(20.0)],
      vec![Some(101.0), Some(19.0)],
    ]);
    let cov = SampleCovariance::default().covariance(&prices).unwrap();

    assert!(cov.values.iter().all(|v| *v == 0.0));
  }

  /// AAA is flat, then alternates by 10%; BBB and CCC join late and only see the
  /// volatile stretch, so pairwise overlaps disagree with AAA's full-history variance.
  fn staggered_prices() -> PriceTable {
    let aaa = [100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 110.0, 99.0, 108.9, 98.01];
    let bbb = [None, None, None, None, None, None, Some(50.0), Some(55.0), Some(49.5), Some(54.45), Some(49.005)];
    let ccc = [None, None, None, None, None, None, None, None, Some(20.0), Some(21.0), Some(19.95)];

    let rows = (0..aaa.len())
      .map(|t| vec![Some(aaa[t]), bbb[t], ccc[t]])
      .collect::<Vec<_>>();
    let start = NaiveDate::from_ymd_opt(2022, 6, 1).unwrap();
    let dates = (0..rows.len())
      .map(|i| start + chrono::Duration::days(i as i64))
      .collect();
    PriceTable::new(Universe::new(["AAA", "BBB", "CCC"]).unwrap(), dates, rows).unwrap()
  }

  #[test]
  fn pairwise_overlaps_can_make_an_indefinite_matrix() {
    let prices = staggered_prices();

    // var(AAA) = 0.04 / 9 over ten returns, cov(AAA, BBB) = var(BBB) = 0.04 / 3 over four
    let result = SampleCovariance::new(1.0, Alignment::Pairwise).covariance(&prices);
    assert!(matches!(
      result,
      Err(PortfolioError::IllConditionedMatrix { min_eigenvalue, .. }) if min_eigenvalue < 0.0
    ));

    let common = SampleCovariance::new(1.0, Alignment::CommonWindow)
      .covariance(&prices)
      .unwrap();
    assert_abs_diff_eq!(common.values[(0, 0)], 0.02, epsilon = 1e-12);
    assert_abs_diff_eq!(common.values[(0, 2)], 0.01, epsilon = 1e-12);
  }

  #[test]
  fn rejects_indefinite_matrices() {
    let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);

    assert!(matches!(
      ensure_positive_semidefinite(&m, 1e-10),
      Err(PortfolioError::IllConditionedMatrix { min_eigenvalue, .. }) if (min_eigenvalue + 1.0).abs() < 1e-9
    ));

    let psd = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
    assert!(ensure_positive_semidefinite(&psd, 1e-10).is_ok());
  }
}
