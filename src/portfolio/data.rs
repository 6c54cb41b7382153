//! # Portfolio Data
//!
//! $$
//! r_{i,t} = \frac{p_{i,t}}{p_{i,t-1}} - 1
//! $$
//!
//! Price table storage and simple-return preprocessing.

use chrono::NaiveDate;
use nalgebra::DMatrix;

use super::types::Universe;
use crate::error::PortfolioError;
use crate::error::Result;

/// Date-indexed prices for a fixed universe.
///
/// Prices are stored as a `T x N` matrix in universe order. Absent leading
/// observations are kept as `NaN` and tracked through [`PriceTable::first_valid`].
#[derive(Clone, Debug)]
pub struct PriceTable {
  universe: Universe,
  dates: Vec<NaiveDate>,
  prices: DMatrix<f64>,
  first_valid: Vec<usize>,
}

impl PriceTable {
  /// Validate and build a price table from row-major observations.
  ///
  /// Each row holds one price per asset; `None` is allowed only before the
  /// asset's first observed price.
  pub fn new(
    universe: Universe,
    dates: Vec<NaiveDate>,
    rows: Vec<Vec<Option<f64>>>,
  ) -> Result<Self> {
    let n = universe.len();
    let t = dates.len();

    if rows.len() != t {
      return Err(PortfolioError::InvalidPriceTable(format!(
        "{} dates but {} price rows",
        t,
        rows.len()
      )));
    }

    if let Some(pair) = dates.windows(2).find(|w| w[1] <= w[0]) {
      return Err(PortfolioError::InvalidPriceTable(format!(
        "dates must be strictly ascending ({} followed by {})",
        pair[0], pair[1]
      )));
    }

    let mut prices = DMatrix::from_element(t, n, f64::NAN);
    let mut first_valid = vec![t; n];

    for (row_idx, row) in rows.iter().enumerate() {
      if row.len() != n {
        return Err(PortfolioError::InvalidPriceTable(format!(
          "row {} ({}) has {} prices, universe has {} assets",
          row_idx,
          dates[row_idx],
          row.len(),
          n
        )));
      }

      for (asset, cell) in row.iter().enumerate() {
        match *cell {
          Some(p) => {
            if !p.is_finite() || p <= 0.0 {
              return Err(PortfolioError::InvalidPriceTable(format!(
                "non-positive price {p} for {} on {}",
                universe.tickers()[asset],
                dates[row_idx]
              )));
            }
            if first_valid[asset] == t {
              first_valid[asset] = row_idx;
            }
            prices[(row_idx, asset)] = p;
          }
          None => {
            if first_valid[asset] < row_idx {
              return Err(PortfolioError::InvalidPriceTable(format!(
                "missing price for {} on {} after its first observation",
                universe.tickers()[asset],
                dates[row_idx]
              )));
            }
          }
        }
      }
    }

    Ok(Self {
      universe,
      dates,
      prices,
      first_valid,
    })
  }

  pub fn universe(&self) -> &Universe {
    &self.universe
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn n_dates(&self) -> usize {
    self.dates.len()
  }

  pub fn n_assets(&self) -> usize {
    self.universe.len()
  }

  /// Price of `asset` at row `t`, if observed.
  pub fn price(&self, t: usize, asset: usize) -> Option<f64> {
    if t < self.dates.len() && asset < self.universe.len() && t >= self.first_valid[asset] {
      Some(self.prices[(t, asset)])
    } else {
      None
    }
  }

  /// Row index of the first observed price per asset (`n_dates()` if none).
  pub fn first_valid(&self) -> &[usize] {
    &self.first_valid
  }

  /// Number of observed prices for `asset`.
  pub fn observations(&self, asset: usize) -> usize {
    self.dates.len() - self.first_valid[asset]
  }

  /// Fail with [`PortfolioError::InsufficientData`] unless every asset has two prices.
  pub fn ensure_min_observations(&self) -> Result<()> {
    for (asset, ticker) in self.universe.tickers().iter().enumerate() {
      let observations = self.observations(asset);
      if observations < 2 {
        return Err(PortfolioError::InsufficientData {
          asset: ticker.clone(),
          observations,
        });
      }
    }
    Ok(())
  }

  /// Simple period returns of every asset.
  pub fn returns(&self) -> ReturnTable {
    let t = self.dates.len();
    let n = self.universe.len();
    let periods = t.saturating_sub(1);
    let mut returns = DMatrix::from_element(periods, n, f64::NAN);

    for asset in 0..n {
      let start = self.first_valid[asset] + 1;
      for row in start..t {
        returns[(row - 1, asset)] = self.prices[(row, asset)] / self.prices[(row - 1, asset)] - 1.0;
      }
    }

    ReturnTable {
      returns,
      first_valid: self.first_valid.iter().map(|&fv| fv.min(periods)).collect(),
    }
  }
}

/// Period returns aligned on the price table's date grid minus the first row.
#[derive(Clone, Debug)]
pub struct ReturnTable {
  returns: DMatrix<f64>,
  first_valid: Vec<usize>,
}

impl ReturnTable {
  pub fn n_periods(&self) -> usize {
    self.returns.nrows()
  }

  pub fn n_assets(&self) -> usize {
    self.returns.ncols()
  }

  /// First return row defined for `asset`.
  pub fn first_valid(&self, asset: usize) -> usize {
    self.first_valid[asset]
  }

  /// Number of defined returns for `asset`.
  pub fn observations(&self, asset: usize) -> usize {
    self.n_periods() - self.first_valid[asset]
  }

  /// Defined returns of `asset` from row `from` onwards.
  pub fn series_from(&self, asset: usize, from: usize) -> impl Iterator<Item = f64> + '_ {
    let start = from.max(self.first_valid[asset]);
    (start..self.n_periods()).map(move |row| self.returns[(row, asset)])
  }

  /// All defined returns of `asset`.
  pub fn series(&self, asset: usize) -> impl Iterator<Item = f64> + '_ {
    self.series_from(asset, 0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    (0..n)
      .map(|i| start + chrono::Duration::days(i as i64))
      .collect()
  }

  #[test]
  fn rejects_unordered_dates() {
    let universe = Universe::new(["AAA", "BBB"]).unwrap();
    let mut d = dates(2);
    d.swap(0, 1);
    let rows = vec![vec![Some(1.0), Some(2.0)], vec![Some(1.1), Some(2.1)]];

    assert!(matches!(
      PriceTable::new(universe, d, rows),
      Err(PortfolioError::InvalidPriceTable(_))
    ));
  }

  #[test]
  fn rejects_non_positive_prices() {
    let universe = Universe::new(["AAA", "BBB"]).unwrap();
    let rows = vec![vec![Some(1.0), Some(2.0)], vec![Some(0.0), Some(2.1)]];

    assert!(matches!(
      PriceTable::new(universe, dates(2), rows),
      Err(PortfolioError::InvalidPriceTable(_))
    ));
  }

  #[test]
  fn rejects_gaps_after_first_observation() {
    let universe = Universe::new(["AAA", "BBB"]).unwrap();
    let rows = vec![
      vec![Some(1.0), Some(2.0)],
      vec![None, Some(2.1)],
      vec![Some(1.2), Some(2.2)],
    ];

    assert!(matches!(
      PriceTable::new(universe, dates(3), rows),
      Err(PortfolioError::InvalidPriceTable(_))
    ));
  }

  #[test]
  fn returns_skip_undefined_leading_rows() {
    let universe = Universe::new(["AAA", "BBB"]).unwrap();
    let rows = vec![
      vec![Some(100.0), None],
      vec![Some(110.0), Some(50.0)],
      vec![Some(121.0), Some(55.0)],
    ];
    let table = PriceTable::new(universe, dates(3), rows).unwrap();
    let returns = table.returns();

    assert_eq!(table.observations(1), 2);
    assert_eq!(returns.n_periods(), 2);
    assert_eq!(returns.observations(0), 2);
    assert_eq!(returns.observations(1), 1);

    let a: Vec<f64> = returns.series(0).collect();
    let b: Vec<f64> = returns.series(1).collect();
    assert!((a[0] - 0.1).abs() < 1e-12);
    assert!((a[1] - 0.1).abs() < 1e-12);
    assert_eq!(b.len(), 1);
    assert!((b[0] - 0.1).abs() < 1e-12);
    assert_eq!(table.price(0, 1), None);
  }

  #[test]
  fn single_observation_asset_is_insufficient() {
    let universe = Universe::new(["AAA", "BBB"]).unwrap();
    let rows = vec![vec![Some(100.0), None], vec![Some(110.0), Some(50.0)]];
    let table = PriceTable::new(universe, dates(2), rows).unwrap();

    assert_eq!(
      table.ensure_min_observations(),
      Err(PortfolioError::InsufficientData {
        asset: "BBB".to_string(),
        observations: 1,
      })
    );
  }
}
