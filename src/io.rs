//! # Price I/O
//!
//! Wide CSV price files: a `date` column in ISO format followed by one column
//! per ticker. Empty cells mark prices that are not yet available.

use std::fs::File;
use std::path::Path;
use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use chrono::NaiveDate;
use tracing::debug;

use crate::portfolio::PriceTable;
use crate::portfolio::Universe;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Source of historical close prices.
pub trait PriceProvider {
  /// Prices of `universe` for every available date in `[start, end]`.
  fn fetch(&self, universe: &Universe, start: NaiveDate, end: NaiveDate) -> Result<PriceTable>;
}

/// [`PriceProvider`] backed by a wide CSV file.
#[derive(Clone, Debug)]
pub struct CsvPriceProvider {
  path: PathBuf,
}

impl CsvPriceProvider {
  pub fn new<P: AsRef<Path>>(path: P) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn reader(&self) -> Result<csv::Reader<File>> {
    let file = File::open(&self.path)
      .with_context(|| format!("failed to open price file {:?}", self.path))?;
    Ok(
      csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file),
    )
  }

  fn tickers(&self, reader: &mut csv::Reader<File>) -> Result<Vec<String>> {
    let headers = reader
      .headers()
      .with_context(|| format!("failed to read header of {:?}", self.path))?;

    match headers.get(0) {
      Some(first) if first.eq_ignore_ascii_case("date") => {}
      _ => bail!("first column of {:?} must be `date`", self.path),
    }

    Ok(headers.iter().skip(1).map(str::to_owned).collect())
  }

  /// Universe made of every ticker column in the file.
  pub fn universe(&self) -> Result<Universe> {
    let tickers = self.tickers(&mut self.reader()?)?;
    Ok(Universe::new(tickers)?)
  }
}

impl PriceProvider for CsvPriceProvider {
  fn fetch(&self, universe: &Universe, start: NaiveDate, end: NaiveDate) -> Result<PriceTable> {
    if start > end {
      bail!("start date {start} is after end date {end}");
    }

    let mut reader = self.reader()?;
    let header = self.tickers(&mut reader)?;

    let columns = universe
      .tickers()
      .iter()
      .map(|ticker| {
        header
          .iter()
          .position(|h| h == ticker)
          .map(|idx| idx + 1)
          .with_context(|| format!("ticker {ticker} not found in {:?}", self.path))
      })
      .collect::<Result<Vec<_>>>()?;

    let mut dates = Vec::new();
    let mut rows = Vec::new();

    for (line, record) in reader.records().enumerate() {
      let record = record.with_context(|| format!("failed to read row {} of {:?}", line + 1, self.path))?;
      let raw_date = record.get(0).unwrap_or_default();
      let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
        .with_context(|| format!("invalid date `{raw_date}` in row {}", line + 1))?;
      if date < start || date > end {
        continue;
      }

      let row = columns
        .iter()
        .map(|&col| match record.get(col).unwrap_or_default() {
          "" => Ok(None),
          cell => cell
            .parse::<f64>()
            .map(Some)
            .with_context(|| format!("invalid price `{cell}` on {date}")),
        })
        .collect::<Result<Vec<_>>>()?;

      // dates where none of the selected assets traded carry no information
      if row.iter().all(Option::is_none) {
        continue;
      }

      dates.push(date);
      rows.push(row);
    }

    debug!(path = ?self.path, dates = dates.len(), assets = universe.len(), "prices loaded");
    Ok(PriceTable::new(universe.clone(), dates, rows)?)
  }
}
