use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use frontier_rs::io::CsvPriceProvider;
use frontier_rs::io::PriceProvider;
use frontier_rs::portfolio::Alignment;
use frontier_rs::portfolio::Constraints;
use frontier_rs::portfolio::PortfolioEngine;
use frontier_rs::portfolio::PortfolioEngineConfig;
use frontier_rs::portfolio::Universe;
use frontier_rs::report;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Minimum-variance and maximum-Sharpe allocation from a CSV of daily prices.
#[derive(Parser, Debug)]
#[command(name = "frontier")]
#[command(about = "Mean-variance portfolio optimization", long_about = None)]
struct Cli {
  /// Wide CSV file: `date,TICKER1,TICKER2,...`
  prices: PathBuf,

  /// Comma-separated tickers (default: every column of the file)
  #[arg(long, value_delimiter = ',')]
  tickers: Option<Vec<String>>,

  /// First date to include (YYYY-MM-DD)
  #[arg(long)]
  start: Option<NaiveDate>,

  /// Last date to include (YYYY-MM-DD)
  #[arg(long)]
  end: Option<NaiveDate>,

  /// Annual risk-free rate used for Sharpe ratios
  #[arg(long, default_value_t = 0.0)]
  risk_free: f64,

  #[arg(long, default_value_t = 252.0)]
  periods_per_year: f64,

  /// Lower weight bound per asset (default 0, or -1 with --allow-short)
  #[arg(long, allow_hyphen_values = true)]
  min_weight: Option<f64>,

  /// Upper weight bound per asset
  #[arg(long, default_value_t = 1.0)]
  max_weight: f64,

  /// Allow negative weights
  #[arg(long)]
  allow_short: bool,

  /// Arithmetic instead of geometric mean returns
  #[arg(long)]
  arithmetic: bool,

  /// Estimate covariance only over dates where every asset has a price
  #[arg(long)]
  common_window: bool,

  /// Solver iteration budget
  #[arg(long)]
  max_iter: Option<u32>,

  /// Also print an efficient frontier with this many points
  #[arg(long)]
  frontier: Option<usize>,
}

impl Cli {
  fn config(&self) -> PortfolioEngineConfig {
    let mut config = PortfolioEngineConfig {
      periods_per_year: self.periods_per_year,
      risk_free_rate: self.risk_free,
      compounding: !self.arithmetic,
      ..Default::default()
    };

    if self.common_window {
      config.alignment = Alignment::CommonWindow;
    }

    let min_weight = self
      .min_weight
      .unwrap_or(if self.allow_short { -1.0 } else { 0.0 });
    config.constraints = Constraints::with_bounds(min_weight, self.max_weight);

    if let Some(max_iter) = self.max_iter {
      config.solver.max_iter = max_iter;
    }

    config
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let provider = CsvPriceProvider::new(&cli.prices);

  let universe = match &cli.tickers {
    Some(tickers) => Universe::new(tickers.iter().cloned())?,
    None => provider.universe()?,
  };

  let prices = provider.fetch(
    &universe,
    cli.start.unwrap_or(NaiveDate::MIN),
    cli.end.unwrap_or(NaiveDate::MAX),
  )?;
  info!(
    assets = prices.n_assets(),
    dates = prices.n_dates(),
    "price table loaded"
  );

  let engine = PortfolioEngine::new(cli.config());
  let (estimates, reports) = engine
    .run(&prices)
    .with_context(|| format!("failed to estimate inputs from {:?}", cli.prices))?;

  print!("{}", report::render(&reports, engine.config().weight_cutoff));

  if let Some(points) = cli.frontier {
    let frontier = engine
      .frontier(&estimates, points)
      .context("failed to trace the efficient frontier")?;
    println!("\nEfficient frontier");
    print!("{}", report::frontier_table(&frontier));
  }

  Ok(())
}
