//! # Report
//!
//! Plain-text tables of optimized weights, portfolio statistics and frontier points.

use prettytable::format;
use prettytable::row;
use prettytable::Table;

use crate::portfolio::FrontierPoint;
use crate::portfolio::ObjectiveReport;
use crate::portfolio::WeightVector;

fn new_table() -> Table {
  let mut table = Table::new();
  table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
  table
}

/// Non-zero weights after dropping entries below `cutoff`.
pub fn weights_table(weights: &WeightVector, cutoff: f64) -> Table {
  let mut table = new_table();
  table.set_titles(row!["Ticker", r->"Weight"]);
  for (ticker, w) in weights.cleaned(cutoff).iter() {
    if w != 0.0 {
      table.add_row(row![ticker, r->format!("{:.4}", w)]);
    }
  }
  table
}

/// Expected return, volatility and Sharpe ratio of every objective, or the reason it failed.
pub fn performance_table(reports: &[ObjectiveReport]) -> Table {
  let mut table = new_table();
  table.set_titles(row!["Objective", r->"Return", r->"Volatility", r->"Sharpe", "Status"]);
  for report in reports {
    match &report.outcome {
      Ok(p) => table.add_row(row![
        report.objective.to_string(),
        r->format!("{:.2}%", 100.0 * p.performance.expected_return),
        r->format!("{:.2}%", 100.0 * p.performance.volatility),
        r->format!("{:.3}", p.performance.sharpe_ratio),
        "ok"
      ]),
      Err(err) => table.add_row(row![report.objective.to_string(), r->"-", r->"-", r->"-", err.to_string()]),
    };
  }
  table
}

pub fn frontier_table(points: &[FrontierPoint]) -> Table {
  let mut table = new_table();
  table.set_titles(row![r->"#", r->"Target", r->"Return", r->"Volatility", r->"Sharpe"]);
  for (i, p) in points.iter().enumerate() {
    table.add_row(row![
      r->i,
      r->format!("{:.2}%", 100.0 * p.target_return),
      r->format!("{:.2}%", 100.0 * p.performance.expected_return),
      r->format!("{:.2}%", 100.0 * p.performance.volatility),
      r->format!("{:.3}", p.performance.sharpe_ratio)
    ]);
  }
  table
}

/// Full text report of an engine run.
pub fn render(reports: &[ObjectiveReport], cutoff: f64) -> String {
  let mut out = performance_table(reports).to_string();
  for report in reports {
    if let Ok(p) = &report.outcome {
      out.push('\n');
      out.push_str(&format!("{}\n", report.objective));
      out.push_str(&weights_table(&p.weights, cutoff).to_string());
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use nalgebra::DVector;

  use super::*;
  use crate::error::PortfolioError;
  use crate::portfolio::Objective;
  use crate::portfolio::OptimizedPortfolio;
  use crate::portfolio::PortfolioPerformance;
  use crate::portfolio::Universe;

  fn portfolio() -> OptimizedPortfolio {
    let universe = Universe::new(["AAA", "BBB", "CCC"]).unwrap();
    OptimizedPortfolio {
      weights: WeightVector::new(universe, DVector::from_vec(vec![0.6, 0.4, 1e-9])).unwrap(),
      performance: PortfolioPerformance {
        expected_return: 0.1234,
        volatility: 0.2,
        sharpe_ratio: 0.617,
      },
    }
  }

  #[test]
  fn weights_below_cutoff_are_hidden() {
    let text = weights_table(&portfolio().weights, 1e-6).to_string();
    assert!(text.contains("AAA"));
    assert!(text.contains("0.6000"));
    assert!(!text.contains("CCC"));
  }

  #[test]
  fn failed_objectives_show_their_error() {
    let reports = vec![
      ObjectiveReport {
        objective: Objective::MinimizeVariance,
        outcome: Ok(portfolio()),
      },
      ObjectiveReport {
        objective: Objective::max_sharpe(),
        outcome: Err(PortfolioError::NoFeasibleSharpeImprovement {
          best_return: 0.1,
          risk_free_rate: 0.2,
        }),
      },
    ];

    let text = render(&reports, 1e-6);
    assert!(text.contains("12.34%"));
    assert!(text.contains(&reports[1].outcome.as_ref().unwrap_err().to_string()));
    assert_eq!(text.matches("Ticker").count(), 1);
  }
}
