//! # Portfolio Engine
//!
//! $$
//! \text{prices} \mapsto (\mu, \Sigma) \mapsto \mathbf{w}^\* \mapsto (\mathbb E[R_p], \sigma_p, S)
//! $$
//!
//! High-level orchestration of estimation, optimization and evaluation.

use tracing::info;
use tracing::warn;

use super::constraints::Constraints;
use super::data::PriceTable;
use super::expected_returns::MeanHistoricalReturn;
use super::expected_returns::ReturnEstimator;
use super::optimizers::efficient_frontier;
use super::optimizers::optimize;
use super::optimizers::FrontierPoint;
use super::performance::evaluate;
use super::risk_models::Alignment;
use super::risk_models::RiskModel;
use super::risk_models::SampleCovariance;
use super::solver::ClarabelSolver;
use super::solver::QpSolver;
use super::solver::SolverSettings;
use super::types::CovarianceMatrix;
use super::types::ExpectedReturns;
use super::types::Objective;
use super::types::PortfolioPerformance;
use super::types::WeightVector;
use super::types::TRADING_DAYS_PER_YEAR;
use crate::error::Result;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug)]
pub struct PortfolioEngineConfig {
  /// Return periods per year used for annualization.
  pub periods_per_year: f64,
  /// Risk-free rate used in Sharpe computations.
  pub risk_free_rate: f64,
  /// Geometric (true) or arithmetic mean historical return.
  pub compounding: bool,
  /// Covariance row alignment for late-starting assets.
  pub alignment: Alignment,
  /// Relative tolerance for negative covariance eigenvalues.
  pub psd_tolerance: f64,
  /// Weight bounds; full investment is always imposed.
  pub constraints: Constraints,
  /// Iteration and tolerance budget of the QP solver.
  pub solver: SolverSettings,
  /// Weights below this magnitude are reported as zero.
  pub weight_cutoff: f64,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      periods_per_year: TRADING_DAYS_PER_YEAR,
      risk_free_rate: 0.0,
      compounding: true,
      alignment: Alignment::Pairwise,
      psd_tolerance: 1e-10,
      constraints: Constraints::long_only(),
      solver: SolverSettings::default(),
      weight_cutoff: 1e-6,
    }
  }
}

/// Expected returns and covariance derived once from a price table.
#[derive(Clone, Debug)]
pub struct MarketEstimates {
  pub expected_returns: ExpectedReturns,
  pub covariance: CovarianceMatrix,
}

/// Weights and statistics of one objective.
#[derive(Clone, Debug)]
pub struct OptimizedPortfolio {
  pub weights: WeightVector,
  pub performance: PortfolioPerformance,
}

/// Outcome of one objective in [`PortfolioEngine::run`].
#[derive(Clone, Debug)]
pub struct ObjectiveReport {
  pub objective: Objective,
  pub outcome: Result<OptimizedPortfolio>,
}

/// Single entry-point engine for the estimation and optimization pipeline.
pub struct PortfolioEngine<R = MeanHistoricalReturn, C = SampleCovariance, S = ClarabelSolver> {
  config: PortfolioEngineConfig,
  returns: R,
  risk_model: C,
  solver: S,
}

impl PortfolioEngine {
  /// Construct an engine with the sample estimators and Clarabel solver described by `config`.
  pub fn new(config: PortfolioEngineConfig) -> Self {
    let returns = MeanHistoricalReturn::new(config.periods_per_year, config.compounding);
    let risk_model = SampleCovariance {
      periods_per_year: config.periods_per_year,
      alignment: config.alignment,
      psd_tolerance: config.psd_tolerance,
    };
    let solver = ClarabelSolver::new(config.solver);

    Self {
      config,
      returns,
      risk_model,
      solver,
    }
  }
}

impl<R, C, S> PortfolioEngine<R, C, S>
where
  R: ReturnEstimator,
  C: RiskModel,
  S: QpSolver,
{
  /// Borrow engine configuration.
  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Replace the covariance estimator, e.g. with a shrinkage model.
  pub fn with_risk_model<C2: RiskModel>(self, risk_model: C2) -> PortfolioEngine<R, C2, S> {
    PortfolioEngine {
      config: self.config,
      returns: self.returns,
      risk_model,
      solver: self.solver,
    }
  }

  /// Replace the expected return estimator.
  pub fn with_return_estimator<R2: ReturnEstimator>(self, returns: R2) -> PortfolioEngine<R2, C, S> {
    PortfolioEngine {
      config: self.config,
      returns,
      risk_model: self.risk_model,
      solver: self.solver,
    }
  }

  /// Replace the QP solver.
  pub fn with_solver<S2: QpSolver>(self, solver: S2) -> PortfolioEngine<R, C, S2> {
    PortfolioEngine {
      config: self.config,
      returns: self.returns,
      risk_model: self.risk_model,
      solver,
    }
  }

  /// Derive expected returns and covariance from `prices`.
  pub fn estimate(&self, prices: &PriceTable) -> Result<MarketEstimates> {
    let (expected_returns, covariance) = super::estimate(prices, &self.returns, &self.risk_model)?;
    Ok(MarketEstimates {
      expected_returns,
      covariance,
    })
  }

  /// Optimize weights for `objective` under the configured constraints.
  pub fn optimize(&self, estimates: &MarketEstimates, objective: Objective) -> Result<WeightVector> {
    optimize(
      &estimates.expected_returns,
      &estimates.covariance,
      objective,
      &self.config.constraints,
      &self.solver,
    )
  }

  /// Summary statistics of `weights` at the configured risk-free rate.
  pub fn evaluate(
    &self,
    weights: &WeightVector,
    estimates: &MarketEstimates,
  ) -> Result<PortfolioPerformance> {
    evaluate(
      weights,
      &estimates.expected_returns,
      &estimates.covariance,
      self.config.risk_free_rate,
    )
  }

  /// Efficient frontier with `points` portfolios under the configured constraints.
  pub fn frontier(&self, estimates: &MarketEstimates, points: usize) -> Result<Vec<FrontierPoint>> {
    efficient_frontier(
      &estimates.expected_returns,
      &estimates.covariance,
      self.config.risk_free_rate,
      &self.config.constraints,
      points,
      &self.solver,
    )
  }

  fn run_objective(&self, estimates: &MarketEstimates, objective: Objective) -> ObjectiveReport {
    let outcome = self.optimize(estimates, objective).and_then(|weights| {
      let performance = self.evaluate(&weights, estimates)?;
      Ok(OptimizedPortfolio {
        weights,
        performance,
      })
    });

    match &outcome {
      Ok(p) => info!(
        %objective,
        expected_return = p.performance.expected_return,
        volatility = p.performance.volatility,
        sharpe = p.performance.sharpe_ratio,
        "objective optimized"
      ),
      Err(err) => warn!(%objective, error = %err, "objective failed"),
    }

    ObjectiveReport { objective, outcome }
  }

  /// Minimum-variance and maximum-Sharpe portfolios for `estimates`.
  ///
  /// The two objectives are solved independently and concurrently; a failure of
  /// one does not affect the other.
  pub fn run_estimates(&self, estimates: &MarketEstimates) -> Vec<ObjectiveReport> {
    let (min_variance, max_sharpe) = rayon::join(
      || self.run_objective(estimates, Objective::MinimizeVariance),
      || {
        self.run_objective(
          estimates,
          Objective::MaximizeSharpe {
            risk_free_rate: self.config.risk_free_rate,
          },
        )
      },
    );
    vec![min_variance, max_sharpe]
  }

  /// Estimate from `prices`, then run both objectives.
  pub fn run(&self, prices: &PriceTable) -> Result<(MarketEstimates, Vec<ObjectiveReport>)> {
    let estimates = self.estimate(prices)?;
    let reports = self.run_estimates(&estimates);
    Ok((estimates, reports))
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use nalgebra::DMatrix;
  use tracing_test::traced_test;

  use super::*;
  use crate::error::PortfolioError;
  use crate::portfolio::types::Universe;

  /// Deterministic daily paths with distinct drifts and cycles.
  fn synthetic_prices(days: usize) -> PriceTable {
    let universe = Universe::new(["AAA", "BBB", "CCC", "DDD"]).unwrap();
    let drift = [0.0008, 0.0004, 0.0002, 0.0006];
    let amp = [0.02, 0.01, 0.006, 0.015];
    let freq = [0.7, 1.3, 2.1, 0.4];
    let phase = [0.0, 1.0, 2.0, 3.0];

    let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
    let dates = (0..days)
      .map(|i| start + chrono::Duration::days(i as i64))
      .collect();

    let mut level = [100.0, 50.0, 20.0, 75.0];
    let mut rows = Vec::with_capacity(days);
    for t in 0..days {
      if t > 0 {
        for a in 0..4 {
          let shock = amp[a] * (freq[a] * t as f64 + phase[a]).sin();
          let common = 0.004 * (0.3 * t as f64).sin();
          level[a] *= 1.0 + drift[a] + shock + common;
        }
      }
      rows.push(level.iter().map(|&p| Some(p)).collect());
    }

    PriceTable::new(universe, dates, rows).unwrap()
  }

  #[test]
  #[traced_test]
  fn engine_runs_both_objectives() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig::default());
    let (estimates, reports) = engine.run(&synthetic_prices(400)).unwrap();

    assert_eq!(reports.len(), 2);
    let min_var = reports[0].outcome.as_ref().unwrap();
    let tangency = reports[1].outcome.as_ref().unwrap();

    for p in [min_var, tangency] {
      assert!((p.weights.sum() - 1.0).abs() < 1e-6);
      assert!(p.weights.values().iter().all(|&w| (0.0..=1.0).contains(&w)));
    }

    let equal = engine
      .evaluate(&WeightVector::equal(estimates.covariance.universe.clone()), &estimates)
      .unwrap();
    assert!(min_var.performance.volatility <= equal.volatility + 1e-9);
    assert!(tangency.performance.sharpe_ratio >= equal.sharpe_ratio - 1e-6);
    assert!(tangency.performance.sharpe_ratio >= min_var.performance.sharpe_ratio - 1e-6);
    assert!(logs_contain("objective optimized"));
  }

  #[test]
  fn failed_objective_does_not_stop_the_other() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig {
      risk_free_rate: 10.0,
      ..PortfolioEngineConfig::default()
    });
    let (_, reports) = engine.run(&synthetic_prices(300)).unwrap();

    assert!(reports[0].outcome.is_ok());
    assert!(matches!(
      reports[1].outcome,
      Err(PortfolioError::NoFeasibleSharpeImprovement { .. })
    ));
  }

  #[test]
  fn rerunning_gives_the_same_minimum_variance() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig::default());
    let estimates = engine.estimate(&synthetic_prices(250)).unwrap();

    let a = engine.optimize(&estimates, Objective::MinimizeVariance).unwrap();
    let b = engine.optimize(&estimates, Objective::MinimizeVariance).unwrap();
    let va = engine.evaluate(&a, &estimates).unwrap().volatility;
    let vb = engine.evaluate(&b, &estimates).unwrap().volatility;

    assert!((va - vb).abs() < 1e-9);
  }

  struct DiagonalRisk;

  impl RiskModel for DiagonalRisk {
    fn covariance(&self, prices: &PriceTable) -> Result<CovarianceMatrix> {
      let full = SampleCovariance::default().covariance(prices)?;
      let diag = DMatrix::from_diagonal(&full.values.diagonal());
      CovarianceMatrix::new(full.universe, diag)
    }
  }

  #[test]
  fn risk_model_is_pluggable() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig::default()).with_risk_model(DiagonalRisk);
    let estimates = engine.estimate(&synthetic_prices(200)).unwrap();

    assert_eq!(estimates.covariance.values[(0, 1)], 0.0);
    assert!(engine.optimize(&estimates, Objective::MinimizeVariance).is_ok());
  }

  #[test]
  fn two_row_table_estimates_but_cannot_be_evaluated() {
    let engine = PortfolioEngine::new(PortfolioEngineConfig::default());
    let (estimates, reports) = engine.run(&synthetic_prices(2)).unwrap();

    assert!(estimates.covariance.values.iter().all(|v| *v == 0.0));
    // every weight vector has zero variance, so no Sharpe ratio exists
    assert_eq!(reports.len(), 2);
    for report in &reports {
      assert_eq!(
        report.outcome.as_ref().err(),
        Some(&PortfolioError::DegenerateVolatility { volatility: 0.0 }),
        "{}",
        report.objective
      );
    }
  }

  #[test]
  fn indefinite_pairwise_covariance_stops_the_run() {
    let universe = Universe::new(["AAA", "BBB", "CCC"]).unwrap();
    let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
    let dates = (0..11)
      .map(|i| start + chrono::Duration::days(i as i64))
      .collect();
    // flat then alternating; late starters only see the alternating part
    let aaa = [100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 110.0, 99.0, 108.9, 98.01];
    let rows = (0..11)
      .map(|t| {
        vec![
          Some(aaa[t]),
          (t >= 6).then(|| aaa[t] / 2.0),
          (t >= 8).then(|| aaa[t] / 5.0),
        ]
      })
      .collect();
    let prices = PriceTable::new(universe, dates, rows).unwrap();

    let pairwise = PortfolioEngine::new(PortfolioEngineConfig::default());
    assert!(matches!(
      pairwise.run(&prices),
      Err(PortfolioError::IllConditionedMatrix { .. })
    ));

    let common = PortfolioEngine::new(PortfolioEngineConfig {
      alignment: Alignment::CommonWindow,
      ..PortfolioEngineConfig::default()
    });
    assert!(common.estimate(&prices).is_ok());
  }
}
