//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Expected return and covariance estimation, mean-variance optimization and
//! portfolio performance.

pub mod constraints;
pub mod data;
pub mod engine;
pub mod expected_returns;
pub mod optimizers;
pub mod performance;
pub mod risk_models;
pub mod solver;
pub mod types;

pub use constraints::Bounds;
pub use constraints::Constraints;
pub use constraints::WeightBounds;
pub use data::PriceTable;
pub use data::ReturnTable;
pub use engine::MarketEstimates;
pub use engine::ObjectiveReport;
pub use engine::OptimizedPortfolio;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use expected_returns::MeanHistoricalReturn;
pub use expected_returns::ReturnEstimator;
pub use optimizers::efficient_frontier;
pub use optimizers::efficient_return;
pub use optimizers::max_sharpe;
pub use optimizers::min_volatility;
pub use optimizers::optimize;
pub use optimizers::FrontierPoint;
pub use performance::evaluate;
pub use risk_models::Alignment;
pub use risk_models::RiskModel;
pub use risk_models::SampleCovariance;
pub use solver::ClarabelSolver;
pub use solver::QpSolver;
pub use solver::QuadraticProgram;
pub use solver::SolverSettings;
pub use types::CovarianceMatrix;
pub use types::ExpectedReturns;
pub use types::Objective;
pub use types::PortfolioPerformance;
pub use types::Universe;
pub use types::WeightVector;

use crate::error::Result;

/// Expected returns and covariance of `prices` from the given estimators.
pub fn estimate(
  prices: &PriceTable,
  returns: &dyn ReturnEstimator,
  risk_model: &dyn RiskModel,
) -> Result<(ExpectedReturns, CovarianceMatrix)> {
  Ok((returns.expected_returns(prices)?, risk_model.covariance(prices)?))
}
