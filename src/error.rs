//! Failure kinds of the portfolio pipeline.

use thiserror::Error;

use crate::portfolio::types::Objective;

/// Errors produced by the portfolio pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
  /// The asset universe is too small or contains duplicate identifiers.
  #[error("invalid universe: {0}")]
  InvalidUniverse(String),

  /// The price table violates ordering, positivity or alignment rules.
  #[error("invalid price table: {0}")]
  InvalidPriceTable(String),

  /// Inputs of different dimensions were combined.
  #[error("dimension mismatch: expected {expected}, found {found}")]
  DimensionMismatch { expected: usize, found: usize },

  /// An asset has fewer than two valid price observations.
  #[error("insufficient data for {asset}: {observations} price observation(s), at least 2 required")]
  InsufficientData { asset: String, observations: usize },

  /// The covariance matrix is not positive semi-definite within tolerance.
  #[error("ill-conditioned covariance matrix: smallest eigenvalue {min_eigenvalue:e} below -{tolerance:e}")]
  IllConditionedMatrix { min_eigenvalue: f64, tolerance: f64 },

  /// The constraint set admits no weight vector.
  #[error("infeasible constraints: {0}")]
  InfeasibleConstraints(String),

  /// No feasible portfolio earns more than the risk-free rate.
  #[error("no feasible portfolio beats the risk-free rate {risk_free_rate} (best attainable return {best_return})")]
  NoFeasibleSharpeImprovement { best_return: f64, risk_free_rate: f64 },

  /// The QP solver exhausted its iteration budget.
  #[error("solver did not converge for {objective} after {iterations} iterations (primal residual {primal_residual:e}, dual residual {dual_residual:e})")]
  SolverDivergence {
    objective: Objective,
    iterations: usize,
    primal_residual: f64,
    dual_residual: f64,
  },

  /// Portfolio volatility is numerically zero, so the Sharpe ratio is undefined.
  #[error("degenerate portfolio volatility {volatility:e}")]
  DegenerateVolatility { volatility: f64 },
}

/// A specialized Result type for portfolio operations.
pub type Result<T> = std::result::Result<T, PortfolioError>;
