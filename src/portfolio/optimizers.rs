//! # Portfolio Optimizers
//!
//! $$
//! \min_{\mathbf{w}} \ \mathbf{w}^\top \Sigma \mathbf{w}
//! \quad\text{or}\quad
//! \max_{\mathbf{w}} \ \frac{\mathbf{w}^\top\mu - r_f}{\sqrt{\mathbf{w}^\top \Sigma \mathbf{w}}}
//! $$
//!
//! Minimum-variance, maximum-Sharpe and efficient-frontier allocations solved as
//! convex quadratic programs.

use nalgebra::DMatrix;
use nalgebra::DVector;
use rayon::prelude::*;
use tracing::debug;
use tracing::info;

use super::constraints::max_attainable_return;
use super::constraints::max_return_weights;
use super::constraints::Bounds;
use super::constraints::Constraints;
use super::performance::evaluate;
use super::solver::QpSolution;
use super::solver::QpSolver;
use super::solver::QuadraticProgram;
use super::solver::SolverStatus;
use super::types::CovarianceMatrix;
use super::types::ExpectedReturns;
use super::types::Objective;
use super::types::PortfolioPerformance;
use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;

/// Budget scaling below which a maximum-Sharpe solution cannot be normalized.
const MIN_KAPPA: f64 = 1e-12;

/// One portfolio on the efficient frontier.
#[derive(Clone, Debug)]
pub struct FrontierPoint {
  /// Minimum required expected return.
  pub target_return: f64,
  pub weights: WeightVector,
  pub performance: PortfolioPerformance,
}

fn check_inputs(mu: &ExpectedReturns, cov: &CovarianceMatrix) -> Result<()> {
  if mu.universe != cov.universe {
    return Err(PortfolioError::DimensionMismatch {
      expected: cov.universe.len(),
      found: mu.universe.len(),
    });
  }
  Ok(())
}

/// Rows `[1'; I]` with full investment and every bound that has a finite end.
fn budget_and_box_rows(
  n: usize,
  bounds: &[Bounds],
  extra_rows: usize,
) -> (Vec<Vec<f64>>, Vec<f64>, Vec<f64>) {
  let mut rows = Vec::with_capacity(1 + n + extra_rows);
  let mut l = Vec::with_capacity(1 + n + extra_rows);
  let mut u = Vec::with_capacity(1 + n + extra_rows);

  rows.push(vec![1.0; n]);
  l.push(1.0);
  u.push(1.0);

  for (i, b) in bounds.iter().enumerate() {
    if b.lower.is_finite() || b.upper.is_finite() {
      let mut row = vec![0.0; n];
      row[i] = 1.0;
      rows.push(row);
      l.push(b.lower);
      u.push(b.upper);
    }
  }

  (rows, l, u)
}

fn assemble(
  p: DMatrix<f64>,
  rows: Vec<Vec<f64>>,
  l: Vec<f64>,
  u: Vec<f64>,
) -> QuadraticProgram {
  let n = p.ncols();
  let m = rows.len();
  let flat: Vec<f64> = rows.into_iter().flatten().collect();

  QuadraticProgram {
    p,
    q: DVector::zeros(n),
    a: DMatrix::from_row_slice(m, n, &flat),
    l: DVector::from_vec(l),
    u: DVector::from_vec(u),
  }
}

fn ensure_solved(solution: &QpSolution, objective: Objective) -> Result<()> {
  match solution.status {
    SolverStatus::Solved => Ok(()),
    SolverStatus::PrimalInfeasible => Err(PortfolioError::InfeasibleConstraints(
      "no weight vector satisfies the constraints".to_string(),
    )),
    SolverStatus::MaxIterationsReached | SolverStatus::NumericalError => {
      Err(PortfolioError::SolverDivergence {
        objective,
        iterations: solution.iterations,
        primal_residual: solution.primal_residual,
        dual_residual: solution.dual_residual,
      })
    }
  }
}

fn clamp_to_bounds(x: impl Iterator<Item = f64>, bounds: &[Bounds]) -> DVector<f64> {
  DVector::from_iterator(
    bounds.len(),
    x.zip(bounds.iter()).map(|(w, b)| b.clamp(w)),
  )
}

/// Minimum-variance weights: `min w'Σw  s.t.  sum(w) = 1, bounds`.
///
/// Expected returns play no part; with a degenerate `Σ` any minimizer may be returned.
pub fn min_volatility<S: QpSolver + ?Sized>(
  cov: &CovarianceMatrix,
  constraints: &Constraints,
  solver: &S,
) -> Result<WeightVector> {
  let n = cov.universe.len();
  let bounds = constraints.resolve(n)?;
  let (rows, l, u) = budget_and_box_rows(n, &bounds, 0);
  let qp = assemble(&cov.values * 2.0, rows, l, u);

  let solution = solver.solve(&qp);
  ensure_solved(&solution, Objective::MinimizeVariance)?;

  info!(
    iterations = solution.iterations,
    variance = solution.objective,
    "minimum variance portfolio solved"
  );

  WeightVector::new(
    cov.universe.clone(),
    clamp_to_bounds(solution.x.iter().copied(), &bounds),
  )
}

/// Maximum-Sharpe weights through the homogenized program
///
/// `min y'Σy  s.t.  mu'y - r_f k = 1, sum(y) = k, l k <= y <= u k, k >= 0`
///
/// with `w = y / k`.
pub fn max_sharpe<S: QpSolver + ?Sized>(
  mu: &ExpectedReturns,
  cov: &CovarianceMatrix,
  risk_free_rate: f64,
  constraints: &Constraints,
  solver: &S,
) -> Result<WeightVector> {
  check_inputs(mu, cov)?;
  let n = mu.universe.len();
  let bounds = constraints.resolve(n)?;

  let best_return = max_attainable_return(&mu.values, &bounds).unwrap_or_else(|| mu.values.max());
  if best_return <= risk_free_rate {
    return Err(PortfolioError::NoFeasibleSharpeImprovement {
      best_return,
      risk_free_rate,
    });
  }

  let mut p = DMatrix::zeros(n + 1, n + 1);
  p.view_mut((0, 0), (n, n)).copy_from(&(&cov.values * 2.0));

  let mut rows = Vec::with_capacity(2 * n + 3);
  let mut l = Vec::with_capacity(2 * n + 3);
  let mut u = Vec::with_capacity(2 * n + 3);

  let mut excess: Vec<f64> = mu.values.iter().copied().collect();
  excess.push(-risk_free_rate);
  rows.push(excess);
  l.push(1.0);
  u.push(1.0);

  let mut budget = vec![1.0; n];
  budget.push(-1.0);
  rows.push(budget);
  l.push(0.0);
  u.push(0.0);

  let mut kappa = vec![0.0; n];
  kappa.push(1.0);
  rows.push(kappa);
  l.push(0.0);
  u.push(f64::INFINITY);

  for (i, b) in bounds.iter().enumerate() {
    if b.lower.is_finite() {
      let mut row = vec![0.0; n + 1];
      row[i] = 1.0;
      row[n] = -b.lower;
      rows.push(row);
      l.push(0.0);
      u.push(f64::INFINITY);
    }
    if b.upper.is_finite() {
      let mut row = vec![0.0; n + 1];
      row[i] = 1.0;
      row[n] = -b.upper;
      rows.push(row);
      l.push(f64::NEG_INFINITY);
      u.push(0.0);
    }
  }

  let qp = assemble(p, rows, l, u);
  let objective = Objective::MaximizeSharpe { risk_free_rate };
  let solution = solver.solve(&qp);

  if solution.status == SolverStatus::PrimalInfeasible {
    return Err(PortfolioError::NoFeasibleSharpeImprovement {
      best_return,
      risk_free_rate,
    });
  }
  ensure_solved(&solution, objective)?;

  let kappa = solution.x[n];
  debug!(kappa, iterations = solution.iterations, "maximum Sharpe program solved");
  if kappa <= MIN_KAPPA {
    return Err(PortfolioError::InfeasibleConstraints(
      "maximum Sharpe direction has zero net investment and cannot be fully invested".to_string(),
    ));
  }

  info!(
    iterations = solution.iterations,
    sharpe = 1.0 / solution.objective.max(0.0).sqrt(),
    "maximum Sharpe portfolio solved"
  );

  WeightVector::new(
    mu.universe.clone(),
    clamp_to_bounds(solution.x.rows(0, n).iter().map(|y| y / kappa), &bounds),
  )
}

/// Minimum-variance weights earning at least `target_return`.
pub fn efficient_return<S: QpSolver + ?Sized>(
  mu: &ExpectedReturns,
  cov: &CovarianceMatrix,
  target_return: f64,
  constraints: &Constraints,
  solver: &S,
) -> Result<WeightVector> {
  check_inputs(mu, cov)?;
  let n = mu.universe.len();
  let bounds = constraints.resolve(n)?;

  if let Some(best) = max_attainable_return(&mu.values, &bounds) {
    if target_return > best + 1e-12 {
      return Err(PortfolioError::InfeasibleConstraints(format!(
        "target return {target_return} exceeds the attainable maximum {best}"
      )));
    }
  }

  let (mut rows, mut l, mut u) = budget_and_box_rows(n, &bounds, 1);
  rows.push(mu.values.iter().copied().collect());
  l.push(target_return);
  u.push(f64::INFINITY);

  let qp = assemble(&cov.values * 2.0, rows, l, u);
  let solution = solver.solve(&qp);
  ensure_solved(&solution, Objective::MinimizeVariance)?;

  WeightVector::new(
    mu.universe.clone(),
    clamp_to_bounds(solution.x.iter().copied(), &bounds),
  )
}

/// Sweep `points` target returns from the minimum-variance return to the
/// highest attainable return. Points are solved in parallel.
pub fn efficient_frontier<S: QpSolver + ?Sized>(
  mu: &ExpectedReturns,
  cov: &CovarianceMatrix,
  risk_free_rate: f64,
  constraints: &Constraints,
  points: usize,
  solver: &S,
) -> Result<Vec<FrontierPoint>> {
  check_inputs(mu, cov)?;
  let n = mu.universe.len();
  let bounds = constraints.resolve(n)?;

  let min_var = min_volatility(cov, constraints, solver)?;
  let max_ret = max_return_weights(&mu.values, &bounds);
  let low = min_var.values().dot(&mu.values);
  let high = max_ret
    .as_ref()
    .map(|w| w.dot(&mu.values))
    .unwrap_or_else(|| mu.values.max());
  let points = points.max(2);
  let step = (high - low).max(0.0) / (points - 1) as f64;

  (0..points)
    .into_par_iter()
    .map(|k| {
      let target_return = if k == points - 1 {
        high.max(low)
      } else {
        low + step * k as f64
      };
      let weights = match (k, &max_ret) {
        (0, _) => min_var.clone(),
        // the top of a bounded frontier is a single vertex, no solve needed
        (k, Some(w)) if k == points - 1 && high > low => {
          WeightVector::new(mu.universe.clone(), w.clone())?
        }
        _ => efficient_return(mu, cov, target_return, constraints, solver)?,
      };
      let performance = evaluate(&weights, mu, cov, risk_free_rate)?;
      Ok(FrontierPoint {
        target_return,
        weights,
        performance,
      })
    })
    .collect()
}

/// Solve for `objective` under `constraints`. Each call returns a fresh weight vector.
pub fn optimize<S: QpSolver + ?Sized>(
  mu: &ExpectedReturns,
  cov: &CovarianceMatrix,
  objective: Objective,
  constraints: &Constraints,
  solver: &S,
) -> Result<WeightVector> {
  check_inputs(mu, cov)?;
  match objective {
    Objective::MinimizeVariance => min_volatility(cov, constraints, solver),
    Objective::MaximizeSharpe { risk_free_rate } => {
      max_sharpe(mu, cov, risk_free_rate, constraints, solver)
    }
  }
}
