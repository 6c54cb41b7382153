//! # QP Solver
//!
//! $$
//! \min_{x}\ \tfrac12 x^\top P x + q^\top x \quad \text{s.t.}\quad l \le Ax \le u
//! $$
//!
//! Convex quadratic programming behind the [`QpSolver`] trait. The default
//! backend is the Clarabel interior-point solver.

use clarabel::algebra::CscMatrix;
use clarabel::solver::DefaultSettingsBuilder;
use clarabel::solver::DefaultSolver;
use clarabel::solver::IPSolver;
use clarabel::solver::SolverStatus as ClarabelStatus;
use clarabel::solver::SupportedConeT;
use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::debug;
use tracing::warn;

/// Convex quadratic program `min 1/2 x'Px + q'x  s.t.  l <= Ax <= u`.
///
/// `P` must be symmetric positive semi-definite. Bounds may be infinite and
/// rows with `l == u` are treated as equalities.
#[derive(Clone, Debug)]
pub struct QuadraticProgram {
  pub p: DMatrix<f64>,
  pub q: DVector<f64>,
  pub a: DMatrix<f64>,
  pub l: DVector<f64>,
  pub u: DVector<f64>,
}

impl QuadraticProgram {
  pub fn n_variables(&self) -> usize {
    self.q.len()
  }

  pub fn n_constraints(&self) -> usize {
    self.l.len()
  }

  pub fn objective(&self, x: &DVector<f64>) -> f64 {
    0.5 * x.dot(&(&self.p * x)) + self.q.dot(x)
  }
}

/// Terminal state of a solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverStatus {
  /// Optimality conditions hold within tolerance.
  Solved,
  /// A certificate of primal infeasibility was found.
  PrimalInfeasible,
  /// The iteration or time budget ran out before convergence.
  MaxIterationsReached,
  /// The solver stopped on a numerical failure or an unbounded program.
  NumericalError,
}

/// Output of a QP solve.
#[derive(Clone, Debug)]
pub struct QpSolution {
  pub status: SolverStatus,
  /// Primal iterate.
  pub x: DVector<f64>,
  pub iterations: usize,
  pub primal_residual: f64,
  pub dual_residual: f64,
  pub objective: f64,
}

/// Capability to minimize a convex quadratic form under linear constraints.
pub trait QpSolver: Send + Sync {
  fn solve(&self, qp: &QuadraticProgram) -> QpSolution;
}

/// Iteration budget and tolerances passed to [`ClarabelSolver`].
#[derive(Clone, Copy, Debug)]
pub struct SolverSettings {
  /// Maximum number of interior-point iterations.
  pub max_iter: u32,
  /// Absolute duality gap tolerance.
  pub tol_gap_abs: f64,
  /// Relative duality gap tolerance.
  pub tol_gap_rel: f64,
  /// Primal and dual feasibility tolerance.
  pub tol_feas: f64,
}

impl Default for SolverSettings {
  fn default() -> Self {
    Self {
      max_iter: 200,
      tol_gap_abs: 1e-8,
      tol_gap_rel: 1e-8,
      tol_feas: 1e-8,
    }
  }
}

/// [`QpSolver`] backed by Clarabel.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClarabelSolver {
  pub settings: SolverSettings,
}

/// Constraint rows in Clarabel's `Ax + s = b` form, equalities first.
struct ConicRows {
  /// Source row of `A` and the sign applied to it.
  rows: Vec<(usize, f64)>,
  b: Vec<f64>,
  zero: usize,
  nonneg: usize,
}

impl ClarabelSolver {
  pub fn new(settings: SolverSettings) -> Self {
    Self { settings }
  }

  /// Split `l <= Ax <= u` into `Ax = u` rows and `Ax <= u`, `-Ax <= -l` rows.
  fn conic_rows(qp: &QuadraticProgram) -> ConicRows {
    let mut eq = Vec::new();
    let mut ineq = Vec::new();

    for (i, (&l, &u)) in qp.l.iter().zip(qp.u.iter()).enumerate() {
      if l.is_finite() && u.is_finite() && (u - l).abs() < 1e-12 {
        eq.push((i, 1.0, u));
        continue;
      }
      if u.is_finite() {
        ineq.push((i, 1.0, u));
      }
      if l.is_finite() {
        ineq.push((i, -1.0, -l));
      }
    }

    let zero = eq.len();
    let nonneg = ineq.len();
    let (rows, b) = eq
      .into_iter()
      .chain(ineq)
      .map(|(i, sign, b)| ((i, sign), b))
      .unzip();
    ConicRows {
      rows,
      b,
      zero,
      nonneg,
    }
  }

  fn constraint_matrix(qp: &QuadraticProgram, conic: &ConicRows) -> CscMatrix<f64> {
    let m = conic.rows.len();
    let n = qp.n_variables();
    let mut colptr = Vec::with_capacity(n + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    colptr.push(0);
    for j in 0..n {
      for (k, &(src, sign)) in conic.rows.iter().enumerate() {
        let v = qp.a[(src, j)];
        if v != 0.0 {
          rowval.push(k);
          nzval.push(sign * v);
        }
      }
      colptr.push(nzval.len());
    }

    CscMatrix::new(m, n, colptr, rowval, nzval)
  }

  /// Upper triangle of `P`, the half Clarabel reads.
  fn objective_matrix(qp: &QuadraticProgram) -> CscMatrix<f64> {
    let n = qp.n_variables();
    let mut colptr = Vec::with_capacity(n + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    colptr.push(0);
    for j in 0..n {
      for i in 0..=j {
        let v = qp.p[(i, j)];
        if v != 0.0 {
          rowval.push(i);
          nzval.push(v);
        }
      }
      colptr.push(nzval.len());
    }

    CscMatrix::new(n, n, colptr, rowval, nzval)
  }

  fn failure(&self, qp: &QuadraticProgram, reason: &str) -> QpSolution {
    warn!(reason, "qp solver setup failed");
    let x = DVector::zeros(qp.n_variables());
    QpSolution {
      status: SolverStatus::NumericalError,
      objective: qp.objective(&x),
      x,
      iterations: 0,
      primal_residual: f64::INFINITY,
      dual_residual: f64::INFINITY,
    }
  }
}

impl QpSolver for ClarabelSolver {
  fn solve(&self, qp: &QuadraticProgram) -> QpSolution {
    let conic = Self::conic_rows(qp);
    let p = Self::objective_matrix(qp);
    let a = Self::constraint_matrix(qp, &conic);
    let q: Vec<f64> = qp.q.iter().copied().collect();

    let mut cones = Vec::with_capacity(2);
    if conic.zero > 0 {
      cones.push(SupportedConeT::ZeroConeT(conic.zero));
    }
    if conic.nonneg > 0 {
      cones.push(SupportedConeT::NonnegativeConeT(conic.nonneg));
    }

    let settings = match DefaultSettingsBuilder::default()
      .max_iter(self.settings.max_iter)
      .tol_gap_abs(self.settings.tol_gap_abs)
      .tol_gap_rel(self.settings.tol_gap_rel)
      .tol_feas(self.settings.tol_feas)
      .verbose(false)
      .build()
    {
      Ok(settings) => settings,
      Err(err) => return self.failure(qp, &err.to_string()),
    };

    let mut solver = match DefaultSolver::new(&p, &q, &a, &conic.b, &cones, settings) {
      Ok(solver) => solver,
      Err(err) => return self.failure(qp, &format!("{err:?}")),
    };
    solver.solve();

    let solution = &solver.solution;
    let status = match solution.status {
      ClarabelStatus::Solved => SolverStatus::Solved,
      ClarabelStatus::AlmostSolved => {
        warn!("qp solved to reduced accuracy");
        SolverStatus::Solved
      }
      ClarabelStatus::PrimalInfeasible | ClarabelStatus::AlmostPrimalInfeasible => {
        SolverStatus::PrimalInfeasible
      }
      ClarabelStatus::MaxIterations
      | ClarabelStatus::MaxTime
      | ClarabelStatus::InsufficientProgress => SolverStatus::MaxIterationsReached,
      _ => SolverStatus::NumericalError,
    };

    debug!(
      status = ?solution.status,
      iterations = solution.iterations,
      r_prim = solution.r_prim,
      r_dual = solution.r_dual,
      "qp solve finished"
    );

    let x = DVector::from_column_slice(&solution.x);
    QpSolution {
      status,
      objective: qp.objective(&x),
      x,
      iterations: solution.iterations as usize,
      primal_residual: solution.r_prim,
      dual_residual: solution.r_dual,
    }
  }
}
