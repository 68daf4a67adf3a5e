//! Clarabel solver integration.
//!
//! Clarabel is an interior-point solver for convex conic programs. It handles
//! the models that are continuous quadratic programs with affine constraints;
//! general nonlinear models need an external NLP solver driving
//! [`NlpProblem`] directly.

use std::time::Instant;

use clarabel::algebra::CscMatrix as ClarabelCsc;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};

use super::problem::NlpProblem;
use super::solution::SolveStatus;
use super::stuffing::{stuff_problem, ConeDims};
use super::NlpSolver;
use crate::error::{NlpError, Result};

impl From<SolverStatus> for SolveStatus {
    fn from(status: SolverStatus) -> Self {
        match status {
            SolverStatus::Solved => SolveStatus::Optimal,
            SolverStatus::AlmostSolved => SolveStatus::AcceptablePoint,
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                SolveStatus::Infeasible
            }
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                SolveStatus::Unbounded
            }
            SolverStatus::MaxIterations => SolveStatus::IterationLimit,
            SolverStatus::MaxTime => SolveStatus::TimeLimit,
            SolverStatus::NumericalError | SolverStatus::InsufficientProgress => {
                SolveStatus::NumericalError
            }
            _ => SolveStatus::Error,
        }
    }
}

/// Solver settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Print solver output.
    pub verbose: bool,
    /// Maximum iterations.
    pub max_iter: u32,
    /// Time limit in seconds.
    pub time_limit: f64,
    /// Absolute tolerance.
    pub tol_gap_abs: f64,
    /// Relative tolerance.
    pub tol_gap_rel: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            verbose: false,
            max_iter: 100,
            time_limit: f64::INFINITY,
            tol_gap_abs: 1e-8,
            tol_gap_rel: 1e-8,
        }
    }
}

/// Backend for continuous QP-shaped models.
///
/// ```
/// use nlprust::prelude::*;
///
/// let mut model = Model::new();
/// let x = model.new_variable().build().unwrap();
/// let y = model.new_variable().build().unwrap();
/// model.minimize(x.square() + y.square()).unwrap();
/// model.add_eq_constraint(&x + &y, 1.0).unwrap();
///
/// let status = model.solve(&mut ClarabelSolver::default()).unwrap();
/// assert_eq!(status, SolveStatus::Optimal);
/// assert!((model.value(&x).unwrap() - 0.5).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClarabelSolver {
    /// Settings passed to Clarabel.
    pub settings: Settings,
}

impl ClarabelSolver {
    /// Create a backend with custom settings.
    pub fn new(settings: Settings) -> Self {
        ClarabelSolver { settings }
    }
}

impl NlpSolver for ClarabelSolver {
    fn solve(&mut self, problem: &mut NlpProblem<'_>) -> Result<()> {
        let stuffed = stuff_problem(problem)?;

        let p = to_clarabel_csc(&stuffed.p);
        let a = to_clarabel_csc(&stuffed.a);
        let cones = to_clarabel_cones(&stuffed.cone_dims);

        let settings = DefaultSettingsBuilder::default()
            .verbose(self.settings.verbose)
            .max_iter(self.settings.max_iter)
            .time_limit(self.settings.time_limit)
            .tol_gap_abs(self.settings.tol_gap_abs)
            .tol_gap_rel(self.settings.tol_gap_rel)
            .build()
            .map_err(|e| NlpError::Solver(e.to_string()))?;

        tracing::info!(
            component = "clarabel",
            operation = "solve",
            variables = problem.num_variables(),
            rows = stuffed.cone_dims.total(),
            "starting solve"
        );
        let start = Instant::now();

        let mut solver = DefaultSolver::new(&p, &stuffed.q, &a, &stuffed.b, &cones, settings);
        solver.solve();

        let status: SolveStatus = solver.solution.status.into();
        let iterations = solver.info.iterations;
        tracing::info!(
            component = "clarabel",
            operation = "solve",
            %status,
            iterations,
            objective = solver.solution.obj_val + stuffed.objective_offset,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "solve finished"
        );

        problem.report_iterations(iterations);
        problem.report_solution(&solver.solution.x, status)?;
        if status.has_solution() {
            let multipliers = stuffed
                .constraint_multipliers(&solver.solution.z, problem.num_constraints());
            problem.report_multipliers(&multipliers)?;
        }
        Ok(())
    }
}

/// Convert nalgebra CSC to Clarabel CSC.
fn to_clarabel_csc(m: &nalgebra_sparse::CscMatrix<f64>) -> ClarabelCsc<f64> {
    ClarabelCsc::new(
        m.nrows(),
        m.ncols(),
        m.col_offsets().to_vec(),
        m.row_indices().to_vec(),
        m.values().to_vec(),
    )
}

/// Convert cone dimensions to Clarabel cones.
fn to_clarabel_cones(dims: &ConeDims) -> Vec<SupportedConeT<f64>> {
    let mut cones = Vec::new();

    if dims.zero > 0 {
        cones.push(SupportedConeT::ZeroConeT(dims.zero));
    }

    if dims.nonneg > 0 {
        cones.push(SupportedConeT::NonnegativeConeT(dims.nonneg));
    }

    cones
}
