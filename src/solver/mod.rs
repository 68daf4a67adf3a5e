//! Solver interface for nlprust.
//!
//! This module provides:
//! - The callback surface external NLP solvers drive ([`NlpProblem`])
//! - The [`NlpSolver`] trait that `Model::solve` dispatches to
//! - Matrix stuffing and Clarabel integration for QP-shaped models

pub mod clarabel;
pub mod problem;
pub mod solution;
pub mod stuffing;

pub use self::clarabel::{ClarabelSolver, Settings};
pub use problem::{Bounds, NlpProblem, SparseEval};
pub use solution::{Solution, SolveStatus};
pub use stuffing::{stuff_problem, ConeDims, RowOrigin, StuffedProblem};

use crate::error::Result;

/// A solver that drives the callbacks of an [`NlpProblem`].
///
/// Implementations evaluate the problem at the points they choose and finish
/// by calling [`NlpProblem::report_solution`] (and, when available,
/// [`NlpProblem::report_multipliers`]). Evaluation errors returned by the
/// callbacks leave the problem usable, so a solver may retry at another point.
pub trait NlpSolver {
    /// Solve `problem`.
    fn solve(&mut self, problem: &mut NlpProblem<'_>) -> Result<()>;
}
