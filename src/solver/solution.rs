//! Solve status and the solution recorded in a model.

use std::fmt;

/// Outcome of a solve as reported by the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolveStatus {
    /// No solve has completed yet.
    #[default]
    NotSolved,
    /// Optimal solution found.
    Optimal,
    /// Solver stopped at a point satisfying relaxed tolerances.
    AcceptablePoint,
    /// Problem is infeasible.
    Infeasible,
    /// Problem is unbounded.
    Unbounded,
    /// Maximum iterations reached.
    IterationLimit,
    /// Time limit reached.
    TimeLimit,
    /// Numerical difficulties.
    NumericalError,
    /// Any other solver failure.
    Error,
}

impl SolveStatus {
    /// Check if the reported point can be used as a solution.
    pub fn has_solution(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::AcceptablePoint)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolveStatus::NotSolved => "not solved",
            SolveStatus::Optimal => "optimal",
            SolveStatus::AcceptablePoint => "acceptable point",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::Unbounded => "unbounded",
            SolveStatus::IterationLimit => "iteration limit",
            SolveStatus::TimeLimit => "time limit",
            SolveStatus::NumericalError => "numerical error",
            SolveStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Solution written back into a model by the solver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Solution {
    /// Solution status.
    pub status: SolveStatus,
    /// Objective value in the model's own sense (if it could be evaluated).
    pub value: Option<f64>,
    /// Primal variable values, indexed by variable.
    pub primal: Vec<f64>,
    /// Constraint multipliers, if the solver reported them.
    pub dual: Option<Vec<f64>>,
    /// Number of iterations.
    pub iterations: u32,
}

impl Solution {
    /// Value of variable `index` in the reported point.
    pub fn primal_value(&self, index: usize) -> Option<f64> {
        self.primal.get(index).copied()
    }

    /// Get all dual variable values (Lagrange multipliers).
    pub fn duals(&self) -> Option<&[f64]> {
        self.dual.as_deref()
    }

    /// Get the dual value for a specific constraint by index.
    ///
    /// The constraint index corresponds to the order constraints were added to the model.
    pub fn constraint_dual(&self, idx: usize) -> Option<f64> {
        self.dual.as_ref().and_then(|d| d.get(idx).copied())
    }

    /// Check if the solution has dual values available.
    pub fn has_duals(&self) -> bool {
        self.dual.is_some()
    }
}
