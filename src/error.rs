//! Error types for nlprust.

use std::fmt;

use thiserror::Error;

/// Which expression of a model an evaluation failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalTarget {
    /// A standalone expression evaluated outside of a model.
    Expression,
    /// The model objective.
    Objective,
    /// The constraint with the given index.
    Constraint(usize),
}

impl fmt::Display for EvalTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalTarget::Expression => write!(f, "expression"),
            EvalTarget::Objective => write!(f, "objective"),
            EvalTarget::Constraint(i) => write!(f, "constraint {i}"),
        }
    }
}

/// Error type for nlprust operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NlpError {
    /// A lower bound exceeds its upper bound, or a bound is NaN.
    #[error("Invalid bounds [{lb}, {ub}] for {context}")]
    InvalidBounds {
        lb: f64,
        ub: f64,
        context: String,
    },

    /// An expression references a variable or parameter that is not registered
    /// in the model it is being added to.
    #[error("Unregistered {kind} with index {index}: {reason}")]
    UnregisteredVariable {
        kind: &'static str,
        index: usize,
        reason: String,
    },

    /// Structural modification attempted on a frozen model.
    #[error("Model is frozen: cannot {0} after the model has been finalized")]
    ModelFrozen(&'static str),

    /// An operation was undefined at the evaluation point.
    #[error("Domain error in {target} at tape entry {entry} ({op}): {reason}")]
    Domain {
        target: EvalTarget,
        entry: usize,
        op: &'static str,
        reason: String,
    },

    /// Buffer or point sizes disagree with the model.
    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// Backend solver failure.
    #[error("Solver error: {0}")]
    Solver(String),

    /// The model cannot be handled by the requested operation.
    #[error("Invalid model: {0}")]
    InvalidModel(String),
}

impl NlpError {
    /// Re-tag a domain error with the model expression it came from.
    ///
    /// Other variants are returned unchanged.
    pub fn at(self, target: EvalTarget) -> Self {
        match self {
            NlpError::Domain {
                entry, op, reason, ..
            } => NlpError::Domain {
                target,
                entry,
                op,
                reason,
            },
            other => other,
        }
    }

    /// Check if this is a domain error.
    pub fn is_domain(&self) -> bool {
        matches!(self, NlpError::Domain { .. })
    }

    /// The expression a domain error was raised for.
    pub fn target(&self) -> Option<EvalTarget> {
        match self {
            NlpError::Domain { target, .. } => Some(*target),
            _ => None,
        }
    }

    pub(crate) fn dimension(what: &'static str, expected: usize, got: usize) -> Self {
        NlpError::DimensionMismatch {
            what,
            expected,
            got,
        }
    }
}

/// Result type for nlprust operations.
pub type Result<T> = std::result::Result<T, NlpError>;
