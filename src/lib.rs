//! # nlprust
//!
//! Modeling core for nonlinear optimization.
//!
//! nlprust lets you state a nonlinear program with ordinary Rust expressions,
//! then hands exact first and second derivatives to a solver through a
//! callback interface:
//!
//! ```text
//! min / max  f(x)
//! s.t.       gl <= g(x) <= gu
//!            xl <=   x  <= xu
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use nlprust::prelude::*;
//!
//! let mut model = Model::new();
//! let x = model.new_variable().name("x").bounds(0.0, 4.0).build()?;
//! let y = model.new_variable().name("y").nonneg().build()?;
//!
//! model.minimize((&x - 1.0).square() + (&y - 2.0).square())?;
//! model.subject_to((&x + &y).leq(2.0))?;
//!
//! let status = model.solve(&mut ClarabelSolver::default())?;
//! assert!(status.has_solution());
//! # Ok::<(), nlprust::NlpError>(())
//! ```
//!
//! ## Supported Operations
//!
//! - Arithmetic: `+`, `-`, `*`, `/`, unary `-`, [`try_div`](atoms::try_div)
//! - Elementary: `sqrt`, `exp`, `log`, `sin`, `cos`, `tan`, `tanh`
//! - Powers: `powf` / `powi` / `square` with constant exponents, `pow` with an
//!   expression exponent
//! - Aggregation: `sum`, `dot`
//!
//! ## Architecture
//!
//! - **Expression DAG** built from the `Expr` enum with `Arc` sharing
//! - **Model** registry of variables, parameters, constraints and the objective
//! - **Tape** recorded once per expression; forward, reverse and
//!   second-order sweeps give exact values, gradients and Hessians
//! - **Sparsity** of the Jacobian and the Hessian of the Lagrangian, fixed at
//!   freeze time
//! - **Custom functions** ([`CustomConstraint`](constraints::CustomConstraint))
//!   with hand-written derivatives, merged into both patterns
//! - **Solver boundary** ([`NlpProblem`](solver::NlpProblem)) with a bundled
//!   Clarabel backend for QP-shaped models

pub mod atoms;
pub mod constraints;
pub mod error;
pub mod eval;
pub mod expr;
pub mod model;
pub mod solver;
pub mod sparse;
pub mod sparsity;
pub mod tape;

/// Prelude module for convenient imports.
///
/// ```
/// use nlprust::prelude::*;
/// ```
pub mod prelude {
    // Expression types
    pub use crate::expr::{constant, Expr, IntoExpr, VariableBuilder, VariableKind};

    // Atoms
    pub use crate::atoms::{
        cos, dot, exp, log, pow, powf, powi, sin, sqrt, square, sum, tan, tanh, try_div,
    };

    // Constraints
    pub use crate::constraints::{Constraint, ConstraintExt, CustomConstraint};

    // Model
    pub use crate::model::{Model, Objective};

    // Evaluation
    pub use crate::eval::{Derivatives, ExprEvaluator};

    // Solver
    pub use crate::solver::{
        ClarabelSolver, NlpProblem, NlpSolver, Settings, Solution, SolveStatus,
    };

    // Errors
    pub use crate::error::{NlpError, Result};
}

// Re-export main types at crate root
pub use error::{NlpError, Result};
pub use model::Model;
pub use solver::{Solution, SolveStatus};
