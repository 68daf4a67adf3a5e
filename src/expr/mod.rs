//! Expression types and creation utilities.
//!
//! This module provides the core expression types for building models:
//! - `Expr` - The expression enum forming a shared DAG
//! - Variables via `Model::new_variable()` and `VariableBuilder`
//! - Parameters, values that can change between solves
//! - Constant creation via `constant()`

pub mod constant;
pub mod expression;
pub mod parameter;
pub mod variable;

// Re-export main types
pub use constant::{constant, IntoExpr};
pub use expression::{BinaryOp, Expr, ModelId, ParameterData, UnaryOp, VariableData};
pub use parameter::Parameter;
pub use variable::{Variable, VariableBuilder, VariableKind};
