//! Model constraints.

mod constraint;
mod custom;

pub(crate) use constraint::fmt_bounded;
pub use constraint::{Constraint, ConstraintExt};
pub use custom::CustomConstraint;
