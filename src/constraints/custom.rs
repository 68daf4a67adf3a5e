//! Functions with hand-written derivatives.
//!
//! A [`CustomConstraint`] stands next to expression constraints in a model. It
//! reports its own structure once, at freeze time, and fills value, gradient
//! and Hessian buffers at every point the solver asks for. The model merges its
//! entries into the Jacobian and Hessian patterns like any recorded expression.
//!
//! ```
//! use nlprust::prelude::*;
//!
//! /// sum_i (x_i - 1)^2 over a block of variables.
//! struct ShiftedSquares {
//!     first: usize,
//!     len: usize,
//! }
//!
//! impl CustomConstraint for ShiftedSquares {
//!     fn gradient_columns(&self) -> Vec<usize> {
//!         (self.first..self.first + self.len).collect()
//!     }
//!
//!     fn hessian_entries(&self) -> Vec<(usize, usize)> {
//!         self.gradient_columns().into_iter().map(|i| (i, i)).collect()
//!     }
//!
//!     fn evaluate(&self, x: &[f64], gradient: &mut [f64], hessian: &mut [f64]) -> Result<f64> {
//!         let mut value = 0.0;
//!         for k in 0..self.len {
//!             let t = x[self.first + k] - 1.0;
//!             value += t * t;
//!             gradient[k] = 2.0 * t;
//!             hessian[k] = 2.0;
//!         }
//!         Ok(value)
//!     }
//! }
//!
//! let mut model = Model::new();
//! let _x = model.new_variable().build()?;
//! let _y = model.new_variable().build()?;
//! model.minimize_custom(ShiftedSquares { first: 0, len: 2 })?;
//! model.freeze()?;
//! assert_eq!(model.hessian_pattern().unwrap().entries(), &[(0, 0), (1, 1)]);
//! # Ok::<(), nlprust::NlpError>(())
//! ```

use std::fmt;

use crate::error::Result;

/// A scalar function of the model variables with its own derivatives.
///
/// Used as a constraint body with [`Model::add_custom_constraint`] or as the
/// objective with [`Model::minimize_custom`] / [`Model::maximize_custom`].
/// The structure methods are called once when the model is frozen.
///
/// [`Model::add_custom_constraint`]: crate::model::Model::add_custom_constraint
/// [`Model::minimize_custom`]: crate::model::Model::minimize_custom
/// [`Model::maximize_custom`]: crate::model::Model::maximize_custom
pub trait CustomConstraint: Send + Sync {
    /// Variables with a gradient entry, each listed once. Gradient values follow this order.
    fn gradient_columns(&self) -> Vec<usize>;

    /// Hessian pairs in model indices. Hessian values follow this order.
    ///
    /// Either triangle may be used; `(i, j)` and `(j, i)` name the same entry
    /// and their values are added. A linear function keeps the default.
    fn hessian_entries(&self) -> Vec<(usize, usize)> {
        Vec::new()
    }

    /// Value at `x`, writing the gradient and Hessian values.
    ///
    /// `x` holds every model variable. `gradient` is as long as
    /// [`gradient_columns`](Self::gradient_columns) and `hessian` as long as
    /// [`hessian_entries`](Self::hessian_entries). Return a `Domain` error if
    /// the function is undefined at `x`.
    fn evaluate(&self, x: &[f64], gradient: &mut [f64], hessian: &mut [f64]) -> Result<f64>;

    /// Name used when the model is displayed.
    fn name(&self) -> &str {
        "custom"
    }
}

impl fmt::Debug for dyn CustomConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomConstraint")
            .field("name", &self.name())
            .field("columns", &self.gradient_columns())
            .finish()
    }
}
