//! Decision variables and the builder used to register them.

use std::fmt;
use std::sync::Arc;

use super::expression::Expr;
use crate::error::Result;
use crate::model::Model;

/// Domain tag for a variable.
///
/// Integrality is carried to the solver as a tag only; derivative evaluation
/// always treats variables as continuous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariableKind {
    /// Real-valued.
    #[default]
    Continuous,
    /// Integer-valued.
    Integer,
    /// Integer restricted to {0, 1}.
    Binary,
}

impl VariableKind {
    /// Check if the solver must treat the variable as integral.
    pub fn is_integral(&self) -> bool {
        !matches!(self, VariableKind::Continuous)
    }
}

/// A variable registered in a model.
#[derive(Debug, Clone)]
pub struct Variable {
    /// Optional display name.
    pub name: Option<Arc<str>>,
    /// Lower bound (may be `-inf`).
    pub lb: f64,
    /// Upper bound (may be `+inf`).
    pub ub: f64,
    /// Starting point handed to the solver.
    pub init: f64,
    /// Current value, written back after a solve.
    pub value: f64,
    /// Domain tag.
    pub kind: VariableKind,
    /// Fixed variables are reported to the solver with `lb = ub = init`.
    pub fixed: bool,
}

impl Variable {
    /// Bounds as seen by the solver.
    pub fn solver_bounds(&self) -> (f64, f64) {
        if self.fixed {
            (self.init, self.init)
        } else {
            (self.lb, self.ub)
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or("_");
        write!(f, "{} <= {} = {} <= {}", self.lb, name, self.init, self.ub)?;
        match self.kind {
            VariableKind::Continuous => {}
            VariableKind::Integer => write!(f, " (integer)")?,
            VariableKind::Binary => write!(f, " (binary)")?,
        }
        if self.fixed {
            write!(f, " (fixed)")?;
        }
        Ok(())
    }
}

/// Builder for registering variables with various attributes.
///
/// ```
/// use nlprust::prelude::*;
///
/// let mut model = Model::new();
/// let x = model.new_variable().name("x").bounds(0.0, 10.0).init(1.0).build().unwrap();
/// assert_eq!(x.variable_index(), Some(0));
/// ```
pub struct VariableBuilder<'m> {
    model: &'m mut Model,
    name: Option<String>,
    lb: f64,
    ub: f64,
    init: Option<f64>,
    kind: VariableKind,
}

impl<'m> VariableBuilder<'m> {
    /// Create a builder for an unbounded continuous variable.
    pub fn new(model: &'m mut Model) -> Self {
        Self {
            model,
            name: None,
            lb: f64::NEG_INFINITY,
            ub: f64::INFINITY,
            init: None,
            kind: VariableKind::Continuous,
        }
    }

    /// Set the name of the variable.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set both bounds.
    pub fn bounds(mut self, lb: f64, ub: f64) -> Self {
        self.lb = lb;
        self.ub = ub;
        self
    }

    /// Set the lower bound.
    pub fn lower(mut self, lb: f64) -> Self {
        self.lb = lb;
        self
    }

    /// Set the upper bound.
    pub fn upper(mut self, ub: f64) -> Self {
        self.ub = ub;
        self
    }

    /// Constrain the variable to be non-negative (x >= 0).
    pub fn nonneg(self) -> Self {
        self.lower(0.0)
    }

    /// Set the starting value. Defaults to 0 clamped into the bounds.
    pub fn init(mut self, init: f64) -> Self {
        self.init = Some(init);
        self
    }

    /// Mark the variable as integer.
    pub fn integer(mut self) -> Self {
        self.kind = VariableKind::Integer;
        self
    }

    /// Mark the variable as binary. Bounds default to [0, 1].
    pub fn binary(mut self) -> Self {
        self.kind = VariableKind::Binary;
        self.lb = self.lb.max(0.0);
        self.ub = self.ub.min(1.0);
        self
    }

    /// Register the variable and return its expression leaf.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBounds` if the bounds are inconsistent and `ModelFrozen`
    /// if the model has been finalized.
    pub fn build(self) -> Result<Expr> {
        let init = self.init.unwrap_or_else(|| default_init(self.lb, self.ub));
        self.model
            .register_variable(self.name, self.lb, self.ub, init, self.kind)
    }
}

/// Zero clamped into `[lb, ub]`.
pub(crate) fn default_init(lb: f64, ub: f64) -> f64 {
    if lb > 0.0 {
        lb
    } else if ub < 0.0 {
        ub
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_init() {
        assert_eq!(default_init(f64::NEG_INFINITY, f64::INFINITY), 0.0);
        assert_eq!(default_init(2.0, 5.0), 2.0);
        assert_eq!(default_init(-5.0, -1.0), -1.0);
    }

    #[test]
    fn test_variable_builder() {
        let mut model = Model::new();
        let x = VariableBuilder::new(&mut model)
            .name("x")
            .bounds(1.0, 4.0)
            .build()
            .unwrap();

        let v = model.variable(x.variable_index().unwrap()).unwrap();
        assert_eq!(v.name.as_deref(), Some("x"));
        assert_eq!(v.init, 1.0);
        assert_eq!(v.kind, VariableKind::Continuous);
    }

    #[test]
    fn test_binary_variable() {
        let mut model = Model::new();
        let b = model.new_variable().binary().build().unwrap();
        let v = model.variable(b.variable_index().unwrap()).unwrap();
        assert_eq!((v.lb, v.ub), (0.0, 1.0));
        assert!(v.kind.is_integral());
    }

    #[test]
    fn test_fixed_bounds() {
        let v = Variable {
            name: None,
            lb: 0.0,
            ub: 5.0,
            init: 3.0,
            value: 3.0,
            kind: VariableKind::Continuous,
            fixed: true,
        };
        assert_eq!(v.solver_bounds(), (3.0, 3.0));
        assert_eq!(v.to_string(), "0 <= _ = 3 <= 5 (fixed)");
    }
}
