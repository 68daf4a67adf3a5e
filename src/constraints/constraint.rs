//! Constraint types for optimization models.
//!
//! Every constraint has the ranged form `lb <= body <= ub`:
//! - Equality: `lb == ub`
//! - Upper bounded: `lb == -inf`
//! - Lower bounded: `ub == +inf`

use std::fmt;

use crate::expr::{Expr, IntoExpr};

/// A ranged constraint `lb <= body <= ub`.
#[derive(Debug, Clone)]
pub struct Constraint {
    /// The constrained expression.
    pub body: Expr,
    /// Lower bound, possibly `-inf`.
    pub lb: f64,
    /// Upper bound, possibly `+inf`.
    pub ub: f64,
}

impl Constraint {
    /// Create a ranged constraint: lb <= body <= ub.
    pub fn new(body: Expr, lb: f64, ub: f64) -> Self {
        Constraint { body, lb, ub }
    }

    /// Create an equality constraint: lhs == rhs.
    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        let (body, c) = split_constant(lhs, rhs);
        Constraint::new(body, c, c)
    }

    /// Create an inequality constraint: lhs <= rhs.
    pub fn leq(lhs: Expr, rhs: Expr) -> Self {
        let (body, c) = split_constant(lhs, rhs);
        Constraint::new(body, f64::NEG_INFINITY, c)
    }

    /// Create an inequality constraint: lhs >= rhs.
    pub fn geq(lhs: Expr, rhs: Expr) -> Self {
        let (body, c) = split_constant(lhs, rhs);
        Constraint::new(body, c, f64::INFINITY)
    }

    /// Check if this is an equality constraint.
    pub fn is_equality(&self) -> bool {
        self.lb == self.ub
    }
}

/// Move a constant side into the bound.
///
/// `lhs op c` keeps `lhs` as the body; anything else becomes `lhs - rhs op 0`.
fn split_constant(lhs: Expr, rhs: Expr) -> (Expr, f64) {
    match rhs.constant_value() {
        Some(c) => (lhs, c),
        None => (lhs - rhs, 0.0),
    }
}

/// Write `body` with its bounds in the shortest form.
pub(crate) fn fmt_bounded(
    f: &mut fmt::Formatter<'_>,
    body: &dyn fmt::Display,
    lb: f64,
    ub: f64,
) -> fmt::Result {
    if lb == ub {
        write!(f, "{body} == {lb}")
    } else if lb == f64::NEG_INFINITY {
        write!(f, "{body} <= {ub}")
    } else if ub == f64::INFINITY {
        write!(f, "{body} >= {lb}")
    } else {
        write!(f, "{lb} <= {body} <= {ub}")
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_bounded(f, &self.body, self.lb, self.ub)
    }
}

/// Extension trait for creating constraints from expressions.
pub trait ConstraintExt {
    /// Create equality constraint: self == rhs.
    fn equals(&self, rhs: impl IntoExpr) -> Constraint;

    /// Create inequality constraint: self <= rhs.
    fn leq(&self, rhs: impl IntoExpr) -> Constraint;

    /// Create inequality constraint: self >= rhs.
    fn geq(&self, rhs: impl IntoExpr) -> Constraint;
}

impl ConstraintExt for Expr {
    fn equals(&self, rhs: impl IntoExpr) -> Constraint {
        Constraint::eq(self.clone(), rhs.into_expr())
    }

    fn leq(&self, rhs: impl IntoExpr) -> Constraint {
        Constraint::leq(self.clone(), rhs.into_expr())
    }

    fn geq(&self, rhs: impl IntoExpr) -> Constraint {
        Constraint::geq(self.clone(), rhs.into_expr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ModelId, VariableData};

    fn var(index: usize) -> Expr {
        Expr::Variable(VariableData {
            model: ModelId::new(),
            index,
            name: None,
        })
    }

    #[test]
    fn test_equality_constraint() {
        let constr = Constraint::eq(var(0), Expr::Constant(1.0));
        assert!(constr.is_equality());
        assert_eq!((constr.lb, constr.ub), (1.0, 1.0));
        assert_eq!(constr.body.variable_index(), Some(0));
    }

    #[test]
    fn test_inequality_constraint() {
        let constr = Constraint::geq(var(0), Expr::Constant(0.0));
        assert_eq!((constr.lb, constr.ub), (0.0, f64::INFINITY));

        let constr = Constraint::leq(var(0), Expr::Constant(2.0));
        assert_eq!((constr.lb, constr.ub), (f64::NEG_INFINITY, 2.0));
    }

    #[test]
    fn test_expression_rhs_is_moved_into_body() {
        let constr = Constraint::leq(var(0), var(1));
        assert_eq!(constr.ub, 0.0);
        assert_eq!(constr.body.variables().len(), 2);
    }

    #[test]
    fn test_constraint_ext() {
        let x = var(0);
        let eq_constr = x.equals(1.0);
        assert!(eq_constr.is_equality());

        let leq_constr = x.leq(3);
        assert_eq!(leq_constr.ub, 3.0);
        assert_eq!(leq_constr.to_string(), "x[0] <= 3");
    }
}
