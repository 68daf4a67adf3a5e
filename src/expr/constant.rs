//! Constant expression creation.

use super::expression::Expr;

/// Create a constant expression from a scalar.
pub fn constant(value: f64) -> Expr {
    Expr::Constant(value)
}

/// Conversion into an expression, implemented for expressions and plain numbers.
pub trait IntoExpr {
    /// Convert into an expression.
    fn into_expr(self) -> Expr;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl IntoExpr for &Expr {
    fn into_expr(self) -> Expr {
        self.clone()
    }
}

impl IntoExpr for f64 {
    fn into_expr(self) -> Expr {
        Expr::Constant(self)
    }
}

impl IntoExpr for i32 {
    fn into_expr(self) -> Expr {
        Expr::Constant(f64::from(self))
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Constant(value)
    }
}
