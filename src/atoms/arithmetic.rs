//! Arithmetic atoms and operator overloading.
//!
//! Every combination of `Expr`, `&Expr` and `f64` is supported for `+`, `-`, `*`
//! and `/`. Numbers become `Constant` leaves. Nothing is folded or simplified:
//! `x * 1.0` stays a multiplication node.

use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::error::{EvalTarget, NlpError, Result};
use crate::expr::{BinaryOp, Expr, IntoExpr, UnaryOp};

fn add_nodes(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Add, a, b)
}

fn sub_nodes(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Sub, a, b)
}

fn mul_nodes(a: Expr, b: Expr) -> Expr {
    Expr::binary(BinaryOp::Mul, a, b)
}

fn div_nodes(a: Expr, b: Expr) -> Expr {
    match try_div(a, b) {
        Ok(e) => e,
        Err(err) => panic!("{err}"),
    }
}

fn division_error(reason: String) -> NlpError {
    NlpError::Domain {
        target: EvalTarget::Expression,
        entry: 0,
        op: "div",
        reason,
    }
}

/// Division, returning an error for a literal divisor that cannot be used.
///
/// This is the fallible version of the `/` operator. Divisors that merely
/// evaluate to zero at some point are reported as domain errors during
/// evaluation instead.
///
/// # Errors
///
/// Returns a `Domain` error if the divisor is the constant `0`, or if either
/// operand is a non-finite constant.
pub fn try_div(a: impl IntoExpr, b: impl IntoExpr) -> Result<Expr> {
    let (a, b) = (a.into_expr(), b.into_expr());
    if b.constant_value() == Some(0.0) {
        return Err(division_error("division by the constant zero".into()));
    }
    for (side, operand) in [("numerator", &a), ("divisor", &b)] {
        if let Some(v) = operand.constant_value().filter(|v| !v.is_finite()) {
            return Err(division_error(format!("{side} is the constant {v}")));
        }
    }
    Ok(Expr::binary(BinaryOp::Div, a, b))
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $build:path) => {
        impl $trait<Expr> for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                $build(self, rhs)
            }
        }

        impl $trait<&Expr> for Expr {
            type Output = Expr;

            fn $method(self, rhs: &Expr) -> Expr {
                $build(self, rhs.clone())
            }
        }

        impl $trait<Expr> for &Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                $build(self.clone(), rhs)
            }
        }

        impl $trait<&Expr> for &Expr {
            type Output = Expr;

            fn $method(self, rhs: &Expr) -> Expr {
                $build(self.clone(), rhs.clone())
            }
        }

        impl $trait<f64> for Expr {
            type Output = Expr;

            fn $method(self, rhs: f64) -> Expr {
                $build(self, Expr::Constant(rhs))
            }
        }

        impl $trait<f64> for &Expr {
            type Output = Expr;

            fn $method(self, rhs: f64) -> Expr {
                $build(self.clone(), Expr::Constant(rhs))
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                $build(Expr::Constant(self), rhs)
            }
        }

        impl $trait<&Expr> for f64 {
            type Output = Expr;

            fn $method(self, rhs: &Expr) -> Expr {
                $build(Expr::Constant(self), rhs.clone())
            }
        }
    };
}

impl_binary_op!(Add, add, add_nodes);
impl_binary_op!(Sub, sub, sub_nodes);
impl_binary_op!(Mul, mul, mul_nodes);

// Panics when the divisor is the constant zero or an operand is a non-finite
// constant. `try_div()` returns an error instead.
impl_binary_op!(Div, div, div_nodes);

macro_rules! impl_assign_op {
    ($trait:ident, $method:ident, $build:path) => {
        impl<T: IntoExpr> $trait<T> for Expr {
            fn $method(&mut self, rhs: T) {
                let lhs = std::mem::replace(self, Expr::Constant(0.0));
                *self = $build(lhs, rhs.into_expr());
            }
        }
    };
}

impl_assign_op!(AddAssign, add_assign, add_nodes);
impl_assign_op!(SubAssign, sub_assign, sub_nodes);
impl_assign_op!(MulAssign, mul_assign, mul_nodes);

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Neg, self)
    }
}

impl Neg for &Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Neg, self.clone())
    }
}
