//! Elementary functions, powers and aggregation.

use crate::error::{NlpError, Result};
use crate::expr::{BinaryOp, Expr, UnaryOp};

/// Sine: sin(x).
pub fn sin(x: &Expr) -> Expr {
    Expr::unary(UnaryOp::Sin, x.clone())
}

/// Cosine: cos(x).
pub fn cos(x: &Expr) -> Expr {
    Expr::unary(UnaryOp::Cos, x.clone())
}

/// Tangent: tan(x).
pub fn tan(x: &Expr) -> Expr {
    Expr::unary(UnaryOp::Tan, x.clone())
}

/// Hyperbolic tangent: tanh(x).
pub fn tanh(x: &Expr) -> Expr {
    Expr::unary(UnaryOp::Tanh, x.clone())
}

/// Exponential: exp(x).
pub fn exp(x: &Expr) -> Expr {
    Expr::unary(UnaryOp::Exp, x.clone())
}

/// Natural logarithm: log(x).
///
/// Evaluating at x <= 0 is a domain error.
pub fn log(x: &Expr) -> Expr {
    Expr::unary(UnaryOp::Log, x.clone())
}

/// Square root: sqrt(x).
///
/// Evaluating at x < 0 is a domain error, and so is differentiating at x = 0.
pub fn sqrt(x: &Expr) -> Expr {
    Expr::unary(UnaryOp::Sqrt, x.clone())
}

/// Power by a constant exponent: x^p.
pub fn powf(x: &Expr, p: f64) -> Expr {
    Expr::unary(UnaryOp::Powf(p), x.clone())
}

/// Power by an integer exponent: x^n.
pub fn powi(x: &Expr, n: i32) -> Expr {
    powf(x, f64::from(n))
}

/// Square: x^2.
pub fn square(x: &Expr) -> Expr {
    powf(x, 2.0)
}

/// General power: base^exponent.
///
/// A constant exponent produces the same node as `powf`. An expression exponent
/// is differentiated with the logarithmic chain rule and requires base > 0 at
/// the evaluation point.
pub fn pow(base: &Expr, exponent: &Expr) -> Expr {
    match exponent.constant_value() {
        Some(p) => powf(base, p),
        None => Expr::binary(BinaryOp::Pow, base.clone(), exponent.clone()),
    }
}

/// Sum of expressions.
///
/// Terms are combined pairwise so the resulting tree has logarithmic depth.
/// An empty sum is the constant 0.
pub fn sum(terms: impl IntoIterator<Item = Expr>) -> Expr {
    let mut level: Vec<Expr> = terms.into_iter().collect();
    if level.is_empty() {
        return Expr::Constant(0.0);
    }
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut iter = level.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(Expr::binary(BinaryOp::Add, a, b)),
                None => next.push(a),
            }
        }
        level = next;
    }
    level.pop().unwrap_or(Expr::Constant(0.0))
}

/// Weighted sum: sum_i coeffs[i] * terms[i].
///
/// # Errors
///
/// Returns `DimensionMismatch` if the slices differ in length.
pub fn dot(coeffs: &[f64], terms: &[Expr]) -> Result<Expr> {
    if coeffs.len() != terms.len() {
        return Err(NlpError::dimension("dot terms", coeffs.len(), terms.len()));
    }
    Ok(sum(coeffs
        .iter()
        .zip(terms)
        .map(|(&c, t)| Expr::binary(BinaryOp::Mul, Expr::Constant(c), t.clone()))))
}

impl std::iter::Sum for Expr {
    fn sum<I: Iterator<Item = Expr>>(iter: I) -> Expr {
        sum(iter)
    }
}

impl Expr {
    /// Power by a constant exponent.
    pub fn powf(&self, p: f64) -> Expr {
        powf(self, p)
    }

    /// Power by an integer exponent.
    pub fn powi(&self, n: i32) -> Expr {
        powi(self, n)
    }

    /// Square.
    pub fn square(&self) -> Expr {
        square(self)
    }

    /// Sine.
    pub fn sin(&self) -> Expr {
        sin(self)
    }

    /// Cosine.
    pub fn cos(&self) -> Expr {
        cos(self)
    }

    /// Exponential.
    pub fn exp(&self) -> Expr {
        exp(self)
    }

    /// Natural logarithm.
    pub fn ln(&self) -> Expr {
        log(self)
    }

    /// Square root.
    pub fn sqrt(&self) -> Expr {
        sqrt(self)
    }
}
