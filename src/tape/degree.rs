//! Polynomial degree of a recorded expression.
//!
//! Backends that only accept linear constraints and quadratic objectives use
//! this to decide whether a model is in their class.

use super::opcode::OpCode;
use super::Tape;

/// Polynomial degree of an expression in the model variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Degree {
    /// Polynomial of at most this degree. `Polynomial(0)` is a constant.
    Polynomial(u32),
    /// Not a polynomial (or degree unknown).
    Nonpolynomial,
}

impl Degree {
    /// Degree of a constant.
    pub const CONSTANT: Degree = Degree::Polynomial(0);

    /// Check if the degree is 0.
    pub fn is_constant(self) -> bool {
        self == Degree::CONSTANT
    }

    /// Check if the degree is at most 1.
    pub fn is_affine(self) -> bool {
        matches!(self, Degree::Polynomial(d) if d <= 1)
    }

    /// Check if the degree is at most 2.
    pub fn is_quadratic(self) -> bool {
        matches!(self, Degree::Polynomial(d) if d <= 2)
    }
}

/// Degree of a + b.
pub fn add_degree(a: Degree, b: Degree) -> Degree {
    use Degree::*;
    match (a, b) {
        (Polynomial(x), Polynomial(y)) => Polynomial(x.max(y)),
        _ => Nonpolynomial,
    }
}

/// Degree of a * b.
pub fn mul_degree(a: Degree, b: Degree) -> Degree {
    if a.is_constant() {
        return b;
    }
    if b.is_constant() {
        return a;
    }
    match (a, b) {
        (Degree::Polynomial(x), Degree::Polynomial(y)) => {
            x.checked_add(y).map_or(Degree::Nonpolynomial, Degree::Polynomial)
        }
        _ => Degree::Nonpolynomial,
    }
}

/// Degree of a^p for a constant exponent p.
pub fn powf_degree(a: Degree, p: f64) -> Degree {
    use Degree::*;
    if a.is_constant() || p == 0.0 {
        return Degree::CONSTANT;
    }
    match a {
        Polynomial(d) if p > 0.0 && p.fract() == 0.0 && p <= f64::from(u32::MAX) => {
            d.checked_mul(p as u32).map_or(Nonpolynomial, Polynomial)
        }
        _ => Nonpolynomial,
    }
}

impl Tape {
    /// Polynomial degree of the recorded expression.
    pub fn degree(&self) -> Degree {
        let mut degrees = vec![Degree::CONSTANT; self.len()];
        for i in 0..self.len() {
            let [a, b] = self.arg_indices[i];
            let at = |k: u32| degrees[k as usize];
            let d = match self.opcodes[i] {
                OpCode::Input => Degree::Polynomial(1),
                OpCode::Param | OpCode::Const => Degree::CONSTANT,
                OpCode::Add | OpCode::Sub => add_degree(at(a), at(b)),
                OpCode::Mul => mul_degree(at(a), at(b)),
                OpCode::Div if at(b).is_constant() => at(a),
                OpCode::Div => Degree::Nonpolynomial,
                OpCode::Neg => at(a),
                OpCode::Powf => powf_degree(at(a), self.immediates[i]),
                OpCode::Pow if at(a).is_constant() && at(b).is_constant() => Degree::CONSTANT,
                OpCode::Pow => Degree::Nonpolynomial,
                OpCode::Sqrt
                | OpCode::Exp
                | OpCode::Log
                | OpCode::Sin
                | OpCode::Cos
                | OpCode::Tan
                | OpCode::Tanh => {
                    if at(a).is_constant() {
                        Degree::CONSTANT
                    } else {
                        Degree::Nonpolynomial
                    }
                }
            };
            degrees[i] = d;
        }
        degrees[self.output_index as usize]
    }
}
