//! Opcodes for the evaluation tape.
//!
//! Each opcode is an elementary operation. [`eval_local`] evaluates one opcode
//! and returns its value together with the first and second local partials,
//! which the reverse and second-order sweeps reuse without re-evaluating.

use crate::expr::{BinaryOp, UnaryOp};

/// Sentinel used in the second operand slot of unary ops and leaves.
pub const UNUSED: u32 = u32::MAX;

/// Elementary operation codes.
///
/// `Input` stores its local variable slot in operand 0, `Param` its parameter
/// index. `Const` keeps its value and `Powf` its exponent in the immediate table.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    // Leaves
    Input,
    Param,
    Const,

    // Binary
    Add,
    Sub,
    Mul,
    Div,
    Pow,

    // Unary
    Neg,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Tanh,
    Powf,
}

impl OpCode {
    /// Name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Input => "input",
            OpCode::Param => "param",
            OpCode::Const => "const",
            OpCode::Add => "add",
            OpCode::Sub => "sub",
            OpCode::Mul => "mul",
            OpCode::Div => "div",
            OpCode::Pow => "pow",
            OpCode::Neg => "neg",
            OpCode::Sqrt => "sqrt",
            OpCode::Exp => "exp",
            OpCode::Log => "log",
            OpCode::Sin => "sin",
            OpCode::Cos => "cos",
            OpCode::Tan => "tan",
            OpCode::Tanh => "tanh",
            OpCode::Powf => "powf",
        }
    }

    /// Leaves have no operands.
    pub fn is_leaf(self) -> bool {
        matches!(self, OpCode::Input | OpCode::Param | OpCode::Const)
    }

    /// Binary ops read both operand slots.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow
        )
    }

    /// Map a unary expression op to its opcode and immediate.
    pub fn from_unary(op: UnaryOp) -> (OpCode, f64) {
        match op {
            UnaryOp::Neg => (OpCode::Neg, 0.0),
            UnaryOp::Sqrt => (OpCode::Sqrt, 0.0),
            UnaryOp::Exp => (OpCode::Exp, 0.0),
            UnaryOp::Log => (OpCode::Log, 0.0),
            UnaryOp::Sin => (OpCode::Sin, 0.0),
            UnaryOp::Cos => (OpCode::Cos, 0.0),
            UnaryOp::Tan => (OpCode::Tan, 0.0),
            UnaryOp::Tanh => (OpCode::Tanh, 0.0),
            UnaryOp::Powf(p) => (OpCode::Powf, p),
        }
    }

    /// Map a binary expression op to its opcode.
    pub fn from_binary(op: BinaryOp) -> OpCode {
        match op {
            BinaryOp::Add => OpCode::Add,
            BinaryOp::Sub => OpCode::Sub,
            BinaryOp::Mul => OpCode::Mul,
            BinaryOp::Div => OpCode::Div,
            BinaryOp::Pow => OpCode::Pow,
        }
    }
}

/// First and second partial derivatives of one entry with respect to its operands.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Partials {
    pub da: f64,
    pub db: f64,
    pub daa: f64,
    pub dab: f64,
    pub dbb: f64,
}

impl Partials {
    fn unary(da: f64, daa: f64) -> Self {
        Partials {
            da,
            daa,
            ..Default::default()
        }
    }

    /// Check if the first partials are finite.
    pub fn first_finite(&self) -> bool {
        self.da.is_finite() && self.db.is_finite()
    }

    /// Check if the second partials are finite.
    pub fn second_finite(&self) -> bool {
        self.daa.is_finite() && self.dab.is_finite() && self.dbb.is_finite()
    }
}

/// Evaluate a non-leaf opcode at operand values `a`, `b` with immediate `imm`.
///
/// Returns the value and local partials, or a description of why the operation
/// is undefined at this point. A non-finite value is always an error; non-finite
/// partials are returned as is and only reported if a sweep actually uses them.
pub fn eval_local(op: OpCode, a: f64, b: f64, imm: f64) -> Result<(f64, Partials), String> {
    let (r, p) = match op {
        OpCode::Add => (
            a + b,
            Partials {
                da: 1.0,
                db: 1.0,
                ..Default::default()
            },
        ),
        OpCode::Sub => (
            a - b,
            Partials {
                da: 1.0,
                db: -1.0,
                ..Default::default()
            },
        ),
        OpCode::Mul => (
            a * b,
            Partials {
                da: b,
                db: a,
                dab: 1.0,
                ..Default::default()
            },
        ),
        OpCode::Div => {
            if b == 0.0 {
                return Err(format!("division of {a} by zero"));
            }
            let r = a / b;
            let inv = 1.0 / b;
            (
                r,
                Partials {
                    da: inv,
                    db: -r * inv,
                    daa: 0.0,
                    dab: -inv * inv,
                    dbb: 2.0 * r * inv * inv,
                },
            )
        }
        OpCode::Pow => {
            if a <= 0.0 {
                return Err(format!(
                    "base {a} must be positive when the exponent is an expression"
                ));
            }
            let r = a.powf(b);
            let ln_a = a.ln();
            (
                r,
                Partials {
                    da: b * r / a,
                    db: r * ln_a,
                    daa: b * (b - 1.0) * r / (a * a),
                    dab: r * (1.0 + b * ln_a) / a,
                    dbb: r * ln_a * ln_a,
                },
            )
        }
        OpCode::Neg => (-a, Partials::unary(-1.0, 0.0)),
        OpCode::Sqrt => {
            if a < 0.0 {
                return Err(format!("square root of negative value {a}"));
            }
            let r = a.sqrt();
            (r, Partials::unary(0.5 / r, -0.25 / (a * r)))
        }
        OpCode::Exp => {
            let r = a.exp();
            (r, Partials::unary(r, r))
        }
        OpCode::Log => {
            if a <= 0.0 {
                return Err(format!("logarithm of non-positive value {a}"));
            }
            (a.ln(), Partials::unary(1.0 / a, -1.0 / (a * a)))
        }
        OpCode::Sin => {
            let (s, c) = a.sin_cos();
            (s, Partials::unary(c, -s))
        }
        OpCode::Cos => {
            let (s, c) = a.sin_cos();
            (c, Partials::unary(-s, -c))
        }
        OpCode::Tan => {
            let r = a.tan();
            let sec2 = 1.0 + r * r;
            (r, Partials::unary(sec2, 2.0 * r * sec2))
        }
        OpCode::Tanh => {
            let r = a.tanh();
            let sech2 = 1.0 - r * r;
            (r, Partials::unary(sech2, -2.0 * r * sech2))
        }
        OpCode::Powf => powf_local(a, imm)?,
        OpCode::Input | OpCode::Param | OpCode::Const => {
            return Err(format!("{} has no operands", op.name()));
        }
    };

    if !r.is_finite() {
        return Err(format!("{} produced non-finite value {r}", op.name()));
    }
    Ok((r, p))
}

fn powf_local(a: f64, c: f64) -> Result<(f64, Partials), String> {
    if c == 0.0 {
        return Ok((1.0, Partials::default()));
    }
    if c == 1.0 {
        return Ok((a, Partials::unary(1.0, 0.0)));
    }
    if c == 2.0 {
        return Ok((a * a, Partials::unary(2.0 * a, 2.0)));
    }

    let integral = c.fract() == 0.0 && c.abs() < f64::from(i32::MAX);
    if a < 0.0 && !integral {
        return Err(format!("negative base {a} with fractional exponent {c}"));
    }
    if a == 0.0 && c < 0.0 {
        return Err(format!("zero raised to negative exponent {c}"));
    }

    if integral {
        let n = c as i32;
        Ok((
            a.powi(n),
            Partials::unary(c * a.powi(n - 1), c * (c - 1.0) * a.powi(n - 2)),
        ))
    } else {
        Ok((
            a.powf(c),
            Partials::unary(c * a.powf(c - 1.0), c * (c - 1.0) * a.powf(c - 2.0)),
        ))
    }
}
