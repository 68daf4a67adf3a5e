//! Core expression types for nlprust.
//!
//! The `Expr` enum represents scalar expressions over model variables.
//! Expressions form an immutable DAG (directed acyclic graph) using `Arc` for sharing,
//! so reusing a sub-expression in several places never copies it.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Unique identifier for a model.
///
/// Every variable and parameter leaf remembers the model that created it, which
/// lets a model reject expressions built from another model's variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(u64);

impl ModelId {
    /// Generate a new unique ID.
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        ModelId(NEXT_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ModelId {
    fn default() -> Self {
        Self::new()
    }
}

/// Data for a variable leaf.
#[derive(Debug, Clone)]
pub struct VariableData {
    /// Model that owns the variable.
    pub model: ModelId,
    /// Dense index of the variable within its model.
    pub index: usize,
    /// Optional name for display.
    pub name: Option<Arc<str>>,
}

/// Data for a parameter leaf.
#[derive(Debug, Clone)]
pub struct ParameterData {
    /// Model that owns the parameter.
    pub model: ModelId,
    /// Dense index of the parameter within its model.
    pub index: usize,
    /// Optional name for display.
    pub name: Option<Arc<str>>,
}

/// Single-operand operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    /// -a
    Neg,
    /// sqrt(a), defined for a >= 0.
    Sqrt,
    /// exp(a)
    Exp,
    /// Natural logarithm, defined for a > 0.
    Log,
    /// sin(a)
    Sin,
    /// cos(a)
    Cos,
    /// tan(a)
    Tan,
    /// tanh(a)
    Tanh,
    /// a^c for a constant exponent c.
    Powf(f64),
}

impl UnaryOp {
    /// Short name used in diagnostics and display.
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Powf(_) => "powf",
        }
    }
}

/// Two-operand operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// a + b
    Add,
    /// a - b
    Sub,
    /// a * b
    Mul,
    /// a / b
    Div,
    /// a^b with an expression exponent, defined for a > 0.
    Pow,
}

impl BinaryOp {
    /// Infix symbol used for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }
}

/// The core expression type.
///
/// All expressions are immutable and use `Arc` for efficient sharing.
/// Building an expression never evaluates or simplifies it.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A literal value.
    Constant(f64),
    /// A decision variable registered in a model.
    Variable(VariableData),
    /// A named value that is constant for differentiation but may change between solves.
    Parameter(ParameterData),
    /// op(a)
    Unary(UnaryOp, Arc<Expr>),
    /// a op b
    Binary(BinaryOp, Arc<Expr>, Arc<Expr>),
}

impl Expr {
    /// Build a unary node.
    pub fn unary(op: UnaryOp, a: Expr) -> Expr {
        Expr::Unary(op, Arc::new(a))
    }

    /// Build a binary node.
    pub fn binary(op: BinaryOp, a: Expr, b: Expr) -> Expr {
        Expr::Binary(op, Arc::new(a), Arc::new(b))
    }

    /// Check if this is a constant leaf.
    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Constant(_))
    }

    /// Get the literal value of a constant leaf.
    pub fn constant_value(&self) -> Option<f64> {
        match self {
            Expr::Constant(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the dense index if this is a variable leaf.
    pub fn variable_index(&self) -> Option<usize> {
        match self {
            Expr::Variable(v) => Some(v.index),
            _ => None,
        }
    }

    /// Get the dense index if this is a parameter leaf.
    pub fn parameter_index(&self) -> Option<usize> {
        match self {
            Expr::Parameter(p) => Some(p.index),
            _ => None,
        }
    }

    /// Visit every distinct node once, depth first, left operand before right.
    ///
    /// Shared sub-expressions (same `Arc`) are visited a single time.
    pub fn visit(&self, mut f: impl FnMut(&Expr)) {
        let mut seen: HashSet<*const Expr> = HashSet::new();
        let mut stack: Vec<&Expr> = vec![self];
        while let Some(node) = stack.pop() {
            if !seen.insert(node as *const Expr) {
                continue;
            }
            f(node);
            match node {
                Expr::Unary(_, a) => stack.push(a),
                Expr::Binary(_, a, b) => {
                    stack.push(b);
                    stack.push(a);
                }
                Expr::Constant(_) | Expr::Variable(_) | Expr::Parameter(_) => {}
            }
        }
    }

    /// Distinct variables referenced by this expression, in first-seen order.
    pub fn variables(&self) -> Vec<VariableData> {
        let mut seen = HashSet::new();
        let mut vars = Vec::new();
        self.visit(|node| {
            if let Expr::Variable(v) = node {
                if seen.insert((v.model, v.index)) {
                    vars.push(v.clone());
                }
            }
        });
        vars
    }

    /// Distinct parameters referenced by this expression, in first-seen order.
    pub fn parameters(&self) -> Vec<ParameterData> {
        let mut seen = HashSet::new();
        let mut params = Vec::new();
        self.visit(|node| {
            if let Expr::Parameter(p) = node {
                if seen.insert((p.model, p.index)) {
                    params.push(p.clone());
                }
            }
        });
        params
    }

    /// Number of distinct nodes reachable from this expression.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.visit(|_| count += 1);
        count
    }
}

/// Shared leaf that stands in for children moved out during drop.
fn placeholder() -> Arc<Expr> {
    static LEAF: OnceLock<Arc<Expr>> = OnceLock::new();
    LEAF.get_or_init(|| Arc::new(Expr::Constant(0.0))).clone()
}

/// Move the uniquely owned children of `node` onto `stack`.
fn detach_children(node: &mut Expr, stack: &mut Vec<Arc<Expr>>) {
    let mut take = |child: &mut Arc<Expr>| {
        if Arc::strong_count(child) == 1 {
            stack.push(std::mem::replace(child, placeholder()));
        }
    };
    match node {
        Expr::Unary(_, a) => take(a),
        Expr::Binary(_, a, b) => {
            take(a);
            take(b);
        }
        Expr::Constant(_) | Expr::Variable(_) | Expr::Parameter(_) => {}
    }
}

// Dropping a long chain releases it node by node from a heap stack instead of
// recursing through `Arc` destructors.
impl Drop for Expr {
    fn drop(&mut self) {
        let mut stack = Vec::new();
        detach_children(self, &mut stack);
        while let Some(child) = stack.pop() {
            if let Some(mut node) = Arc::into_inner(child) {
                detach_children(&mut node, &mut stack);
            }
        }
    }
}

enum Piece<'a> {
    Node(&'a Expr),
    Text(&'static str),
    Exponent(f64),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![Piece::Node(self)];
        while let Some(piece) = stack.pop() {
            let node = match piece {
                Piece::Text(s) => {
                    f.write_str(s)?;
                    continue;
                }
                Piece::Exponent(c) => {
                    write!(f, "^{c})")?;
                    continue;
                }
                Piece::Node(node) => node,
            };
            match node {
                Expr::Constant(v) => write!(f, "{v}")?,
                Expr::Variable(v) => match &v.name {
                    Some(name) => write!(f, "{name}")?,
                    None => write!(f, "x[{}]", v.index)?,
                },
                Expr::Parameter(p) => match &p.name {
                    Some(name) => write!(f, "{name}")?,
                    None => write!(f, "p[{}]", p.index)?,
                },
                Expr::Unary(UnaryOp::Neg, a) => {
                    f.write_str("(-")?;
                    stack.push(Piece::Text(")"));
                    stack.push(Piece::Node(a));
                }
                Expr::Unary(UnaryOp::Powf(c), a) => {
                    f.write_str("(")?;
                    stack.push(Piece::Exponent(*c));
                    stack.push(Piece::Node(a));
                }
                Expr::Unary(op, a) => {
                    write!(f, "{}(", op.name())?;
                    stack.push(Piece::Text(")"));
                    stack.push(Piece::Node(a));
                }
                Expr::Binary(op, a, b) => {
                    f.write_str("(")?;
                    stack.push(Piece::Text(")"));
                    stack.push(Piece::Node(b));
                    stack.push(Piece::Text(" "));
                    stack.push(Piece::Text(op.symbol()));
                    stack.push(Piece::Text(" "));
                    stack.push(Piece::Node(a));
                }
            }
        }
        Ok(())
    }
}
