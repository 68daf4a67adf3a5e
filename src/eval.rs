//! Derivative evaluation for single expressions.
//!
//! [`ExprEvaluator`] records an expression once and then evaluates its value,
//! sparse gradient and exact sparse Hessian at any number of points. Results
//! computed at the current point are kept, so asking for the gradient after the
//! value only runs the reverse sweep.
//!
//! ```
//! use nlprust::prelude::*;
//!
//! let mut model = Model::new();
//! let x = model.new_variable().build().unwrap();
//! let y = model.new_variable().build().unwrap();
//!
//! let d = nlprust::eval::evaluate(&(&x * &y + x.sin()), &[0.0, 2.0]).unwrap();
//! assert_eq!(d.value, 0.0);
//! assert_eq!(d.gradient, vec![(0, 3.0), (1, 0.0)]);
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use nalgebra::DMatrix;

use crate::constraints::CustomConstraint;
use crate::error::{EvalTarget, NlpError, Result};
use crate::expr::Expr;
use crate::tape::{Tape, Workspace};

/// Value and derivatives of one expression at one point.
///
/// Indices are model variable indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Derivatives {
    /// Expression value.
    pub value: f64,
    /// `(variable, df/dx)` for every variable the expression references, in first-seen order.
    pub gradient: Vec<(usize, f64)>,
    /// `((row, col), d2f/dx_row dx_col)` for each structural pair with `row >= col`.
    pub hessian: Vec<((usize, usize), f64)>,
}

impl Derivatives {
    /// Gradient scattered into a dense vector of length `n`.
    pub fn dense_gradient(&self, n: usize) -> Vec<f64> {
        let mut g = vec![0.0; n];
        for &(i, v) in &self.gradient {
            if i < n {
                g[i] += v;
            }
        }
        g
    }

    /// Full symmetric Hessian as an `n x n` matrix.
    pub fn dense_hessian(&self, n: usize) -> DMatrix<f64> {
        let mut h = DMatrix::zeros(n, n);
        for &((r, c), v) in &self.hessian {
            if r < n && c < n {
                h[(r, c)] = v;
                h[(c, r)] = v;
            }
        }
        h
    }
}

/// How far the cached results at the current point go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Level {
    Stale,
    Value,
    Gradient,
    Hessian,
}

/// A recorded expression with its own evaluation buffers.
#[derive(Debug, Clone)]
pub struct ExprEvaluator {
    tape: Tape,
    workspace: Workspace,
    hessian_structure: Vec<(usize, usize)>,
    value: f64,
    gradient: Vec<f64>,
    hessian: Vec<f64>,
    level: Level,
}

impl ExprEvaluator {
    /// Record `expr` and allocate buffers.
    pub fn new(expr: &Expr) -> Result<Self> {
        Ok(Self::from_tape(Tape::record(expr)?))
    }

    /// Wrap an already recorded tape.
    pub fn from_tape(tape: Tape) -> Self {
        let workspace = Workspace::new(&tape);
        let hessian_structure = tape.hessian_structure();
        ExprEvaluator {
            gradient: vec![0.0; tape.num_inputs()],
            hessian: vec![0.0; tape.hessian_nnz()],
            tape,
            workspace,
            hessian_structure,
            value: 0.0,
            level: Level::Stale,
        }
    }

    /// The recorded tape.
    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    /// Structural Hessian pairs in model indices, `row >= col`.
    pub fn hessian_structure(&self) -> &[(usize, usize)] {
        &self.hessian_structure
    }

    /// Value at `point`.
    pub fn value(&mut self, point: &[f64], params: &[f64]) -> Result<f64> {
        self.invalidate();
        self.ensure(Level::Value, point, params)?;
        Ok(self.value)
    }

    /// Value and sparse gradient at `point`.
    pub fn gradient(&mut self, point: &[f64], params: &[f64]) -> Result<(f64, Vec<(usize, f64)>)> {
        self.invalidate();
        self.ensure(Level::Gradient, point, params)?;
        Ok((self.value, self.sparse_gradient()))
    }

    /// Value, sparse gradient and sparse Hessian at `point`.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if `point` or `params` is too short, `Domain` if the
    /// expression or one of its derivatives is undefined at `point`.
    pub fn evaluate(&mut self, point: &[f64], params: &[f64]) -> Result<Derivatives> {
        self.invalidate();
        self.ensure(Level::Hessian, point, params)?;
        tracing::trace!(
            component = "eval",
            operation = "evaluate",
            nodes = self.tape.len(),
            hessian_nnz = self.hessian.len(),
            "expression evaluated"
        );
        Ok(Derivatives {
            value: self.value,
            gradient: self.sparse_gradient(),
            hessian: self
                .hessian_structure
                .iter()
                .copied()
                .zip(self.hessian.iter().copied())
                .collect(),
        })
    }

    /// Full symmetric Hessian at `point` as a dense `point.len() x point.len()` matrix.
    pub fn dense_hessian(&mut self, point: &[f64], params: &[f64]) -> Result<DMatrix<f64>> {
        Ok(self.evaluate(point, params)?.dense_hessian(point.len()))
    }

    pub(crate) fn invalidate(&mut self) {
        self.level = Level::Stale;
    }

    /// Bring the cached results up to `level` at `point`.
    ///
    /// The caller guarantees that `point` and `params` have not changed since
    /// the last call unless [`invalidate`](Self::invalidate) was called.
    pub(crate) fn ensure(&mut self, level: Level, point: &[f64], params: &[f64]) -> Result<()> {
        if self.level >= level {
            return Ok(());
        }
        if self.level < Level::Value {
            self.value = self.tape.forward(point, params, &mut self.workspace)?;
            self.level = Level::Value;
        }
        if level >= Level::Gradient && self.level < Level::Gradient {
            self.tape.reverse(&mut self.workspace)?;
            self.tape.gradient_into(&self.workspace, &mut self.gradient);
            self.level = Level::Gradient;
        }
        if level >= Level::Hessian && self.level < Level::Hessian {
            self.tape.hessian_into(&mut self.workspace, &mut self.hessian)?;
            self.level = Level::Hessian;
        }
        Ok(())
    }

    pub(crate) fn cached_value(&self) -> f64 {
        self.value
    }

    /// Gradient per local slot, aligned with `tape().inputs()`.
    pub(crate) fn cached_gradient(&self) -> &[f64] {
        &self.gradient
    }

    /// Hessian values aligned with `hessian_structure()`.
    pub(crate) fn cached_hessian(&self) -> &[f64] {
        &self.hessian
    }

    fn sparse_gradient(&self) -> Vec<(usize, f64)> {
        self.tape
            .inputs()
            .iter()
            .copied()
            .zip(self.gradient.iter().copied())
            .collect()
    }
}

/// A [`CustomConstraint`] with its structure read once and its own buffers.
///
/// One call to the function fills the value, the gradient and the Hessian, so
/// every level is reached at once.
#[derive(Debug, Clone)]
pub(crate) struct CustomEvaluator {
    function: Arc<dyn CustomConstraint>,
    columns: Vec<usize>,
    hessian_structure: Vec<(usize, usize)>,
    value: f64,
    gradient: Vec<f64>,
    hessian: Vec<f64>,
    fresh: bool,
}

impl CustomEvaluator {
    /// Read the structure of `function` and check it against `num_variables`.
    ///
    /// # Errors
    ///
    /// `UnregisteredVariable` for an index past the last variable and
    /// `InvalidModel` for a gradient column listed twice.
    pub(crate) fn new(function: Arc<dyn CustomConstraint>, num_variables: usize) -> Result<Self> {
        let columns = function.gradient_columns();
        let entries = function.hessian_entries();
        let out_of_range = columns
            .iter()
            .chain(entries.iter().flat_map(|(r, c)| [r, c]))
            .find(|&&i| i >= num_variables);
        if let Some(&index) = out_of_range {
            return Err(NlpError::UnregisteredVariable {
                kind: "variable",
                index,
                reason: format!(
                    "{} refers to it but the model has {num_variables} variables",
                    function.name()
                ),
            });
        }
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|&&c| !seen.insert(c)) {
            return Err(NlpError::InvalidModel(format!(
                "{} lists gradient column {dup} twice",
                function.name()
            )));
        }

        let hessian_structure = entries
            .into_iter()
            .map(|(r, c)| if r >= c { (r, c) } else { (c, r) })
            .collect::<Vec<_>>();
        Ok(CustomEvaluator {
            gradient: vec![0.0; columns.len()],
            hessian: vec![0.0; hessian_structure.len()],
            function,
            columns,
            hessian_structure,
            value: 0.0,
            fresh: false,
        })
    }

    /// Variables with a gradient entry, in value order.
    pub(crate) fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Hessian pairs with `row >= col`, in value order.
    pub(crate) fn hessian_structure(&self) -> &[(usize, usize)] {
        &self.hessian_structure
    }

    pub(crate) fn invalidate(&mut self) {
        self.fresh = false;
    }

    /// Evaluate at `point` unless the results are already current.
    ///
    /// # Errors
    ///
    /// Whatever the function returns, and `Domain` if it produces a non-finite
    /// value or derivative.
    pub(crate) fn ensure(&mut self, point: &[f64]) -> Result<()> {
        if self.fresh {
            return Ok(());
        }
        self.gradient.fill(0.0);
        self.hessian.fill(0.0);
        let value = self
            .function
            .evaluate(point, &mut self.gradient, &mut self.hessian)?;
        let bad = if !value.is_finite() {
            Some("value")
        } else if !self.gradient.iter().all(|g| g.is_finite()) {
            Some("gradient")
        } else if !self.hessian.iter().all(|h| h.is_finite()) {
            Some("hessian")
        } else {
            None
        };
        if let Some(what) = bad {
            return Err(NlpError::Domain {
                target: EvalTarget::Expression,
                entry: 0,
                op: "custom",
                reason: format!("{} returned a non-finite {what}", self.function.name()),
            });
        }
        self.value = value;
        self.fresh = true;
        Ok(())
    }

    pub(crate) fn cached_value(&self) -> f64 {
        self.value
    }

    pub(crate) fn cached_gradient(&self) -> &[f64] {
        &self.gradient
    }

    pub(crate) fn cached_hessian(&self) -> &[f64] {
        &self.hessian
    }
}

/// Record `expr` and evaluate it once at `point`.
///
/// Expressions containing parameters need [`ExprEvaluator::evaluate`] with
/// explicit parameter values.
pub fn evaluate(expr: &Expr, point: &[f64]) -> Result<Derivatives> {
    ExprEvaluator::new(expr)?.evaluate(point, &[])
}
