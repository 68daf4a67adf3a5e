//! Sparsity patterns of the constraint Jacobian and the Hessian of the Lagrangian.
//!
//! Both patterns are computed once when a model is frozen, from the recorded
//! tapes and the structure reported by custom functions. Their order is part of the solver protocol: value arrays returned
//! during a solve are aligned with the entries listed here, so the builders are
//! deterministic and never reorder.

use std::collections::HashMap;

use nalgebra_sparse::CscMatrix;

use crate::error::{NlpError, Result};
use crate::sparse::csc_from_triplets;
use crate::tape::Tape;

/// Ordered set of `(row, col)` positions of a sparse matrix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SparsityPattern {
    nrows: usize,
    ncols: usize,
    entries: Vec<(usize, usize)>,
    positions: HashMap<(usize, usize), usize>,
}

impl SparsityPattern {
    /// Empty pattern for an `nrows x ncols` matrix.
    pub fn new(nrows: usize, ncols: usize) -> Self {
        SparsityPattern {
            nrows,
            ncols,
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Insert an entry if not present and return its position.
    pub fn insert(&mut self, row: usize, col: usize) -> usize {
        if let Some(&pos) = self.positions.get(&(row, col)) {
            return pos;
        }
        let pos = self.entries.len();
        self.entries.push((row, col));
        self.positions.insert((row, col), pos);
        pos
    }

    /// Position of an entry in value arrays.
    pub fn position(&self, row: usize, col: usize) -> Option<usize> {
        self.positions.get(&(row, col)).copied()
    }

    /// Entries in order.
    pub fn entries(&self) -> &[(usize, usize)] {
        &self.entries
    }

    /// Row index of each entry.
    pub fn rows(&self) -> Vec<usize> {
        self.entries.iter().map(|&(r, _)| r).collect()
    }

    /// Column index of each entry.
    pub fn cols(&self) -> Vec<usize> {
        self.entries.iter().map(|&(_, c)| c).collect()
    }

    /// Number of structural nonzeros.
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Build a CSC matrix from values aligned with the entries.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if `values` does not have one value per entry.
    pub fn to_csc(&self, values: &[f64]) -> Result<CscMatrix<f64>> {
        if values.len() != self.nnz() {
            return Err(NlpError::dimension("pattern values", self.nnz(), values.len()));
        }
        Ok(csc_from_triplets(
            self.nrows,
            self.ncols,
            self.rows(),
            self.cols(),
            values.to_vec(),
        ))
    }
}

/// Hessian-of-the-Lagrangian pattern plus where each expression's pairs land in it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HessianLayout {
    /// Lower-triangular pattern (`row >= col`).
    pub pattern: SparsityPattern,
    /// Pattern position of each objective Hessian pair.
    pub objective: Vec<usize>,
    /// Pattern position of each Hessian pair, per constraint.
    pub constraints: Vec<Vec<usize>>,
}

/// Structural nonzeros of one function's gradient and Hessian.
pub trait DerivativeStructure {
    /// Variables with a gradient entry, in the order gradient values are produced.
    fn gradient_columns(&self) -> &[usize];

    /// Hessian pairs with `row >= col` in model indices, in value order.
    fn hessian_pairs(&self) -> Vec<(usize, usize)>;
}

impl DerivativeStructure for Tape {
    fn gradient_columns(&self) -> &[usize] {
        self.inputs()
    }

    fn hessian_pairs(&self) -> Vec<(usize, usize)> {
        self.hessian_structure()
    }
}

/// Jacobian pattern of the constraints.
///
/// Row `i` is constraint `i`; its columns are the constraint's gradient
/// columns in order (first-seen order for recorded expressions).
pub fn build_jacobian_pattern<S: DerivativeStructure + ?Sized>(
    num_variables: usize,
    constraints: &[&S],
) -> SparsityPattern {
    let mut pattern = SparsityPattern::new(constraints.len(), num_variables);
    for (row, c) in constraints.iter().enumerate() {
        for &col in c.gradient_columns() {
            pattern.insert(row, col);
        }
    }
    pattern
}

/// Hessian pattern of the Lagrangian.
///
/// Objective pairs come first, then each constraint's pairs in constraint
/// order. Pairs are lower triangular in model indices and each appears once.
pub fn build_hessian_pattern<S: DerivativeStructure + ?Sized>(
    num_variables: usize,
    objective: &S,
    constraints: &[&S],
) -> HessianLayout {
    let mut pattern = SparsityPattern::new(num_variables, num_variables);
    let mut place = |f: &S| -> Vec<usize> {
        f.hessian_pairs()
            .into_iter()
            .map(|(r, c)| pattern.insert(r, c))
            .collect()
    };
    let objective = place(objective);
    let constraints = constraints.iter().map(|t| place(*t)).collect();
    HessianLayout {
        pattern,
        objective,
        constraints,
    }
}
