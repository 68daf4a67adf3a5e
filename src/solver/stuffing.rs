//! Matrix stuffing: lowers a QP-shaped model to Clarabel's conic form.
//!
//! Clarabel solves
//!
//! ```text
//! min  1/2 x'Px + q'x
//! s.t. Ax + s = b,  s in K
//! ```
//!
//! For a model whose objective has degree <= 2 and whose constraints are
//! affine, a single evaluation at the origin gives everything: `q = ∇f(0)`,
//! `P = ∇²f`, and each constraint is `g(0) + J x`. Ranged rows are split into
//! the zero cone (equalities) and the nonnegative cone (one row per finite
//! bound).

use nalgebra_sparse::CscMatrix;

use super::problem::NlpProblem;
use crate::error::{NlpError, Result};
use crate::sparse::{csc_from_triplets, csc_transpose};

/// Cone dimensions for Clarabel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConeDims {
    /// Number of zero cone (equality) rows.
    pub zero: usize,
    /// Number of nonnegative cone rows.
    pub nonneg: usize,
}

impl ConeDims {
    /// Total number of constraint rows.
    pub fn total(&self) -> usize {
        self.zero + self.nonneg
    }
}

/// Where a row of `A` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrigin {
    /// `g_i(x) == lb_i`.
    Equality(usize),
    /// `g_i(x) <= ub_i`.
    Upper(usize),
    /// `g_i(x) >= lb_i`.
    Lower(usize),
    /// Fixed variable or a variable with equal bounds.
    VariableFixed(usize),
    /// `x_j <= ub_j`.
    VariableUpper(usize),
    /// `x_j >= lb_j`.
    VariableLower(usize),
}

/// Stuffed problem ready for Clarabel.
#[derive(Debug)]
pub struct StuffedProblem {
    /// Quadratic cost matrix P (n x n, upper triangle).
    pub p: CscMatrix<f64>,
    /// Linear cost vector q (n).
    pub q: Vec<f64>,
    /// Constraint matrix A (m x n).
    pub a: CscMatrix<f64>,
    /// Constraint vector b (m).
    pub b: Vec<f64>,
    /// Cone dimensions.
    pub cone_dims: ConeDims,
    /// Origin of each row of `A`, zero cone rows first.
    pub rows: Vec<RowOrigin>,
    /// Objective value at the origin.
    pub objective_offset: f64,
}

impl StuffedProblem {
    /// Constraint multipliers from Clarabel's dual `z`.
    ///
    /// An upper row contributes `+z`, a lower row `-z`, so the result follows
    /// the `f + Σ λ_i g_i` convention.
    pub fn constraint_multipliers(&self, z: &[f64], num_constraints: usize) -> Vec<f64> {
        let mut lambda = vec![0.0; num_constraints];
        for (origin, &zi) in self.rows.iter().zip(z) {
            match *origin {
                RowOrigin::Equality(i) | RowOrigin::Upper(i) => lambda[i] += zi,
                RowOrigin::Lower(i) => lambda[i] -= zi,
                RowOrigin::VariableFixed(_)
                | RowOrigin::VariableUpper(_)
                | RowOrigin::VariableLower(_) => {}
            }
        }
        lambda
    }
}

/// Accumulates rows of `A` in triplet form.
#[derive(Default)]
struct RowBuilder {
    rows: Vec<usize>,
    cols: Vec<usize>,
    vals: Vec<f64>,
    b: Vec<f64>,
    origins: Vec<RowOrigin>,
}

impl RowBuilder {
    fn push(&mut self, origin: RowOrigin, coeffs: impl IntoIterator<Item = (usize, f64)>, b: f64) {
        let row = self.b.len();
        for (col, val) in coeffs {
            self.rows.push(row);
            self.cols.push(col);
            self.vals.push(val);
        }
        self.b.push(b);
        self.origins.push(origin);
    }

    fn append(&mut self, other: RowBuilder) {
        let offset = self.b.len();
        self.rows.extend(other.rows.into_iter().map(|r| r + offset));
        self.cols.extend(other.cols);
        self.vals.extend(other.vals);
        self.b.extend(other.b);
        self.origins.extend(other.origins);
    }
}

/// Check that the model is a continuous QP with affine constraints.
fn check_qp_shape(problem: &NlpProblem<'_>) -> Result<()> {
    if !problem.integer_variables().is_empty() {
        return Err(NlpError::Solver(
            "Clarabel does not support integer variables".into(),
        ));
    }
    let degree = problem.objective_degree()?;
    if !degree.is_quadratic() {
        return Err(NlpError::Solver(format!(
            "Clarabel needs an objective of degree at most 2, got {degree:?}"
        )));
    }
    for (i, d) in problem.constraint_degrees()?.into_iter().enumerate() {
        if !d.is_affine() {
            return Err(NlpError::Solver(format!(
                "Clarabel needs affine constraints, constraint {i} has degree {d:?}"
            )));
        }
    }
    Ok(())
}

/// Build the stuffed problem from the model behind `problem`.
///
/// # Errors
///
/// `NlpError::Solver` if the model is not a continuous QP with affine
/// constraints. Evaluation errors at the origin are propagated.
pub fn stuff_problem(problem: &mut NlpProblem<'_>) -> Result<StuffedProblem> {
    check_qp_shape(problem)?;

    let n = problem.num_variables();
    let m = problem.num_constraints();
    let origin = vec![0.0; n];

    // Objective
    let objective_offset = problem.eval_objective(&origin)?;
    let q = problem.eval_objective_gradient(&origin)?;
    let hessian_entries = problem
        .eval_hessian_of_lagrangian(None, 1.0, &[])?
        .structure()
        .map(<[_]>::to_vec)
        .unwrap_or_default();
    let hessian_values = problem
        .eval_hessian_of_lagrangian(Some(&origin), 1.0, &vec![0.0; m])?
        .values()
        .map(<[_]>::to_vec)
        .unwrap_or_default();
    let lower = csc_from_triplets(
        n,
        n,
        hessian_entries.iter().map(|&(r, _)| r).collect(),
        hessian_entries.iter().map(|&(_, c)| c).collect(),
        hessian_values,
    );
    let p = csc_transpose(&lower);

    // Constraints
    let g0 = problem.eval_constraints(&origin)?;
    let jacobian_entries = problem
        .eval_jacobian(None)?
        .structure()
        .map(<[_]>::to_vec)
        .unwrap_or_default();
    let jacobian_values = problem
        .eval_jacobian(Some(&origin))?
        .values()
        .map(<[_]>::to_vec)
        .unwrap_or_default();
    let mut jacobian_rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); m];
    for (&(row, col), &val) in jacobian_entries.iter().zip(&jacobian_values) {
        jacobian_rows[row].push((col, val));
    }

    let bounds = problem.bounds();
    let mut zero = RowBuilder::default();
    let mut nonneg = RowBuilder::default();

    for (i, coeffs) in jacobian_rows.iter().enumerate() {
        let (lb, ub) = (bounds.constraint_lower[i], bounds.constraint_upper[i]);
        if lb == ub {
            zero.push(RowOrigin::Equality(i), coeffs.iter().copied(), lb - g0[i]);
            continue;
        }
        if ub.is_finite() {
            nonneg.push(RowOrigin::Upper(i), coeffs.iter().copied(), ub - g0[i]);
        }
        if lb.is_finite() {
            nonneg.push(
                RowOrigin::Lower(i),
                coeffs.iter().map(|&(c, v)| (c, -v)),
                g0[i] - lb,
            );
        }
    }

    for j in 0..n {
        let (lb, ub) = (bounds.variable_lower[j], bounds.variable_upper[j]);
        if lb == ub {
            zero.push(RowOrigin::VariableFixed(j), [(j, 1.0)], lb);
            continue;
        }
        if ub.is_finite() {
            nonneg.push(RowOrigin::VariableUpper(j), [(j, 1.0)], ub);
        }
        if lb.is_finite() {
            nonneg.push(RowOrigin::VariableLower(j), [(j, -1.0)], -lb);
        }
    }

    let cone_dims = ConeDims {
        zero: zero.b.len(),
        nonneg: nonneg.b.len(),
    };
    zero.append(nonneg);
    let a = csc_from_triplets(cone_dims.total(), n, zero.rows, zero.cols, zero.vals);

    tracing::debug!(
        component = "clarabel",
        operation = "stuff",
        variables = n,
        zero_rows = cone_dims.zero,
        nonneg_rows = cone_dims.nonneg,
        p_nnz = p.nnz(),
        a_nnz = a.nnz(),
        "problem stuffed"
    );

    Ok(StuffedProblem {
        p,
        q,
        a,
        b: zero.b,
        cone_dims,
        rows: zero.origins,
        objective_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintExt;
    use crate::model::Model;
    use crate::sparse::csc_to_dense;

    #[test]
    fn test_stuff_qp() {
        // min x^2 + x*y + 2y + 1  s.t.  x + y == 1, 0 <= x - y <= 3, y >= -5
        let mut model = Model::new();
        let x = model.new_variable().build().unwrap();
        let y = model.new_variable().lower(-5.0).build().unwrap();
        model
            .minimize(x.square() + &x * &y + 2.0 * &y + 1.0)
            .unwrap();
        model.subject_to((&x + &y).equals(1.0)).unwrap();
        model.add_constraint(&x - &y, 0.0, 3.0).unwrap();

        let mut problem = NlpProblem::new(&mut model).unwrap();
        let stuffed = stuff_problem(&mut problem).unwrap();

        assert_eq!(stuffed.objective_offset, 1.0);
        assert_eq!(stuffed.q, vec![0.0, 2.0]);
        let p = csc_to_dense(&stuffed.p);
        assert_eq!(p[(0, 0)], 2.0);
        assert_eq!(p[(0, 1)], 1.0);
        assert_eq!(p[(1, 0)], 0.0);

        assert_eq!(stuffed.cone_dims, ConeDims { zero: 1, nonneg: 3 });
        assert_eq!(
            stuffed.rows,
            vec![
                RowOrigin::Equality(0),
                RowOrigin::Upper(1),
                RowOrigin::Lower(1),
                RowOrigin::VariableLower(1),
            ]
        );
        assert_eq!(stuffed.b, vec![1.0, 3.0, 0.0, 5.0]);
        let a = csc_to_dense(&stuffed.a);
        assert_eq!(a.row(2).iter().copied().collect::<Vec<_>>(), vec![-1.0, 1.0]);
        assert_eq!(a.row(3).iter().copied().collect::<Vec<_>>(), vec![0.0, -1.0]);

        let lambda = stuffed.constraint_multipliers(&[0.5, 1.0, 0.25, 9.0], 2);
        assert_eq!(lambda, vec![0.5, 0.75]);
    }

    #[test]
    fn test_rejects_nonlinear_constraints() {
        let mut model = Model::new();
        let x = model.new_variable().build().unwrap();
        model.minimize(x.clone()).unwrap();
        model.add_le_constraint(x.exp(), 2.0).unwrap();
        let mut problem = NlpProblem::new(&mut model).unwrap();
        assert!(matches!(
            stuff_problem(&mut problem),
            Err(NlpError::Solver(_))
        ));
    }

    #[test]
    fn test_rejects_integer_variables() {
        let mut model = Model::new();
        let x = model.new_variable().integer().build().unwrap();
        model.minimize(x).unwrap();
        let mut problem = NlpProblem::new(&mut model).unwrap();
        assert!(stuff_problem(&mut problem).is_err());
    }
}
