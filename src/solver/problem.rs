//! The callback surface a nonlinear solver drives.
//!
//! [`NlpProblem`] presents a frozen model in minimization form:
//!
//! ```text
//! min  s * f(x)        s = 1 for minimize, -1 for maximize
//! s.t. gl <= g(x) <= gu
//!      xl <=   x  <= xu
//! ```
//!
//! Every `eval_*` call takes the point it is evaluated at. Results computed at
//! the current point are kept, so a solver asking for the objective, its
//! gradient, the constraints, the Jacobian and the Hessian at one iterate runs
//! each sweep once. Sparse results come back as values aligned with the
//! structure returned when the point is `None`.

use crate::error::{NlpError, Result};
use crate::eval::Level;
use crate::model::{CompiledModel, Model, Row};
use crate::sparsity::DerivativeStructure;
use crate::tape::Degree;

use super::solution::SolveStatus;

/// Variable and constraint bounds as seen by the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    /// Lower bound of each variable (fixed variables report their value).
    pub variable_lower: Vec<f64>,
    /// Upper bound of each variable (fixed variables report their value).
    pub variable_upper: Vec<f64>,
    /// Lower bound of each constraint.
    pub constraint_lower: Vec<f64>,
    /// Upper bound of each constraint.
    pub constraint_upper: Vec<f64>,
}

/// Result of a sparse callback.
#[derive(Debug, Clone, PartialEq)]
pub enum SparseEval<'a> {
    /// `(row, col)` of each structural entry.
    Structure(&'a [(usize, usize)]),
    /// One value per structural entry, in the same order.
    Values(Vec<f64>),
}

impl SparseEval<'_> {
    /// The values, if this is a value result.
    pub fn values(&self) -> Option<&[f64]> {
        match self {
            SparseEval::Values(v) => Some(v),
            SparseEval::Structure(_) => None,
        }
    }

    /// The structure, if this is a structure result.
    pub fn structure(&self) -> Option<&[(usize, usize)]> {
        match self {
            SparseEval::Structure(s) => Some(s),
            SparseEval::Values(_) => None,
        }
    }
}

/// A frozen model borrowed for the duration of a solve.
pub struct NlpProblem<'m> {
    model: &'m mut Model,
    params: Vec<f64>,
    point: Vec<f64>,
    has_point: bool,
    sign: f64,
}

fn not_frozen() -> NlpError {
    NlpError::InvalidModel("the model must be frozen before it is solved".into())
}

/// Log a domain error on its way to the solver.
fn surface(err: NlpError) -> NlpError {
    if err.is_domain() {
        tracing::warn!(component = "solver", error = %err, "evaluation failed at solver point");
    }
    err
}

impl<'m> NlpProblem<'m> {
    /// Freeze `model` (if needed) and wrap it.
    ///
    /// Parameter values are read once here; they cannot change while the
    /// problem holds the model.
    pub fn new(model: &'m mut Model) -> Result<Self> {
        model.freeze()?;
        let n = model.num_variables();
        Ok(NlpProblem {
            params: model.parameter_values(),
            point: vec![0.0; n],
            has_point: false,
            sign: model.objective().sign(),
            model,
        })
    }

    /// The model being solved.
    pub fn model(&self) -> &Model {
        self.model
    }

    /// Number of variables.
    pub fn num_variables(&self) -> usize {
        self.model.num_variables()
    }

    /// Number of constraints.
    pub fn num_constraints(&self) -> usize {
        self.model.num_constraints()
    }

    /// `1` if the model minimizes, `-1` if the objective was negated.
    pub fn objective_sign(&self) -> f64 {
        self.sign
    }

    /// Variable and constraint bounds.
    pub fn bounds(&self) -> Bounds {
        let (variable_lower, variable_upper) = self
            .model
            .variables
            .iter()
            .map(|v| v.solver_bounds())
            .unzip();
        let (constraint_lower, constraint_upper) =
            self.model.constraints.iter().map(Row::bounds).unzip();
        Bounds {
            variable_lower,
            variable_upper,
            constraint_lower,
            constraint_upper,
        }
    }

    /// Initial value of every variable.
    pub fn starting_point(&self) -> Vec<f64> {
        self.model.variables.iter().map(|v| v.init).collect()
    }

    /// Indices of variables the solver must treat as integral.
    pub fn integer_variables(&self) -> Vec<usize> {
        self.model
            .variables
            .iter()
            .enumerate()
            .filter(|(_, v)| v.kind.is_integral())
            .map(|(i, _)| i)
            .collect()
    }

    /// Polynomial degree of the objective.
    pub fn objective_degree(&self) -> Result<Degree> {
        Ok(self.compiled()?.objective.degree())
    }

    /// Polynomial degree of each constraint.
    pub fn constraint_degrees(&self) -> Result<Vec<Degree>> {
        Ok(self
            .compiled()?
            .constraints
            .iter()
            .map(|c| c.degree())
            .collect())
    }

    fn compiled(&self) -> Result<&CompiledModel> {
        self.model.compiled.as_ref().ok_or_else(not_frozen)
    }

    /// Move to `x`, dropping cached results if it differs from the current point.
    fn prepare(&mut self, x: &[f64]) -> Result<()> {
        if x.len() != self.point.len() {
            return Err(NlpError::dimension("point", self.point.len(), x.len()));
        }
        let compiled = self.model.compiled.as_mut().ok_or_else(not_frozen)?;
        let same = self.has_point
            && self
                .point
                .iter()
                .zip(x)
                .all(|(a, b)| a.to_bits() == b.to_bits());
        if !same {
            self.point.copy_from_slice(x);
            self.has_point = true;
            compiled.invalidate();
        }
        Ok(())
    }

    /// Objective value in minimization form.
    pub fn eval_objective(&mut self, x: &[f64]) -> Result<f64> {
        let sign = self.sign;
        self.prepare(x)?;
        let compiled = self.model.compiled.as_mut().ok_or_else(not_frozen)?;
        compiled
            .ensure_objective(Level::Value, &self.point, &self.params)
            .map_err(surface)?;
        Ok(sign * compiled.objective.cached_value())
    }

    /// Dense objective gradient in minimization form.
    pub fn eval_objective_gradient(&mut self, x: &[f64]) -> Result<Vec<f64>> {
        let sign = self.sign;
        let n = self.point.len();
        self.prepare(x)?;
        let compiled = self.model.compiled.as_mut().ok_or_else(not_frozen)?;
        compiled
            .ensure_objective(Level::Gradient, &self.point, &self.params)
            .map_err(surface)?;

        let mut grad = vec![0.0; n];
        let objective = &compiled.objective;
        for (&i, &g) in objective
            .gradient_columns()
            .iter()
            .zip(objective.cached_gradient())
        {
            grad[i] += sign * g;
        }
        Ok(grad)
    }

    /// Value of every constraint body.
    pub fn eval_constraints(&mut self, x: &[f64]) -> Result<Vec<f64>> {
        self.prepare(x)?;
        let compiled = self.model.compiled.as_mut().ok_or_else(not_frozen)?;
        compiled
            .ensure_constraints(Level::Value, &self.point, &self.params, None)
            .map_err(surface)?;
        Ok(compiled.constraints.iter().map(|c| c.cached_value()).collect())
    }

    /// Constraint Jacobian: its structure for `None`, its values at `x` otherwise.
    pub fn eval_jacobian(&mut self, x: Option<&[f64]>) -> Result<SparseEval<'_>> {
        let Some(x) = x else {
            let compiled = self.compiled()?;
            return Ok(SparseEval::Structure(compiled.jacobian.entries()));
        };
        self.prepare(x)?;
        let compiled = self.model.compiled.as_mut().ok_or_else(not_frozen)?;
        compiled
            .ensure_constraints(Level::Gradient, &self.point, &self.params, None)
            .map_err(surface)?;

        // Each row lists its constraint's gradient columns in value order, so
        // the gradients concatenate into pattern order.
        let mut values = Vec::with_capacity(compiled.jacobian.nnz());
        for c in &compiled.constraints {
            values.extend_from_slice(c.cached_gradient());
        }
        Ok(SparseEval::Values(values))
    }

    /// Lower triangle of `obj_weight * s * ∇²f + Σ multipliers[i] * ∇²g_i`.
    ///
    /// `None` gives the structure. Constraints with a zero multiplier are not
    /// evaluated, and neither is the objective when `obj_weight` is zero.
    pub fn eval_hessian_of_lagrangian(
        &mut self,
        x: Option<&[f64]>,
        obj_weight: f64,
        multipliers: &[f64],
    ) -> Result<SparseEval<'_>> {
        let m = self.num_constraints();
        let Some(x) = x else {
            let compiled = self.compiled()?;
            return Ok(SparseEval::Structure(compiled.hessian.pattern.entries()));
        };
        if multipliers.len() != m {
            return Err(NlpError::dimension("multipliers", m, multipliers.len()));
        }
        let sign = self.sign;
        self.prepare(x)?;
        let compiled = self.model.compiled.as_mut().ok_or_else(not_frozen)?;

        let mut values = vec![0.0; compiled.hessian.pattern.nnz()];
        if obj_weight != 0.0 {
            compiled
                .ensure_objective(Level::Hessian, &self.point, &self.params)
                .map_err(surface)?;
            let w = obj_weight * sign;
            for (&pos, &h) in compiled
                .hessian
                .objective
                .iter()
                .zip(compiled.objective.cached_hessian())
            {
                values[pos] += w * h;
            }
        }

        compiled
            .ensure_constraints(Level::Hessian, &self.point, &self.params, Some(multipliers))
            .map_err(surface)?;
        for (i, (c, positions)) in compiled
            .constraints
            .iter()
            .zip(&compiled.hessian.constraints)
            .enumerate()
        {
            let lambda = multipliers[i];
            if lambda == 0.0 {
                continue;
            }
            for (&pos, &h) in positions.iter().zip(c.cached_hessian()) {
                values[pos] += lambda * h;
            }
        }

        tracing::trace!(
            component = "solver",
            operation = "hessian",
            nnz = values.len(),
            "hessian of the lagrangian evaluated"
        );
        Ok(SparseEval::Values(values))
    }

    /// Record the final point and status in the model.
    ///
    /// Variable values are overwritten with `x`. The objective value is stored
    /// in the model's own sense; it is left empty if the objective cannot be
    /// evaluated at `x`.
    pub fn report_solution(&mut self, x: &[f64], status: SolveStatus) -> Result<()> {
        let n = self.num_variables();
        if x.len() != n {
            return Err(NlpError::dimension("solution", n, x.len()));
        }
        let value = match self.eval_objective(x) {
            Ok(v) => Some(self.sign * v),
            Err(err) => {
                tracing::warn!(component = "solver", error = %err, "objective undefined at reported solution");
                None
            }
        };
        for (v, &xi) in self.model.variables.iter_mut().zip(x) {
            v.value = xi;
        }
        let solution = &mut self.model.solution;
        solution.status = status;
        solution.value = value;
        solution.primal = x.to_vec();
        Ok(())
    }

    /// Record constraint multipliers.
    ///
    /// Multipliers follow the minimization form: at a solution
    /// `s * ∇f + Σ λ_i ∇g_i` is balanced by the variable bound multipliers.
    pub fn report_multipliers(&mut self, multipliers: &[f64]) -> Result<()> {
        let m = self.num_constraints();
        if multipliers.len() != m {
            return Err(NlpError::dimension("multipliers", m, multipliers.len()));
        }
        self.model.solution.dual = Some(multipliers.to_vec());
        Ok(())
    }

    /// Record the number of iterations the solver took.
    pub fn report_iterations(&mut self, iterations: u32) {
        self.model.solution.iterations = iterations;
    }
}
