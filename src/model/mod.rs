//! The model: registry of variables, parameters, constraints and the objective.
//!
//! A model is built in two phases. While it is open, variables, parameters and
//! constraints can be added and the objective replaced. [`Model::freeze`]
//! records every expression once and computes both sparsity patterns; from
//! then on the structure is fixed and only values (bounds, starting point,
//! parameter values) may change.
//!
//! ```
//! use nlprust::prelude::*;
//!
//! let mut model = Model::new();
//! let x = model.new_variable().name("x").build().unwrap();
//! let y = model.new_variable().name("y").build().unwrap();
//!
//! model.minimize(x.square() + y.square()).unwrap();
//! model.subject_to((&x + &y).equals(1.0)).unwrap();
//! model.freeze().unwrap();
//!
//! assert_eq!(model.num_variables(), 2);
//! assert_eq!(model.hessian_pattern().unwrap().entries(), &[(0, 0), (1, 1)]);
//! ```

mod compiled;
mod handle;

use std::fmt;
use std::sync::Arc;

use crate::constraints::{Constraint, CustomConstraint};
use crate::error::{NlpError, Result};
use crate::eval::ExprEvaluator;
use crate::expr::{
    Expr, IntoExpr, ModelId, Parameter, ParameterData, Variable, VariableBuilder, VariableData,
    VariableKind,
};
use crate::solver::{NlpProblem, NlpSolver, Solution, SolveStatus};
use crate::sparsity::SparsityPattern;

use compiled::Body;
pub(crate) use compiled::{CompiledModel, Row};
pub use handle::{ParameterRef, VariableRef};

/// Objective type for optimization models.
#[derive(Debug, Clone)]
pub enum Objective {
    /// Minimize the expression.
    Minimize(Expr),
    /// Maximize the expression (presented to solvers as minimizing its negation).
    Maximize(Expr),
}

impl Objective {
    /// Get the expression being optimized.
    pub fn expr(&self) -> &Expr {
        match self {
            Objective::Minimize(e) | Objective::Maximize(e) => e,
        }
    }

    /// Check if this is a minimization.
    pub fn is_minimize(&self) -> bool {
        matches!(self, Objective::Minimize(_))
    }

    /// Factor turning the objective into minimization form.
    pub fn sign(&self) -> f64 {
        if self.is_minimize() {
            1.0
        } else {
            -1.0
        }
    }
}

impl Default for Objective {
    fn default() -> Self {
        Objective::Minimize(Expr::Constant(0.0))
    }
}

/// A nonlinear optimization model.
#[derive(Debug, Clone)]
pub struct Model {
    id: ModelId,
    pub(crate) variables: Vec<Variable>,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) constraints: Vec<Row>,
    pub(crate) objective: Objective,
    custom_objective: Option<Arc<dyn CustomConstraint>>,
    pub(crate) compiled: Option<CompiledModel>,
    pub(crate) solution: Solution,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

fn check_bounds(lb: f64, ub: f64, context: impl FnOnce() -> String) -> Result<()> {
    if lb.is_nan() || ub.is_nan() || lb > ub {
        return Err(NlpError::InvalidBounds {
            lb,
            ub,
            context: context(),
        });
    }
    Ok(())
}

fn check_binary_bounds(index: usize, lb: f64, ub: f64) -> Result<()> {
    if lb < 0.0 || ub > 1.0 {
        return Err(NlpError::InvalidBounds {
            lb,
            ub,
            context: format!("binary variable {index} (must lie within [0, 1])"),
        });
    }
    Ok(())
}

impl Model {
    /// Create an empty model.
    pub fn new() -> Self {
        Model {
            id: ModelId::new(),
            variables: Vec::new(),
            parameters: Vec::new(),
            constraints: Vec::new(),
            objective: Objective::default(),
            custom_objective: None,
            compiled: None,
            solution: Solution::default(),
        }
    }

    /// Identifier stamped into every leaf this model creates.
    pub fn id(&self) -> ModelId {
        self.id
    }

    fn ensure_open(&self, action: &'static str) -> Result<()> {
        if self.is_frozen() {
            Err(NlpError::ModelFrozen(action))
        } else {
            Ok(())
        }
    }

    // ---- Structure ----

    /// Start building a variable.
    pub fn new_variable(&mut self) -> VariableBuilder<'_> {
        VariableBuilder::new(self)
    }

    /// Register a variable and return its expression leaf.
    ///
    /// # Errors
    ///
    /// `InvalidBounds` if `lb > ub`, a bound is NaN, or a binary variable's
    /// bounds leave `[0, 1]`. `ModelFrozen` once the model is frozen.
    pub fn add_variable(&mut self, lb: f64, ub: f64, init: f64, kind: VariableKind) -> Result<Expr> {
        self.register_variable(None, lb, ub, init, kind)
    }

    pub(crate) fn register_variable(
        &mut self,
        name: Option<String>,
        lb: f64,
        ub: f64,
        init: f64,
        kind: VariableKind,
    ) -> Result<Expr> {
        self.ensure_open("add a variable")?;
        let index = self.variables.len();
        check_bounds(lb, ub, || format!("variable {index}"))?;
        if kind == VariableKind::Binary {
            check_binary_bounds(index, lb, ub)?;
        }

        let name: Option<Arc<str>> = name.map(Arc::from);
        self.variables.push(Variable {
            name: name.clone(),
            lb,
            ub,
            init,
            value: init,
            kind,
            fixed: false,
        });
        Ok(Expr::Variable(VariableData {
            model: self.id,
            index,
            name,
        }))
    }

    /// Register a parameter and return its expression leaf.
    pub fn add_parameter(&mut self, value: f64, name: Option<&str>) -> Result<Expr> {
        self.ensure_open("add a parameter")?;
        let index = self.parameters.len();
        let name: Option<Arc<str>> = name.map(Arc::from);
        self.parameters.push(Parameter {
            name: name.clone(),
            value,
        });
        Ok(Expr::Parameter(ParameterData {
            model: self.id,
            index,
            name,
        }))
    }

    /// Add the constraint `lb <= body <= ub` and return its index.
    ///
    /// # Errors
    ///
    /// `InvalidBounds` if `lb > ub` or a bound is NaN, `UnregisteredVariable`
    /// if `body` references a leaf this model does not own, `ModelFrozen` once
    /// the model is frozen.
    pub fn add_constraint(&mut self, body: impl IntoExpr, lb: f64, ub: f64) -> Result<usize> {
        self.ensure_open("add a constraint")?;
        let body = body.into_expr();
        let index = self.constraints.len();
        check_bounds(lb, ub, || format!("constraint {index}"))?;
        handle::check_references(self, &body)?;
        self.constraints.push(Row::Expr(Constraint::new(body, lb, ub)));
        Ok(index)
    }

    /// Add the constraint `lb <= function <= ub` and return its index.
    ///
    /// Column indices reported by `function` are checked at [`freeze`](Self::freeze).
    pub fn add_custom_constraint(
        &mut self,
        function: impl CustomConstraint + 'static,
        lb: f64,
        ub: f64,
    ) -> Result<usize> {
        self.ensure_open("add a constraint")?;
        let index = self.constraints.len();
        check_bounds(lb, ub, || format!("constraint {index}"))?;
        self.constraints.push(Row::Custom {
            function: Arc::new(function),
            lb,
            ub,
        });
        Ok(index)
    }

    /// Add `body == value`.
    pub fn add_eq_constraint(&mut self, body: impl IntoExpr, value: f64) -> Result<usize> {
        self.add_constraint(body, value, value)
    }

    /// Add `body <= ub`.
    pub fn add_le_constraint(&mut self, body: impl IntoExpr, ub: f64) -> Result<usize> {
        self.add_constraint(body, f64::NEG_INFINITY, ub)
    }

    /// Add `body >= lb`.
    pub fn add_ge_constraint(&mut self, body: impl IntoExpr, lb: f64) -> Result<usize> {
        self.add_constraint(body, lb, f64::INFINITY)
    }

    /// Add a constraint built with [`ConstraintExt`](crate::constraints::ConstraintExt).
    pub fn subject_to(&mut self, constraint: Constraint) -> Result<usize> {
        self.add_constraint(constraint.body, constraint.lb, constraint.ub)
    }

    /// Set the objective to minimize `expr`.
    pub fn set_objective(&mut self, expr: impl IntoExpr) -> Result<()> {
        self.minimize(expr)
    }

    /// Set the objective to minimize `expr`.
    pub fn minimize(&mut self, expr: impl IntoExpr) -> Result<()> {
        let expr = expr.into_expr();
        self.replace_objective(Objective::Minimize(expr))
    }

    /// Set the objective to maximize `expr`.
    pub fn maximize(&mut self, expr: impl IntoExpr) -> Result<()> {
        let expr = expr.into_expr();
        self.replace_objective(Objective::Maximize(expr))
    }

    /// Set the objective to minimize a function with its own derivatives.
    pub fn minimize_custom(&mut self, function: impl CustomConstraint + 'static) -> Result<()> {
        self.replace_objective(Objective::Minimize(Expr::Constant(0.0)))?;
        self.custom_objective = Some(Arc::new(function));
        Ok(())
    }

    /// Set the objective to maximize a function with its own derivatives.
    pub fn maximize_custom(&mut self, function: impl CustomConstraint + 'static) -> Result<()> {
        self.replace_objective(Objective::Maximize(Expr::Constant(0.0)))?;
        self.custom_objective = Some(Arc::new(function));
        Ok(())
    }

    fn replace_objective(&mut self, objective: Objective) -> Result<()> {
        self.ensure_open("set the objective")?;
        handle::check_references(self, objective.expr())?;
        self.objective = objective;
        self.custom_objective = None;
        Ok(())
    }

    /// Check if the objective is a [`CustomConstraint`].
    pub fn has_custom_objective(&self) -> bool {
        self.custom_objective.is_some()
    }

    /// Record every expression and compute the sparsity patterns.
    ///
    /// Freezing an already frozen model does nothing.
    pub fn freeze(&mut self) -> Result<()> {
        if self.is_frozen() {
            return Ok(());
        }
        let objective = match &self.custom_objective {
            Some(function) => Body::Custom(Arc::clone(function)),
            None => Body::Expr(self.objective.expr().clone()),
        };
        let compiled =
            CompiledModel::compile(self.variables.len(), &objective, &self.constraints)?;
        tracing::debug!(
            component = "model",
            operation = "freeze",
            variables = self.variables.len(),
            constraints = self.constraints.len(),
            jacobian_nnz = compiled.jacobian.nnz(),
            hessian_nnz = compiled.hessian.pattern.nnz(),
            "model frozen"
        );
        self.compiled = Some(compiled);
        Ok(())
    }

    // ---- Values that stay mutable after freezing ----

    /// Replace a variable's bounds.
    ///
    /// The same checks as [`add_variable`](Self::add_variable) apply.
    pub fn set_variable_bounds(&mut self, var: impl VariableRef, lb: f64, ub: f64) -> Result<()> {
        let i = var.resolve(self)?;
        check_bounds(lb, ub, || format!("variable {i}"))?;
        if self.variables[i].kind == VariableKind::Binary {
            check_binary_bounds(i, lb, ub)?;
        }
        let v = &mut self.variables[i];
        v.lb = lb;
        v.ub = ub;
        Ok(())
    }

    /// Set the starting value handed to the solver.
    pub fn set_initial_value(&mut self, var: impl VariableRef, init: f64) -> Result<()> {
        let i = var.resolve(self)?;
        self.variables[i].init = init;
        Ok(())
    }

    /// Set the current value used by [`evaluate`](Self::evaluate).
    pub fn set_variable_value(&mut self, var: impl VariableRef, value: f64) -> Result<()> {
        let i = var.resolve(self)?;
        self.variables[i].value = value;
        Ok(())
    }

    /// Fix a variable at `value`: the solver sees `lb = ub = value`.
    ///
    /// The original bounds are kept and come back with
    /// [`unfix_variable`](Self::unfix_variable).
    pub fn fix_variable(&mut self, var: impl VariableRef, value: f64) -> Result<()> {
        let i = var.resolve(self)?;
        if !value.is_finite() {
            return Err(NlpError::InvalidBounds {
                lb: value,
                ub: value,
                context: format!("fixed variable {i}"),
            });
        }
        let v = &mut self.variables[i];
        v.fixed = true;
        v.init = value;
        v.value = value;
        Ok(())
    }

    /// Release a fixed variable.
    pub fn unfix_variable(&mut self, var: impl VariableRef) -> Result<()> {
        let i = var.resolve(self)?;
        self.variables[i].fixed = false;
        Ok(())
    }

    /// Replace the bounds of constraint `index`.
    pub fn set_constraint_bounds(&mut self, index: usize, lb: f64, ub: f64) -> Result<()> {
        handle::check_index("constraint", index, self.constraints.len())?;
        check_bounds(lb, ub, || format!("constraint {index}"))?;
        self.constraints[index].set_bounds(lb, ub);
        Ok(())
    }

    /// Change a parameter value. Takes effect at the next evaluation.
    pub fn set_parameter(&mut self, param: impl ParameterRef, value: f64) -> Result<()> {
        let i = param.resolve(self)?;
        self.parameters[i].value = value;
        Ok(())
    }

    /// Copy the last reported primal point into the starting point.
    ///
    /// Returns `false` (and changes nothing) if no point has been reported.
    pub fn use_solution_as_initial(&mut self) -> bool {
        if self.solution.primal.len() != self.variables.len() || self.variables.is_empty() {
            return false;
        }
        for (v, &x) in self.variables.iter_mut().zip(&self.solution.primal) {
            v.init = x;
        }
        true
    }

    // ---- Queries ----

    /// Number of variables.
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Number of constraints.
    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Number of parameters.
    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    /// Get a registered variable.
    pub fn variable(&self, index: usize) -> Option<&Variable> {
        self.variables.get(index)
    }

    /// Get a registered parameter.
    pub fn parameter(&self, index: usize) -> Option<&Parameter> {
        self.parameters.get(index)
    }

    /// Get an expression constraint. `None` for custom constraints.
    pub fn constraint(&self, index: usize) -> Option<&Constraint> {
        match self.constraints.get(index)? {
            Row::Expr(c) => Some(c),
            Row::Custom { .. } => None,
        }
    }

    /// Bounds `(lb, ub)` of any constraint.
    pub fn constraint_bounds(&self, index: usize) -> Option<(f64, f64)> {
        self.constraints.get(index).map(Row::bounds)
    }

    /// The objective.
    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    /// Current value of a variable.
    pub fn value(&self, var: impl VariableRef) -> Result<f64> {
        let i = var.resolve(self)?;
        Ok(self.variables[i].value)
    }

    /// Value of any expression at the current variable and parameter values.
    ///
    /// # Errors
    ///
    /// `UnregisteredVariable` for foreign leaves, `Domain` if the expression
    /// is undefined at the current values.
    pub fn evaluate(&self, expr: &Expr) -> Result<f64> {
        handle::check_references(self, expr)?;
        ExprEvaluator::new(expr)?.value(&self.current_values(), &self.parameter_values())
    }

    /// Current value of every variable.
    pub fn current_values(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.value).collect()
    }

    /// Current value of every parameter.
    pub fn parameter_values(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.value).collect()
    }

    /// Last reported solution.
    pub fn solution(&self) -> &Solution {
        &self.solution
    }

    /// Status of the last solve.
    pub fn status(&self) -> SolveStatus {
        self.solution.status
    }

    /// Check if the model has been frozen.
    pub fn is_frozen(&self) -> bool {
        self.compiled.is_some()
    }

    /// Jacobian pattern of the constraints, once frozen.
    pub fn jacobian_pattern(&self) -> Option<&SparsityPattern> {
        self.compiled.as_ref().map(|c| &c.jacobian)
    }

    /// Lower-triangular Hessian-of-the-Lagrangian pattern, once frozen.
    pub fn hessian_pattern(&self) -> Option<&SparsityPattern> {
        self.compiled.as_ref().map(|c| &c.hessian.pattern)
    }

    // ---- Solving ----

    /// Freeze the model and hand it to `solver`.
    ///
    /// Returns the status the solver reported. The solution is available from
    /// [`solution`](Self::solution) and the variable values are updated.
    pub fn solve<S: NlpSolver + ?Sized>(&mut self, solver: &mut S) -> Result<SolveStatus> {
        self.freeze()?;
        self.solution = Solution::default();
        let mut problem = NlpProblem::new(self)?;
        solver.solve(&mut problem)?;
        Ok(self.solution.status)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sense = if self.objective.is_minimize() {
            "minimize"
        } else {
            "maximize"
        };
        match &self.custom_objective {
            Some(function) => writeln!(f, "{sense} {}", function.name())?,
            None => writeln!(f, "{sense} {}", self.objective.expr())?,
        }
        if !self.constraints.is_empty() {
            writeln!(f, "subject to")?;
            for (i, c) in self.constraints.iter().enumerate() {
                writeln!(f, "  c{i}: {c}")?;
            }
        }
        if !self.variables.is_empty() {
            writeln!(f, "variables")?;
            for v in &self.variables {
                writeln!(f, "  {v}")?;
            }
        }
        if !self.parameters.is_empty() {
            writeln!(f, "parameters")?;
            for p in &self.parameters {
                writeln!(f, "  {p}")?;
            }
        }
        Ok(())
    }
}
