//! Frozen evaluation state of a model.

use std::fmt;
use std::sync::Arc;

use crate::constraints::{fmt_bounded, Constraint, CustomConstraint};
use crate::error::{EvalTarget, Result};
use crate::eval::{CustomEvaluator, ExprEvaluator, Level};
use crate::expr::Expr;
use crate::sparsity::{
    build_hessian_pattern, build_jacobian_pattern, DerivativeStructure, HessianLayout,
    SparsityPattern,
};
use crate::tape::Degree;

/// What a model function is made of before freezing.
#[derive(Debug, Clone)]
pub(crate) enum Body {
    Expr(Expr),
    Custom(Arc<dyn CustomConstraint>),
}

/// A constraint as stored by the model.
#[derive(Debug, Clone)]
pub(crate) enum Row {
    Expr(Constraint),
    Custom {
        function: Arc<dyn CustomConstraint>,
        lb: f64,
        ub: f64,
    },
}

impl Row {
    pub(crate) fn bounds(&self) -> (f64, f64) {
        match self {
            Row::Expr(c) => (c.lb, c.ub),
            Row::Custom { lb, ub, .. } => (*lb, *ub),
        }
    }

    pub(crate) fn set_bounds(&mut self, new_lb: f64, new_ub: f64) {
        match self {
            Row::Expr(c) => {
                c.lb = new_lb;
                c.ub = new_ub;
            }
            Row::Custom { lb, ub, .. } => {
                *lb = new_lb;
                *ub = new_ub;
            }
        }
    }

    fn body(&self) -> Body {
        match self {
            Row::Expr(c) => Body::Expr(c.body.clone()),
            Row::Custom { function, .. } => Body::Custom(Arc::clone(function)),
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Row::Expr(c) => write!(f, "{c}"),
            Row::Custom { function, lb, ub } => fmt_bounded(f, &function.name(), *lb, *ub),
        }
    }
}

/// Evaluation state of one model function.
#[derive(Debug, Clone)]
pub(crate) enum Evaluator {
    Tape(ExprEvaluator),
    Custom(CustomEvaluator),
}

impl Evaluator {
    fn new(body: &Body, num_variables: usize) -> Result<Self> {
        match body {
            Body::Expr(e) => Ok(Evaluator::Tape(ExprEvaluator::new(e)?)),
            Body::Custom(f) => Ok(Evaluator::Custom(CustomEvaluator::new(
                Arc::clone(f),
                num_variables,
            )?)),
        }
    }

    pub(crate) fn invalidate(&mut self) {
        match self {
            Evaluator::Tape(e) => e.invalidate(),
            Evaluator::Custom(c) => c.invalidate(),
        }
    }

    pub(crate) fn ensure(&mut self, level: Level, point: &[f64], params: &[f64]) -> Result<()> {
        match self {
            Evaluator::Tape(e) => e.ensure(level, point, params),
            Evaluator::Custom(c) => c.ensure(point),
        }
    }

    pub(crate) fn cached_value(&self) -> f64 {
        match self {
            Evaluator::Tape(e) => e.cached_value(),
            Evaluator::Custom(c) => c.cached_value(),
        }
    }

    /// Gradient values aligned with [`columns`](DerivativeStructure::gradient_columns).
    pub(crate) fn cached_gradient(&self) -> &[f64] {
        match self {
            Evaluator::Tape(e) => e.cached_gradient(),
            Evaluator::Custom(c) => c.cached_gradient(),
        }
    }

    /// Hessian values aligned with [`hessian_pairs`](DerivativeStructure::hessian_pairs).
    pub(crate) fn cached_hessian(&self) -> &[f64] {
        match self {
            Evaluator::Tape(e) => e.cached_hessian(),
            Evaluator::Custom(c) => c.cached_hessian(),
        }
    }

    /// Polynomial degree. Custom functions are opaque and never polynomial.
    pub(crate) fn degree(&self) -> Degree {
        match self {
            Evaluator::Tape(e) => e.tape().degree(),
            Evaluator::Custom(_) => Degree::Nonpolynomial,
        }
    }
}

impl DerivativeStructure for Evaluator {
    fn gradient_columns(&self) -> &[usize] {
        match self {
            Evaluator::Tape(e) => e.tape().inputs(),
            Evaluator::Custom(c) => c.columns(),
        }
    }

    fn hessian_pairs(&self) -> Vec<(usize, usize)> {
        match self {
            Evaluator::Tape(e) => e.hessian_structure().to_vec(),
            Evaluator::Custom(c) => c.hessian_structure().to_vec(),
        }
    }
}

/// Evaluators and sparsity patterns built once by `Model::freeze`.
#[derive(Debug, Clone)]
pub(crate) struct CompiledModel {
    pub(crate) objective: Evaluator,
    pub(crate) constraints: Vec<Evaluator>,
    pub(crate) jacobian: SparsityPattern,
    pub(crate) hessian: HessianLayout,
}

impl CompiledModel {
    pub(crate) fn compile(num_variables: usize, objective: &Body, rows: &[Row]) -> Result<Self> {
        let objective =
            Evaluator::new(objective, num_variables).map_err(|e| e.at(EvalTarget::Objective))?;
        let constraints = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                Evaluator::new(&row.body(), num_variables)
                    .map_err(|e| e.at(EvalTarget::Constraint(i)))
            })
            .collect::<Result<Vec<_>>>()?;

        let structures: Vec<&Evaluator> = constraints.iter().collect();
        // Row i holds constraint i's gradient columns in order, so its Jacobian
        // values are the constraint's gradient laid out contiguously.
        let jacobian = build_jacobian_pattern(num_variables, &structures);
        let hessian = build_hessian_pattern(num_variables, &objective, &structures);

        Ok(CompiledModel {
            objective,
            constraints,
            jacobian,
            hessian,
        })
    }

    /// Drop every cached result.
    pub(crate) fn invalidate(&mut self) {
        self.objective.invalidate();
        for c in &mut self.constraints {
            c.invalidate();
        }
    }

    pub(crate) fn ensure_objective(
        &mut self,
        level: Level,
        point: &[f64],
        params: &[f64],
    ) -> Result<()> {
        self.objective
            .ensure(level, point, params)
            .map_err(|e| e.at(EvalTarget::Objective))
    }

    /// Bring the constraints up to `level`.
    ///
    /// With `multipliers`, constraints whose multiplier is zero are skipped.
    #[cfg(not(feature = "parallel"))]
    pub(crate) fn ensure_constraints(
        &mut self,
        level: Level,
        point: &[f64],
        params: &[f64],
        multipliers: Option<&[f64]>,
    ) -> Result<()> {
        for (i, c) in self.constraints.iter_mut().enumerate() {
            if multipliers.is_some_and(|m| m[i] == 0.0) {
                continue;
            }
            c.ensure(level, point, params)
                .map_err(|e| e.at(EvalTarget::Constraint(i)))?;
        }
        Ok(())
    }

    /// Bring the constraints up to `level` on the rayon pool.
    ///
    /// With `multipliers`, constraints whose multiplier is zero are skipped.
    #[cfg(feature = "parallel")]
    pub(crate) fn ensure_constraints(
        &mut self,
        level: Level,
        point: &[f64],
        params: &[f64],
        multipliers: Option<&[f64]>,
    ) -> Result<()> {
        use rayon::prelude::*;

        self.constraints
            .par_iter_mut()
            .enumerate()
            .filter(|(i, _)| !multipliers.is_some_and(|m| m[*i] == 0.0))
            .try_for_each(|(i, c)| {
                c.ensure(level, point, params)
                    .map_err(|e| e.at(EvalTarget::Constraint(i)))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::{exp, square};
    use crate::error::NlpError;
    use crate::expr::{ModelId, VariableData};

    fn var(model: ModelId, index: usize) -> Expr {
        Expr::Variable(VariableData {
            model,
            index,
            name: None,
        })
    }

    #[test]
    fn test_compile_builds_layouts() {
        let m = ModelId::new();
        let (x, y) = (var(m, 0), var(m, 1));
        let rows = vec![
            Row::Expr(Constraint::new(&x + &y, 1.0, 1.0)),
            Row::Expr(Constraint::new(&x * &y, f64::NEG_INFINITY, 4.0)),
        ];
        let objective = Body::Expr(square(&x) + exp(&y));
        let compiled = CompiledModel::compile(2, &objective, &rows).unwrap();
        assert_eq!(compiled.jacobian.entries(), &[(0, 0), (0, 1), (1, 0), (1, 1)]);
        assert_eq!(compiled.hessian.pattern.entries(), &[(0, 0), (1, 1), (1, 0)]);
        assert_eq!(compiled.hessian.constraints, vec![vec![], vec![2]]);
    }

    #[test]
    fn test_constraint_errors_are_tagged() {
        let m = ModelId::new();
        let x = var(m, 0);
        let rows = vec![
            Row::Expr(Constraint::new(x.clone(), 0.0, 1.0)),
            Row::Expr(Constraint::new(x.ln(), 0.0, 1.0)),
        ];
        let mut compiled = CompiledModel::compile(1, &Body::Expr(x.clone()), &rows).unwrap();
        let err = compiled
            .ensure_constraints(Level::Value, &[-1.0], &[], None)
            .unwrap_err();
        assert!(matches!(
            err,
            NlpError::Domain {
                target: EvalTarget::Constraint(1),
                ..
            }
        ));

        // A zero multiplier skips the failing constraint.
        compiled.invalidate();
        compiled
            .ensure_constraints(Level::Hessian, &[-1.0], &[], Some(&[1.0, 0.0]))
            .unwrap();
    }
}
