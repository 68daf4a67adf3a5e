//! Functions with hand-written derivatives next to recorded expressions.

use approx::assert_relative_eq;
use nlprust::error::EvalTarget;
use nlprust::prelude::*;
use nlprust::tape::Degree;

/// g(x, y, z) = (x^2 + 1.5 x - a) cos(y) - z
struct Tutorial {
    a: f64,
}

impl CustomConstraint for Tutorial {
    fn gradient_columns(&self) -> Vec<usize> {
        vec![0, 1, 2]
    }

    fn hessian_entries(&self) -> Vec<(usize, usize)> {
        // (0, 1) is the upper-triangle name of (1, 0).
        vec![(0, 0), (0, 1), (1, 1)]
    }

    fn evaluate(&self, x: &[f64], gradient: &mut [f64], hessian: &mut [f64]) -> Result<f64> {
        let (u, y) = (x[0] * x[0] + 1.5 * x[0] - self.a, x[1]);
        let du = 2.0 * x[0] + 1.5;
        gradient.copy_from_slice(&[du * y.cos(), -u * y.sin(), -1.0]);
        hessian.copy_from_slice(&[2.0 * y.cos(), -du * y.sin(), -u * y.cos()]);
        Ok(u * y.cos() - x[2])
    }

    fn name(&self) -> &str {
        "tutorial"
    }
}

/// Reports a column the model does not have, or a column twice.
struct Broken {
    columns: Vec<usize>,
}

impl CustomConstraint for Broken {
    fn gradient_columns(&self) -> Vec<usize> {
        self.columns.clone()
    }

    fn evaluate(&self, _: &[f64], _: &mut [f64], _: &mut [f64]) -> Result<f64> {
        Ok(0.0)
    }
}

/// sqrt(x) written by hand, undefined below zero.
struct Root;

impl CustomConstraint for Root {
    fn gradient_columns(&self) -> Vec<usize> {
        vec![0]
    }

    fn hessian_entries(&self) -> Vec<(usize, usize)> {
        vec![(0, 0)]
    }

    fn evaluate(&self, x: &[f64], gradient: &mut [f64], hessian: &mut [f64]) -> Result<f64> {
        let r = x[0].sqrt();
        gradient[0] = 0.5 / r;
        hessian[0] = -0.25 / (r * x[0]);
        Ok(r)
    }
}

/// min x^2  s.t.  x*z <= 4, tutorial(x, y, z) == 0
fn tutorial_model() -> Model {
    let mut model = Model::new();
    let x = model.new_variable().name("x").build().unwrap();
    let _y = model.new_variable().name("y").build().unwrap();
    let z = model.new_variable().name("z").build().unwrap();
    model.minimize(x.square()).unwrap();
    model.add_le_constraint(&x * &z, 4.0).unwrap();
    model
        .add_custom_constraint(Tutorial { a: 1.0 }, 0.0, 0.0)
        .unwrap();
    model
}

#[test]
fn test_custom_entries_merge_into_patterns() {
    let mut model = tutorial_model();
    model.freeze().unwrap();
    assert_eq!(
        model.jacobian_pattern().unwrap().entries(),
        &[(0, 0), (0, 2), (1, 0), (1, 1), (1, 2)]
    );
    assert_eq!(
        model.hessian_pattern().unwrap().entries(),
        &[(0, 0), (2, 0), (1, 0), (1, 1)]
    );
}

#[test]
fn test_custom_values_through_adapter() {
    let mut model = tutorial_model();
    let mut problem = NlpProblem::new(&mut model).unwrap();
    let x = [1.0, 0.0, 2.0];

    let g = problem.eval_constraints(&x).unwrap();
    assert_relative_eq!(g[0], 2.0);
    assert_relative_eq!(g[1], -0.5);

    let jac = problem.eval_jacobian(Some(&x)).unwrap();
    assert_eq!(jac.values().unwrap(), &[2.0, 1.0, 3.5, 0.0, -1.0]);

    // objective 2 at (0,0), x*z gives 1 at (2,0), tutorial gives 2, 0, -1.5
    let hess = problem
        .eval_hessian_of_lagrangian(Some(&x), 1.0, &[2.0, 3.0])
        .unwrap();
    let h = hess.values().unwrap();
    assert_relative_eq!(h[0], 8.0);
    assert_relative_eq!(h[1], 2.0);
    assert_relative_eq!(h[2], 0.0);
    assert_relative_eq!(h[3], -4.5);

    assert_eq!(problem.constraint_degrees().unwrap()[1], Degree::Nonpolynomial);
}

#[test]
fn test_custom_objective() {
    let mut model = Model::new();
    let _x = model.new_variable().build().unwrap();
    let _y = model.new_variable().build().unwrap();
    let _z = model.new_variable().build().unwrap();
    model.maximize_custom(Tutorial { a: 0.0 }).unwrap();

    let mut problem = NlpProblem::new(&mut model).unwrap();
    let x = [2.0, 0.0, 1.0];
    // u = 4 + 3 = 7, value 7 - 1 = 6, negated for minimization
    assert_relative_eq!(problem.eval_objective(&x).unwrap(), -6.0);
    assert_eq!(
        problem.eval_objective_gradient(&x).unwrap(),
        vec![-5.5, 0.0, 1.0]
    );
    let hess = problem.eval_hessian_of_lagrangian(None, 1.0, &[]).unwrap();
    assert_eq!(hess.structure().unwrap(), &[(0, 0), (1, 0), (1, 1)]);
}

#[test]
fn test_custom_hessian_values_in_pattern_order() {
    let mut model = Model::new();
    let _x = model.new_variable().build().unwrap();
    let _y = model.new_variable().build().unwrap();
    let _z = model.new_variable().build().unwrap();
    model.minimize_custom(Tutorial { a: 0.0 }).unwrap();
    let mut problem = NlpProblem::new(&mut model).unwrap();
    let x = [1.0, std::f64::consts::FRAC_PI_2, 0.0];
    let hess = problem.eval_hessian_of_lagrangian(Some(&x), 1.0, &[]).unwrap();
    let h = hess.values().unwrap();
    // cos(pi/2) = 0, sin(pi/2) = 1
    assert_relative_eq!(h[0], 0.0, epsilon = 1e-12);
    assert_relative_eq!(h[1], -3.5);
    assert_relative_eq!(h[2], 0.0, epsilon = 1e-12);
}

#[test]
fn test_invalid_structure_is_rejected_at_freeze() {
    let mut model = Model::new();
    let _x = model.new_variable().build().unwrap();
    model
        .add_custom_constraint(Broken { columns: vec![0, 3] }, 0.0, 1.0)
        .unwrap();
    assert!(matches!(
        model.freeze().unwrap_err(),
        NlpError::UnregisteredVariable { index: 3, .. }
    ));
    assert!(!model.is_frozen());

    let mut model = Model::new();
    let _x = model.new_variable().build().unwrap();
    model
        .add_custom_constraint(Broken { columns: vec![0, 0] }, 0.0, 1.0)
        .unwrap();
    assert!(matches!(
        model.freeze().unwrap_err(),
        NlpError::InvalidModel(_)
    ));
}

#[test]
fn test_non_finite_custom_result_is_domain_error() {
    let mut model = Model::new();
    let x = model.new_variable().build().unwrap();
    model.minimize(x.clone()).unwrap();
    model.add_ge_constraint(x.clone(), 0.0).unwrap();
    model.add_custom_constraint(Root, 0.0, 4.0).unwrap();

    let mut problem = NlpProblem::new(&mut model).unwrap();
    let err = problem.eval_constraints(&[-1.0]).unwrap_err();
    assert_eq!(err.target(), Some(EvalTarget::Constraint(1)));
    assert_eq!(problem.eval_constraints(&[4.0]).unwrap(), vec![4.0, 2.0]);
    let jac = problem.eval_jacobian(Some(&[4.0])).unwrap();
    assert_eq!(jac.values().unwrap(), &[1.0, 0.25]);
}

#[test]
fn test_clarabel_rejects_custom_objective() {
    let mut model = Model::new();
    let _x = model.new_variable().build().unwrap();
    model.minimize_custom(Root).unwrap();
    let mut solver = ClarabelSolver::default();
    assert!(model.solve(&mut solver).is_err());
}
