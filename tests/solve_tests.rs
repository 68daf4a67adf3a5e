//! End-to-end solves.
//!
//! QP-shaped models run through the bundled Clarabel backend, defined as data
//! and checked programmatically. A small Newton solver exercises the callback
//! protocol the way an external NLP solver would.

use nalgebra::{DMatrix, DVector};
use nlprust::prelude::*;

/// Tolerance for comparing floating point results
const TOL: f64 = 1e-4;

/// A test case definition
struct TestCase {
    name: &'static str,
    /// Function that builds the model and returns (model, expected_value)
    build: fn() -> (Model, f64),
}

/// All minimize test cases
fn minimize_test_cases() -> Vec<TestCase> {
    vec![
        // ========== Linear Programs ==========
        TestCase {
            name: "bounds_and_constraint",
            build: || {
                // minimize x + y s.t. x >= 1 (bound), y >= 2
                let mut model = Model::new();
                let x = model.new_variable().lower(1.0).build().unwrap();
                let y = model.new_variable().build().unwrap();
                model.minimize(&x + &y).unwrap();
                model.add_ge_constraint(y.clone(), 2.0).unwrap();
                (model, 3.0)
            },
        },
        TestCase {
            name: "equality_simplex",
            build: || {
                // minimize 2x + 3y s.t. x + y == 1, x, y >= 0
                let mut model = Model::new();
                let x = model.new_variable().nonneg().build().unwrap();
                let y = model.new_variable().nonneg().build().unwrap();
                model.minimize(2.0 * &x + 3.0 * &y).unwrap();
                model.subject_to((&x + &y).equals(1.0)).unwrap();
                (model, 2.0)
            },
        },
        TestCase {
            name: "ranged_row",
            build: || {
                // minimize x s.t. -2 <= 2x <= 4
                let mut model = Model::new();
                let x = model.new_variable().build().unwrap();
                model.minimize(x.clone()).unwrap();
                model.add_constraint(2.0 * &x, -2.0, 4.0).unwrap();
                (model, -1.0)
            },
        },
        TestCase {
            name: "fixed_variable",
            build: || {
                // minimize x + y with x fixed at 3, y in [0, 10]
                let mut model = Model::new();
                let x = model.new_variable().bounds(0.0, 10.0).build().unwrap();
                let y = model.new_variable().bounds(0.0, 10.0).build().unwrap();
                model.minimize(&x + &y).unwrap();
                model.fix_variable(&x, 3.0).unwrap();
                (model, 3.0)
            },
        },
        // ========== Quadratic Programs ==========
        TestCase {
            name: "sum_of_squares_on_line",
            build: || {
                // minimize x^2 + y^2 s.t. x + y == 1 -> x = y = 0.5
                let mut model = Model::new();
                let x = model.new_variable().build().unwrap();
                let y = model.new_variable().build().unwrap();
                model.minimize(x.square() + y.square()).unwrap();
                model.add_eq_constraint(&x + &y, 1.0).unwrap();
                (model, 0.5)
            },
        },
        TestCase {
            name: "active_upper_bound",
            build: || {
                // minimize (x - 3)^2 s.t. x <= 1
                let mut model = Model::new();
                let x = model.new_variable().build().unwrap();
                model.minimize((&x - 3.0).square()).unwrap();
                model.add_le_constraint(x.clone(), 1.0).unwrap();
                (model, 4.0)
            },
        },
        TestCase {
            name: "cross_term",
            build: || {
                // minimize x^2 + xy + y^2 - x s.t. x <= 100 -> x = 2/3, y = -1/3
                let mut model = Model::new();
                let x = model.new_variable().upper(100.0).build().unwrap();
                let y = model.new_variable().build().unwrap();
                model
                    .minimize(x.square() + &x * &y + y.square() - &x)
                    .unwrap();
                (model, -1.0 / 3.0)
            },
        },
        TestCase {
            name: "constant_offset",
            build: || {
                // minimize (x + 1)^2 + 5 s.t. x >= 0
                let mut model = Model::new();
                let x = model.new_variable().nonneg().build().unwrap();
                model.minimize((&x + 1.0).powi(2) + 5.0).unwrap();
                (model, 6.0)
            },
        },
    ]
}

/// All maximize test cases
fn maximize_test_cases() -> Vec<TestCase> {
    vec![
        TestCase {
            name: "lp_box",
            build: || {
                // maximize x + y s.t. x + 2y <= 4, x, y in [0, 3]
                let mut model = Model::new();
                let x = model.new_variable().bounds(0.0, 3.0).build().unwrap();
                let y = model.new_variable().bounds(0.0, 3.0).build().unwrap();
                model.maximize(&x + &y).unwrap();
                model.add_le_constraint(&x + 2.0 * &y, 4.0).unwrap();
                (model, 3.5)
            },
        },
        TestCase {
            name: "concave_quadratic",
            build: || {
                // maximize 4x - x^2 s.t. x <= 100 -> x = 2
                let mut model = Model::new();
                let x = model.new_variable().upper(100.0).build().unwrap();
                model.maximize(4.0 * &x - x.square()).unwrap();
                (model, 4.0)
            },
        },
    ]
}

fn infeasible_test_cases() -> Vec<(&'static str, Model)> {
    let mut model = Model::new();
    let x = model.new_variable().build().unwrap();
    model.minimize(x.clone()).unwrap();
    model.add_ge_constraint(x.clone(), 1.0).unwrap();
    model.add_le_constraint(x, 0.0).unwrap();

    let mut bounded = Model::new();
    let y = bounded.new_variable().bounds(0.0, 1.0).build().unwrap();
    bounded.minimize(y.clone()).unwrap();
    bounded.add_eq_constraint(y, 2.0).unwrap();

    vec![("contradicting_rows", model), ("row_outside_bounds", bounded)]
}

#[test]
fn test_minimize() {
    for case in minimize_test_cases() {
        let (mut model, expected) = (case.build)();
        let status = model.solve(&mut ClarabelSolver::default());
        assert!(status.is_ok(), "Model '{}' should solve: {:?}", case.name, status.err());
        assert_eq!(
            model.status(),
            SolveStatus::Optimal,
            "Model '{}' should be optimal",
            case.name
        );
        let value = model.solution().value.unwrap();
        assert!(
            (value - expected).abs() < TOL,
            "Model '{}': expected {}, got {}",
            case.name,
            expected,
            value
        );
    }
}

#[test]
fn test_maximize() {
    for case in maximize_test_cases() {
        let (mut model, expected) = (case.build)();
        model.solve(&mut ClarabelSolver::default()).unwrap();
        assert_eq!(model.status(), SolveStatus::Optimal, "Model '{}'", case.name);
        let value = model.solution().value.unwrap();
        assert!(
            (value - expected).abs() < TOL,
            "Model '{}': expected {}, got {}",
            case.name,
            expected,
            value
        );
    }
}

#[test]
fn test_infeasible() {
    for (name, mut model) in infeasible_test_cases() {
        let status = model.solve(&mut ClarabelSolver::default()).unwrap();
        assert_eq!(status, SolveStatus::Infeasible, "Model '{}'", name);
        assert!(!model.solution().has_duals());
    }
}

#[test]
fn test_solution_is_written_back() {
    let mut model = Model::new();
    let x = model.new_variable().build().unwrap();
    let y = model.new_variable().build().unwrap();
    model.minimize(x.square() + y.square()).unwrap();
    model.add_eq_constraint(&x + &y, 1.0).unwrap();
    model.solve(&mut ClarabelSolver::default()).unwrap();

    assert!((model.value(&x).unwrap() - 0.5).abs() < TOL);
    assert!((model.value(&y).unwrap() - 0.5).abs() < TOL);
    assert!(model.solution().iterations > 0);

    // 2x + λ = 0 at x = 0.5
    let lambda = model.solution().constraint_dual(0).unwrap();
    assert!((lambda + 1.0).abs() < TOL, "got multiplier {lambda}");

    assert!(model.use_solution_as_initial());
    assert!((model.variable(0).unwrap().init - 0.5).abs() < TOL);
}

#[test]
fn test_resolve_after_parameter_change() {
    let mut model = Model::new();
    let x = model.new_variable().build().unwrap();
    let p = model.add_parameter(2.0, Some("p")).unwrap();
    model.minimize((&x - &p).square()).unwrap();
    model.add_le_constraint(x.clone(), 4.0).unwrap();

    model.solve(&mut ClarabelSolver::default()).unwrap();
    assert!((model.value(&x).unwrap() - 2.0).abs() < TOL);
    let pattern = model.hessian_pattern().unwrap().clone();

    model.set_parameter(&p, 7.0).unwrap();
    model.solve(&mut ClarabelSolver::default()).unwrap();
    assert!((model.value(&x).unwrap() - 4.0).abs() < TOL);
    assert_eq!(model.hessian_pattern().unwrap(), &pattern);
}

#[test]
fn test_clarabel_rejects_nonlinear_models() {
    let mut model = Model::new();
    let x = model.new_variable().build().unwrap();
    model.minimize(x.exp()).unwrap();
    let err = model.solve(&mut ClarabelSolver::default()).unwrap_err();
    assert!(matches!(err, NlpError::Solver(_)));
    assert_eq!(model.status(), SolveStatus::NotSolved);
}

#[test]
fn test_custom_settings() {
    let settings = Settings {
        max_iter: 1,
        ..Settings::default()
    };
    let mut model = Model::new();
    let x = model.new_variable().build().unwrap();
    let y = model.new_variable().build().unwrap();
    model.minimize(x.square() + y.square() + &x * &y - &x).unwrap();
    model.add_le_constraint(&x + &y, 10.0).unwrap();
    let status = model.solve(&mut ClarabelSolver::new(settings)).unwrap();
    assert_eq!(status, SolveStatus::IterationLimit);
}

// ============================================================================
// Callback protocol
// ============================================================================

/// Damped Newton's method for unconstrained problems, driven purely through
/// the solver callbacks.
struct Newton {
    max_iter: u32,
}

impl NlpSolver for Newton {
    fn solve(&mut self, problem: &mut NlpProblem<'_>) -> Result<()> {
        let n = problem.num_variables();
        let structure = problem
            .eval_hessian_of_lagrangian(None, 1.0, &[])?
            .structure()
            .map(<[_]>::to_vec)
            .unwrap_or_default();

        let mut x = problem.starting_point();
        for k in 0..self.max_iter {
            let g = DVector::from_vec(problem.eval_objective_gradient(&x)?);
            if g.norm() < 1e-10 {
                problem.report_iterations(k);
                return problem.report_solution(&x, SolveStatus::Optimal);
            }
            let values = problem
                .eval_hessian_of_lagrangian(Some(&x), 1.0, &[])?
                .values()
                .map(<[_]>::to_vec)
                .unwrap_or_default();
            let mut h = DMatrix::zeros(n, n);
            for (&(r, c), v) in structure.iter().zip(values) {
                h[(r, c)] = v;
                h[(c, r)] = v;
            }
            let step = h
                .lu()
                .solve(&g)
                .ok_or_else(|| NlpError::Solver("singular Hessian".into()))?;

            // Backtrack until the objective is defined and does not increase.
            let f0 = problem.eval_objective(&x)?;
            let accept = f0 + 1e-12 * (1.0 + f0.abs());
            let mut t = 1.0;
            loop {
                let trial: Vec<f64> = x.iter().zip(step.iter()).map(|(a, s)| a - t * s).collect();
                match problem.eval_objective(&trial) {
                    Ok(f) if f <= accept => {
                        x = trial;
                        break;
                    }
                    Ok(_) | Err(NlpError::Domain { .. }) if t > 1e-8 => t *= 0.5,
                    Ok(_) => return Err(NlpError::Solver("line search failed".into())),
                    Err(err) => return Err(err),
                }
            }
        }
        problem.report_iterations(self.max_iter);
        problem.report_solution(&x, SolveStatus::IterationLimit)
    }
}

#[test]
fn test_newton_through_callbacks() {
    // minimize exp(x) - 2x + (y - 1)^2 -> x = ln 2, y = 1
    let mut model = Model::new();
    let x = model.new_variable().name("x").build().unwrap();
    let y = model.new_variable().name("y").init(5.0).build().unwrap();
    model.minimize(x.exp() - 2.0 * &x + (&y - 1.0).square()).unwrap();

    let status = model.solve(&mut Newton { max_iter: 50 }).unwrap();
    assert_eq!(status, SolveStatus::Optimal);
    assert!((model.value(&x).unwrap() - 2f64.ln()).abs() < 1e-8);
    assert!((model.value(&y).unwrap() - 1.0).abs() < 1e-8);
    let expected = 2.0 - 2.0 * 2f64.ln();
    assert!((model.solution().value.unwrap() - expected).abs() < 1e-10);
}

#[test]
fn test_newton_recovers_from_domain_errors() {
    // minimize x - 2 log(x) from x = 6: the full Newton step lands on x = -6.
    let mut model = Model::new();
    let x = model.new_variable().init(6.0).build().unwrap();
    model.minimize(&x - 2.0 * x.ln()).unwrap();

    let status = model.solve(&mut Newton { max_iter: 100 }).unwrap();
    assert_eq!(status, SolveStatus::Optimal);
    assert!((model.value(&x).unwrap() - 2.0).abs() < 1e-8);
}

#[test]
fn test_newton_on_maximization() {
    // maximize -(x - 3)^4 - x^2 is minimized as its negation
    let mut model = Model::new();
    let x = model.new_variable().build().unwrap();
    model.maximize(-(&x - 3.0).powi(4) - x.square()).unwrap();
    let status = model.solve(&mut Newton { max_iter: 100 }).unwrap();
    assert_eq!(status, SolveStatus::Optimal);
    // 4(x - 3)^3 + 2x = 0
    let xv = model.value(&x).unwrap();
    assert!((4.0 * (xv - 3.0).powi(3) + 2.0 * xv).abs() < 1e-6);
    assert!(model.solution().value.unwrap() < 0.0);
}
