//! Nonlinear Programming Example
//!
//! Builds Hock-Schittkowski problem 71 and prints what a nonlinear solver sees
//! through the callbacks: bounds, sparsity patterns and derivative values at
//! the starting point.
//!
//! minimize    x1 x4 (x1 + x2 + x3) + x3
//! subject to  x1 x2 x3 x4 >= 25
//!             x1^2 + x2^2 + x3^2 + x4^2 = 40
//!             1 <= x <= 5
//!
//! It then minimizes the Rosenbrock function with a small Newton method driven
//! through the same callbacks.

use nalgebra::{DMatrix, DVector};
use nlprust::prelude::*;

fn hs071() -> Result<Model> {
    let mut model = Model::new();
    let start = [1.0, 5.0, 5.0, 1.0];
    let x = start
        .iter()
        .enumerate()
        .map(|(i, &init)| {
            model
                .new_variable()
                .name(format!("x{}", i + 1))
                .bounds(1.0, 5.0)
                .init(init)
                .build()
        })
        .collect::<Result<Vec<_>>>()?;

    model.minimize(&x[0] * &x[3] * (&x[0] + &x[1] + &x[2]) + &x[2])?;
    model.subject_to((&x[0] * &x[1] * &x[2] * &x[3]).geq(25.0))?;
    model.subject_to(sum(x.iter().map(|xi| xi.square())).equals(40.0))?;
    Ok(model)
}

/// Newton's method with backtracking for unconstrained models.
struct Newton {
    max_iter: u32,
    tolerance: f64,
}

impl Newton {
    fn dense_hessian(
        problem: &mut NlpProblem<'_>,
        structure: &[(usize, usize)],
        x: &[f64],
    ) -> Result<DMatrix<f64>> {
        let n = problem.num_variables();
        let hess = problem.eval_hessian_of_lagrangian(Some(x), 1.0, &[])?;
        let mut h = DMatrix::zeros(n, n);
        for (&(r, c), &v) in structure.iter().zip(hess.values().unwrap_or_default()) {
            h[(r, c)] += v;
            if r != c {
                h[(c, r)] += v;
            }
        }
        Ok(h)
    }
}

impl NlpSolver for Newton {
    fn solve(&mut self, problem: &mut NlpProblem<'_>) -> Result<()> {
        let structure = problem
            .eval_hessian_of_lagrangian(None, 1.0, &[])?
            .structure()
            .map(<[_]>::to_vec)
            .unwrap_or_default();

        let mut x = problem.starting_point();
        for k in 0..self.max_iter {
            let g = DVector::from_vec(problem.eval_objective_gradient(&x)?);
            if g.norm() < self.tolerance {
                problem.report_iterations(k);
                return problem.report_solution(&x, SolveStatus::Optimal);
            }

            // Fall back to steepest descent where the Hessian is not positive definite.
            let h = Self::dense_hessian(problem, &structure, &x)?;
            let step = match h.cholesky() {
                Some(chol) => chol.solve(&g),
                None => g.clone(),
            };

            let f0 = problem.eval_objective(&x)?;
            let slope = g.dot(&step);
            let mut t = 1.0;
            loop {
                let trial: Vec<f64> = x.iter().zip(step.iter()).map(|(a, s)| a - t * s).collect();
                match problem.eval_objective(&trial) {
                    Ok(f) if f <= f0 - 1e-4 * t * slope => {
                        x = trial;
                        break;
                    }
                    Ok(_) | Err(NlpError::Domain { .. }) if t > 1e-12 => t *= 0.5,
                    Ok(_) => return Err(NlpError::Solver("line search failed".into())),
                    Err(err) => return Err(err),
                }
            }
        }
        problem.report_iterations(self.max_iter);
        problem.report_solution(&x, SolveStatus::IterationLimit)
    }
}

fn main() -> Result<()> {
    println!("=== Nonlinear Programming ===\n");

    let mut model = hs071()?;
    println!("{model}");

    let mut problem = NlpProblem::new(&mut model)?;
    let bounds = problem.bounds();
    println!("Constraint bounds:");
    for (lb, ub) in bounds.constraint_lower.iter().zip(&bounds.constraint_upper) {
        println!("  [{lb}, {ub}]");
    }

    let x0 = problem.starting_point();
    println!("\nAt the starting point {x0:?}:");
    println!("  f(x0) = {:.6}", problem.eval_objective(&x0)?);
    println!("  grad f(x0) = {:?}", problem.eval_objective_gradient(&x0)?);
    println!("  g(x0) = {:?}", problem.eval_constraints(&x0)?);

    let structure = problem.eval_jacobian(None)?.structure().map(<[_]>::to_vec);
    let values = problem.eval_jacobian(Some(&x0))?.values().map(<[_]>::to_vec);
    println!("\nJacobian:");
    for (entry, value) in structure
        .unwrap_or_default()
        .iter()
        .zip(values.unwrap_or_default())
    {
        println!("  {entry:?} = {value}");
    }

    let multipliers = [1.0, 1.0];
    let structure = problem
        .eval_hessian_of_lagrangian(None, 1.0, &multipliers)?
        .structure()
        .map(<[_]>::to_vec);
    let values = problem
        .eval_hessian_of_lagrangian(Some(&x0), 1.0, &multipliers)?
        .values()
        .map(<[_]>::to_vec);
    println!("\nHessian of the Lagrangian (lower triangle, unit multipliers):");
    for (entry, value) in structure
        .unwrap_or_default()
        .iter()
        .zip(values.unwrap_or_default())
    {
        println!("  {entry:?} = {value}");
    }

    println!("\n=== Rosenbrock with Newton's method ===\n");
    let mut model = Model::new();
    let x = model.new_variable().name("x").init(-1.2).build()?;
    let y = model.new_variable().name("y").init(1.0).build()?;
    model.minimize((1.0 - &x).square() + 100.0 * (&y - x.square()).square())?;

    let status = model.solve(&mut Newton {
        max_iter: 100,
        tolerance: 1e-10,
    })?;
    println!("  Status: {status}");
    println!("  Iterations: {}", model.solution().iterations);
    println!("  x = {:.6}", model.value(&x)?);
    println!("  y = {:.6}", model.value(&y)?);
    Ok(())
}
