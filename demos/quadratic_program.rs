//! Quadratic Programming Example
//!
//! This example solves a small quadratic program with the bundled Clarabel
//! backend:
//!
//! minimize    (x1 - 3)^2 + (x2 - 2)^2
//! subject to  x1 + x2 = 4, x >= 0

use nlprust::prelude::*;

fn main() -> Result<()> {
    println!("=== Quadratic Programming ===\n");

    println!("Problem: Find point closest to [3, 2]");
    println!("Subject to: x1 + x2 = 4, x >= 0\n");

    let mut model = Model::new();
    let x1 = model.new_variable().name("x1").nonneg().build()?;
    let x2 = model.new_variable().name("x2").nonneg().build()?;

    model.minimize((&x1 - 3.0).square() + (&x2 - 2.0).square())?;
    model.subject_to((&x1 + &x2).equals(4.0))?;

    println!("{model}");
    println!("Solving...");
    let status = model.solve(&mut ClarabelSolver::default())?;

    let solution = model.solution();
    println!("\nResults:");
    println!("  Status: {status}");
    println!("  Iterations: {}", solution.iterations);
    if let Some(value) = solution.value {
        println!("  Optimal value: {value:.6}");
        println!("  Distance: {:.6}", value.sqrt());
    }
    println!("  x1 = {:.6}", model.value(&x1)?);
    println!("  x2 = {:.6}", model.value(&x2)?);
    if let Some(dual) = solution.constraint_dual(0) {
        println!("  Multiplier of x1 + x2 = 4: {dual:.6}");
    }
    Ok(())
}
