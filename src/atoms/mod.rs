//! Atoms for building nonlinear expressions.
//!
//! - `arithmetic` - operator overloading (`+ - * /`, unary `-`) and `try_div`
//! - `elementary` - elementary functions, powers and aggregation

pub mod arithmetic;
pub mod elementary;

pub use arithmetic::try_div;
pub use elementary::{
    cos, dot, exp, log, pow, powf, powi, sin, sqrt, square, sum, tan, tanh,
};
