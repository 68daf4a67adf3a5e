//! Parameters: named values that act as constants during differentiation.

use std::fmt;
use std::sync::Arc;

/// A parameter registered in a model.
///
/// Tapes read parameter values at evaluation time, so changing a value does
/// not require re-recording anything.
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Optional display name.
    pub name: Option<Arc<str>>,
    /// Current value.
    pub value: f64,
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or("_");
        write!(f, "{} = {}", name, self.value)
    }
}
