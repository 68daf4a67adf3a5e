//! Ways of naming a variable or parameter of a model.

use super::Model;
use crate::error::{NlpError, Result};
use crate::expr::Expr;

/// Something that identifies a variable of a model: a dense index or a
/// variable expression returned by the model.
pub trait VariableRef {
    /// Resolve to the dense variable index in `model`.
    fn resolve(&self, model: &Model) -> Result<usize>;
}

/// Something that identifies a parameter of a model: a dense index or a
/// parameter expression returned by the model.
pub trait ParameterRef {
    /// Resolve to the dense parameter index in `model`.
    fn resolve(&self, model: &Model) -> Result<usize>;
}

fn unregistered(kind: &'static str, index: usize, reason: impl Into<String>) -> NlpError {
    NlpError::UnregisteredVariable {
        kind,
        index,
        reason: reason.into(),
    }
}

pub(crate) fn check_index(kind: &'static str, index: usize, len: usize) -> Result<usize> {
    if index < len {
        Ok(index)
    } else {
        Err(unregistered(
            kind,
            index,
            format!("the model has {len} {kind}s"),
        ))
    }
}

impl VariableRef for usize {
    fn resolve(&self, model: &Model) -> Result<usize> {
        check_index("variable", *self, model.num_variables())
    }
}

impl VariableRef for &Expr {
    fn resolve(&self, model: &Model) -> Result<usize> {
        match self {
            Expr::Variable(v) if v.model == model.id() => {
                check_index("variable", v.index, model.num_variables())
            }
            Expr::Variable(v) => Err(unregistered(
                "variable",
                v.index,
                "the variable belongs to another model",
            )),
            _ => Err(NlpError::InvalidModel(format!(
                "expected a variable, got {self}"
            ))),
        }
    }
}

impl ParameterRef for usize {
    fn resolve(&self, model: &Model) -> Result<usize> {
        check_index("parameter", *self, model.num_parameters())
    }
}

impl ParameterRef for &Expr {
    fn resolve(&self, model: &Model) -> Result<usize> {
        match self {
            Expr::Parameter(p) if p.model == model.id() => {
                check_index("parameter", p.index, model.num_parameters())
            }
            Expr::Parameter(p) => Err(unregistered(
                "parameter",
                p.index,
                "the parameter belongs to another model",
            )),
            _ => Err(NlpError::InvalidModel(format!(
                "expected a parameter, got {self}"
            ))),
        }
    }
}

/// Check that every leaf of `expr` is registered in `model`.
pub(crate) fn check_references(model: &Model, expr: &Expr) -> Result<()> {
    for v in expr.variables() {
        if v.model != model.id() {
            return Err(unregistered(
                "variable",
                v.index,
                "the variable belongs to another model",
            ));
        }
        check_index("variable", v.index, model.num_variables())?;
    }
    for p in expr.parameters() {
        if p.model != model.id() {
            return Err(unregistered(
                "parameter",
                p.index,
                "the parameter belongs to another model",
            ));
        }
        check_index("parameter", p.index, model.num_parameters())?;
    }
    Ok(())
}
