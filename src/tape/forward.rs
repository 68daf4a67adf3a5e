use super::opcode::{self, OpCode};
use super::{Tape, Workspace};
use crate::error::{EvalTarget, NlpError, Result};

impl Tape {
    /// Forward sweep: evaluate every entry at `point` and store local partials.
    ///
    /// `point` is indexed by model variable index and `params` by parameter index.
    /// Returns the output value.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if `point` or `params` is too short for the recorded
    /// indices, and `Domain` at the first entry whose value is undefined or
    /// non-finite.
    pub fn forward(&self, point: &[f64], params: &[f64], ws: &mut Workspace) -> Result<f64> {
        if point.len() < self.min_point_len {
            return Err(NlpError::dimension("point", self.min_point_len, point.len()));
        }
        if params.len() < self.min_params_len {
            return Err(NlpError::dimension(
                "parameters",
                self.min_params_len,
                params.len(),
            ));
        }
        if ws.values.len() != self.len() {
            *ws = Workspace::new(self);
        }

        for i in 0..self.opcodes.len() {
            let op = self.opcodes[i];
            let [a_idx, b_idx] = self.arg_indices[i];
            let (value, partials) = match op {
                OpCode::Input => {
                    let v = point[self.inputs[a_idx as usize]];
                    if !v.is_finite() {
                        return Err(domain(i, op, format!("variable value {v} is not finite")));
                    }
                    (v, Default::default())
                }
                OpCode::Param => {
                    let v = params[a_idx as usize];
                    if !v.is_finite() {
                        return Err(domain(i, op, format!("parameter value {v} is not finite")));
                    }
                    (v, Default::default())
                }
                OpCode::Const => {
                    let v = self.immediates[i];
                    if !v.is_finite() {
                        return Err(domain(i, op, format!("constant {v} is not finite")));
                    }
                    (v, Default::default())
                }
                op => {
                    let a = ws.values[a_idx as usize];
                    let b = if op.is_binary() {
                        ws.values[b_idx as usize]
                    } else {
                        0.0
                    };
                    opcode::eval_local(op, a, b, self.immediates[i])
                        .map_err(|reason| domain(i, op, reason))?
                }
            };
            ws.values[i] = value;
            ws.partials[i] = partials;
        }

        Ok(ws.values[self.output_index as usize])
    }
}

pub(super) fn domain(entry: usize, op: OpCode, reason: String) -> NlpError {
    NlpError::Domain {
        target: EvalTarget::Expression,
        entry,
        op: op.name(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::{log, sqrt};
    use crate::expr::{Expr, ModelId, ParameterData, VariableData};
    use approx::assert_relative_eq;

    fn var(model: ModelId, index: usize) -> Expr {
        Expr::Variable(VariableData {
            model,
            index,
            name: None,
        })
    }

    #[test]
    fn test_forward_value() {
        let m = ModelId::new();
        let (x, y) = (var(m, 0), var(m, 1));
        let e = &x * &y + x.sin();
        let tape = Tape::record(&e).unwrap();
        let mut ws = Workspace::new(&tape);
        let v = tape.forward(&[0.5, 2.0], &[], &mut ws).unwrap();
        assert_relative_eq!(v, 1.0 + 0.5f64.sin());
    }

    #[test]
    fn test_forward_reads_parameters() {
        let m = ModelId::new();
        let p = Expr::Parameter(ParameterData {
            model: m,
            index: 0,
            name: None,
        });
        let e = &p * var(m, 0);
        let tape = Tape::record(&e).unwrap();
        let mut ws = Workspace::new(&tape);
        assert_relative_eq!(tape.forward(&[3.0], &[2.0], &mut ws).unwrap(), 6.0);
        assert_relative_eq!(tape.forward(&[3.0], &[-1.0], &mut ws).unwrap(), -3.0);
        assert!(tape.forward(&[3.0], &[], &mut ws).is_err());
    }

    #[test]
    fn test_domain_error_names_entry() {
        let m = ModelId::new();
        let x = var(m, 0);
        let e = sqrt(&x) + log(&x);
        let tape = Tape::record(&e).unwrap();
        let mut ws = Workspace::new(&tape);
        let err = tape.forward(&[0.0], &[], &mut ws).unwrap_err();
        match err {
            NlpError::Domain { entry, op, .. } => {
                assert_eq!(op, "log");
                assert_eq!(tape.opcode(entry), OpCode::Log);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_short_point_is_dimension_mismatch() {
        let m = ModelId::new();
        let tape = Tape::record(&var(m, 3)).unwrap();
        let mut ws = Workspace::new(&tape);
        let err = tape.forward(&[1.0, 2.0], &[], &mut ws).unwrap_err();
        assert!(matches!(err, NlpError::DimensionMismatch { expected: 4, got: 2, .. }));
    }

    #[test]
    fn test_nan_input_is_domain_error() {
        let m = ModelId::new();
        let tape = Tape::record(&(var(m, 0) + 1.0)).unwrap();
        let mut ws = Workspace::new(&tape);
        assert!(tape.forward(&[f64::NAN], &[], &mut ws).unwrap_err().is_domain());
    }
}
