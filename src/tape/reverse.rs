use super::forward::domain;
use super::opcode::OpCode;
use super::{Tape, Workspace};
use crate::error::Result;

impl Tape {
    /// Reverse sweep: adjoints of every entry, seeded with 1 at the output.
    ///
    /// Reads the partials stored by the last [`forward`](Self::forward).
    ///
    /// # Errors
    ///
    /// `Domain` if a partial that carries a nonzero adjoint is not finite, e.g.
    /// the derivative of `sqrt` at 0.
    pub fn reverse(&self, ws: &mut Workspace) -> Result<()> {
        ws.adjoints.iter_mut().for_each(|a| *a = 0.0);
        ws.adjoints[self.output_index as usize] = 1.0;

        for i in (0..=self.output_index as usize).rev() {
            let adj = ws.adjoints[i];
            let op = self.opcodes[i];
            if adj == 0.0 || op.is_leaf() {
                continue;
            }
            let p = ws.partials[i];
            if !p.first_finite() {
                return Err(domain(i, op, "derivative is not finite".into()));
            }
            let [a, b] = self.arg_indices[i];
            self.accumulate(&mut ws.adjoints, a, p.da * adj)
                .map_err(|reason| domain(i, op, reason.into()))?;
            if op.is_binary() {
                self.accumulate(&mut ws.adjoints, b, p.db * adj)
                    .map_err(|reason| domain(i, op, reason.into()))?;
            }
        }
        Ok(())
    }

    /// Add `delta` to the buffer slot of operand `entry`.
    ///
    /// Constants and parameters are never read back, so nothing is stored for
    /// them. Any other slot must stay finite.
    fn accumulate(
        &self,
        buf: &mut [f64],
        entry: u32,
        delta: f64,
    ) -> std::result::Result<(), &'static str> {
        let entry = entry as usize;
        if matches!(self.opcodes[entry], OpCode::Const | OpCode::Param) {
            return Ok(());
        }
        let sum = buf[entry] + delta;
        if !sum.is_finite() {
            return Err("derivative overflowed");
        }
        buf[entry] = sum;
        Ok(())
    }

    /// Gradient with respect to each local slot after [`reverse`](Self::reverse).
    ///
    /// `out[k]` is the derivative with respect to model variable `inputs()[k]`.
    pub fn gradient_into(&self, ws: &Workspace, out: &mut [f64]) {
        for (o, &entry) in out.iter_mut().zip(&self.input_entries) {
            *o = ws.adjoints[entry as usize];
        }
    }

    /// Second-order sweep for one Hessian column.
    ///
    /// Propagates a tangent seeded at local slot `col`, then accumulates
    /// second-order adjoints backwards reusing the stored first and second
    /// partials and the first-order adjoints. Afterwards the second-order
    /// adjoint of each input entry holds `d2f / (dx_row dx_col)`.
    ///
    /// Requires [`forward`](Self::forward) and [`reverse`](Self::reverse) at the same point.
    ///
    /// # Errors
    ///
    /// `Domain` if a used second partial is not finite.
    pub fn second_order(&self, col: u32, ws: &mut Workspace) -> Result<()> {
        let out = self.output_index as usize;
        ws.tangents.iter_mut().for_each(|t| *t = 0.0);
        ws.second.iter_mut().for_each(|s| *s = 0.0);
        ws.tangents[self.input_entries[col as usize] as usize] = 1.0;

        for i in 0..=out {
            let op = self.opcodes[i];
            if op.is_leaf() {
                continue;
            }
            let [a, b] = self.arg_indices[i];
            let p = ws.partials[i];
            let mut t = 0.0;
            let ta = ws.tangents[a as usize];
            if ta != 0.0 {
                t += p.da * ta;
            }
            if op.is_binary() {
                let tb = ws.tangents[b as usize];
                if tb != 0.0 {
                    t += p.db * tb;
                }
            }
            ws.tangents[i] = t;
        }

        for i in (0..=out).rev() {
            let op = self.opcodes[i];
            if op.is_leaf() {
                continue;
            }
            let s = ws.second[i];
            let adj = ws.adjoints[i];
            if s == 0.0 && adj == 0.0 {
                continue;
            }
            let [a, b] = self.arg_indices[i];
            let p = ws.partials[i];
            let ta = ws.tangents[a as usize];

            if op.is_binary() {
                let tb = ws.tangents[b as usize];
                let sa = scaled(p.da, s) + scaled(adj, scaled(p.daa, ta) + scaled(p.dab, tb));
                let sb = scaled(p.db, s) + scaled(adj, scaled(p.dab, ta) + scaled(p.dbb, tb));
                if !sa.is_finite() || !sb.is_finite() {
                    return Err(domain(i, op, "second derivative is not finite".into()));
                }
                self.accumulate(&mut ws.second, a, sa)
                    .and_then(|()| self.accumulate(&mut ws.second, b, sb))
                    .map_err(|reason| domain(i, op, reason.into()))?;
            } else {
                let sa = scaled(p.da, s) + scaled(adj, scaled(p.daa, ta));
                if !sa.is_finite() {
                    return Err(domain(i, op, "second derivative is not finite".into()));
                }
                self.accumulate(&mut ws.second, a, sa)
                    .map_err(|reason| domain(i, op, reason.into()))?;
            }
        }
        Ok(())
    }

    /// Structural Hessian values, aligned with the tape's Hessian pairs.
    ///
    /// Runs one second-order sweep per distinct column. Requires
    /// [`forward`](Self::forward) and [`reverse`](Self::reverse) at the same point.
    pub fn hessian_into(&self, ws: &mut Workspace, out: &mut [f64]) -> Result<()> {
        for (col, rows) in &self.hessian_columns {
            self.second_order(*col, ws)?;
            for &(pos, row) in rows {
                out[pos] = ws.second[self.input_entries[row as usize] as usize];
            }
        }
        Ok(())
    }
}

/// Product that treats an exact zero factor as annihilating, so an unused
/// infinite partial never turns into NaN.
#[inline]
fn scaled(a: f64, b: f64) -> f64 {
    if a == 0.0 || b == 0.0 {
        0.0
    } else {
        a * b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::{exp, sqrt};
    use crate::error::NlpError;
    use crate::expr::{Expr, ModelId, VariableData};
    use approx::assert_relative_eq;

    fn var(model: ModelId, index: usize) -> Expr {
        Expr::Variable(VariableData {
            model,
            index,
            name: None,
        })
    }

    #[test]
    fn test_gradient_of_product() {
        let m = ModelId::new();
        let (x, y) = (var(m, 0), var(m, 1));
        let tape = Tape::record(&(&x * &y + &x)).unwrap();
        let mut ws = Workspace::new(&tape);
        tape.forward(&[2.0, 3.0], &[], &mut ws).unwrap();
        tape.reverse(&mut ws).unwrap();
        let mut g = [0.0; 2];
        tape.gradient_into(&ws, &mut g);
        assert_eq!(g, [4.0, 2.0]);
    }

    #[test]
    fn test_hessian_of_exp_product() {
        // f = exp(x * y): H = exp(xy) [[y^2, 1 + xy], [1 + xy, x^2]]
        let m = ModelId::new();
        let (x, y) = (var(m, 0), var(m, 1));
        let tape = Tape::record(&exp(&(&x * &y))).unwrap();
        let mut ws = Workspace::new(&tape);
        let (a, b) = (0.3, -0.7);
        tape.forward(&[a, b], &[], &mut ws).unwrap();
        tape.reverse(&mut ws).unwrap();
        let mut h = vec![0.0; tape.hessian_nnz()];
        tape.hessian_into(&mut ws, &mut h).unwrap();

        let f = (a * b).exp();
        for (k, &(r, c)) in tape.hessian_structure().iter().enumerate() {
            let expected = match (r, c) {
                (0, 0) => f * b * b,
                (1, 1) => f * a * a,
                (1, 0) => f * (1.0 + a * b),
                other => panic!("unexpected pair {other:?}"),
            };
            assert_relative_eq!(h[k], expected, max_relative = 1e-12);
        }
        assert_eq!(tape.hessian_nnz(), 3);
    }

    #[test]
    fn test_sqrt_gradient_at_zero_is_domain_error() {
        let m = ModelId::new();
        let tape = Tape::record(&sqrt(&var(m, 0))).unwrap();
        let mut ws = Workspace::new(&tape);
        assert_eq!(tape.forward(&[0.0], &[], &mut ws).unwrap(), 0.0);
        let err = tape.reverse(&mut ws).unwrap_err();
        assert!(matches!(err, NlpError::Domain { op: "sqrt", .. }));
    }

    #[test]
    fn test_gradient_overflow_is_domain_error() {
        // Value 1e300 is finite but d/dx = 1e400 is not.
        let m = ModelId::new();
        let x = var(m, 0);
        let tape = Tape::record(&(1e200 * (1e200 * &x))).unwrap();
        let mut ws = Workspace::new(&tape);
        assert_eq!(tape.forward(&[1e-100], &[], &mut ws).unwrap(), 1e300);
        let err = tape.reverse(&mut ws).unwrap_err();
        assert!(matches!(err, NlpError::Domain { op: "mul", .. }));
    }

    #[test]
    fn test_second_order_overflow_is_domain_error() {
        // log at 1e-160: value and gradient are finite, d2/dx2 = -1e320 is not.
        let m = ModelId::new();
        let x = var(m, 0);
        let tape = Tape::record(&(crate::atoms::log(&x) * 2.0)).unwrap();
        let mut ws = Workspace::new(&tape);
        tape.forward(&[1e-160], &[], &mut ws).unwrap();
        tape.reverse(&mut ws).unwrap();
        let mut h = vec![0.0; tape.hessian_nnz()];
        assert!(tape.hessian_into(&mut ws, &mut h).unwrap_err().is_domain());
    }

    #[test]
    fn test_unused_infinite_partial_does_not_poison() {
        // sqrt(x) * 0 + y: the sqrt branch carries a zero adjoint.
        let m = ModelId::new();
        let (x, y) = (var(m, 0), var(m, 1));
        let e = sqrt(&x) * 0.0 + &y * &y;
        let tape = Tape::record(&e).unwrap();
        let mut ws = Workspace::new(&tape);
        tape.forward(&[0.0, 2.0], &[], &mut ws).unwrap();
        tape.reverse(&mut ws).unwrap();
        let mut g = [0.0; 2];
        tape.gradient_into(&ws, &mut g);
        assert_eq!(g, [0.0, 4.0]);
    }
}
