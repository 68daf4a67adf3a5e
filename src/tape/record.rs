use std::collections::HashMap;

use super::opcode::{OpCode, UNUSED};
use super::Tape;
use crate::error::{NlpError, Result};
use crate::expr::Expr;

/// Structural identity of an entry. Two nodes with the same key compute the same value.
#[derive(Debug, Hash, PartialEq, Eq)]
enum NodeKey {
    Input(usize),
    Param(usize),
    Const(u64),
    Op(OpCode, u32, u32, u64),
}

#[derive(Default)]
struct Recorder {
    opcodes: Vec<OpCode>,
    arg_indices: Vec<[u32; 2]>,
    immediates: Vec<f64>,
    inputs: Vec<usize>,
    input_entries: Vec<u32>,
    slots: HashMap<usize, u32>,
    keys: HashMap<NodeKey, u32>,
}

impl Recorder {
    fn push(&mut self, key: NodeKey, op: OpCode, args: [u32; 2], imm: f64) -> Result<u32> {
        if let Some(&pos) = self.keys.get(&key) {
            return Ok(pos);
        }
        let pos = u32::try_from(self.opcodes.len())
            .ok()
            .filter(|&p| p != UNUSED)
            .ok_or_else(|| NlpError::InvalidModel("expression has too many nodes".into()))?;
        self.opcodes.push(op);
        self.arg_indices.push(args);
        self.immediates.push(imm);
        self.keys.insert(key, pos);
        Ok(pos)
    }

    fn input(&mut self, index: usize) -> Result<u32> {
        if let Some(&slot) = self.slots.get(&index) {
            return Ok(self.input_entries[slot as usize]);
        }
        let slot = self.inputs.len() as u32;
        let pos = self.push(NodeKey::Input(index), OpCode::Input, [slot, UNUSED], 0.0)?;
        self.slots.insert(index, slot);
        self.inputs.push(index);
        self.input_entries.push(pos);
        Ok(pos)
    }
}

impl Tape {
    /// Flatten an expression into a tape.
    ///
    /// One iterative post-order traversal visits each distinct node once.
    /// Nodes shared by `Arc` and structurally identical nodes (same opcode, operands
    /// and immediate) are recorded a single time. Variables get local slots in
    /// the order they are first reached, left operand before right.
    ///
    /// # Errors
    ///
    /// Returns `InvalidModel` if the expression has more nodes than the tape can index.
    pub fn record(expr: &Expr) -> Result<Tape> {
        let mut rec = Recorder::default();
        let mut memo: HashMap<*const Expr, u32> = HashMap::new();
        let mut stack: Vec<(&Expr, bool)> = vec![(expr, false)];

        while let Some((node, expanded)) = stack.pop() {
            let ptr = node as *const Expr;
            if memo.contains_key(&ptr) {
                continue;
            }

            if !expanded {
                stack.push((node, true));
                match node {
                    Expr::Unary(_, a) => stack.push((a.as_ref(), false)),
                    Expr::Binary(_, a, b) => {
                        stack.push((b.as_ref(), false));
                        stack.push((a.as_ref(), false));
                    }
                    Expr::Constant(_) | Expr::Variable(_) | Expr::Parameter(_) => {}
                }
                continue;
            }

            let operand = |child: &Expr| memo[&(child as *const Expr)];
            let pos = match node {
                Expr::Constant(v) => {
                    rec.push(NodeKey::Const(v.to_bits()), OpCode::Const, [UNUSED, UNUSED], *v)?
                }
                Expr::Variable(v) => rec.input(v.index)?,
                Expr::Parameter(p) => {
                    let idx = u32::try_from(p.index).map_err(|_| {
                        NlpError::InvalidModel("parameter index out of range".into())
                    })?;
                    rec.push(NodeKey::Param(p.index), OpCode::Param, [idx, UNUSED], 0.0)?
                }
                Expr::Unary(op, a) => {
                    let (code, imm) = OpCode::from_unary(*op);
                    let a = operand(a.as_ref());
                    rec.push(
                        NodeKey::Op(code, a, UNUSED, imm.to_bits()),
                        code,
                        [a, UNUSED],
                        imm,
                    )?
                }
                Expr::Binary(op, a, b) => {
                    let code = OpCode::from_binary(*op);
                    let (a, b) = (operand(a.as_ref()), operand(b.as_ref()));
                    rec.push(NodeKey::Op(code, a, b, 0), code, [a, b], 0.0)?
                }
            };
            memo.insert(ptr, pos);
        }

        let output_index = memo[&(expr as *const Expr)];
        let min_point_len = rec.inputs.iter().max().map_or(0, |&m| m + 1);
        let min_params_len = rec
            .opcodes
            .iter()
            .zip(&rec.arg_indices)
            .filter(|(op, _)| **op == OpCode::Param)
            .map(|(_, args)| args[0] as usize + 1)
            .max()
            .unwrap_or(0);
        let mut tape = Tape {
            opcodes: rec.opcodes,
            arg_indices: rec.arg_indices,
            immediates: rec.immediates,
            inputs: rec.inputs,
            input_entries: rec.input_entries,
            output_index,
            min_point_len,
            min_params_len,
            hessian_pairs: Vec::new(),
            hessian_columns: Vec::new(),
        };
        tape.detect_hessian_structure();
        Ok(tape)
    }
}
