use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::opcode::{OpCode, UNUSED};
use super::Tape;

#[derive(Debug, Clone, Copy)]
enum OpClass {
    Linear,
    UnaryNonlinear,
    /// Cross pairs between the operands only.
    Product,
    /// Cross pairs plus all pairs within the divisor.
    Quotient,
    /// All pairs within the union of both operands.
    Power,
}

fn classify_op(op: OpCode, imm: f64) -> OpClass {
    match op {
        OpCode::Add | OpCode::Sub | OpCode::Neg => OpClass::Linear,
        OpCode::Powf if imm == 0.0 || imm == 1.0 => OpClass::Linear,
        OpCode::Sqrt
        | OpCode::Exp
        | OpCode::Log
        | OpCode::Sin
        | OpCode::Cos
        | OpCode::Tan
        | OpCode::Tanh
        | OpCode::Powf => OpClass::UnaryNonlinear,
        OpCode::Mul => OpClass::Product,
        OpCode::Div => OpClass::Quotient,
        OpCode::Pow => OpClass::Power,
        OpCode::Input | OpCode::Param | OpCode::Const => OpClass::Linear,
    }
}

/// Input slots that tape entries depend on.
///
/// Sets are computed on request and cached for the requested entry only. A walk
/// stops at any entry whose set is already cached, so a chain of nonlinear ops
/// costs one short walk per op, and linear stretches that never feed a nonlinear
/// op are never expanded.
struct DependencySets {
    depends: Vec<bool>,
    cached: Vec<Option<Rc<[u32]>>>,
    stamp: Vec<u32>,
    generation: u32,
}

impl DependencySets {
    fn new(tape: &Tape) -> Self {
        let n = tape.len();
        let mut depends = vec![false; n];
        for i in 0..n {
            let [a, b] = tape.arg_indices[i];
            depends[i] = match tape.opcodes[i] {
                OpCode::Input => true,
                OpCode::Param | OpCode::Const => false,
                op if op.is_binary() => depends[a as usize] || depends[b as usize],
                _ => depends[a as usize],
            };
        }
        DependencySets {
            depends,
            cached: vec![None; n],
            stamp: vec![0; n],
            generation: 0,
        }
    }

    fn depends(&self, entry: u32) -> bool {
        self.depends[entry as usize]
    }

    /// Sorted input slots reachable from `entry`.
    fn inputs(&mut self, tape: &Tape, entry: u32) -> Rc<[u32]> {
        if let Some(set) = &self.cached[entry as usize] {
            return Rc::clone(set);
        }
        self.generation += 1;
        let mut slots = Vec::new();
        let mut stack = vec![entry];
        while let Some(e) = stack.pop() {
            let i = e as usize;
            if self.stamp[i] == self.generation || !self.depends[i] {
                continue;
            }
            self.stamp[i] = self.generation;
            if let Some(set) = &self.cached[i] {
                slots.extend_from_slice(set);
                continue;
            }
            let op = tape.opcodes[i];
            let [a, b] = tape.arg_indices[i];
            if op == OpCode::Input {
                slots.push(a);
                continue;
            }
            if a != UNUSED && !op.is_leaf() {
                stack.push(a);
            }
            if op.is_binary() {
                stack.push(b);
            }
        }
        slots.sort_unstable();
        slots.dedup();
        let set: Rc<[u32]> = slots.into();
        self.cached[entry as usize] = Some(Rc::clone(&set));
        set
    }
}

#[derive(Default)]
struct PairSet {
    seen: HashSet<(u32, u32)>,
    pairs: Vec<(u32, u32)>,
}

impl PairSet {
    fn mark(&mut self, i: u32, j: u32) {
        let pair = if i >= j { (i, j) } else { (j, i) };
        if self.seen.insert(pair) {
            self.pairs.push(pair);
        }
    }

    fn mark_all_pairs(&mut self, set: &[u32]) {
        for (k, &i) in set.iter().enumerate() {
            for &j in &set[..=k] {
                self.mark(i, j);
            }
        }
    }

    fn mark_cross_pairs(&mut self, a: &[u32], b: &[u32]) {
        for &i in a {
            for &j in b {
                self.mark(i, j);
            }
        }
    }
}

impl Tape {
    /// Fill in the structural Hessian pairs and the per-column sweep plan.
    ///
    /// Walks the tape forward. Linear ops contribute nothing. A nonlinear unary op
    /// marks every pair of its operand's inputs. `Mul` marks the cross pairs of its
    /// operands, `Div` also marks all pairs of the divisor, and `Pow` marks all
    /// pairs of the union. Pairs are kept lower triangular in local slots and in
    /// the order they are first marked.
    pub(super) fn detect_hessian_structure(&mut self) {
        let mut deps = DependencySets::new(self);
        let mut set = PairSet::default();

        for i in 0..self.len() {
            let [a, b] = self.arg_indices[i];
            if !deps.depends[i] {
                continue;
            }
            match classify_op(self.opcodes[i], self.immediates[i]) {
                OpClass::Linear => {}
                OpClass::UnaryNonlinear => {
                    let deps_a = deps.inputs(self, a);
                    set.mark_all_pairs(&deps_a);
                }
                OpClass::Product => {
                    // A constant factor keeps the product linear.
                    if deps.depends(a) && deps.depends(b) {
                        let deps_a = deps.inputs(self, a);
                        let deps_b = deps.inputs(self, b);
                        set.mark_cross_pairs(&deps_a, &deps_b);
                    }
                }
                OpClass::Quotient => {
                    if deps.depends(b) {
                        let deps_b = deps.inputs(self, b);
                        if deps.depends(a) {
                            let deps_a = deps.inputs(self, a);
                            set.mark_cross_pairs(&deps_a, &deps_b);
                        }
                        set.mark_all_pairs(&deps_b);
                    }
                }
                OpClass::Power => {
                    let mut union = Vec::new();
                    for operand in [a, b] {
                        if deps.depends(operand) {
                            union.extend_from_slice(&deps.inputs(self, operand));
                        }
                    }
                    union.sort_unstable();
                    union.dedup();
                    set.mark_all_pairs(&union);
                }
            }
        }

        let mut columns: Vec<(u32, Vec<(usize, u32)>)> = Vec::new();
        let mut column_of: HashMap<u32, usize> = HashMap::new();
        for (pos, &(row, col)) in set.pairs.iter().enumerate() {
            let k = *column_of.entry(col).or_insert_with(|| {
                columns.push((col, Vec::new()));
                columns.len() - 1
            });
            columns[k].1.push((pos, row));
        }

        self.hessian_pairs = set.pairs;
        self.hessian_columns = columns;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::{cos, log, pow, sin, square, sum};
    use crate::expr::{Expr, ModelId, VariableData};

    fn var(model: ModelId, index: usize) -> Expr {
        Expr::Variable(VariableData {
            model,
            index,
            name: None,
        })
    }

    fn structure(e: &Expr) -> Vec<(usize, usize)> {
        Tape::record(e).unwrap().hessian_structure()
    }

    #[test]
    fn test_linear_has_empty_hessian() {
        let m = ModelId::new();
        let e = var(m, 0) * 3.0 - var(m, 1) + 2.0;
        assert!(structure(&e).is_empty());
    }

    #[test]
    fn test_product_marks_cross_pair_only() {
        let m = ModelId::new();
        assert_eq!(structure(&(var(m, 0) * var(m, 1))), vec![(1, 0)]);
    }

    #[test]
    fn test_square_of_variable() {
        let m = ModelId::new();
        let x = var(m, 0);
        assert_eq!(structure(&(&x * &x)), vec![(0, 0)]);
        assert_eq!(structure(&square(&x)), vec![(0, 0)]);
    }

    #[test]
    fn test_separable_sum() {
        let m = ModelId::new();
        let e = sum((0..4).map(|i| sin(&var(m, i))));
        assert_eq!(structure(&e), vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn test_quotient_pairs() {
        let m = ModelId::new();
        let e = var(m, 0) / var(m, 1);
        assert_eq!(structure(&e), vec![(1, 0), (1, 1)]);
    }

    #[test]
    fn test_power_marks_union() {
        let m = ModelId::new();
        let e = pow(&var(m, 0), &var(m, 1));
        assert_eq!(structure(&e), vec![(0, 0), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_constant_branches_contribute_nothing() {
        let m = ModelId::new();
        let e = log(&Expr::Constant(2.0)) * var(m, 0) + cos(&Expr::Constant(1.0));
        assert!(structure(&e).is_empty());
    }

    #[test]
    fn test_long_chains_record_in_linear_time() {
        // Each level repeats a nonlinear op over the whole chain below it, and
        // a product with a constant. Walking the chain per op would not finish.
        let m = ModelId::new();
        let x = var(m, 0);
        let y = var(m, 1);
        let mut e = x.clone();
        for _ in 0..100_000 {
            e = sin(&e) * 0.5 + &x;
        }
        e = e * &y;
        let tape = Tape::record(&e).unwrap();
        assert_eq!(tape.hessian_structure(), vec![(0, 0), (1, 0)]);
    }

    #[test]
    fn test_shared_operand_sets_are_reused() {
        let m = ModelId::new();
        let s = var(m, 0) + var(m, 1);
        let e = sin(&s) * cos(&s) + log(&s);
        let tape = Tape::record(&e).unwrap();
        assert_eq!(tape.hessian_structure(), vec![(0, 0), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_columns_cover_all_pairs() {
        let m = ModelId::new();
        let e = sin(&(var(m, 0) + var(m, 1) + var(m, 2)));
        let tape = Tape::record(&e).unwrap();
        let covered: usize = tape.hessian_columns.iter().map(|(_, r)| r.len()).sum();
        assert_eq!(covered, tape.hessian_nnz());
        assert_eq!(tape.hessian_nnz(), 6);
    }
}
