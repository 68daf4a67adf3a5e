//! Evaluation tape for exact first and second derivatives.
//!
//! An expression DAG is flattened once into a topologically ordered sequence of
//! entries. The tape itself only holds structure: opcodes, operand positions,
//! immediates and the mapping from local variable slots to model variables. All
//! point-dependent numbers live in a [`Workspace`], so one tape can be evaluated
//! at any number of points, and every model expression owns its own buffers.
//!
//! Sweeps, each adding an impl block to [`Tape`]:
//! - `record` - flattening with sharing detection
//! - `forward` - values and local partials
//! - `reverse` - adjoints, and the second-order sweep giving one Hessian column
//! - `sparsity` - structural Hessian pairs
//! - `degree` - polynomial degree

mod degree;
mod forward;
mod record;
mod reverse;
mod sparsity;

pub mod opcode;

pub use degree::Degree;
pub use opcode::{OpCode, Partials, UNUSED};

/// A recorded expression.
///
/// Created by [`Tape::record`]. Immutable afterwards.
#[derive(Debug, Clone)]
pub struct Tape {
    pub(crate) opcodes: Vec<OpCode>,
    pub(crate) arg_indices: Vec<[u32; 2]>,
    /// `Const` value or `Powf` exponent, 0 otherwise.
    pub(crate) immediates: Vec<f64>,
    /// Model variable index for each local slot, in first-seen order.
    pub(crate) inputs: Vec<usize>,
    /// Tape entry of each local slot.
    pub(crate) input_entries: Vec<u32>,
    pub(crate) output_index: u32,
    /// Smallest point length that covers every input.
    pub(crate) min_point_len: usize,
    /// Smallest parameter slice that covers every parameter entry.
    pub(crate) min_params_len: usize,
    /// Structural Hessian pairs as local slots, `row >= col`, first-seen order.
    pub(crate) hessian_pairs: Vec<(u32, u32)>,
    /// For each Hessian column: the local column slot and `(pair position, row slot)`.
    pub(crate) hessian_columns: Vec<(u32, Vec<(usize, u32)>)>,
}

impl Tape {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.opcodes.len()
    }

    /// Check if the tape has no entries.
    pub fn is_empty(&self) -> bool {
        self.opcodes.is_empty()
    }

    /// Model variable indices the expression depends on, in first-seen order.
    ///
    /// Position `k` in this slice is local slot `k`.
    pub fn inputs(&self) -> &[usize] {
        &self.inputs
    }

    /// Number of distinct variables.
    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Structural Hessian pairs as `(row, col)` model indices with `row >= col`.
    pub fn hessian_structure(&self) -> Vec<(usize, usize)> {
        self.hessian_pairs
            .iter()
            .map(|&(r, c)| {
                let (r, c) = (self.inputs[r as usize], self.inputs[c as usize]);
                if r >= c {
                    (r, c)
                } else {
                    (c, r)
                }
            })
            .collect()
    }

    /// Number of structural Hessian pairs.
    pub fn hessian_nnz(&self) -> usize {
        self.hessian_pairs.len()
    }

    /// Opcode of an entry.
    pub fn opcode(&self, entry: usize) -> OpCode {
        self.opcodes[entry]
    }
}

/// Per-point numeric buffers for one tape.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    pub(crate) values: Vec<f64>,
    pub(crate) partials: Vec<Partials>,
    pub(crate) adjoints: Vec<f64>,
    pub(crate) tangents: Vec<f64>,
    pub(crate) second: Vec<f64>,
}

impl Workspace {
    /// Allocate buffers sized for `tape`.
    pub fn new(tape: &Tape) -> Self {
        let n = tape.len();
        Workspace {
            values: vec![0.0; n],
            partials: vec![Partials::default(); n],
            adjoints: vec![0.0; n],
            tangents: vec![0.0; n],
            second: vec![0.0; n],
        }
    }

    /// Value of the output after the last forward sweep.
    pub fn value_of(&self, tape: &Tape) -> f64 {
        self.values[tape.output_index as usize]
    }
}
