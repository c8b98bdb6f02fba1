//! LSTM cell evaluation.
//!
//! Two kernels implement [`LstmKernel`]: [`FloatLstm`] (f32 reference) and
//! [`QuantizedLstm`] (int8 activations, int8 weights, int16 gates and cell).
//! [`sequence::run_sequence`] drives either of them over a whole input
//! sequence inside caller-owned buffers.

pub mod cell;
pub mod float;
pub mod gate;
pub mod hidden;
pub mod integer;
pub mod sequence;

pub use float::{FloatLstm, FloatLstmBuilder, FloatProjection};
pub use gate::{FloatGate, GateParameters, QuantizedGate};
pub use integer::{QuantizedLstm, QuantizedLstmBuilder, QuantizedProjection};
pub use sequence::{run_sequence, step, SequenceInput, SequenceLayout};

use crate::activation::Activation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    Forget,
    Input,
    /// Candidate cell values, `g` in the usual notation.
    Modulation,
    Output,
}

impl Gate {
    /// Evaluation order within a step.
    pub const ALL: [Gate; 4] = [Gate::Forget, Gate::Input, Gate::Modulation, Gate::Output];

    pub fn name(self) -> &'static str {
        match self {
            Gate::Forget => "forget",
            Gate::Input => "input",
            Gate::Modulation => "modulation",
            Gate::Output => "output",
        }
    }
}

/// One value per gate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GateSet<T> {
    pub forget: T,
    pub input: T,
    pub modulation: T,
    pub output: T,
}

impl<T> GateSet<T> {
    pub fn get(&self, gate: Gate) -> &T {
        match gate {
            Gate::Forget => &self.forget,
            Gate::Input => &self.input,
            Gate::Modulation => &self.modulation,
            Gate::Output => &self.output,
        }
    }

    pub fn get_mut(&mut self, gate: Gate) -> &mut T {
        match gate {
            Gate::Forget => &mut self.forget,
            Gate::Input => &mut self.input,
            Gate::Modulation => &mut self.modulation,
            Gate::Output => &mut self.output,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LstmDims {
    pub n_input: usize,
    /// Number of cell units (the "state" size).
    pub n_cell: usize,
    /// Hidden/output width; equals `n_cell` unless a projection is configured.
    pub n_output: usize,
    #[serde(default)]
    pub n_aux_input: usize,
}

impl LstmDims {
    pub fn new(n_input: usize, n_cell: usize, n_output: usize) -> Self {
        Self { n_input, n_cell, n_output, n_aux_input: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LstmSettings {
    /// Modulation gate and cell-to-hidden activation.
    #[serde(default)]
    pub activation: Activation,
    /// Symmetric cell clip; 0 disables clipping.
    #[serde(default)]
    pub cell_clip: f32,
    /// Symmetric projection clip; 0 disables clipping.
    #[serde(default)]
    pub proj_clip: f32,
    /// CIFG: the input gate is `1 - forget`.
    #[serde(default)]
    pub use_coupled_gates: bool,
}

impl Default for LstmSettings {
    fn default() -> Self {
        Self { activation: Activation::Tanh, cell_clip: 0.0, proj_clip: 0.0, use_coupled_gates: false }
    }
}

/// Inputs of one step for every batch row in flight.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a, A> {
    pub input: &'a [A],
    /// Caller-detected all-zero input; lets the kernel skip the product.
    pub input_is_zero: bool,
    pub aux: Option<&'a [A]>,
    pub aux_is_zero: bool,
}

impl<'a, A> StepInput<'a, A> {
    pub fn new(input: &'a [A]) -> Self { Self { input, input_is_zero: false, aux: None, aux_is_zero: false } }
}

/// Recurrent state carried across steps: hidden `[batch][n_output]`, cell `[batch][n_cell]`.
#[derive(Debug)]
pub struct RecurrentState<'a, A, C> {
    pub hidden: &'a mut [A],
    pub cell: &'a mut [C],
}

/// Per-call workspaces, each at least `[batch][n_cell]`.
#[derive(Debug)]
pub struct StepScratch<'a, G, A> {
    pub gates: GateSet<&'a mut [G]>,
    /// Gated hidden before projection, in the activation type.
    pub hidden: &'a mut [A],
}

/// Owned scratch sized once at preparation time.
#[derive(Debug, Clone)]
pub struct ScratchBuffers<G, A> {
    gates: GateSet<Vec<G>>,
    hidden: Vec<A>,
}

impl<G: Copy + Default, A: Copy + Default> ScratchBuffers<G, A> {
    pub fn new(dims: &LstmDims, n_batch: usize) -> Self {
        let len = n_batch * dims.n_cell;
        Self {
            gates: GateSet {
                forget: vec![G::default(); len],
                input: vec![G::default(); len],
                modulation: vec![G::default(); len],
                output: vec![G::default(); len],
            },
            hidden: vec![A::default(); len],
        }
    }

    pub fn view(&mut self) -> StepScratch<'_, G, A> {
        let GateSet { forget, input, modulation, output } = &mut self.gates;
        StepScratch {
            gates: GateSet {
                forget: forget.as_mut_slice(),
                input: input.as_mut_slice(),
                modulation: modulation.as_mut_slice(),
                output: output.as_mut_slice(),
            },
            hidden: self.hidden.as_mut_slice(),
        }
    }
}

/// Owned recurrent state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateBuffers<A, C> {
    pub hidden: Vec<A>,
    pub cell: Vec<C>,
}

impl<A: Copy, C: Copy> StateBuffers<A, C> {
    /// State filled with the stored representation of zero (`hidden_zero` carries the zero point).
    pub fn new(dims: &LstmDims, n_batch: usize, hidden_zero: A, cell_zero: C) -> Self {
        Self { hidden: vec![hidden_zero; n_batch * dims.n_output], cell: vec![cell_zero; n_batch * dims.n_cell] }
    }

    pub fn view(&mut self) -> RecurrentState<'_, A, C> {
        RecurrentState { hidden: &mut self.hidden, cell: &mut self.cell }
    }
}

/// Gate, cell and hidden computations of one LSTM flavour.
///
/// Slices are batched `[batch][element]`. None of these allocate; buffer sizes
/// are checked once by [`run_sequence`].
pub trait LstmKernel {
    /// Input, hidden and output element type.
    type Activation: Copy + Default + PartialEq;
    /// Gate output type.
    type Gate: Copy + Default;
    type Cell: Copy + Default;

    fn dims(&self) -> LstmDims;

    fn uses_coupled_gates(&self) -> bool;

    /// Activated gate values into `out` (`n_batch * n_cell`). `cell` is only
    /// read by peephole connections.
    fn compute_gate(
        &self,
        gate: Gate,
        input: &StepInput<'_, Self::Activation>,
        hidden: &[Self::Activation],
        cell: &[Self::Cell],
        n_batch: usize,
        out: &mut [Self::Gate],
    );

    /// `cell = clip(forget ⊙ cell + input ⊙ modulation)`. `input` is `None` with coupled gates.
    fn update_cell(
        &self,
        n_batch: usize,
        cell: &mut [Self::Cell],
        forget: &[Self::Gate],
        input: Option<&[Self::Gate]>,
        modulation: &[Self::Gate],
    );

    /// `hidden = project(output_gate ⊙ act(cell))`.
    fn update_hidden(
        &self,
        n_batch: usize,
        cell: &[Self::Cell],
        output_gate: &[Self::Gate],
        activated_cell: &mut [Self::Gate],
        gated: &mut [Self::Activation],
        hidden: &mut [Self::Activation],
    );
}
