//! Step sequencing over a whole input sequence.

use super::{Gate, LstmKernel, RecurrentState, StepInput, StepScratch};
use crate::error::{ConfigError, Result};
use crate::tensor_utils::is_zero_vector;
use log::debug;
use serde::{Deserialize, Serialize};

/// How the input and output sequences are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceLayout {
    /// `[time][batch][feature]` when set, `[batch][time][feature]` otherwise.
    #[serde(default)]
    pub time_major: bool,
    /// Backward sequences consume time steps from last to first.
    #[serde(default = "default_forward")]
    pub forward_sequence: bool,
    /// Column at which each output row starts.
    #[serde(default)]
    pub output_offset: usize,
    /// Distance between output rows; `None` means `n_output` (dense).
    #[serde(default)]
    pub output_row_stride: Option<usize>,
}

fn default_forward() -> bool { true }

impl Default for SequenceLayout {
    fn default() -> Self { Self { time_major: false, forward_sequence: true, output_offset: 0, output_row_stride: None } }
}

/// An input sequence, optionally with an auxiliary input of the same layout.
#[derive(Debug, Clone, Copy)]
pub struct SequenceInput<'a, A> {
    pub input: &'a [A],
    pub aux: Option<&'a [A]>,
    pub n_batch: usize,
    pub max_time: usize,
}

impl<'a, A> SequenceInput<'a, A> {
    pub fn new(input: &'a [A], n_batch: usize, max_time: usize) -> Self {
        Self { input, aux: None, n_batch, max_time }
    }

    pub fn with_aux(mut self, aux: &'a [A]) -> Self { self.aux = Some(aux); self }
}

/// One time step for `n_batch` rows: forget, input, modulation, cell update,
/// output gate, hidden update. The output gate follows the cell update so a
/// peephole on it observes the new cell.
pub fn step<K: LstmKernel>(
    kernel: &K,
    input: &StepInput<'_, K::Activation>,
    n_batch: usize,
    state: &mut RecurrentState<'_, K::Activation, K::Cell>,
    scratch: &mut StepScratch<'_, K::Gate, K::Activation>,
) {
    let dims = kernel.dims();
    let len = n_batch * dims.n_cell;
    let hidden_len = n_batch * dims.n_output;
    let gates = &mut scratch.gates;
    let hidden = &mut state.hidden[..hidden_len];
    let cell = &mut state.cell[..len];

    kernel.compute_gate(Gate::Forget, input, hidden, cell, n_batch, &mut gates.forget[..len]);
    let coupled = kernel.uses_coupled_gates();
    if !coupled {
        kernel.compute_gate(Gate::Input, input, hidden, cell, n_batch, &mut gates.input[..len]);
    }
    kernel.compute_gate(Gate::Modulation, input, hidden, cell, n_batch, &mut gates.modulation[..len]);
    kernel.update_cell(
        n_batch,
        cell,
        &gates.forget[..len],
        if coupled { None } else { Some(&gates.input[..len]) },
        &gates.modulation[..len],
    );
    kernel.compute_gate(Gate::Output, input, hidden, cell, n_batch, &mut gates.output[..len]);
    // the input gate buffer is free from here on
    kernel.update_hidden(
        n_batch,
        cell,
        &gates.output[..len],
        &mut gates.input[..len],
        &mut scratch.hidden[..len],
        hidden,
    );
}

fn require(what: &'static str, needed: usize, got: usize) -> Result<()> {
    if got < needed {
        return Err(ConfigError::BufferTooSmall { what, needed, got });
    }
    Ok(())
}

/// Run `kernel` over a sequence, writing each step's hidden state into `output`.
///
/// All buffer sizes are checked up front; once that passes evaluation cannot
/// fail. Batch rows are independent, so the batch-major layout runs each row's
/// full sequence before the next.
pub fn run_sequence<K: LstmKernel>(
    kernel: &K,
    input: &SequenceInput<'_, K::Activation>,
    state: &mut RecurrentState<'_, K::Activation, K::Cell>,
    scratch: &mut StepScratch<'_, K::Gate, K::Activation>,
    output: &mut [K::Activation],
    layout: &SequenceLayout,
) -> Result<()> {
    let dims = kernel.dims();
    let (n_batch, max_time) = (input.n_batch, input.max_time);
    let (n_input, n_cell, n_output) = (dims.n_input, dims.n_cell, dims.n_output);
    let stride = layout.output_row_stride.unwrap_or(n_output);
    if layout.output_offset + n_output > stride {
        return Err(ConfigError::DimensionMismatch {
            what: "output_row_stride",
            expected: layout.output_offset + n_output,
            got: stride,
        });
    }
    if input.input.len() != n_batch * max_time * n_input {
        return Err(ConfigError::DimensionMismatch {
            what: "input",
            expected: n_batch * max_time * n_input,
            got: input.input.len(),
        });
    }
    if let Some(aux) = input.aux {
        if aux.len() != n_batch * max_time * dims.n_aux_input {
            return Err(ConfigError::DimensionMismatch {
                what: "aux_input",
                expected: n_batch * max_time * dims.n_aux_input,
                got: aux.len(),
            });
        }
    }
    require("hidden state", n_batch * n_output, state.hidden.len())?;
    require("cell state", n_batch * n_cell, state.cell.len())?;
    for gate in Gate::ALL {
        require("gate scratch", n_batch * n_cell, scratch.gates.get(gate).len())?;
    }
    require("hidden scratch", n_batch * n_cell, scratch.hidden.len())?;
    require("output", n_batch * max_time * stride, output.len())?;

    debug!(
        "running {} steps over {} batch rows ({}, {})",
        max_time,
        n_batch,
        if layout.time_major { "time major" } else { "batch major" },
        if layout.forward_sequence { "forward" } else { "backward" }
    );

    let n_aux = dims.n_aux_input;
    let time_index = |t: usize| if layout.forward_sequence { t } else { max_time - 1 - t };
    let (data, aux_data) = (input.input, input.aux);
    let step_input = move |offset: usize, rows: usize| {
        let x = &data[offset * n_input..(offset + rows) * n_input];
        let aux = aux_data.map(|a| &a[offset * n_aux..(offset + rows) * n_aux]);
        StepInput {
            input: x,
            input_is_zero: is_zero_vector(x),
            aux,
            aux_is_zero: aux.map_or(true, is_zero_vector),
        }
    };

    if layout.time_major {
        for t in 0..max_time {
            let t_rel = time_index(t);
            let x = step_input(t_rel * n_batch, n_batch);
            step(kernel, &x, n_batch, state, scratch);
            for b in 0..n_batch {
                let start = (t_rel * n_batch + b) * stride + layout.output_offset;
                output[start..start + n_output].copy_from_slice(&state.hidden[b * n_output..(b + 1) * n_output]);
            }
        }
    } else {
        for b in 0..n_batch {
            let mut row = RecurrentState {
                hidden: &mut state.hidden[b * n_output..(b + 1) * n_output],
                cell: &mut state.cell[b * n_cell..(b + 1) * n_cell],
            };
            for t in 0..max_time {
                let index = b * max_time + time_index(t);
                let x = step_input(index, 1);
                step(kernel, &x, 1, &mut row, scratch);
                let start = index * stride + layout.output_offset;
                output[start..start + n_output].copy_from_slice(&row.hidden[..]);
            }
        }
    }
    debug!("sequence finished");
    Ok(())
}
