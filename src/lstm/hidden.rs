//! Hidden state: `h = project(o ⊙ act(c))`.

use super::float::FloatProjection;
use super::integer::QuantizedProjection;
use crate::activation::{tanh_i16_in_place, Activation};
use crate::quant::{EvaluationParameters, Quantized};
use crate::tensor_utils::*;

/// Float hidden update. Without projection `n_output == n_cell` and the gated
/// cell is the hidden state.
#[allow(clippy::too_many_arguments)]
pub fn update_hidden_float(
    cell: &[f32],
    output_gate: &[f32],
    activation: Activation,
    projection: Option<&FloatProjection>,
    proj_clip: f32,
    n_batch: usize,
    n_cell: usize,
    n_output: usize,
    gated: &mut [f32],
    hidden: &mut [f32],
) {
    let len = n_batch * n_cell;
    let target = match projection {
        Some(_) => &mut gated[..len],
        None => &mut hidden[..len],
    };
    for ((h, &c), &o) in target.iter_mut().zip(&cell[..len]).zip(&output_gate[..len]) {
        *h = o * activation.apply(c);
    }
    if let Some(projection) = projection {
        let hidden = &mut hidden[..n_batch * n_output];
        match &projection.bias {
            Some(bias) => vector_batch_vector_assign(bias, n_output, n_batch, hidden),
            None => hidden.fill(0.0),
        }
        matrix_batch_vector_multiply_accumulate(&projection.weights, n_output, n_cell, &gated[..len], n_batch, hidden);
        if proj_clip > 0.0 {
            cwise_clipping_f32(hidden, proj_clip);
        }
    }
}

/// Integer hidden update.
///
/// `tanh(c)` is realigned from the cell scale to Q0.15, multiplied with the
/// Q0.15 output gate and requantised to the int8 hidden domain. The optional
/// projection maps it to the int8 output domain.
#[allow(clippy::too_many_arguments)]
pub fn update_hidden_integer(
    cell: &[i16],
    output_gate: &[i16],
    params: &EvaluationParameters,
    projection: Option<&QuantizedProjection>,
    n_batch: usize,
    n_cell: usize,
    n_output: usize,
    activated: &mut [i16],
    gated: &mut [i8],
    hidden: &mut [i8],
) {
    let len = n_batch * n_cell;
    let activated = &mut activated[..len];
    activated.copy_from_slice(&cell[..len]);
    tanh_i16_in_place(activated, params.cell_scale);

    let target = match projection {
        Some(_) => &mut gated[..len],
        None => &mut hidden[..len],
    };
    for ((h, &t), &o) in target.iter_mut().zip(activated.iter()).zip(&output_gate[..len]) {
        let value = params.hidden.apply(t as i32 * o as i32).saturating_add(params.hidden_zero_point);
        *h = i8::saturate(value);
    }

    if let Some(projection) = projection {
        let hidden = &mut hidden[..n_batch * n_output];
        hidden.fill(0);
        matrix_batch_vector_multiply_accumulate_i8(
            Some(&gated[..len]),
            &projection.folded_bias,
            &projection.weights,
            params.projection,
            n_batch,
            n_cell,
            n_output,
            params.output_zero_point,
            hidden,
        );
        if let Some((lo, hi)) = params.projection_clip_range {
            cwise_clipping_i8(hidden, lo, hi);
        }
    }
}
