//! Cell state update: `c = clip(f ⊙ c + i ⊙ g)`.

use crate::fixed_point::rounding_divide_by_pot;
use crate::quant::Quantized;

/// Float cell update. `input_gate = None` couples it to the forget gate (`i = 1 - f`).
/// A `clip` of 0 disables clipping.
pub fn update_cell_float(
    cell: &mut [f32],
    forget_gate: &[f32],
    input_gate: Option<&[f32]>,
    modulation_gate: &[f32],
    clip: f32,
) {
    match input_gate {
        Some(input_gate) => {
            for (((c, &f), &i), &g) in cell.iter_mut().zip(forget_gate).zip(input_gate).zip(modulation_gate) {
                *c = f * *c + i * g;
            }
        }
        None => {
            for ((c, &f), &g) in cell.iter_mut().zip(forget_gate).zip(modulation_gate) {
                *c = f * *c + (1.0 - f) * g;
            }
        }
    }
    if clip > 0.0 {
        crate::tensor_utils::cwise_clipping_f32(cell, clip);
    }
}

/// Integer cell update.
///
/// Gates are Q0.15, the cell has scale `2^cell_scale`. `f ⊙ c` is realigned
/// with a rounding shift of 15, `i ⊙ g` (Q0.30) with `30 + cell_scale`; the
/// sum saturates to int16 and is clipped to `±clip` when `clip > 0`.
pub fn update_cell_integer(
    cell: &mut [i16],
    cell_scale: i32,
    forget_gate: &[i16],
    input_gate: Option<&[i16]>,
    modulation_gate: &[i16],
    clip: i16,
) {
    let shift = 30 + cell_scale;
    for (j, c) in cell.iter_mut().enumerate() {
        let forgotten = rounding_divide_by_pot(forget_gate[j] as i32 * *c as i32, 15);
        let i = match input_gate {
            Some(input_gate) => input_gate[j],
            None => i16::MAX - forget_gate[j],
        };
        let added = rounding_divide_by_pot(i as i32 * modulation_gate[j] as i32, shift);
        *c = i16::saturate(forgotten + added);
    }
    if clip > 0 {
        crate::tensor_utils::cwise_clipping_i16(cell, clip);
    }
}
