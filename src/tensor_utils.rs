//! Batched vector and matrix kernels used by the gate, cell and hidden updates.
//!
//! Scalar reference loops over row-major slices. Batched vectors are laid out
//! `[batch][element]`. Nothing here allocates.

use crate::fixed_point::{get_inv_sqrt_quantized_multiplier_exp, multiply_by_quantized_multiplier};
use crate::quant::{Quantized, QuantizedMultiplier};

// ---------------------------------------------------------------- float

/// `result[b][r] += Σ_c matrix[r][c] * vectors[b][c]`
pub fn matrix_batch_vector_multiply_accumulate(
    matrix: &[f32],
    m_rows: usize,
    m_cols: usize,
    vectors: &[f32],
    n_batch: usize,
    result: &mut [f32],
) {
    for b in 0..n_batch {
        let v = &vectors[b * m_cols..(b + 1) * m_cols];
        let out = &mut result[b * m_rows..(b + 1) * m_rows];
        for (r, o) in out.iter_mut().enumerate() {
            let row = &matrix[r * m_cols..(r + 1) * m_cols];
            let mut acc = 0.0f32;
            for c in 0..m_cols { acc += row[c] * v[c]; }
            *o += acc;
        }
    }
}

/// Copy `vector` into every batch row of `batch_vector`.
pub fn vector_batch_vector_assign(vector: &[f32], v_size: usize, n_batch: usize, batch_vector: &mut [f32]) {
    for b in 0..n_batch {
        batch_vector[b * v_size..(b + 1) * v_size].copy_from_slice(&vector[..v_size]);
    }
}

/// `result[b][i] += vector[i] * batch_vector[b][i]`
pub fn vector_batch_vector_cwise_product_accumulate(
    vector: &[f32],
    v_size: usize,
    batch_vector: &[f32],
    n_batch: usize,
    result: &mut [f32],
) {
    for b in 0..n_batch {
        let bv = &batch_vector[b * v_size..(b + 1) * v_size];
        let out = &mut result[b * v_size..(b + 1) * v_size];
        for i in 0..v_size { out[i] += vector[i] * bv[i]; }
    }
}

/// `batch_vector[b][i] *= vector[i]`
pub fn vector_batch_vector_cwise_product_in_place(vector: &[f32], v_size: usize, n_batch: usize, batch_vector: &mut [f32]) {
    for b in 0..n_batch {
        let bv = &mut batch_vector[b * v_size..(b + 1) * v_size];
        for i in 0..v_size { bv[i] *= vector[i]; }
    }
}

/// `batch_vector[b][i] += vector[i]`
pub fn vector_batch_vector_add(vector: &[f32], v_size: usize, n_batch: usize, batch_vector: &mut [f32]) {
    for b in 0..n_batch {
        let bv = &mut batch_vector[b * v_size..(b + 1) * v_size];
        for i in 0..v_size { bv[i] += vector[i]; }
    }
}

/// Normalise each batch row to zero mean and unit variance.
pub fn mean_stddev_normalization(values: &mut [f32], v_size: usize, n_batch: usize) {
    const NORMALIZATION_EPSILON: f32 = 1e-8;
    for b in 0..n_batch {
        let row = &mut values[b * v_size..(b + 1) * v_size];
        let mean = row.iter().sum::<f32>() / v_size as f32;
        // two passes keep the variance non-negative for constant rows
        let variance = row.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / v_size as f32;
        let stddev_inv = 1.0 / (variance + NORMALIZATION_EPSILON).sqrt();
        for v in row.iter_mut() { *v = (*v - mean) * stddev_inv; }
    }
}

pub fn cwise_clipping_f32(values: &mut [f32], clip: f32) {
    for v in values.iter_mut() { *v = v.clamp(-clip, clip); }
}

pub fn is_zero_vector<T: Copy + Default + PartialEq>(values: &[T]) -> bool {
    let zero = T::default();
    values.iter().all(|&v| v == zero)
}

// ---------------------------------------------------------------- integer

/// `output[b][r] = sat(output[b][r] + requant(bias[r] + Σ_c weights[r][c] * input[b][c]) + output_zp)`.
/// Every int32 step saturates.
///
/// `input = None` stands for an all-zero input: only the (folded) bias is applied.
#[allow(clippy::too_many_arguments)]
pub fn matrix_batch_vector_multiply_accumulate_i8<T: Quantized>(
    input: Option<&[i8]>,
    bias: &[i32],
    weights: &[i8],
    multiplier: QuantizedMultiplier,
    n_batch: usize,
    n_input: usize,
    n_output: usize,
    output_zp: i32,
    output: &mut [T],
) {
    for b in 0..n_batch {
        let out = &mut output[b * n_output..(b + 1) * n_output];
        for (r, o) in out.iter_mut().enumerate() {
            let mut acc = bias[r];
            if let Some(input) = input {
                let x = &input[b * n_input..(b + 1) * n_input];
                let row = &weights[r * n_input..(r + 1) * n_input];
                for c in 0..n_input { acc = acc.saturating_add(row[c] as i32 * x[c] as i32); }
            }
            let scaled = multiplier.apply(acc).saturating_add(output_zp).saturating_add(o.to_i32());
            *o = T::saturate(scaled);
        }
    }
}

/// Peephole term: `result[b][i] = sat16(result[b][i] + requant(vector[i] * batch_vector[b][i]))`.
pub fn vector_batch_vector_cwise_product_accumulate_i16(
    vector: &[i16],
    v_size: usize,
    batch_vector: &[i16],
    n_batch: usize,
    multiplier: QuantizedMultiplier,
    result: &mut [i16],
) {
    for b in 0..n_batch {
        let bv = &batch_vector[b * v_size..(b + 1) * v_size];
        let out = &mut result[b * v_size..(b + 1) * v_size];
        for i in 0..v_size {
            let prod = multiplier.apply(vector[i] as i32 * bv[i] as i32);
            out[i] = i16::saturate(prod.saturating_add(out[i] as i32));
        }
    }
}

/// Integer layer normalisation of each batch row, in place.
///
/// Output lands in Q3.12. `bias` is in units of `layer_norm_scale / 1024`.
#[allow(clippy::too_many_arguments)]
pub fn apply_layer_norm_i16(
    values: &mut [i16],
    layer_norm_weights: &[i16],
    bias: &[i32],
    scale: QuantizedMultiplier,
    variance_limit: i32,
    n_batch: usize,
    n_input: usize,
) {
    const INT16_MAX: i32 = i16::MAX as i32;
    const INT16_MIN: i32 = i16::MIN as i32;
    let temp: i32 = (1 << 20) / n_input as i32;
    for b in 0..n_batch {
        let row = &mut values[b * n_input..(b + 1) * n_input];
        let mut sum: i64 = 0;
        let mut sum_sq: i64 = 0;
        for &v in row.iter() {
            sum += v as i64;
            sum_sq += v as i64 * v as i64;
        }
        let mean = (sum * 1024 / n_input as i64) as i32;
        let variance = sum_sq * temp as i64 - mean as i64 * mean as i64;
        let mut variance2 = (variance / (1 << 20)) as i32;
        if variance2 < 1 {
            variance2 = variance_limit;
        }
        let (inv_multiplier, inv_shift) = get_inv_sqrt_quantized_multiplier_exp(variance2, -1);
        for (j, v) in row.iter_mut().enumerate() {
            let shifted = 1024 * *v as i32 - mean;
            let rescaled = multiply_by_quantized_multiplier(shifted, inv_multiplier, inv_shift);
            let val3 = rescaled as i64 * layer_norm_weights[j] as i64 + bias[j] as i64;
            let val4 = ((if val3 > 0 { val3 + 512 } else { val3 - 512 }) / 1024).clamp(i32::MIN as i64, i32::MAX as i64) as i32;
            let val5 = multiply_by_quantized_multiplier(val4, scale.multiplier, scale.shift + 12);
            *v = val5.clamp(INT16_MIN, INT16_MAX) as i16;
        }
    }
}

pub fn cwise_clipping_i16(values: &mut [i16], clip: i16) {
    for v in values.iter_mut() { *v = (*v).clamp(-clip, clip); }
}

/// Clip stored int8 values into `lo..=hi`.
pub fn cwise_clipping_i8(values: &mut [i8], lo: i8, hi: i8) {
    for v in values.iter_mut() {
        *v = (*v).clamp(lo, hi);
    }
}
