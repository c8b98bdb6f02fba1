//! Per-tensor affine quantization: `real = scale * (stored - zero_point)`.

pub mod params;

pub use params::{
    derive_evaluation_parameters, EvaluationParameters, GateQuantization, GateScales, LstmFeatures,
    ModelQuantization,
};

use crate::error::{ConfigError, Result};
use crate::fixed_point::multiply_by_quantized_multiplier;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TensorQuantParams {
    pub scale: f64,
    #[serde(default)]
    pub zero_point: i32,
    #[serde(default)]
    pub symmetric: bool,
}

impl TensorQuantParams {
    pub fn new(scale: f64, zero_point: i32) -> Self { Self { scale, zero_point, symmetric: false } }

    pub fn symmetric(scale: f64) -> Self { Self { scale, zero_point: 0, symmetric: true } }

    pub fn validate(&self, tensor: &'static str) -> Result<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(ConfigError::NonPositiveScale { tensor, scale: self.scale });
        }
        if self.symmetric && self.zero_point != 0 {
            return Err(ConfigError::AsymmetricSymmetricTensor { tensor, zero_point: self.zero_point });
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus a zero point representable in `T`.
    pub fn validate_storage<T: Quantized>(&self, tensor: &'static str) -> Result<()> {
        self.validate(tensor)?;
        if !(T::MIN..=T::MAX).contains(&self.zero_point) {
            return Err(ConfigError::ZeroPointOutOfRange {
                tensor,
                zero_point: self.zero_point,
                bits: std::mem::size_of::<T>() as u32 * 8,
            });
        }
        Ok(())
    }

    pub fn quantize<T: Quantized>(&self, value: f32) -> T { quantize_value(value, self.scale, self.zero_point) }

    pub fn dequantize<T: Quantized>(&self, value: T) -> f32 {
        ((value.to_i32() - self.zero_point) as f64 * self.scale) as f32
    }
}

/// Storage types of quantized tensors.
pub trait Quantized: Copy + Default + PartialEq + std::fmt::Debug {
    const MIN: i32;
    const MAX: i32;
    /// Caller guarantees `v` is within `MIN..=MAX`.
    fn from_i32(v: i32) -> Self;
    fn to_i32(self) -> i32;

    #[inline]
    fn saturate(v: i32) -> Self { Self::from_i32(v.clamp(Self::MIN, Self::MAX)) }
}

macro_rules! impl_quantized {
    ($($t:ty),*) => {$(
        impl Quantized for $t {
            const MIN: i32 = <$t>::MIN as i32;
            const MAX: i32 = <$t>::MAX as i32;
            #[inline] fn from_i32(v: i32) -> Self { v as $t }
            #[inline] fn to_i32(self) -> i32 { self as i32 }
        }
    )*};
}
impl_quantized!(i8, i16);

impl Quantized for i32 {
    const MIN: i32 = i32::MIN;
    const MAX: i32 = i32::MAX;
    #[inline] fn from_i32(v: i32) -> Self { v }
    #[inline] fn to_i32(self) -> i32 { self }
}

/// `clamp(round(value / scale) + zero_point)`, rounding half away from zero.
pub fn quantize_value<T: Quantized>(value: f32, scale: f64, zero_point: i32) -> T {
    let q = (value as f64 / scale).round() + zero_point as f64;
    T::from_i32(q.clamp(T::MIN as f64, T::MAX as f64) as i32)
}

pub fn quantize<T: Quantized>(values: &[f32], out: &mut [T], scale: f64, zero_point: i32) {
    for (o, &v) in out.iter_mut().zip(values) { *o = quantize_value(v, scale, zero_point); }
}

pub fn dequantize<T: Quantized>(values: &[T], out: &mut [f32], scale: f64, zero_point: i32) {
    for (o, &q) in out.iter_mut().zip(values) {
        *o = ((q.to_i32() - zero_point) as f64 * scale) as f32;
    }
}

/// Symmetric quantization clamps to `±T::MAX` so the range stays balanced.
pub fn symmetric_quantize<T: Quantized>(values: &[f32], out: &mut [T], scale: f64) {
    for (o, &v) in out.iter_mut().zip(values) {
        let q = (v as f64 / scale).round();
        *o = T::from_i32(q.clamp(-(T::MAX as f64), T::MAX as f64) as i32);
    }
}

/// A real multiplier encoded as `multiplier * 2^(shift - 31)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QuantizedMultiplier {
    pub multiplier: i32,
    pub shift: i32,
}

impl QuantizedMultiplier {
    pub const ZERO: Self = Self { multiplier: 0, shift: 0 };

    pub fn from_scale(scale: f64) -> Self { quantize_multiplier(scale) }

    #[inline]
    pub fn apply(self, x: i32) -> i32 { multiply_by_quantized_multiplier(x, self.multiplier, self.shift) }

    pub fn to_f64(self) -> f64 { self.multiplier as f64 * 2f64.powi(self.shift - 31) }
}

/// Normalise `scale` to a Q0.31 mantissa in `[2^30, 2^31)` and a power-of-two shift.
pub fn quantize_multiplier(scale: f64) -> QuantizedMultiplier {
    if scale == 0.0 {
        return QuantizedMultiplier::ZERO;
    }
    let (q, mut shift) = frexp(scale);
    let mut q_fixed = (q * (1i64 << 31) as f64).round() as i64;
    debug_assert!(q_fixed <= 1i64 << 31);
    if q_fixed == 1i64 << 31 {
        q_fixed /= 2;
        shift += 1;
    }
    if shift < -31 {
        return QuantizedMultiplier::ZERO;
    }
    QuantizedMultiplier { multiplier: q_fixed as i32, shift }
}

/// `x = mantissa * 2^exp` with `|mantissa|` in `[0.5, 1)`.
fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    if biased == 0 {
        // subnormal: scale into the normal range first
        let (m, e) = frexp(x * 2f64.powi(54));
        return (m, e - 54);
    }
    let mantissa = f64::from_bits((bits & !(0x7ffu64 << 52)) | (1022u64 << 52));
    (mantissa, biased - 1022)
}

/// `Some(round(log2(x)))` when `x` is a power of two within 1e-3 in the log domain.
pub fn checked_log2(x: f64) -> Option<i32> {
    if !x.is_finite() || x <= 0.0 {
        return None;
    }
    let log = x.log2();
    let rounded = log.round();
    if (log - rounded).abs() < 1e-3 { Some(rounded as i32) } else { None }
}

/// Fold a zero point into a bias: `out[r] = bias[r] - zero_point * Σ_c weights[r][c]`.
///
/// The int8 kernels accumulate raw stored values; the folded bias cancels the
/// zero point of the vector they are multiplied with.
pub fn precompute_zero_point_times_weight_with_bias(
    zero_point: i32,
    weights: &[i8],
    n_rows: usize,
    n_cols: usize,
    bias: Option<&[i32]>,
) -> Vec<i32> {
    let mut out = Vec::with_capacity(n_rows);
    for row in 0..n_rows {
        let sum: i32 = weights[row * n_cols..(row + 1) * n_cols].iter().map(|&w| w as i32).sum();
        let base = bias.map_or(0, |b| b[row]);
        out.push(base - zero_point * sum);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplier_normalisation() {
        let m = quantize_multiplier(0.5);
        assert_eq!(m, QuantizedMultiplier { multiplier: 1 << 30, shift: 0 });
        let m = quantize_multiplier(1.0);
        assert_eq!(m, QuantizedMultiplier { multiplier: 1 << 30, shift: 1 });
        let m = quantize_multiplier(0.75);
        assert_eq!(m.multiplier, 1_610_612_736);
        assert_eq!(m.shift, 0);
        // mantissa rounding up to 2^31 is halved
        let m = quantize_multiplier(1.0 - 1e-12);
        assert_eq!(m, QuantizedMultiplier { multiplier: 1 << 30, shift: 1 });
        assert_eq!(quantize_multiplier(0.0), QuantizedMultiplier::ZERO);
        assert_eq!(quantize_multiplier(1e-20), QuantizedMultiplier::ZERO);
    }

    #[test]
    fn multiplier_round_trips_scale() {
        for &s in &[3.1e-4, 0.0123, 0.9, 1.7, 12.5, 1234.5] {
            let m = quantize_multiplier(s);
            assert!(m.multiplier >= 1 << 30, "mantissa below range for {s}");
            assert!((m.to_f64() - s).abs() / s < 1e-9, "scale {s} -> {}", m.to_f64());
        }
    }

    #[test]
    fn frexp_matches_definition() {
        assert_eq!(frexp(1.0), (0.5, 1));
        assert_eq!(frexp(0.375), (0.75, -1));
        assert_eq!(frexp(-6.0), (-0.75, 3));
        let (m, e) = frexp(f64::MIN_POSITIVE / 8.0);
        assert_eq!(m, 0.5);
        assert_eq!(e, -1021 - 3);
    }

    #[test]
    fn log2_tolerance() {
        assert_eq!(checked_log2(0.000244140625), Some(-12));
        assert_eq!(checked_log2(0.00024414062), Some(-12));
        assert_eq!(checked_log2(0.0003), None);
        assert_eq!(checked_log2(0.0), None);
    }

    #[test]
    fn quantize_rounds_and_clamps() {
        let mut out = [0i8; 4];
        quantize(&[0.5, -0.5, 100.0, -100.0], &mut out, 1.0, 0);
        assert_eq!(out, [1, -1, 127, -128]);
        let mut sym = [0i16; 2];
        symmetric_quantize(&[1e9, -1e9], &mut sym, 1.0);
        assert_eq!(sym, [32767, -32767]);
    }

    #[test]
    fn zero_point_folding() {
        let w = [1i8, 2, 3, -4, 5, 6];
        let folded = precompute_zero_point_times_weight_with_bias(3, &w, 2, 3, Some(&[10i32, 20][..]));
        assert_eq!(folded, vec![10 - 3 * 6, 20 - 3 * 7]);
        let folded = precompute_zero_point_times_weight_with_bias(-1, &w, 2, 3, None);
        assert_eq!(folded, vec![6, 7]);
    }
}
