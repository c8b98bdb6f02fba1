//! Quantized int8 elementwise division.
//!
//! `out = in1 / in2` in each tensor's own quantization. The divisor is
//! inverted with [`get_reciprocal`], the dividend is pre-shifted by its
//! redundant sign bits to keep precision, and a single multiplier realigns the
//! quotient to the output scale.

use crate::error::{ConfigError, Result};
use crate::fixed_point::{
    count_leading_sign_bits, get_reciprocal, multiply_by_quantized_multiplier,
    multiply_by_quantized_multiplier_greater_than_one, multiply_by_quantized_multiplier_smaller_than_one_exp,
};
use crate::quant::{quantize_multiplier, TensorQuantParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DivParams {
    pub input1_offset: i32,
    pub input2_offset: i32,
    pub output_offset: i32,
    pub output_multiplier: i32,
    pub output_shift: i32,
    pub activation_min: i32,
    pub activation_max: i32,
}

impl DivParams {
    /// Offsets negate the input zero points; the multiplier is `s1 / (s2 * s_out)`.
    pub fn new(input1: TensorQuantParams, input2: TensorQuantParams, output: TensorQuantParams) -> Result<Self> {
        input1.validate("div input1")?;
        input2.validate("div input2")?;
        output.validate("div output")?;
        let m = quantize_multiplier(input1.scale / (input2.scale * output.scale));
        Ok(Self {
            input1_offset: -input1.zero_point,
            input2_offset: -input2.zero_point,
            output_offset: output.zero_point,
            output_multiplier: m.multiplier,
            output_shift: m.shift,
            activation_min: i8::MIN as i32,
            activation_max: i8::MAX as i32,
        })
    }

    /// Restrict the output to `[min, max]` in stored units.
    pub fn with_activation_range(mut self, min: i8, max: i8) -> Result<Self> {
        if min > max {
            return Err(ConfigError::Unsupported("activation range is empty"));
        }
        self.activation_min = min as i32;
        self.activation_max = max as i32;
        Ok(self)
    }
}

/// Divide one quantized value by another.
///
/// A zero divisor saturates towards the sign of the dividend (0 / 0 yields the
/// output zero point).
#[inline]
pub fn div_quantized(params: &DivParams, a: i8, b: i8) -> i8 {
    let mut input1 = params.input1_offset + a as i32;
    let mut input2 = params.input2_offset + b as i32;
    let clamp = |v: i32| v.clamp(params.activation_min, params.activation_max) as i8;
    if input2 == 0 {
        return match input1.signum() {
            1 => clamp(params.activation_max),
            -1 => clamp(params.activation_min),
            _ => clamp(params.output_offset),
        };
    }
    if input2 < 0 {
        input1 = -input1;
        input2 = -input2;
    }
    let (recip, recip_shift) = get_reciprocal(input2, 31);
    let headroom = count_leading_sign_bits(input1);
    let unscaled = multiply_by_quantized_multiplier_greater_than_one(input1, recip, headroom);
    let total_shift = params.output_shift - recip_shift - headroom;
    let scaled = if total_shift <= 0 {
        multiply_by_quantized_multiplier_smaller_than_one_exp(unscaled, params.output_multiplier, total_shift)
    } else {
        multiply_by_quantized_multiplier(unscaled, params.output_multiplier, total_shift)
    };
    clamp(params.output_offset + scaled)
}

pub fn div_elementwise(params: &DivParams, input1: &[i8], input2: &[i8], output: &mut [i8]) -> Result<()> {
    if input1.len() != input2.len() {
        return Err(ConfigError::DimensionMismatch { what: "div input2", expected: input1.len(), got: input2.len() });
    }
    if output.len() < input1.len() {
        return Err(ConfigError::BufferTooSmall { what: "div output", needed: input1.len(), got: output.len() });
    }
    for ((o, &a), &b) in output.iter_mut().zip(input1).zip(input2) {
        *o = div_quantized(params, a, b);
    }
    Ok(())
}
