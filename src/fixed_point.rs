//! Fixed-point primitives with gemmlowp rounding semantics.
//!
//! Every function here is bit exact with the reference runtime: the integer
//! kernels are validated against float goldens only through these.
//! Formats are named `Fn` where `n` is the number of integer bits of a raw
//! `i32` (so F0 is Q0.31, F3 is Q3.28).

/// `round(a * b / 2^31)`, saturating the single overflow case `MIN * MIN`.
#[inline]
pub fn saturating_rounding_doubling_high_mul(a: i32, b: i32) -> i32 {
    if a == i32::MIN && b == i32::MIN { return i32::MAX; }
    let ab = a as i64 * b as i64;
    let nudge: i64 = if ab >= 0 { 1 << 30 } else { 1 - (1 << 30) };
    ((ab + nudge) / (1i64 << 31)) as i32
}

/// Divide by `2^exponent`, rounding half away from zero. `exponent` in 0..=31.
#[inline]
pub fn rounding_divide_by_pot(x: i32, exponent: i32) -> i32 {
    debug_assert!((0..=31).contains(&exponent), "exponent out of range: {exponent}");
    let mask = ((1i64 << exponent) - 1) as i32;
    let remainder = x & mask;
    let threshold = (mask >> 1) + (x < 0) as i32;
    (x >> exponent) + (remainder > threshold) as i32
}

/// Multiply by `2^exponent`; saturating for positive exponents, rounding for negative ones.
#[inline]
pub fn saturating_rounding_multiply_by_pot(x: i32, exponent: i32) -> i32 {
    if exponent > 0 {
        let threshold = (1i32 << (31 - exponent)) - 1;
        if x > threshold { i32::MAX } else if x < -threshold { i32::MIN } else { x << exponent }
    } else if exponent < 0 {
        rounding_divide_by_pot(x, -exponent)
    } else {
        x
    }
}

/// `(a + b) / 2` rounded half away from zero, computed without overflow.
#[inline]
pub fn rounding_half_sum(a: i32, b: i32) -> i32 {
    let sum = a as i64 + b as i64;
    let sign: i64 = if sum >= 0 { 1 } else { -1 };
    ((sum + sign) / 2) as i32
}

/// `x * multiplier * 2^(shift - 31)` with round-half-away-from-zero.
///
/// A left shift that runs out of headroom saturates to `i32::MIN`/`i32::MAX`.
#[inline]
pub fn multiply_by_quantized_multiplier(x: i32, multiplier: i32, shift: i32) -> i32 {
    let left_shift = shift.clamp(0, 31);
    let right_shift = (-shift).max(0);
    rounding_divide_by_pot(
        saturating_rounding_doubling_high_mul(saturating_rounding_multiply_by_pot(x, left_shift), multiplier),
        right_shift,
    )
}

#[inline]
pub fn multiply_by_quantized_multiplier_greater_than_one(x: i32, multiplier: i32, left_shift: i32) -> i32 {
    saturating_rounding_doubling_high_mul(saturating_rounding_multiply_by_pot(x, left_shift.clamp(0, 31)), multiplier)
}

/// `left_shift` must be <= 0.
#[inline]
pub fn multiply_by_quantized_multiplier_smaller_than_one_exp(x: i32, multiplier: i32, left_shift: i32) -> i32 {
    rounding_divide_by_pot(saturating_rounding_doubling_high_mul(x, multiplier), -left_shift)
}

#[inline]
pub fn count_leading_zeros(x: u32) -> i32 { x.leading_zeros() as i32 }

/// Redundant sign bits of `x`: how far it can be shifted left without overflow.
#[inline]
pub fn count_leading_sign_bits(x: i32) -> i32 {
    if x >= 0 {
        count_leading_zeros(x as u32) - 1
    } else if x != i32::MIN {
        count_leading_zeros(2 * (x.wrapping_neg() as u32) - 1)
    } else {
        0
    }
}

/// `1 / (1 + a)` for `a` in [0, 1), both in F0. Newton-Raphson on the half denominator.
pub fn one_over_one_plus_x_for_x_in_0_1(a: i32) -> i32 {
    const F2_ONE: i32 = 1 << 29;
    const CONSTANT_48_OVER_17: i32 = 1_515_870_810; // F2
    const CONSTANT_NEG_32_OVER_17: i32 = -1_010_580_540; // F2
    let half_denominator = rounding_half_sum(a, i32::MAX);
    let mut x = CONSTANT_48_OVER_17
        .wrapping_add(saturating_rounding_doubling_high_mul(half_denominator, CONSTANT_NEG_32_OVER_17));
    for _ in 0..3 {
        let half_denominator_times_x = saturating_rounding_doubling_high_mul(half_denominator, x);
        let one_minus = F2_ONE.wrapping_sub(half_denominator_times_x);
        // F2 * F2 -> F4, rescaled back to F2
        let step = saturating_rounding_multiply_by_pot(saturating_rounding_doubling_high_mul(x, one_minus), 2);
        x = x.wrapping_add(step);
    }
    // x approximates 1/half_denominator in F2; as F1 it is 1/denominator. Rescale to F0.
    saturating_rounding_multiply_by_pot(x, 1)
}

/// Reciprocal of a positive `x` with `x_integer_digits` integer bits.
///
/// Returns `(scale, num_bits_over_unit)` with `1/x ≈ scale * 2^-31 * 2^-num_bits_over_unit`.
pub fn get_reciprocal(x: i32, x_integer_digits: i32) -> (i32, i32) {
    debug_assert!(x > 0, "reciprocal of non-positive value {x}");
    let headroom_plus_one = count_leading_zeros(x as u32);
    let num_bits_over_unit = x_integer_digits - headroom_plus_one;
    let shifted_sum_minus_one = (x as u32)
        .wrapping_shl(headroom_plus_one as u32)
        .wrapping_sub(1u32 << 31) as i32;
    (one_over_one_plus_x_for_x_in_0_1(shifted_sum_minus_one), num_bits_over_unit)
}

/// `1 / sqrt(input)` as a quantized multiplier. `reverse_shift = -1` yields a
/// shift usable directly with [`multiply_by_quantized_multiplier`].
pub fn get_inv_sqrt_quantized_multiplier_exp(input: i32, reverse_shift: i32) -> (i32, i32) {
    if input <= 1 {
        return (i32::MAX, 0);
    }
    let mut input = input;
    let mut output_shift = 11;
    while input >= (1 << 29) {
        input /= 4;
        output_shift += 1;
    }
    let max_left_shift_bits = count_leading_zeros(input as u32) - 1;
    let left_shift_bit_pairs = max_left_shift_bits / 2 - 1;
    output_shift -= left_shift_bit_pairs;
    input <<= 2 * left_shift_bit_pairs;

    // Newton-Raphson for 1/sqrt(x) in F3.
    const F3_ONE: i32 = 1 << 28;
    const HALF_THREE: i32 = (1 << 28) + (1 << 27);
    const HALF_SQRT_2: i32 = 1_518_500_250; // F0
    let fixedpoint_input = input >> 1;
    let fixedpoint_half_input = saturating_rounding_multiply_by_pot(fixedpoint_input, -1);
    let mut x = F3_ONE;
    for _ in 0..5 {
        let x2 = saturating_rounding_doubling_high_mul(x, x); // F6
        let x3 = saturating_rounding_multiply_by_pot(saturating_rounding_doubling_high_mul(x2, x), 6); // F9 -> F3
        let diff = saturating_rounding_doubling_high_mul(HALF_THREE, x)
            .wrapping_sub(saturating_rounding_doubling_high_mul(fixedpoint_half_input, x3)); // F6
        x = saturating_rounding_multiply_by_pot(diff, 3);
    }
    let mut output_inv_sqrt = saturating_rounding_doubling_high_mul(x, HALF_SQRT_2);
    if output_shift < 0 {
        output_inv_sqrt <<= -output_shift;
        output_shift = 0;
    }
    (output_inv_sqrt, output_shift * reverse_shift)
}
