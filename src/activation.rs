//! Gate nonlinearities: float reference and table-driven int16 versions.

use serde::{Deserialize, Serialize};

/// Activation applied to the modulation gate and to the cell before the output gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    None,
    Relu,
    ReluN1To1,
    Relu6,
    #[default]
    Tanh,
    Sigmoid,
    SignBit,
}

impl Activation {
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::None => x,
            Activation::Relu => x.max(0.0),
            Activation::ReluN1To1 => x.clamp(-1.0, 1.0),
            Activation::Relu6 => x.clamp(0.0, 6.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
            Activation::SignBit => if x.is_sign_negative() { 1.0 } else { 0.0 },
        }
    }

    pub fn apply_in_place(self, values: &mut [f32]) {
        for v in values.iter_mut() { *v = self.apply(*v); }
    }
}

#[inline]
pub fn sigmoid(x: f32) -> f32 { 1.0 / (1.0 + (-x).exp()) }

/// The activations with an int16 table kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerActivation {
    Sigmoid,
    Tanh,
}

impl IntegerActivation {
    /// Apply in place to values with scale `2^input_scale_log2`.
    /// Sigmoid is always read as Q3.12.
    pub fn apply_in_place(self, values: &mut [i16], input_scale_log2: i32) {
        match self {
            IntegerActivation::Sigmoid => sigmoid_i16_in_place(values),
            IntegerActivation::Tanh => tanh_i16_in_place(values, input_scale_log2),
        }
    }
}

/// `round(65536 / (1 + exp(-i / 24)))` for `i` in 0..256, saturated to u16.
/// Sampled on [0, 10.667); tanh reuses it through `tanh(x) = 2·sigmoid(2x) - 1`.
#[rustfmt::skip]
static SIGMOID_TABLE: [u16; 256] = [
    32768, 33451, 34133, 34813, 35492, 36169, 36843, 37513, 38179, 38841, 39498, 40149,
    40793, 41432, 42063, 42687, 43303, 43911, 44511, 45101, 45682, 46254, 46816, 47369,
    47911, 48442, 48964, 49474, 49974, 50463, 50941, 51408, 51865, 52310, 52744, 53168,
    53581, 53982, 54374, 54754, 55124, 55484, 55834, 56173, 56502, 56822, 57132, 57433,
    57724, 58006, 58279, 58544, 58800, 59048, 59287, 59519, 59743, 59959, 60168, 60370,
    60565, 60753, 60934, 61109, 61278, 61441, 61598, 61750, 61896, 62036, 62172, 62302,
    62428, 62549, 62666, 62778, 62886, 62990, 63090, 63186, 63279, 63368, 63453, 63536,
    63615, 63691, 63764, 63835, 63903, 63968, 64030, 64090, 64148, 64203, 64257, 64308,
    64357, 64405, 64450, 64494, 64535, 64576, 64614, 64651, 64687, 64721, 64754, 64786,
    64816, 64845, 64873, 64900, 64925, 64950, 64974, 64997, 65018, 65039, 65060, 65079,
    65097, 65115, 65132, 65149, 65164, 65179, 65194, 65208, 65221, 65234, 65246, 65258,
    65269, 65280, 65291, 65300, 65310, 65319, 65328, 65337, 65345, 65352, 65360, 65367,
    65374, 65381, 65387, 65393, 65399, 65404, 65410, 65415, 65420, 65425, 65429, 65433,
    65438, 65442, 65445, 65449, 65453, 65456, 65459, 65462, 65465, 65468, 65471, 65474,
    65476, 65479, 65481, 65483, 65485, 65488, 65489, 65491, 65493, 65495, 65497, 65498,
    65500, 65501, 65503, 65504, 65505, 65507, 65508, 65509, 65510, 65511, 65512, 65513,
    65514, 65515, 65516, 65517, 65517, 65518, 65519, 65520, 65520, 65521, 65522, 65522,
    65523, 65523, 65524, 65524, 65525, 65525, 65526, 65526, 65526, 65527, 65527, 65528,
    65528, 65528, 65529, 65529, 65529, 65529, 65530, 65530, 65530, 65530, 65531, 65531,
    65531, 65531, 65531, 65532, 65532, 65532, 65532, 65532, 65532, 65533, 65533, 65533,
    65533, 65533, 65533, 65533, 65533, 65534, 65534, 65534, 65534, 65534, 65534, 65534,
    65534, 65534, 65534, 65534,
];

/// Logistic function, Q3.12 in, Q0.15 out.
#[inline]
pub fn sigmoid_i16(x: i16) -> i16 {
    // 3x in Q3.12 steps exactly 1/24 per 2^9 units, matching the table spacing
    let input = x as i32 * 3;
    let abs = input.unsigned_abs();
    let uh = abs >> 9;
    let mut result: u32 = if uh >= 255 {
        0x7fff << 10
    } else {
        let ua = SIGMOID_TABLE[uh as usize] as u32;
        let ub = SIGMOID_TABLE[uh as usize + 1] as u32;
        (ua << 9) + (abs & 0x1ff) * (ub - ua)
    };
    result = if input >= 0 { result + (1 << 9) } else { (1 << (16 + 9)) - result + (1 << 9) - 1 };
    (result >> 10) as i16
}

/// Hyperbolic tangent of an int16 with scale `2^input_scale_log2`, Q0.15 out.
#[inline]
pub fn tanh_i16(x: i16, input_scale_log2: i32) -> i16 {
    // realign to the table domain: 2^-3 scale steps of 1/24 per 2^8 units
    let mut shift = 15 + input_scale_log2 - 3;
    let (multiplier, round) = if shift < 0 {
        shift = -shift;
        (3, 1 << (shift - 1))
    } else {
        let m = 3 << shift;
        shift = 0;
        (m, 0)
    };
    let input = (x as i32 * multiplier + round) >> shift;
    let abs = input.unsigned_abs();
    let uh = abs >> 8;
    let result: i32 = if uh >= 255 {
        0xffff << 8
    } else {
        let ua = SIGMOID_TABLE[uh as usize] as i32;
        let ub = SIGMOID_TABLE[uh as usize + 1] as i32;
        (ua << 8) + (abs & 0xff) as i32 * (ub - ua)
    };
    let result = if input >= 0 {
        result - (1 << (14 + 9)) + (1 << (9 - 2))
    } else {
        -result + (1 << (14 + 9)) + (1 << (9 - 2)) - 1
    };
    (result >> (9 - 1)).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

pub fn sigmoid_i16_in_place(values: &mut [i16]) {
    for v in values.iter_mut() { *v = sigmoid_i16(*v); }
}

pub fn tanh_i16_in_place(values: &mut [i16], input_scale_log2: i32) {
    for v in values.iter_mut() { *v = tanh_i16(*v, input_scale_log2); }
}
