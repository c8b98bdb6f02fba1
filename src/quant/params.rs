//! Derivation of the immutable integer evaluation parameters.
//!
//! All scale arithmetic happens here, in f64, once. The integer kernels only
//! ever see multiplier/shift pairs, zero points and clip limits.

use super::{checked_log2, quantize_multiplier, Quantized, QuantizedMultiplier, TensorQuantParams};
use crate::error::{ConfigError, Result};
use crate::lstm::{Gate, GateSet, LstmSettings};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Log2 of the fixed nonlinearity input domain (Q3.12).
pub const NONLINEAR_INPUT_SCALE_LOG2: i32 = -12;
/// Log2 of the fixed nonlinearity output domain (Q0.15).
pub const NONLINEAR_OUTPUT_SCALE_LOG2: i32 = -15;

fn default_nonlinear_input_scale() -> f64 { 2f64.powi(NONLINEAR_INPUT_SCALE_LOG2) }
fn default_nonlinear_output_scale() -> f64 { 2f64.powi(NONLINEAR_OUTPUT_SCALE_LOG2) }

/// Quantization of the tensors feeding one gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateQuantization {
    pub activation_weight: TensorQuantParams,
    pub recurrent_weight: TensorQuantParams,
    /// Scale of the fused bias. With layer norm this is `layer_norm.scale / 1024`.
    pub bias: TensorQuantParams,
    /// Peephole (int16, symmetric).
    #[serde(default)]
    pub cell_weight: Option<TensorQuantParams>,
    /// Layer-norm coefficients (int16, symmetric).
    #[serde(default)]
    pub layer_norm: Option<TensorQuantParams>,
}

impl GateQuantization {
    pub fn new(activation_weight: TensorQuantParams, recurrent_weight: TensorQuantParams, bias: TensorQuantParams) -> Self {
        Self { activation_weight, recurrent_weight, bias, cell_weight: None, layer_norm: None }
    }

    pub fn with_cell_weight(mut self, q: TensorQuantParams) -> Self { self.cell_weight = Some(q); self }

    pub fn with_layer_norm(mut self, q: TensorQuantParams) -> Self { self.layer_norm = Some(q); self }

    fn validate(&self) -> Result<()> {
        self.activation_weight.validate("activation_weight")?;
        self.recurrent_weight.validate("recurrent_weight")?;
        self.bias.validate("bias")?;
        if self.activation_weight.zero_point != 0 || self.recurrent_weight.zero_point != 0 || self.bias.zero_point != 0 {
            return Err(ConfigError::Unsupported("gate weights and biases must have zero point 0"));
        }
        if let Some(q) = &self.cell_weight { q.validate("cell_weight")?; }
        if let Some(q) = &self.layer_norm { q.validate("layer_norm")?; }
        Ok(())
    }
}

/// Quantization metadata of a whole LSTM, as found in the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelQuantization {
    pub input: TensorQuantParams,
    /// Output state; also the recurrent input of the next step.
    pub output: TensorQuantParams,
    /// Intermediate hidden state before projection. Equals `output` without projection.
    pub hidden: TensorQuantParams,
    /// Cell state (int16, symmetric, power-of-two scale).
    pub cell: TensorQuantParams,
    #[serde(default = "default_nonlinear_input_scale")]
    pub nonlinear_input_scale: f64,
    #[serde(default = "default_nonlinear_output_scale")]
    pub nonlinear_output_scale: f64,
    pub forget_gate: GateQuantization,
    /// Absent with coupled input/forget gates.
    #[serde(default)]
    pub input_gate: Option<GateQuantization>,
    pub modulation_gate: GateQuantization,
    pub output_gate: GateQuantization,
    #[serde(default)]
    pub projection_weight: Option<TensorQuantParams>,
}

impl ModelQuantization {
    pub fn gate(&self, gate: Gate) -> Option<&GateQuantization> {
        match gate {
            Gate::Forget => Some(&self.forget_gate),
            Gate::Input => self.input_gate.as_ref(),
            Gate::Modulation => Some(&self.modulation_gate),
            Gate::Output => Some(&self.output_gate),
        }
    }
}

/// Which optional terms the model carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LstmFeatures {
    #[serde(default)]
    pub peephole: bool,
    #[serde(default)]
    pub layer_norm: bool,
    #[serde(default)]
    pub projection: bool,
}

/// Effective multipliers of one gate. Absent terms carry [`QuantizedMultiplier::ZERO`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateScales {
    pub input_to_gate: QuantizedMultiplier,
    pub recurrent_to_gate: QuantizedMultiplier,
    pub cell_to_gate: QuantizedMultiplier,
    pub layer_norm: QuantizedMultiplier,
    pub variance_guard: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationParameters {
    pub gates: GateSet<GateScales>,
    /// `nonlinear_output_scale² / hidden.scale`
    pub hidden: QuantizedMultiplier,
    pub hidden_zero_point: i32,
    /// `hidden.scale * projection_weight.scale / output.scale`
    pub projection: QuantizedMultiplier,
    pub input_zero_point: i32,
    pub output_zero_point: i32,
    /// `log2(cell.scale)`
    pub cell_scale: i32,
    pub quantized_cell_clip: i16,
    pub quantized_projection_clip: i8,
    /// Stored bounds `output_zero_point ± proj_clip / output.scale`, saturated to int8.
    pub projection_clip_range: Option<(i8, i8)>,
}

fn check_nonlinear_scale(scale: f64, expected: i32, tensor: &'static str) -> Result<()> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(ConfigError::NonPositiveScale { tensor, scale });
    }
    match checked_log2(scale) {
        Some(l) if l == expected => Ok(()),
        _ => Err(ConfigError::Unsupported("nonlinearity domains are fixed at Q3.12 in and Q0.15 out")),
    }
}

/// Turn per-tensor quantization into the parameters the integer kernel runs on.
///
/// Validation is exhaustive: once this returns `Ok`, evaluation cannot fail.
pub fn derive_evaluation_parameters(
    quant: &ModelQuantization,
    settings: &LstmSettings,
    features: &LstmFeatures,
) -> Result<EvaluationParameters> {
    quant.input.validate_storage::<i8>("input")?;
    quant.output.validate_storage::<i8>("output")?;
    quant.hidden.validate_storage::<i8>("hidden")?;
    quant.cell.validate_storage::<i16>("cell")?;
    if quant.cell.zero_point != 0 {
        return Err(ConfigError::Unsupported("cell state must have zero point 0"));
    }
    check_nonlinear_scale(quant.nonlinear_input_scale, NONLINEAR_INPUT_SCALE_LOG2, "nonlinear_input")?;
    check_nonlinear_scale(quant.nonlinear_output_scale, NONLINEAR_OUTPUT_SCALE_LOG2, "nonlinear_output")?;
    if settings.cell_clip < 0.0 {
        return Err(ConfigError::NegativeClip { name: "cell_clip", value: settings.cell_clip });
    }
    if settings.proj_clip < 0.0 {
        return Err(ConfigError::NegativeClip { name: "proj_clip", value: settings.proj_clip });
    }

    let cell_scale = checked_log2(quant.cell.scale)
        .ok_or(ConfigError::NonPowerOfTwoCellScale { scale: quant.cell.scale })?;
    // f*c and i*g are realigned with shifts 15 and 30 + cell_scale
    if !(-30..=1).contains(&cell_scale) {
        return Err(ConfigError::Unsupported("cell scale must lie within 2^-30..=2^1"));
    }

    if !features.projection && quant.output != quant.hidden {
        return Err(ConfigError::Unsupported("output and hidden quantization must match without projection"));
    }

    let nl_in = quant.nonlinear_input_scale;
    let mut gates = GateSet::<GateScales>::default();
    for gate in Gate::ALL {
        if gate == Gate::Input && settings.use_coupled_gates {
            continue;
        }
        let gq = quant.gate(gate).ok_or(ConfigError::MissingGate(gate.name()))?;
        gq.validate()?;
        let mut scales = GateScales {
            input_to_gate: quantize_multiplier(quant.input.scale * gq.activation_weight.scale / nl_in),
            recurrent_to_gate: quantize_multiplier(quant.output.scale * gq.recurrent_weight.scale / nl_in),
            ..GateScales::default()
        };
        match gq.cell_weight {
            Some(cw) => {
                scales.cell_to_gate = quantize_multiplier(2f64.powi(cell_scale) * cw.scale / nl_in);
            }
            None if features.peephole && gate != Gate::Modulation => {
                return Err(ConfigError::Unsupported("peephole enabled but a gate lacks cell weight quantization"));
            }
            None => {}
        }
        match gq.layer_norm {
            Some(ln) if features.layer_norm => {
                scales.layer_norm = quantize_multiplier(ln.scale);
                scales.variance_guard = ((10_000.0 * ln.scale) as i32).max(1);
            }
            None if features.layer_norm => {
                return Err(ConfigError::Unsupported("layer norm enabled but a gate lacks coefficient quantization"));
            }
            _ => {}
        }
        debug!(
            "{} gate: input ({}, {}) recurrent ({}, {})",
            gate.name(),
            scales.input_to_gate.multiplier,
            scales.input_to_gate.shift,
            scales.recurrent_to_gate.multiplier,
            scales.recurrent_to_gate.shift
        );
        *gates.get_mut(gate) = scales;
    }

    let nl_out = quant.nonlinear_output_scale;
    let hidden = quantize_multiplier(nl_out * nl_out / quant.hidden.scale);

    let projection = if features.projection {
        let pw = quant
            .projection_weight
            .ok_or(ConfigError::Unsupported("projection enabled without projection weight quantization"))?;
        pw.validate("projection_weight")?;
        quantize_multiplier(quant.hidden.scale * pw.scale / quant.output.scale)
    } else {
        QuantizedMultiplier::ZERO
    };

    // 0 means "no clip" to the kernels, so a positive clip must survive rounding
    let quantized_cell_clip = if settings.cell_clip > 0.0 {
        let q = (settings.cell_clip as f64 / quant.cell.scale).round().clamp(0.0, i16::MAX as f64) as i16;
        if q == 0 {
            return Err(ConfigError::ClipBelowResolution {
                name: "cell_clip",
                value: settings.cell_clip,
                scale: quant.cell.scale,
            });
        }
        q
    } else {
        0
    };
    let (quantized_projection_clip, projection_clip_range) = if settings.proj_clip > 0.0 {
        let steps = (settings.proj_clip as f64 / quant.output.scale).round().min(i32::MAX as f64) as i32;
        if steps == 0 && features.projection {
            return Err(ConfigError::ClipBelowResolution {
                name: "proj_clip",
                value: settings.proj_clip,
                scale: quant.output.scale,
            });
        }
        let zp = quant.output.zero_point;
        let range = (steps > 0).then(|| {
            (i8::saturate(zp.saturating_sub(steps)), i8::saturate(zp.saturating_add(steps)))
        });
        (i8::saturate(steps), range)
    } else {
        (0, None)
    };

    info!(
        "LSTM quantization: cell scale 2^{}, cell clip {}, hidden multiplier ({}, {})",
        cell_scale, quantized_cell_clip, hidden.multiplier, hidden.shift
    );

    Ok(EvaluationParameters {
        gates,
        hidden,
        hidden_zero_point: quant.hidden.zero_point,
        projection,
        input_zero_point: quant.input.zero_point,
        output_zero_point: quant.output.zero_point,
        cell_scale,
        quantized_cell_clip,
        quantized_projection_clip,
        projection_clip_range,
    })
}
