//! Gate parameters and gate pre-activation + activation.

use super::{Gate, LstmDims, StepInput};
use crate::activation::{Activation, IntegerActivation};
use crate::error::{ConfigError, Result};
use crate::quant::{precompute_zero_point_times_weight_with_bias, GateScales};
use crate::tensor_utils::*;

/// Weights and biases of one gate. Weight matrices are row-major `[n_cell][n_in]`.
///
/// The folded biases absorb the zero point of the vector each matrix is
/// multiplied with: `folded = bias - zero_point * Σ_row(weights)`. Only the
/// activation path carries the fused bias; the recurrent path folds the zero
/// point alone.
#[derive(Debug, Clone, PartialEq)]
pub struct GateParameters<W, B> {
    pub activation_weights: Vec<W>,
    pub recurrent_weights: Vec<W>,
    pub fused_bias: Vec<B>,
    pub activation_folded_bias: Vec<B>,
    pub recurrent_folded_bias: Vec<B>,
}

impl<W, B> GateParameters<W, B> {
    fn check_dims(&self, dims: &LstmDims) -> Result<()> {
        check_len("activation_weights", dims.n_cell * dims.n_input, self.activation_weights.len())?;
        check_len("recurrent_weights", dims.n_cell * dims.n_output, self.recurrent_weights.len())?;
        check_len("fused_bias", dims.n_cell, self.fused_bias.len())
    }
}

impl GateParameters<f32, f32> {
    /// Float parameters have no zero points; folding leaves the bias unchanged.
    pub fn new(activation_weights: Vec<f32>, recurrent_weights: Vec<f32>, bias: Vec<f32>) -> Self {
        let recurrent_folded_bias = vec![0.0; bias.len()];
        Self {
            activation_weights,
            recurrent_weights,
            activation_folded_bias: bias.clone(),
            fused_bias: bias,
            recurrent_folded_bias,
        }
    }
}

impl GateParameters<i8, i32> {
    /// Quantized parameters with both paths folded.
    ///
    /// With `include_bias = false` (layer norm) the fused bias is applied after
    /// normalisation instead, so the activation path folds the zero point only.
    pub fn folded(
        activation_weights: Vec<i8>,
        recurrent_weights: Vec<i8>,
        bias: Vec<i32>,
        input_zero_point: i32,
        output_zero_point: i32,
        include_bias: bool,
    ) -> Self {
        let n_cell = bias.len();
        let n_input = activation_weights.len().checked_div(n_cell).unwrap_or(0);
        let n_output = recurrent_weights.len().checked_div(n_cell).unwrap_or(0);
        let activation_folded_bias = precompute_zero_point_times_weight_with_bias(
            input_zero_point,
            &activation_weights,
            n_cell,
            n_input,
            include_bias.then_some(bias.as_slice()),
        );
        let recurrent_folded_bias =
            precompute_zero_point_times_weight_with_bias(output_zero_point, &recurrent_weights, n_cell, n_output, None);
        Self { activation_weights, recurrent_weights, fused_bias: bias, activation_folded_bias, recurrent_folded_bias }
    }
}

pub(crate) fn check_len(what: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(ConfigError::DimensionMismatch { what, expected, got });
    }
    Ok(())
}

/// A float gate with its optional terms.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatGate {
    pub params: GateParameters<f32, f32>,
    /// `[n_cell][n_aux_input]`
    pub aux_weights: Option<Vec<f32>>,
    /// Peephole, one weight per cell.
    pub cell_weights: Option<Vec<f32>>,
    pub layer_norm: Option<Vec<f32>>,
}

impl FloatGate {
    pub fn new(activation_weights: Vec<f32>, recurrent_weights: Vec<f32>, bias: Vec<f32>) -> Self {
        Self {
            params: GateParameters::new(activation_weights, recurrent_weights, bias),
            aux_weights: None,
            cell_weights: None,
            layer_norm: None,
        }
    }

    pub fn with_aux_weights(mut self, weights: Vec<f32>) -> Self { self.aux_weights = Some(weights); self }

    pub fn with_peephole(mut self, weights: Vec<f32>) -> Self { self.cell_weights = Some(weights); self }

    pub fn with_layer_norm(mut self, coefficients: Vec<f32>) -> Self { self.layer_norm = Some(coefficients); self }

    pub(crate) fn validate(&self, dims: &LstmDims) -> Result<()> {
        self.params.check_dims(dims)?;
        if let Some(w) = &self.aux_weights { check_len("aux_weights", dims.n_cell * dims.n_aux_input, w.len())?; }
        if let Some(w) = &self.cell_weights { check_len("cell_weights", dims.n_cell, w.len())?; }
        if let Some(w) = &self.layer_norm { check_len("layer_norm", dims.n_cell, w.len())?; }
        Ok(())
    }
}

/// A quantized gate: int8 weights, int32 biases, int16 peephole and layer-norm weights.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedGate {
    pub params: GateParameters<i8, i32>,
    pub cell_weights: Option<Vec<i16>>,
    pub layer_norm: Option<Vec<i16>>,
}

impl QuantizedGate {
    /// Unfolded gate; zero points are folded in when the model is built.
    pub fn new(activation_weights: Vec<i8>, recurrent_weights: Vec<i8>, bias: Vec<i32>) -> Self {
        Self {
            params: GateParameters::folded(activation_weights, recurrent_weights, bias, 0, 0, true),
            cell_weights: None,
            layer_norm: None,
        }
    }

    pub fn with_peephole(mut self, weights: Vec<i16>) -> Self { self.cell_weights = Some(weights); self }

    pub fn with_layer_norm(mut self, coefficients: Vec<i16>) -> Self { self.layer_norm = Some(coefficients); self }

    pub(crate) fn fold_zero_points(self, input_zero_point: i32, output_zero_point: i32) -> Self {
        let include_bias = self.layer_norm.is_none();
        let GateParameters { activation_weights, recurrent_weights, fused_bias, .. } = self.params;
        Self {
            params: GateParameters::folded(
                activation_weights,
                recurrent_weights,
                fused_bias,
                input_zero_point,
                output_zero_point,
                include_bias,
            ),
            cell_weights: self.cell_weights,
            layer_norm: self.layer_norm,
        }
    }

    pub(crate) fn validate(&self, dims: &LstmDims) -> Result<()> {
        self.params.check_dims(dims)?;
        if let Some(w) = &self.cell_weights { check_len("cell_weights", dims.n_cell, w.len())?; }
        if let Some(w) = &self.layer_norm { check_len("layer_norm", dims.n_cell, w.len())?; }
        Ok(())
    }
}

/// Float gate: `act(W_x·x + W_aux·aux + W_h·h + w_c⊙c + b)`, layer norm before the bias.
#[allow(clippy::too_many_arguments)]
pub fn compute_float_gate(
    gate: &FloatGate,
    dims: &LstmDims,
    activation: Activation,
    input: &StepInput<'_, f32>,
    hidden: &[f32],
    cell: &[f32],
    n_batch: usize,
    out: &mut [f32],
) {
    let n_cell = dims.n_cell;
    let out = &mut out[..n_batch * n_cell];
    let params = &gate.params;
    if gate.layer_norm.is_some() {
        out.fill(0.0);
    } else {
        vector_batch_vector_assign(&params.fused_bias, n_cell, n_batch, out);
    }
    if !input.input_is_zero {
        matrix_batch_vector_multiply_accumulate(&params.activation_weights, n_cell, dims.n_input, input.input, n_batch, out);
    }
    if let (Some(weights), Some(aux)) = (&gate.aux_weights, input.aux) {
        if !input.aux_is_zero {
            matrix_batch_vector_multiply_accumulate(weights, n_cell, dims.n_aux_input, aux, n_batch, out);
        }
    }
    matrix_batch_vector_multiply_accumulate(&params.recurrent_weights, n_cell, dims.n_output, hidden, n_batch, out);
    if let Some(weights) = &gate.cell_weights {
        vector_batch_vector_cwise_product_accumulate(weights, n_cell, cell, n_batch, out);
    }
    if let Some(coefficients) = &gate.layer_norm {
        mean_stddev_normalization(out, n_cell, n_batch);
        vector_batch_vector_cwise_product_in_place(coefficients, n_cell, n_batch, out);
        vector_batch_vector_add(&params.fused_bias, n_cell, n_batch, out);
    }
    activation.apply_in_place(out);
}

/// Integer gate. Two int32 accumulators (input and recurrent path) are each
/// requantised to Q3.12 and summed with int16 saturation; peephole and layer
/// norm stay in Q3.12; the activation yields Q0.15.
#[allow(clippy::too_many_arguments)]
pub fn compute_quantized_gate(
    gate: &QuantizedGate,
    scales: &GateScales,
    dims: &LstmDims,
    activation: IntegerActivation,
    input: &StepInput<'_, i8>,
    hidden: &[i8],
    cell: &[i16],
    n_batch: usize,
    out: &mut [i16],
) {
    let n_cell = dims.n_cell;
    let out = &mut out[..n_batch * n_cell];
    let params = &gate.params;
    out.fill(0);
    let x = if input.input_is_zero { None } else { Some(input.input) };
    matrix_batch_vector_multiply_accumulate_i8(
        x,
        &params.activation_folded_bias,
        &params.activation_weights,
        scales.input_to_gate,
        n_batch,
        dims.n_input,
        n_cell,
        0,
        out,
    );
    matrix_batch_vector_multiply_accumulate_i8(
        Some(hidden),
        &params.recurrent_folded_bias,
        &params.recurrent_weights,
        scales.recurrent_to_gate,
        n_batch,
        dims.n_output,
        n_cell,
        0,
        out,
    );
    if let Some(weights) = &gate.cell_weights {
        vector_batch_vector_cwise_product_accumulate_i16(weights, n_cell, cell, n_batch, scales.cell_to_gate, out);
    }
    if let Some(coefficients) = &gate.layer_norm {
        apply_layer_norm_i16(
            out,
            coefficients,
            &params.fused_bias,
            scales.layer_norm,
            scales.variance_guard,
            n_batch,
            n_cell,
        );
    }
    activation.apply_in_place(out, crate::quant::params::NONLINEAR_INPUT_SCALE_LOG2);
}

/// Which activation a gate uses: the configured one for the modulation gate, sigmoid otherwise.
pub fn gate_activation(gate: Gate, configured: Activation) -> Activation {
    match gate {
        Gate::Modulation => configured,
        _ => Activation::Sigmoid,
    }
}
