//! Integer LSTM: int8 activations and weights, int16 gates and cell state.

use super::cell::update_cell_integer;
use super::float::{validate_common, FloatLstm};
use super::gate::{check_len, compute_quantized_gate, FloatGate, QuantizedGate};
use super::hidden::update_hidden_integer;
use super::{Gate, GateSet, LstmDims, LstmKernel, LstmSettings, StateBuffers, StepInput};
use crate::activation::{Activation, IntegerActivation};
use crate::error::{ConfigError, Result};
use crate::quant::{
    derive_evaluation_parameters, precompute_zero_point_times_weight_with_bias, quantize, symmetric_quantize,
    EvaluationParameters, GateQuantization, LstmFeatures, ModelQuantization, Quantized, TensorQuantParams,
};
use log::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedProjection {
    /// `[n_output][n_cell]`
    pub weights: Vec<i8>,
    /// Projection bias with the hidden zero point folded in.
    pub folded_bias: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedLstm {
    dims: LstmDims,
    settings: LstmSettings,
    quantization: ModelQuantization,
    params: EvaluationParameters,
    forget: QuantizedGate,
    input: Option<QuantizedGate>,
    modulation: QuantizedGate,
    output: QuantizedGate,
    projection: Option<QuantizedProjection>,
}

impl QuantizedLstm {
    pub fn builder(dims: LstmDims, quantization: ModelQuantization) -> QuantizedLstmBuilder {
        QuantizedLstmBuilder::new(dims, quantization)
    }

    /// Quantize a float model with the given per-tensor quantization.
    ///
    /// Everything is quantized symmetrically: int8 weights, int32 biases,
    /// int16 peephole and layer-norm coefficients. With layer norm the gate
    /// bias scale must be `layer_norm.scale / 1024`.
    pub fn from_float(model: &FloatLstm, quantization: ModelQuantization) -> Result<Self> {
        let dims = model.dims();
        if dims.n_aux_input > 0 {
            return Err(ConfigError::Unsupported("auxiliary input has no integer path"));
        }
        let settings = *model.settings();
        let mut builder = QuantizedLstmBuilder::new(dims, quantization.clone()).settings(settings);
        for gate in Gate::ALL {
            let Some(float_gate) = model.gate(gate) else { continue };
            let gq = quantization.gate(gate).ok_or(ConfigError::MissingGate(gate.name()))?;
            builder = builder.gate(gate, quantize_gate(float_gate, gq)?);
        }
        if let Some(p) = model.projection() {
            let pw = quantization
                .projection_weight
                .ok_or(ConfigError::Unsupported("projection enabled without projection weight quantization"))?;
            let mut weights = vec![0i8; p.weights.len()];
            symmetric_quantize(&p.weights, &mut weights, pw.scale);
            let bias = p.bias.as_ref().map(|b| {
                let mut q = vec![0i32; b.len()];
                symmetric_quantize(b, &mut q, quantization.hidden.scale * pw.scale);
                q
            });
            builder = builder.projection(weights, bias);
        }
        builder.build()
    }

    pub fn params(&self) -> &EvaluationParameters { &self.params }

    pub fn quantization(&self) -> &ModelQuantization { &self.quantization }

    pub fn settings(&self) -> &LstmSettings { &self.settings }

    /// Zero state: hidden holds the output zero point.
    pub fn initial_state(&self, n_batch: usize) -> StateBuffers<i8, i16> {
        StateBuffers::new(&self.dims, n_batch, i8::saturate(self.quantization.output.zero_point), 0)
    }

    pub fn quantize_input(&self, values: &[f32], out: &mut [i8]) {
        let q = self.quantization.input;
        quantize(values, out, q.scale, q.zero_point);
    }

    pub fn dequantize_output(&self, values: &[i8], out: &mut [f32]) {
        let q = self.quantization.output;
        crate::quant::dequantize(values, out, q.scale, q.zero_point);
    }

    pub fn dequantize_cell(&self, values: &[i16], out: &mut [f32]) {
        crate::quant::dequantize(values, out, self.quantization.cell.scale, 0);
    }

    fn gate(&self, gate: Gate) -> Option<&QuantizedGate> {
        match gate {
            Gate::Forget => Some(&self.forget),
            Gate::Input => self.input.as_ref(),
            Gate::Modulation => Some(&self.modulation),
            Gate::Output => Some(&self.output),
        }
    }
}

fn quantize_gate(gate: &FloatGate, gq: &GateQuantization) -> Result<QuantizedGate> {
    let p = &gate.params;
    let mut activation_weights = vec![0i8; p.activation_weights.len()];
    symmetric_quantize(&p.activation_weights, &mut activation_weights, gq.activation_weight.scale);
    let mut recurrent_weights = vec![0i8; p.recurrent_weights.len()];
    symmetric_quantize(&p.recurrent_weights, &mut recurrent_weights, gq.recurrent_weight.scale);
    let mut bias = vec![0i32; p.fused_bias.len()];
    symmetric_quantize(&p.fused_bias, &mut bias, gq.bias.scale);
    let mut q = QuantizedGate::new(activation_weights, recurrent_weights, bias);
    if let Some(w) = &gate.cell_weights {
        let scale = required_scale(gq.cell_weight, "peephole weights without cell weight quantization")?;
        let mut cw = vec![0i16; w.len()];
        symmetric_quantize(w, &mut cw, scale);
        q = q.with_peephole(cw);
    }
    if let Some(c) = &gate.layer_norm {
        let scale = required_scale(gq.layer_norm, "layer norm coefficients without quantization")?;
        let mut ln = vec![0i16; c.len()];
        symmetric_quantize(c, &mut ln, scale);
        q = q.with_layer_norm(ln);
    }
    Ok(q)
}

fn required_scale(q: Option<TensorQuantParams>, what: &'static str) -> Result<f64> {
    q.map(|q| q.scale).ok_or(ConfigError::Unsupported(what))
}

#[derive(Debug, Clone)]
pub struct QuantizedLstmBuilder {
    dims: LstmDims,
    settings: LstmSettings,
    quantization: ModelQuantization,
    gates: GateSet<Option<QuantizedGate>>,
    projection: Option<(Vec<i8>, Option<Vec<i32>>)>,
}

impl QuantizedLstmBuilder {
    pub fn new(dims: LstmDims, quantization: ModelQuantization) -> Self {
        Self { dims, settings: LstmSettings::default(), quantization, gates: GateSet::default(), projection: None }
    }

    pub fn settings(mut self, settings: LstmSettings) -> Self { self.settings = settings; self }

    pub fn gate(mut self, gate: Gate, params: QuantizedGate) -> Self { *self.gates.get_mut(gate) = Some(params); self }

    pub fn forget_gate(self, params: QuantizedGate) -> Self { self.gate(Gate::Forget, params) }

    pub fn input_gate(self, params: QuantizedGate) -> Self { self.gate(Gate::Input, params) }

    pub fn modulation_gate(self, params: QuantizedGate) -> Self { self.gate(Gate::Modulation, params) }

    pub fn output_gate(self, params: QuantizedGate) -> Self { self.gate(Gate::Output, params) }

    /// Projection weights `[n_output][n_cell]` and an optional int32 bias at
    /// scale `hidden.scale * projection_weight.scale`.
    pub fn projection(mut self, weights: Vec<i8>, bias: Option<Vec<i32>>) -> Self {
        self.projection = Some((weights, bias));
        self
    }

    pub fn build(self) -> Result<QuantizedLstm> {
        let Self { dims, settings, quantization, gates, projection } = self;
        validate_common(&dims, &settings, projection.is_some())?;
        if dims.n_aux_input > 0 {
            return Err(ConfigError::Unsupported("auxiliary input has no integer path"));
        }
        if settings.activation != Activation::Tanh {
            return Err(ConfigError::Unsupported("integer kernel requires tanh cell activation"));
        }

        let mut features = LstmFeatures { projection: projection.is_some(), ..LstmFeatures::default() };
        for gate in Gate::ALL {
            let Some(g) = gates.get(gate) else { continue };
            if gate == Gate::Input && settings.use_coupled_gates {
                continue;
            }
            let gq = quantization.gate(gate);
            if g.cell_weights.is_some() {
                features.peephole |= gate != Gate::Modulation;
                if gq.and_then(|q| q.cell_weight).is_none() {
                    return Err(ConfigError::Unsupported("peephole weights without cell weight quantization"));
                }
            }
            if g.layer_norm.is_some() {
                features.layer_norm = true;
            }
        }
        let params = derive_evaluation_parameters(&quantization, &settings, &features)?;

        let input_zp = quantization.input.zero_point;
        let output_zp = quantization.output.zero_point;
        let GateSet { forget, input, modulation, output } = gates;
        let take = |gate: Gate, g: Option<QuantizedGate>| -> Result<QuantizedGate> {
            let g = g.ok_or(ConfigError::MissingGate(gate.name()))?;
            g.validate(&dims)?;
            if features.layer_norm && g.layer_norm.is_none() {
                return Err(ConfigError::Unsupported("layer norm must be configured on every gate"));
            }
            Ok(g.fold_zero_points(input_zp, output_zp))
        };
        let forget = take(Gate::Forget, forget)?;
        let input = if settings.use_coupled_gates { None } else { Some(take(Gate::Input, input)?) };
        let modulation = take(Gate::Modulation, modulation)?;
        let output = take(Gate::Output, output)?;

        let projection = match projection {
            Some((weights, bias)) => {
                check_len("projection_weights", dims.n_output * dims.n_cell, weights.len())?;
                if let Some(b) = &bias { check_len("projection_bias", dims.n_output, b.len())?; }
                let folded_bias = precompute_zero_point_times_weight_with_bias(
                    params.hidden_zero_point,
                    &weights,
                    dims.n_output,
                    dims.n_cell,
                    bias.as_deref(),
                );
                Some(QuantizedProjection { weights, folded_bias })
            }
            None => None,
        };

        info!(
            "quantized LSTM: {} inputs, {} cells, {} outputs, coupled gates {}, projection {}",
            dims.n_input,
            dims.n_cell,
            dims.n_output,
            settings.use_coupled_gates,
            projection.is_some()
        );
        debug!("evaluation parameters: {:?}", params);
        Ok(QuantizedLstm { dims, settings, quantization, params, forget, input, modulation, output, projection })
    }
}

impl LstmKernel for QuantizedLstm {
    type Activation = i8;
    type Gate = i16;
    type Cell = i16;

    fn dims(&self) -> LstmDims { self.dims }

    fn uses_coupled_gates(&self) -> bool { self.input.is_none() }

    fn compute_gate(
        &self,
        gate: Gate,
        input: &StepInput<'_, i8>,
        hidden: &[i8],
        cell: &[i16],
        n_batch: usize,
        out: &mut [i16],
    ) {
        let Some(params) = self.gate(gate) else { return };
        let activation = match gate {
            Gate::Modulation => IntegerActivation::Tanh,
            _ => IntegerActivation::Sigmoid,
        };
        compute_quantized_gate(
            params,
            self.params.gates.get(gate),
            &self.dims,
            activation,
            input,
            hidden,
            cell,
            n_batch,
            out,
        );
    }

    fn update_cell(
        &self,
        n_batch: usize,
        cell: &mut [i16],
        forget: &[i16],
        input: Option<&[i16]>,
        modulation: &[i16],
    ) {
        let len = n_batch * self.dims.n_cell;
        update_cell_integer(
            &mut cell[..len],
            self.params.cell_scale,
            &forget[..len],
            input.map(|i| &i[..len]),
            &modulation[..len],
            self.params.quantized_cell_clip,
        );
    }

    fn update_hidden(
        &self,
        n_batch: usize,
        cell: &[i16],
        output_gate: &[i16],
        activated_cell: &mut [i16],
        gated: &mut [i8],
        hidden: &mut [i8],
    ) {
        update_hidden_integer(
            cell,
            output_gate,
            &self.params,
            self.projection.as_ref(),
            n_batch,
            self.dims.n_cell,
            self.dims.n_output,
            activated_cell,
            gated,
            hidden,
        );
    }
}
