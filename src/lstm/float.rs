//! Float reference LSTM.

use super::cell::update_cell_float;
use super::gate::{check_len, compute_float_gate, gate_activation, FloatGate};
use super::hidden::update_hidden_float;
use super::{Gate, GateSet, LstmDims, LstmKernel, LstmSettings, StateBuffers, StepInput};
use crate::error::{ConfigError, Result};
use log::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct FloatProjection {
    /// `[n_output][n_cell]`
    pub weights: Vec<f32>,
    pub bias: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloatLstm {
    dims: LstmDims,
    settings: LstmSettings,
    forget: FloatGate,
    /// `None` with coupled gates.
    input: Option<FloatGate>,
    modulation: FloatGate,
    output: FloatGate,
    projection: Option<FloatProjection>,
}

impl FloatLstm {
    pub fn builder(dims: LstmDims) -> FloatLstmBuilder { FloatLstmBuilder::new(dims) }

    pub fn settings(&self) -> &LstmSettings { &self.settings }

    pub fn gate(&self, gate: Gate) -> Option<&FloatGate> {
        match gate {
            Gate::Forget => Some(&self.forget),
            Gate::Input => self.input.as_ref(),
            Gate::Modulation => Some(&self.modulation),
            Gate::Output => Some(&self.output),
        }
    }

    pub fn projection(&self) -> Option<&FloatProjection> { self.projection.as_ref() }

    pub fn initial_state(&self, n_batch: usize) -> StateBuffers<f32, f32> {
        StateBuffers::new(&self.dims, n_batch, 0.0, 0.0)
    }
}

#[derive(Debug, Clone)]
pub struct FloatLstmBuilder {
    dims: LstmDims,
    settings: LstmSettings,
    gates: GateSet<Option<FloatGate>>,
    projection: Option<FloatProjection>,
}

impl FloatLstmBuilder {
    pub fn new(dims: LstmDims) -> Self {
        Self { dims, settings: LstmSettings::default(), gates: GateSet::default(), projection: None }
    }

    pub fn settings(mut self, settings: LstmSettings) -> Self { self.settings = settings; self }

    pub fn gate(mut self, gate: Gate, params: FloatGate) -> Self { *self.gates.get_mut(gate) = Some(params); self }

    pub fn forget_gate(self, params: FloatGate) -> Self { self.gate(Gate::Forget, params) }

    pub fn input_gate(self, params: FloatGate) -> Self { self.gate(Gate::Input, params) }

    pub fn modulation_gate(self, params: FloatGate) -> Self { self.gate(Gate::Modulation, params) }

    pub fn output_gate(self, params: FloatGate) -> Self { self.gate(Gate::Output, params) }

    pub fn projection(mut self, weights: Vec<f32>, bias: Option<Vec<f32>>) -> Self {
        self.projection = Some(FloatProjection { weights, bias });
        self
    }

    pub fn build(self) -> Result<FloatLstm> {
        let Self { dims, settings, gates, projection } = self;
        validate_common(&dims, &settings, projection.is_some())?;
        let GateSet { forget, input, modulation, output } = gates;

        let take = |gate: Gate, params: Option<FloatGate>| -> Result<FloatGate> {
            let params = params.ok_or(ConfigError::MissingGate(gate.name()))?;
            params.validate(&dims)?;
            Ok(params)
        };
        let forget = take(Gate::Forget, forget)?;
        let input = if settings.use_coupled_gates {
            if input.is_some() {
                warn!("coupled input/forget gates: ignoring input gate parameters");
            }
            None
        } else {
            Some(take(Gate::Input, input)?)
        };
        let modulation = take(Gate::Modulation, modulation)?;
        let output = take(Gate::Output, output)?;

        if let Some(p) = &projection {
            check_len("projection_weights", dims.n_output * dims.n_cell, p.weights.len())?;
            if let Some(b) = &p.bias { check_len("projection_bias", dims.n_output, b.len())?; }
        }
        debug!("float LSTM: {:?}, coupled gates {}", dims, settings.use_coupled_gates);
        Ok(FloatLstm { dims, settings, forget, input, modulation, output, projection })
    }
}

/// Checks shared by both kernels' builders.
pub(crate) fn validate_common(dims: &LstmDims, settings: &LstmSettings, has_projection: bool) -> Result<()> {
    if settings.cell_clip < 0.0 {
        return Err(ConfigError::NegativeClip { name: "cell_clip", value: settings.cell_clip });
    }
    if settings.proj_clip < 0.0 {
        return Err(ConfigError::NegativeClip { name: "proj_clip", value: settings.proj_clip });
    }
    if !has_projection {
        check_len("n_output (no projection)", dims.n_cell, dims.n_output)?;
    }
    Ok(())
}

impl LstmKernel for FloatLstm {
    type Activation = f32;
    type Gate = f32;
    type Cell = f32;

    fn dims(&self) -> LstmDims { self.dims }

    fn uses_coupled_gates(&self) -> bool { self.input.is_none() }

    fn compute_gate(
        &self,
        gate: Gate,
        input: &StepInput<'_, f32>,
        hidden: &[f32],
        cell: &[f32],
        n_batch: usize,
        out: &mut [f32],
    ) {
        let Some(params) = self.gate(gate) else { return };
        let activation = gate_activation(gate, self.settings.activation);
        compute_float_gate(params, &self.dims, activation, input, hidden, cell, n_batch, out);
    }

    fn update_cell(
        &self,
        n_batch: usize,
        cell: &mut [f32],
        forget: &[f32],
        input: Option<&[f32]>,
        modulation: &[f32],
    ) {
        let len = n_batch * self.dims.n_cell;
        update_cell_float(
            &mut cell[..len],
            &forget[..len],
            input.map(|i| &i[..len]),
            &modulation[..len],
            self.settings.cell_clip,
        );
    }

    fn update_hidden(
        &self,
        n_batch: usize,
        cell: &[f32],
        output_gate: &[f32],
        _activated_cell: &mut [f32],
        gated: &mut [f32],
        hidden: &mut [f32],
    ) {
        update_hidden_float(
            cell,
            output_gate,
            self.settings.activation,
            self.projection.as_ref(),
            self.settings.proj_clip,
            n_batch,
            self.dims.n_cell,
            self.dims.n_output,
            gated,
            hidden,
        );
    }
}
