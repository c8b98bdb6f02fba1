//! JSON model description: dimensions, settings, float weights and quantization.

use crate::error::ConfigError;
use crate::lstm::{FloatGate, FloatLstm, LstmDims, LstmSettings, QuantizedLstm, SequenceLayout};
use crate::quant::ModelQuantization;
use anyhow::{bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    pub activation_weights: Vec<f32>,
    pub recurrent_weights: Vec<f32>,
    pub bias: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux_weights: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_weights: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_norm: Option<Vec<f32>>,
}

impl GateConfig {
    pub fn to_gate(&self) -> FloatGate {
        let mut g = FloatGate::new(self.activation_weights.clone(), self.recurrent_weights.clone(), self.bias.clone());
        if let Some(w) = &self.aux_weights { g = g.with_aux_weights(w.clone()); }
        if let Some(w) = &self.cell_weights { g = g.with_peephole(w.clone()); }
        if let Some(c) = &self.layer_norm { g = g.with_layer_norm(c.clone()); }
        g
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    pub weights: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub dims: LstmDims,
    #[serde(default)]
    pub settings: LstmSettings,
    #[serde(default)]
    pub layout: SequenceLayout,
    pub forget_gate: GateConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_gate: Option<GateConfig>,
    pub modulation_gate: GateConfig,
    pub output_gate: GateConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<ProjectionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization: Option<ModelQuantization>,
}

impl ModelConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("read LSTM model file: {}", path.as_ref().display()))?;
        let cfg = Self::from_json(&text).with_context(|| format!("in {}", path.as_ref().display()))?;
        info!(
            "loaded LSTM model {}: {} inputs, {} cells, {} outputs",
            path.as_ref().display(),
            cfg.dims.n_input,
            cfg.dims.n_cell,
            cfg.dims.n_output
        );
        Ok(cfg)
    }

    pub fn from_json(text: &str) -> Result<Self> { serde_json::from_str(text).context("parse LSTM model JSON") }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("serialize LSTM model")?;
        fs::write(&path, text).with_context(|| format!("write LSTM model file: {}", path.as_ref().display()))
    }

    pub fn build_float(&self) -> std::result::Result<FloatLstm, ConfigError> {
        let mut b = FloatLstm::builder(self.dims)
            .settings(self.settings)
            .forget_gate(self.forget_gate.to_gate())
            .modulation_gate(self.modulation_gate.to_gate())
            .output_gate(self.output_gate.to_gate());
        if let Some(g) = &self.input_gate { b = b.input_gate(g.to_gate()); }
        if let Some(p) = &self.projection { b = b.projection(p.weights.clone(), p.bias.clone()); }
        b.build()
    }

    pub fn build_quantized(&self) -> Result<QuantizedLstm> {
        let Some(quantization) = self.quantization.clone() else {
            bail!("model has no quantization section");
        };
        let float = self.build_float().context("build float model")?;
        QuantizedLstm::from_float(&float, quantization).context("quantize model")
    }
}
