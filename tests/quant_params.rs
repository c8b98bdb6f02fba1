mod common;

use common::*;
use pretty_assertions::assert_eq;

fn derive(q: &pielstm::quant::ModelQuantization) -> pielstm::error::Result<pielstm::quant::EvaluationParameters> {
    use pielstm::quant::{derive_evaluation_parameters, LstmFeatures};
    derive_evaluation_parameters(q, &settings(), &LstmFeatures::default())
}

#[test]
fn evaluation_parameters_match_reference_model() {
    use pielstm::quant::QuantizedMultiplier;
    let p = derive(&quantization()).unwrap();
    let qm = |multiplier, shift| QuantizedMultiplier { multiplier, shift };

    assert_eq!(p.cell_scale, -12);
    assert_eq!(p.quantized_cell_clip, 24576);
    // 3.0 / 0.0047 saturates the int8 range
    assert_eq!(p.quantized_projection_clip, 127);
    assert_eq!(p.projection_clip_range, Some((-128, 127)));
    assert_eq!(p.hidden, qm(1782579271, -22));
    assert_eq!(p.hidden_zero_point, -21);
    assert_eq!(p.output_zero_point, -21);
    assert_eq!(p.input_zero_point, 0);
    assert_eq!(p.projection, QuantizedMultiplier::ZERO);

    assert_eq!(p.gates.forget.input_to_gate, qm(1358050490, 3));
    assert_eq!(p.gates.forget.recurrent_to_gate, qm(1629660523, 2));
    assert_eq!(p.gates.input, p.gates.forget);
    assert_eq!(p.gates.modulation.input_to_gate, qm(1086440392, -1));
    assert_eq!(p.gates.modulation.recurrent_to_gate, qm(1303728418, -2));
    assert_eq!(p.gates.output.input_to_gate, qm(1724724122, 2));
    assert_eq!(p.gates.output.recurrent_to_gate, qm(2069668864, 1));
    assert_eq!(p.gates.output.cell_to_gate, QuantizedMultiplier::ZERO);
}

#[test]
fn quantized_model_exposes_derived_parameters() {
    let model = quantized_model();
    assert_eq!(model.params(), &derive(&quantization()).unwrap());
    assert_eq!(model.quantization(), &quantization());
}

#[test]
fn cell_scale_must_be_power_of_two() {
    use pielstm::quant::TensorQuantParams;
    use pielstm::ConfigError;
    let mut q = quantization();
    q.cell = TensorQuantParams::symmetric(0.0003);
    assert_eq!(derive(&q).unwrap_err(), ConfigError::NonPowerOfTwoCellScale { scale: 0.0003 });
    // within rounding of 2^-12
    q.cell = TensorQuantParams::symmetric(0.00024414062);
    assert_eq!(derive(&q).unwrap().cell_scale, -12);
}

#[test]
fn negative_clip_is_rejected() {
    use pielstm::quant::{derive_evaluation_parameters, LstmFeatures};
    use pielstm::ConfigError;
    let mut s = settings();
    s.cell_clip = -1.0;
    let err = derive_evaluation_parameters(&quantization(), &s, &LstmFeatures::default()).unwrap_err();
    assert_eq!(err, ConfigError::NegativeClip { name: "cell_clip", value: -1.0 });
    let mut s = settings();
    s.proj_clip = -0.5;
    let err = derive_evaluation_parameters(&quantization(), &s, &LstmFeatures::default()).unwrap_err();
    assert_eq!(err, ConfigError::NegativeClip { name: "proj_clip", value: -0.5 });
}

#[test]
fn invalid_tensor_quantization_is_rejected() {
    use pielstm::quant::TensorQuantParams;
    use pielstm::ConfigError;
    let mut q = quantization();
    q.input.scale = 0.0;
    assert_eq!(derive(&q).unwrap_err(), ConfigError::NonPositiveScale { tensor: "input", scale: 0.0 });

    let mut q = quantization();
    q.cell = TensorQuantParams { scale: 2f64.powi(-12), zero_point: 3, symmetric: true };
    assert_eq!(derive(&q).unwrap_err(), ConfigError::AsymmetricSymmetricTensor { tensor: "cell", zero_point: 3 });

    let mut q = quantization();
    q.forget_gate.activation_weight.zero_point = 1;
    q.forget_gate.activation_weight.symmetric = false;
    assert!(matches!(derive(&q).unwrap_err(), ConfigError::Unsupported(_)));
}

#[test]
fn nonlinear_domains_are_fixed() {
    use pielstm::ConfigError;
    let mut q = quantization();
    q.nonlinear_input_scale = 2f64.powi(-11);
    assert!(matches!(derive(&q).unwrap_err(), ConfigError::Unsupported(_)));
    let mut q = quantization();
    q.nonlinear_output_scale = 2f64.powi(-14);
    assert!(matches!(derive(&q).unwrap_err(), ConfigError::Unsupported(_)));
}

#[test]
fn output_must_equal_hidden_without_projection() {
    use pielstm::quant::TensorQuantParams;
    use pielstm::ConfigError;
    let mut q = quantization();
    q.hidden = TensorQuantParams::new(0.01, 0);
    assert!(matches!(derive(&q).unwrap_err(), ConfigError::Unsupported(_)));
}

#[test]
fn missing_input_gate_quantization() {
    use pielstm::ConfigError;
    let mut q = quantization();
    q.input_gate = None;
    assert_eq!(derive(&q).unwrap_err(), ConfigError::MissingGate("input"));
    // fine with coupled gates
    let mut s = settings();
    s.use_coupled_gates = true;
    let p = pielstm::quant::derive_evaluation_parameters(&q, &s, &Default::default()).unwrap();
    assert_eq!(p.gates.input, pielstm::quant::GateScales::default());
}

#[test]
fn peephole_and_layer_norm_need_their_scales() {
    use pielstm::quant::{derive_evaluation_parameters, LstmFeatures, TensorQuantParams};
    use pielstm::ConfigError;
    let q = quantization();
    let peephole = LstmFeatures { peephole: true, ..LstmFeatures::default() };
    assert!(matches!(derive_evaluation_parameters(&q, &settings(), &peephole), Err(ConfigError::Unsupported(_))));
    let layer_norm = LstmFeatures { layer_norm: true, ..LstmFeatures::default() };
    assert!(matches!(derive_evaluation_parameters(&q, &settings(), &layer_norm), Err(ConfigError::Unsupported(_))));
    let projection = LstmFeatures { projection: true, ..LstmFeatures::default() };
    assert!(matches!(derive_evaluation_parameters(&q, &settings(), &projection), Err(ConfigError::Unsupported(_))));

    let mut q = quantization();
    let ln = TensorQuantParams::symmetric(2f64.powi(-10));
    for g in [&mut q.forget_gate, &mut q.modulation_gate, &mut q.output_gate] {
        *g = g.with_layer_norm(ln);
    }
    q.input_gate = q.input_gate.map(|g| g.with_layer_norm(ln));
    let p = derive_evaluation_parameters(&q, &settings(), &layer_norm).unwrap();
    assert_eq!(p.gates.forget.layer_norm.multiplier, 1 << 30);
    assert_eq!(p.gates.forget.layer_norm.shift, -9);
    assert_eq!(p.gates.forget.variance_guard, 9);
}

#[test]
fn clips_below_one_step_are_rejected() {
    use pielstm::quant::{derive_evaluation_parameters, LstmFeatures, TensorQuantParams};
    use pielstm::{ConfigError, QuantizedLstm};
    let q = quantization();
    let mut s = settings();
    s.cell_clip = 1e-5;
    let err = derive_evaluation_parameters(&q, &s, &LstmFeatures::default()).unwrap_err();
    assert_eq!(err, ConfigError::ClipBelowResolution { name: "cell_clip", value: 1e-5, scale: 2f64.powi(-12) });

    let tiny_clip = pielstm::FloatLstm::builder(dims())
        .settings(s)
        .forget_gate(forget_gate())
        .input_gate(input_gate())
        .modulation_gate(modulation_gate())
        .output_gate(output_gate())
        .build()
        .unwrap();
    assert!(matches!(
        QuantizedLstm::from_float(&tiny_clip, quantization()),
        Err(ConfigError::ClipBelowResolution { name: "cell_clip", .. })
    ));

    // three quarters of a step still rounds to one
    s.cell_clip = 0.75 * 2f32.powi(-12);
    let p = derive_evaluation_parameters(&q, &s, &LstmFeatures::default()).unwrap();
    assert_eq!(p.quantized_cell_clip, 1);

    let mut q = quantization();
    q.projection_weight = Some(TensorQuantParams::symmetric(1.0 / 127.0));
    let projection = LstmFeatures { projection: true, ..LstmFeatures::default() };
    let mut s = settings();
    s.proj_clip = 1e-4;
    let err = derive_evaluation_parameters(&q, &s, &projection).unwrap_err();
    assert_eq!(err, ConfigError::ClipBelowResolution { name: "proj_clip", value: 1e-4, scale: q.output.scale });
    // the projection clip is unused without a projection
    let p = derive_evaluation_parameters(&q, &s, &LstmFeatures::default()).unwrap();
    assert_eq!(p.quantized_projection_clip, 0);
    assert_eq!(p.projection_clip_range, None);
}

#[test]
fn zero_points_must_fit_their_storage() {
    use pielstm::quant::TensorQuantParams;
    use pielstm::ConfigError;
    let mut q = quantization();
    q.output.zero_point = 200;
    q.hidden.zero_point = 200;
    assert_eq!(derive(&q).unwrap_err(), ConfigError::ZeroPointOutOfRange { tensor: "output", zero_point: 200, bits: 8 });

    let mut q = quantization();
    q.input.zero_point = -129;
    assert_eq!(derive(&q).unwrap_err(), ConfigError::ZeroPointOutOfRange { tensor: "input", zero_point: -129, bits: 8 });

    let mut q = quantization();
    q.cell = TensorQuantParams::new(2f64.powi(-12), 40_000);
    assert_eq!(derive(&q).unwrap_err(), ConfigError::ZeroPointOutOfRange { tensor: "cell", zero_point: 40_000, bits: 16 });

    // the int8 limits themselves are fine
    let mut q = quantization();
    q.output.zero_point = -128;
    q.hidden.zero_point = -128;
    q.input.zero_point = 127;
    assert_eq!(derive(&q).unwrap().hidden_zero_point, -128);
}

#[test]
fn initial_hidden_state_holds_the_output_zero_point() {
    let model = quantized_model();
    let state = model.initial_state(N_BATCH);
    assert_eq!(state.hidden, vec![-21i8; N_BATCH * N_CELL]);
    assert_eq!(state.cell, vec![0i16; N_BATCH * N_CELL]);
    let mut real = vec![1.0f32; state.hidden.len()];
    model.dequantize_output(&state.hidden, &mut real);
    assert_eq!(real, vec![0.0f32; N_BATCH * N_CELL]);
}
