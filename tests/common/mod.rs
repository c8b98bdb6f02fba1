#![allow(dead_code)]

use pielstm::activation::Activation;
use pielstm::lstm::{FloatGate, FloatLstm, LstmDims, LstmSettings, QuantizedLstm};
use pielstm::quant::{GateQuantization, ModelQuantization, TensorQuantParams};

pub const N_INPUT: usize = 2;
pub const N_CELL: usize = 2;
pub const N_BATCH: usize = 2;
pub const N_TIME: usize = 3;

// single-step fixture, [batch][element]
pub const GATE_INPUT: [f32; 4] = [0.2, 0.3, -0.98, 0.62];
pub const GATE_HIDDEN: [f32; 4] = [-0.1, 0.2, -0.3, 0.5];
pub const GATE_CELL: [f32; 4] = [-1.3, 6.2, -7.3, 3.5];

pub const EXPECTED_FORGET: [f32; 4] = [6.69285092e-3, 4.53978687e-5, 0.93086158, 0.9945137];
pub const EXPECTED_INPUT: [f32; 4] = [0.99330715, 0.9999546, 0.06913842, 0.0054863];
pub const EXPECTED_OUTPUT_GATE: [f32; 4] = [0.6456563062257954, 0.6456563062257954, 0.46008512, 0.46008512];
pub const EXPECTED_MODULATION: [f32; 4] = [0.5370495669980353, 0.5370495669980353, -0.1586485, -0.1586485];
pub const EXPECTED_CELL: [f32; 4] = [0.52475447, 0.53730665, -6.0, 3.47992756];
pub const EXPECTED_HIDDEN: [f32; 4] = [0.31079388, 0.3169827, -0.46007947, 0.45921249];

// three-step batch-major sequence
pub const SEQ_INPUT: [f32; 12] = [0.2, 0.3, 0.2, 0.3, 0.2, 0.3, -0.98, 0.62, 0.01, 0.99, 0.49, -0.32];
pub const SEQ_EXPECTED_OUTPUT: [f32; 12] = [
    0.26455893,
    0.26870455,
    0.47935803,
    0.47937014,
    0.58013272,
    0.58013278,
    -1.41184672e-3,
    -1.43329117e-5,
    0.46887168,
    0.46891281,
    0.50054074,
    0.50054148,
];
pub const SEQ_EXPECTED_HIDDEN: [f32; 4] = [0.58013272, 0.58013278, 0.50054074, 0.50054148];
pub const SEQ_EXPECTED_CELL: [f32; 4] = [0.89740515, 0.8974053, 0.80327607, 0.80327785];

pub fn dims() -> LstmDims { LstmDims::new(N_INPUT, N_CELL, N_CELL) }

pub fn settings() -> LstmSettings {
    LstmSettings { activation: Activation::Tanh, cell_clip: 6.0, proj_clip: 3.0, use_coupled_gates: false }
}

pub fn forget_gate() -> FloatGate {
    FloatGate::new(vec![-10.0, -10.0, -20.0, -20.0], vec![-10.0, -10.0, -20.0, -20.0], vec![1.0, 2.0])
}

pub fn input_gate() -> FloatGate {
    FloatGate::new(vec![10.0, 10.0, 20.0, 20.0], vec![10.0, 10.0, 20.0, 20.0], vec![-1.0, -2.0])
}

pub fn modulation_gate() -> FloatGate { FloatGate::new(vec![1.0; 4], vec![1.0; 4], vec![0.0; 2]) }

pub fn output_gate() -> FloatGate { FloatGate::new(vec![1.0; 4], vec![1.0; 4], vec![0.0; 2]) }

pub fn float_model() -> FloatLstm {
    FloatLstm::builder(dims())
        .settings(settings())
        .forget_gate(forget_gate())
        .input_gate(input_gate())
        .modulation_gate(modulation_gate())
        .output_gate(output_gate())
        .build()
        .expect("float fixture builds")
}

pub fn quantization() -> ModelQuantization {
    let output = TensorQuantParams::new(0.004705882165580988, -21);
    let sym = TensorQuantParams::symmetric;
    let sigmoid_gate = GateQuantization::new(sym(0.15748031496062992), sym(0.15748031496062992), sym(0.0012351397251814111));
    ModelQuantization {
        input: TensorQuantParams::new(0.00784313725490196, 0),
        output,
        hidden: output,
        cell: sym(2f64.powi(-12)),
        nonlinear_input_scale: 2f64.powi(-12),
        nonlinear_output_scale: 2f64.powi(-15),
        forget_gate: sigmoid_gate,
        input_gate: Some(sigmoid_gate),
        modulation_gate: GateQuantization::new(
            sym(0.007874015748031496),
            sym(0.007874015748031496),
            sym(6.175698625907056e-5),
        ),
        output_gate: GateQuantization::new(sym(0.1), sym(0.1), sym(0.1)),
        projection_weight: None,
    }
}

pub fn quantized_model() -> QuantizedLstm {
    QuantizedLstm::from_float(&float_model(), quantization()).expect("quantized fixture builds")
}

pub fn assert_close(expected: &[f32], got: &[f32], tol: f32, what: &str) {
    assert_eq!(expected.len(), got.len(), "{what}: length");
    for (i, (e, g)) in expected.iter().zip(got).enumerate() {
        assert!((e - g).abs() <= tol, "{what}[{i}]: expected {e}, got {g} (tol {tol})");
    }
}
