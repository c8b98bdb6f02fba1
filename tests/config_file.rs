mod common;

use common::*;

fn gate_config(g: pielstm::lstm::FloatGate) -> pielstm::config::GateConfig {
    pielstm::config::GateConfig {
        activation_weights: g.params.activation_weights,
        recurrent_weights: g.params.recurrent_weights,
        bias: g.params.fused_bias,
        aux_weights: None,
        cell_weights: None,
        layer_norm: None,
    }
}

fn fixture_config() -> pielstm::config::ModelConfig {
    pielstm::config::ModelConfig {
        dims: dims(),
        settings: settings(),
        layout: Default::default(),
        forget_gate: gate_config(forget_gate()),
        input_gate: Some(gate_config(input_gate())),
        modulation_gate: gate_config(modulation_gate()),
        output_gate: gate_config(output_gate()),
        projection: None,
        quantization: Some(quantization()),
    }
}

#[test]
fn model_config_round_trips_through_a_file() {
    use pielstm::config::ModelConfig;
    std::fs::create_dir_all("target").unwrap();
    let path = "target/lstm_model_config.json";
    let cfg = fixture_config();
    cfg.save(path).unwrap();
    let loaded = ModelConfig::load(path).unwrap();
    assert_eq!(loaded, cfg);
    assert_eq!(loaded.build_float().unwrap(), float_model());
    assert_eq!(loaded.build_quantized().unwrap(), quantized_model());
}

#[test]
fn minimal_json_uses_defaults() {
    use pielstm::activation::Activation;
    use pielstm::config::ModelConfig;
    let text = r#"{
        "dims": { "n_input": 1, "n_cell": 1, "n_output": 1 },
        "forget_gate": { "activation_weights": [1.0], "recurrent_weights": [1.0], "bias": [0.0] },
        "input_gate": { "activation_weights": [1.0], "recurrent_weights": [1.0], "bias": [0.0] },
        "modulation_gate": { "activation_weights": [1.0], "recurrent_weights": [1.0], "bias": [0.0] },
        "output_gate": { "activation_weights": [1.0], "recurrent_weights": [1.0], "bias": [0.0] }
    }"#;
    let cfg = ModelConfig::from_json(text).unwrap();
    assert_eq!(cfg.dims.n_aux_input, 0);
    assert_eq!(cfg.settings.activation, Activation::Tanh);
    assert_eq!(cfg.settings.cell_clip, 0.0);
    assert!(!cfg.settings.use_coupled_gates);
    assert!(cfg.layout.forward_sequence);
    assert!(!cfg.layout.time_major);
    assert!(cfg.build_float().is_ok());

    let err = cfg.build_quantized().unwrap_err();
    assert!(err.to_string().contains("no quantization section"), "{err}");
}

#[test]
fn quantization_section_defaults_nonlinear_scales() {
    use pielstm::config::ModelConfig;
    let mut value = serde_json::to_value(fixture_config()).unwrap();
    let q = value["quantization"].as_object_mut().unwrap();
    q.remove("nonlinear_input_scale");
    q.remove("nonlinear_output_scale");
    let cfg: ModelConfig = serde_json::from_value(value).unwrap();
    assert_eq!(cfg.quantization, Some(quantization()));
}

#[test]
fn invalid_models_report_context() {
    use pielstm::config::ModelConfig;
    let err = ModelConfig::load("target/does_not_exist.json").unwrap_err();
    assert!(format!("{err:#}").contains("does_not_exist.json"), "{err:#}");

    let err = ModelConfig::from_json("{ \"dims\": 3 }").unwrap_err();
    assert!(format!("{err:#}").contains("parse LSTM model JSON"), "{err:#}");

    let mut cfg = fixture_config();
    cfg.output_gate.bias.push(0.0);
    assert!(cfg.build_float().is_err());
    let err = cfg.build_quantized().unwrap_err();
    assert!(format!("{err:#}").contains("bias"), "{err:#}");
}
