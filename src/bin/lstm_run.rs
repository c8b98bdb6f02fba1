use anyhow::{bail, Context, Result};
use clap::Parser;
use pielstm::config::ModelConfig;
use pielstm::lstm::{run_sequence, LstmKernel, ScratchBuffers, SequenceInput};
use pielstm::quant::Quantized;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "lstm-run", version, about = "Run an LSTM model (float or int8) over an input sequence")]
struct Args {
    /// Model description (JSON, see config::ModelConfig)
    #[arg(long)]
    model: PathBuf,

    /// Input sequence: JSON array of floats in the model's sequence layout
    #[arg(long)]
    input: PathBuf,

    /// Batch size; the time dimension is inferred from the input length
    #[arg(long, default_value_t = 1)]
    batch: usize,

    /// Evaluate the int8x8_16 kernel instead of the float reference
    #[arg(long, default_value_t = false)]
    quantized: bool,

    /// Pretty-print the JSON report
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

#[derive(Serialize)]
struct Report {
    kernel: &'static str,
    batch: usize,
    time_steps: usize,
    elapsed_us: u128,
    outputs: Vec<f32>,
    hidden: Vec<f32>,
    cell: Vec<f32>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let cfg = ModelConfig::load(&args.model)?;
    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("read input sequence: {}", args.input.display()))?;
    let values: Vec<f32> = serde_json::from_str(&text).context("parse input sequence (expected a JSON array)")?;

    let dims = cfg.dims;
    let per_step = args.batch * dims.n_input;
    if args.batch == 0 || per_step == 0 || values.len() % per_step != 0 {
        bail!("input length {} is not a multiple of batch {} x n_input {}", values.len(), args.batch, dims.n_input);
    }
    let time_steps = values.len() / per_step;
    let layout = cfg.layout;
    let stride = layout.output_row_stride.unwrap_or(dims.n_output);
    let out_len = args.batch * time_steps * stride;

    let report = if args.quantized {
        let lstm = cfg.build_quantized()?;
        let mut x = vec![0i8; values.len()];
        lstm.quantize_input(&values, &mut x);
        let mut state = lstm.initial_state(args.batch);
        let mut scratch = ScratchBuffers::<i16, i8>::new(&lstm.dims(), args.batch);
        let mut out = vec![i8::saturate(lstm.quantization().output.zero_point); out_len];
        let t0 = Instant::now();
        run_sequence(
            &lstm,
            &SequenceInput::new(&x, args.batch, time_steps),
            &mut state.view(),
            &mut scratch.view(),
            &mut out,
            &layout,
        )?;
        let elapsed_us = t0.elapsed().as_micros();
        let mut outputs = vec![0.0; out.len()];
        lstm.dequantize_output(&out, &mut outputs);
        let mut hidden = vec![0.0; state.hidden.len()];
        lstm.dequantize_output(&state.hidden, &mut hidden);
        let mut cell = vec![0.0; state.cell.len()];
        lstm.dequantize_cell(&state.cell, &mut cell);
        Report { kernel: "int8x8_16", batch: args.batch, time_steps, elapsed_us, outputs, hidden, cell }
    } else {
        let lstm = cfg.build_float()?;
        let mut state = lstm.initial_state(args.batch);
        let mut scratch = ScratchBuffers::<f32, f32>::new(&lstm.dims(), args.batch);
        let mut outputs = vec![0.0f32; out_len];
        let t0 = Instant::now();
        run_sequence(
            &lstm,
            &SequenceInput::new(&values, args.batch, time_steps),
            &mut state.view(),
            &mut scratch.view(),
            &mut outputs,
            &layout,
        )?;
        let elapsed_us = t0.elapsed().as_micros();
        Report {
            kernel: "float",
            batch: args.batch,
            time_steps,
            elapsed_us,
            outputs,
            hidden: state.hidden,
            cell: state.cell,
        }
    };

    let json = if args.pretty { serde_json::to_string_pretty(&report)? } else { serde_json::to_string(&report)? };
    println!("{}", json);
    Ok(())
}
