mod common;

use common::*;

#[test]
fn float_step_updates_state() {
    use pielstm::lstm::{step, LstmKernel, RecurrentState, ScratchBuffers, StepInput};
    let model = float_model();
    let mut hidden = GATE_HIDDEN;
    let mut cell = GATE_CELL;
    let mut scratch = ScratchBuffers::<f32, f32>::new(&model.dims(), N_BATCH);
    let mut state = RecurrentState { hidden: &mut hidden[..], cell: &mut cell[..] };
    step(&model, &StepInput::new(&GATE_INPUT[..]), N_BATCH, &mut state, &mut scratch.view());
    assert_close(&EXPECTED_HIDDEN, &hidden, 1e-6, "hidden");
    assert_close(&EXPECTED_CELL, &cell, 1e-6, "cell");
}

#[test]
fn quantized_step_tracks_float() {
    use pielstm::lstm::{step, LstmKernel, RecurrentState, ScratchBuffers, StepInput};
    use pielstm::quant::{dequantize, quantize};
    let model = quantized_model();
    let q = quantization();
    let mut x = [0i8; 4];
    model.quantize_input(&GATE_INPUT, &mut x);
    let mut hidden = [0i8; 4];
    quantize(&GATE_HIDDEN, &mut hidden, q.output.scale, q.output.zero_point);
    let mut cell = [0i16; 4];
    quantize(&GATE_CELL, &mut cell, q.cell.scale, 0);
    let mut scratch = ScratchBuffers::<i16, i8>::new(&model.dims(), N_BATCH);
    let mut state = RecurrentState { hidden: &mut hidden[..], cell: &mut cell[..] };
    step(&model, &StepInput::new(&x[..]), N_BATCH, &mut state, &mut scratch.view());

    let mut real_hidden = [0.0f32; 4];
    model.dequantize_output(&hidden, &mut real_hidden);
    assert_close(&EXPECTED_HIDDEN, &real_hidden, 1e-2, "hidden");
    let mut real_cell = [0.0f32; 4];
    dequantize(&cell, &mut real_cell, q.cell.scale, 0);
    assert_close(&EXPECTED_CELL, &real_cell, 1e-1, "cell");
}

#[test]
fn step_with_batch_of_one_matches_batched_rows() {
    use pielstm::lstm::{step, LstmKernel, RecurrentState, ScratchBuffers, StepInput};
    let model = float_model();
    let mut batched_hidden = GATE_HIDDEN;
    let mut batched_cell = GATE_CELL;
    let mut scratch = ScratchBuffers::<f32, f32>::new(&model.dims(), N_BATCH);
    let mut state = RecurrentState { hidden: &mut batched_hidden[..], cell: &mut batched_cell[..] };
    step(&model, &StepInput::new(&GATE_INPUT[..]), N_BATCH, &mut state, &mut scratch.view());

    for b in 0..N_BATCH {
        let mut hidden = GATE_HIDDEN[b * 2..b * 2 + 2].to_vec();
        let mut cell = GATE_CELL[b * 2..b * 2 + 2].to_vec();
        let mut row = RecurrentState { hidden: &mut hidden[..], cell: &mut cell[..] };
        step(&model, &StepInput::new(&GATE_INPUT[b * 2..b * 2 + 2]), 1, &mut row, &mut scratch.view());
        assert_eq!(hidden, &batched_hidden[b * 2..b * 2 + 2], "row {b} hidden");
        assert_eq!(cell, &batched_cell[b * 2..b * 2 + 2], "row {b} cell");
    }
}
