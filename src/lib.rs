pub mod activation;
pub mod config;
pub mod div;
pub mod error;
pub mod fixed_point;
pub mod lstm;
pub mod quant;
pub mod tensor_utils;

pub use error::ConfigError;
pub use lstm::{
    run_sequence, FloatLstm, LstmDims, LstmKernel, LstmSettings, QuantizedLstm, RecurrentState, SequenceInput,
    SequenceLayout, StepScratch,
};
