//! Configuration errors raised while preparing an LSTM for evaluation.
//!
//! Evaluation itself never fails; everything that can go wrong is caught here,
//! once, before the first step runs.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("scale of tensor '{tensor}' must be finite and > 0, got {scale}")]
    NonPositiveScale { tensor: &'static str, scale: f64 },

    #[error("tensor '{tensor}' is symmetric but has zero point {zero_point}")]
    AsymmetricSymmetricTensor { tensor: &'static str, zero_point: i32 },

    #[error("cell scale {scale} is not a power of two")]
    NonPowerOfTwoCellScale { scale: f64 },

    #[error("clip '{name}' must be >= 0, got {value}")]
    NegativeClip { name: &'static str, value: f32 },

    #[error("clip '{name}' of {value} is below half a step of scale {scale}")]
    ClipBelowResolution { name: &'static str, value: f32, scale: f64 },

    #[error("zero point {zero_point} of tensor '{tensor}' does not fit its {bits}-bit storage")]
    ZeroPointOutOfRange { tensor: &'static str, zero_point: i32, bits: u32 },

    #[error("dimension mismatch for '{what}': expected {expected}, got {got}")]
    DimensionMismatch { what: &'static str, expected: usize, got: usize },

    #[error("buffer '{what}' too small: need {needed}, have {got}")]
    BufferTooSmall { what: &'static str, needed: usize, got: usize },

    #[error("missing parameters for the {0} gate")]
    MissingGate(&'static str),

    #[error("unsupported configuration: {0}")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
