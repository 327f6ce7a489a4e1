//! DSP Error Types

use thiserror::Error;

/// Errors that can occur while preparing the engine
#[derive(Error, Debug)]
pub enum DspError {
    #[error("Sample rate must be positive, got {0}")]
    InvalidSampleRate(f64),

    #[error("Chunk size must be at least 1 sample, got {0}")]
    InvalidChunkSize(usize),

    #[error("Invalid filter coefficients for {frequency}Hz at sample rate {sample_rate}Hz")]
    InvalidCoefficients { frequency: f64, sample_rate: f64 },

    #[error("Invalid channel count: {0} (must be 1-8)")]
    InvalidChannelCount(i32),

    #[error("Invalid {name} length: {value}")]
    InvalidLength { name: &'static str, value: i32 },

    #[error("Buffer size mismatch: expected {expected}, got {got}")]
    BufferSizeMismatch { expected: usize, got: usize },
}
