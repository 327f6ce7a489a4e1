//! Host Error Types

use thiserror::Error;

use howl_dsp::IntParam;

/// Errors that can occur in the host
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Instance '{0}' is already prepared")]
    AlreadyPrepared(String),

    #[error("Instance '{0}' has not been configured")]
    NotConfigured(String),

    #[error("Instance '{0}' has not been prepared")]
    NotPrepared(String),

    #[error("Structural parameter {} cannot change after prepare", .0.label())]
    StructuralParameterLocked(IntParam),

    #[error("Unknown channel: {0}")]
    UnknownChannel(usize),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to spawn host thread: {0}")]
    ThreadSpawnError(String),

    #[error("DSP error: {0}")]
    DspError(#[from] howl_dsp::DspError),

    #[error("Channel send error - receiver dropped")]
    ChannelSendError,

    #[error("Channel receive error - sender dropped")]
    ChannelRecvError,
}

/// Result type alias for host operations
pub type HostResult<T> = Result<T, HostError>;
