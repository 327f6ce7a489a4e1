//! Howl DSP - Chunk Engine Contract and Reference Engine
//!
//! This crate provides the engine side of the howl host:
//! - `ChunkEngine`, the configure / prepare / process contract
//! - `EngineWorkingState`, the engine-wide prescription structures
//! - `ChannelMemory`, the per-instance parameter tables and buffers
//! - `AdaptiveEngine`, a reference engine with a biquad filterbank,
//!   per-band compression, a broadband limiter and feedback cancellation
//!
//! # Architecture
//!
//! Engines keep exactly one `EngineWorkingState`. Everything that must not
//! be shared between instances lives in the `ChannelMemory` handed to each
//! call. Processing follows the "no allocation in audio callback" rule:
//! buffers are sized once in `prepare`.

mod compressor;
mod engine;
mod error;
mod feedback;
mod filterbank;
mod fitting;
mod memory;
mod params;

pub use engine::{AdaptiveEngine, ChunkEngine, IoConfig};
pub use error::DspError;
pub use fitting::{
    EngineWorkingState, FeedbackSettings, Fitting, Limiter, Prescription, CODEC_DELAY_SAMPLES,
    MAX_BANDS,
};
pub use memory::ChannelMemory;
pub use params::{FloatParam, IntParam, ParamTables};
