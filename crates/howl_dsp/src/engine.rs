//! Chunk Engine Trait and Reference Engine
//!
//! A chunk engine keeps its prescription structures in one engine-wide
//! `EngineWorkingState` and everything else in the per-instance
//! `ChannelMemory` it is handed on each call. Hosts that run several
//! instances on one engine must copy each instance's state in before a call
//! and back out after it.

use tracing::debug;

use crate::compressor;
use crate::error::DspError;
use crate::feedback;
use crate::filterbank;
use crate::fitting::EngineWorkingState;
use crate::memory::ChannelMemory;

/// Stream description an engine is configured and prepared against
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IoConfig {
    /// Sampling rate (Hz)
    pub rate: f64,
    /// Samples per chunk
    pub chunk_size: usize,
    /// Samples per recorded stimulus (0 when nothing is recorded)
    pub nsmp: usize,
    /// Stimulus repetitions
    pub nrep: usize,
}

impl IoConfig {
    pub fn new(rate: f64, chunk_size: usize) -> Self {
        Self {
            rate,
            chunk_size,
            nsmp: 0,
            nrep: 1,
        }
    }

    /// Check the stream description before buffers are sized from it
    pub fn validate(&self) -> Result<(), DspError> {
        if self.rate <= 0.0 || !self.rate.is_finite() {
            return Err(DspError::InvalidSampleRate(self.rate));
        }
        if self.chunk_size == 0 {
            return Err(DspError::InvalidChunkSize(self.chunk_size));
        }
        Ok(())
    }

    /// Check that a block splits into whole chunks
    pub fn check_block(&self, len: usize) -> Result<(), DspError> {
        if len == 0 || self.chunk_size == 0 || len % self.chunk_size != 0 {
            return Err(DspError::BufferSizeMismatch {
                expected: self.chunk_size,
                got: len,
            });
        }
        Ok(())
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self::new(24000.0, 8)
    }
}

/// Trait for engines that process fixed-size chunks in place
///
/// # Real-time Safety Contract
///
/// `process_chunk` must not allocate, lock or block. All buffers it touches
/// are allocated by `prepare` and owned by the `ChannelMemory` passed in.
pub trait ChunkEngine: Send {
    /// Human-readable name for logs
    fn name(&self) -> &'static str;

    /// Adjust the working state (and possibly `io`) for a stream.
    /// Operates on whatever state is currently swapped in.
    fn configure(&mut self, io: &mut IoConfig);

    /// One-time allocation and initialization of `memory`. Increments the
    /// prepared counter on success.
    fn prepare(&mut self, io: &IoConfig, memory: &mut ChannelMemory) -> Result<(), DspError>;

    /// Process `x` in place. Must be a no-op until the engine is prepared.
    fn process_chunk(&mut self, memory: &mut ChannelMemory, x: &mut [f32]);

    /// Engine-wide working state
    fn state(&self) -> &EngineWorkingState;

    fn state_mut(&mut self) -> &mut EngineWorkingState;
}

/// Filter order used for the reference filterbank
const FILTERBANK_ORDER: i32 = 4;

/// Target filterbank delay (ms)
const FILTERBANK_DELAY_MS: f64 = 2.5;

/// Reference engine: biquad filterbank, per-band compression, broadband
/// limiter and an NLMS feedback canceller
#[derive(Debug, Clone, Default)]
pub struct AdaptiveEngine {
    state: EngineWorkingState,
}

impl AdaptiveEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate_lengths(&self) -> Result<(), DspError> {
        let afc = &self.state.feedback;
        for (name, value) in [
            ("afl", afc.afl),
            ("wfl", afc.wfl),
            ("pfl", afc.pfl),
            ("fbl", afc.fbl),
            ("hdel", afc.hdel),
            ("nqm", afc.nqm),
        ] {
            if value < 0 {
                return Err(DspError::InvalidLength { name, value });
            }
        }
        Ok(())
    }
}

impl ChunkEngine for AdaptiveEngine {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn configure(&mut self, io: &mut IoConfig) {
        let limiter = &mut self.state.limiter;
        limiter.nz = FILTERBANK_ORDER;
        limiter.td = FILTERBANK_DELAY_MS;
        limiter.fs = io.rate;
        // Quality metric is sized at prepare time, from the stimulus length
        self.state.feedback.nqm = 0;
        if io.nrep == 0 {
            io.nrep = 1;
        }
    }

    fn prepare(&mut self, io: &IoConfig, memory: &mut ChannelMemory) -> Result<(), DspError> {
        io.validate()?;
        self.validate_lengths()?;
        let cs = io.chunk_size;

        filterbank::design(
            memory,
            &self.state.prescription,
            io.rate,
            self.state.limiter.nz,
            cs,
        )?;

        let prescription = &self.state.prescription;
        memory.band_ballistics = (
            compressor::ballistic(prescription.attack, io.rate),
            compressor::ballistic(prescription.release, io.rate),
        );
        let limiter = &self.state.limiter;
        memory.limiter_ballistics = (
            compressor::ballistic(limiter.attack, io.rate),
            compressor::ballistic(limiter.release, io.rate),
        );
        memory.limiter_env = 0.0;

        let afc = &mut self.state.feedback;
        if afc.sqm != 0 {
            afc.nqm = (io.nsmp * io.nrep) as i32;
            afc.iqm = 0;
        }
        feedback::prepare(memory, afc, cs);
        let (afl, hdel) = (afc.afl, afc.hdel);

        memory.chunk_size = cs;
        memory.allocated = true;
        self.state.prepared += 1;

        debug!(
            "{} engine prepared: {} bands, afl={}, hdel={}, chunk={}",
            self.name(),
            memory.bands,
            afl,
            hdel,
            cs
        );
        Ok(())
    }

    fn process_chunk(&mut self, memory: &mut ChannelMemory, x: &mut [f32]) {
        if !self.state.is_prepared() || !memory.allocated {
            return;
        }

        let cs = memory.chunk_size;
        for chunk in x.chunks_mut(cs) {
            feedback::cancel(memory, chunk);
            filterbank::analyze(memory, chunk);
            compressor::compress_bands(memory, &self.state.prescription, chunk.len());
            filterbank::synthesize(memory, chunk);
            compressor::limit(memory, &self.state.limiter, chunk);
            feedback::record(memory, &mut self.state.feedback, chunk);
        }
    }

    fn state(&self) -> &EngineWorkingState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EngineWorkingState {
        &mut self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::Fitting;
    use crate::params::{FloatParam, IntParam};

    fn prepared_engine() -> (AdaptiveEngine, ChannelMemory) {
        let mut engine = AdaptiveEngine::new();
        *engine.state_mut() = Fitting::for_chunk(8).working_state();
        let mut io = IoConfig::default();
        engine.configure(&mut io);
        let mut memory = ChannelMemory::new();
        engine.prepare(&io, &mut memory).unwrap();
        (engine, memory)
    }

    #[test]
    fn test_io_config_validation() {
        assert!(IoConfig::default().validate().is_ok());
        assert!(IoConfig::new(0.0, 8).validate().is_err());
        assert!(IoConfig::new(24000.0, 0).validate().is_err());
        assert!(IoConfig::new(f64::NAN, 8).validate().is_err());
    }

    #[test]
    fn test_check_block_wants_whole_chunks() {
        let io = IoConfig::new(24000.0, 8);
        assert!(io.check_block(8).is_ok());
        assert!(io.check_block(32).is_ok());
        assert!(matches!(
            io.check_block(12),
            Err(DspError::BufferSizeMismatch { expected: 8, got: 12 })
        ));
        assert!(io.check_block(0).is_err());
    }

    #[test]
    fn test_configure_sets_limiter() {
        let mut engine = AdaptiveEngine::new();
        let mut io = IoConfig::new(16000.0, 16);
        engine.configure(&mut io);
        assert_eq!(engine.state().limiter.fs, 16000.0);
        assert_eq!(engine.state().limiter.nz, FILTERBANK_ORDER);
    }

    #[test]
    fn test_prepare_increments_counter() {
        let (engine, memory) = prepared_engine();
        assert_eq!(engine.state().prepared, 1);
        assert!(memory.is_allocated());
        assert_eq!(memory.chunk_size(), 8);
        assert_eq!(memory.params().int(IntParam::AdaptiveFilterLength), 42);
    }

    #[test]
    fn test_process_before_prepare_is_noop() {
        let mut engine = AdaptiveEngine::new();
        let mut memory = ChannelMemory::new();
        let mut x = [0.5_f32; 8];
        engine.process_chunk(&mut memory, &mut x);
        assert_eq!(x, [0.5; 8]);
    }

    #[test]
    fn test_prepare_rejects_negative_length() {
        let mut engine = AdaptiveEngine::new();
        let mut fitting = Fitting::default();
        fitting.feedback.afl = -1;
        *engine.state_mut() = fitting.working_state();
        let mut memory = ChannelMemory::new();
        let result = engine.prepare(&IoConfig::default(), &mut memory);
        assert!(matches!(result, Err(DspError::InvalidLength { name: "afl", .. })));
        assert!(!engine.state().is_prepared());
    }

    #[test]
    fn test_quality_metric_sized_from_stimulus() {
        let mut engine = AdaptiveEngine::new();
        let mut fitting = Fitting::default();
        fitting.feedback.sqm = 1;
        *engine.state_mut() = fitting.working_state();
        let mut io = IoConfig {
            nsmp: 100,
            nrep: 2,
            ..IoConfig::default()
        };
        engine.configure(&mut io);
        let mut memory = ChannelMemory::new();
        engine.prepare(&io, &mut memory).unwrap();
        assert_eq!(engine.state().feedback.nqm, 200);
        assert_eq!(memory.quality_metric().len(), 200);
    }

    #[test]
    fn test_process_keeps_length_and_finite() {
        let (mut engine, mut memory) = prepared_engine();
        for block in 0..500 {
            let mut x: Vec<f32> = (0..8)
                .map(|n| 0.2 * ((block * 8 + n) as f32 * 0.11).sin())
                .collect();
            engine.process_chunk(&mut memory, &mut x);
            assert_eq!(x.len(), 8);
            assert!(x.iter().all(|s| s.is_finite()));
        }
        assert_eq!(memory.params().int(IntParam::Reinit), 1);
        assert!(memory.params().float(FloatParam::FeedbackMagnitude).is_finite());
    }
}
