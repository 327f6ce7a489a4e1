//! Prescription Structures and Engine Working State
//!
//! The engine keeps one copy of these structures for the whole process. Every
//! instance that shares the engine holds its own snapshot and copies it in and
//! out around each engine call, so the structures are plain `Copy` values with
//! no heap data inside.

use serde::{Deserialize, Serialize};

/// Maximum number of filterbank channels (bands)
pub const MAX_BANDS: usize = 8;

/// Hardware delay of the reference platform, in samples, not counting buffering
pub const CODEC_DELAY_SAMPLES: i32 = 38;

/// Multiband compression prescription
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    /// Attack time (ms)
    pub attack: f64,
    /// Release time (ms)
    pub release: f64,
    /// dB SPL of a full-scale input (calibration)
    pub maxdb: f64,
    /// 0 = left, 1 = right
    pub ear: i32,
    /// Number of bands in use
    pub nchannel: i32,
    /// Band-edge frequencies (Hz), `nchannel - 1` of them are used
    pub cross_freq: [f64; MAX_BANDS],
    /// Compression-start gain per band (dB)
    pub tkgain: [f64; MAX_BANDS],
    /// Compression ratio per band
    pub cr: [f64; MAX_BANDS],
    /// Compression-start kneepoint per band (dB SPL)
    pub tk: [f64; MAX_BANDS],
    /// Broadband output limiting threshold per band (dB SPL)
    pub bolt: [f64; MAX_BANDS],
}

impl Default for Prescription {
    fn default() -> Self {
        Self {
            attack: 5.0,
            release: 50.0,
            maxdb: 119.0,
            ear: 0,
            nchannel: 8,
            cross_freq: [
                317.1666, 502.9734, 797.6319, 1264.9, 2005.9, 3181.1, 5044.7, 0.0,
            ],
            tkgain: [
                -13.5942, -16.5909, -3.7978, 6.6176, 11.3050, 23.7183, 25.0, 25.0,
            ],
            cr: [0.7, 0.9, 1.0, 1.1, 1.2, 1.4, 1.6, 1.7],
            tk: [32.2, 26.5, 26.7, 26.7, 29.8, 33.6, 34.3, 32.7],
            bolt: [78.7667, 88.2, 90.7, 92.8333, 98.2, 103.3, 101.9, 99.8],
        }
    }
}

/// Broadband limiter settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limiter {
    /// Attack time (ms)
    pub attack: f64,
    /// Release time (ms)
    pub release: f64,
    /// Sampling rate (Hz)
    pub fs: f64,
    /// dB SPL of a full-scale input
    pub maxdb: f64,
    /// Compression-start gain (dB)
    pub tkgain: f64,
    /// Compression-start kneepoint (dB SPL)
    pub tk: f64,
    /// Compression ratio
    pub cr: f64,
    /// Output limiting threshold (dB SPL)
    pub bolt: f64,
    /// Target filterbank delay (ms)
    pub td: f64,
    /// Filter order
    pub nz: i32,
}

impl Default for Limiter {
    fn default() -> Self {
        // Pure limiter: no gain below a kneepoint high enough to be irrelevant
        Self {
            attack: 1.0,
            release: 50.0,
            fs: 24000.0,
            maxdb: 119.0,
            tkgain: 0.0,
            tk: 105.0,
            cr: 10.0,
            bolt: 105.0,
            td: 0.0,
            nz: 0,
        }
    }
}

/// Adaptive feedback cancellation settings and bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSettings {
    /// Simulated-feedback gain
    pub fbg: f64,
    /// Forgetting factor
    pub rho: f64,
    /// Power threshold
    pub eps: f64,
    /// Step size
    pub mu: f64,
    /// Band-limit update rate
    pub alf: f64,
    /// Adaptive-filter length
    pub afl: i32,
    /// Whiten-filter length
    pub wfl: i32,
    /// Band-limit-filter length
    pub pfl: i32,
    /// Simulated-feedback length
    pub fbl: i32,
    /// Output/input hardware delay (samples)
    pub hdel: i32,
    /// Band-limit update period (chunks)
    pub pup: i32,
    /// Quality-metric buffer size
    pub nqm: i32,
    /// Quality-metric write index
    pub iqm: i32,
    /// Save quality metric?
    pub sqm: i32,
}

impl FeedbackSettings {
    /// Tuned settings for a given chunk size. The hardware delay grows with the
    /// chunk size because the codec path double-buffers one chunk each way.
    pub fn for_chunk(chunk_size: usize) -> Self {
        Self {
            fbg: 0.0,
            rho: 0.0072189585,
            eps: 0.000919300,
            mu: 0.004607254,
            alf: 0.000010658,
            afl: 42,
            wfl: 9,
            pfl: 20,
            fbl: 0,
            hdel: Self::hardware_delay(chunk_size),
            pup: 8,
            nqm: 0,
            iqm: 0,
            sqm: 0,
        }
    }

    /// Output-to-input delay of the codec path for a given chunk size
    pub fn hardware_delay(chunk_size: usize) -> i32 {
        CODEC_DELAY_SAMPLES + 2 * chunk_size as i32
    }
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self::for_chunk(8)
    }
}

/// Everything the engine keeps in its engine-wide storage
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineWorkingState {
    pub prescription: Prescription,
    pub limiter: Limiter,
    pub feedback: FeedbackSettings,
    /// Number of successful prepare calls. Processing is a no-op while zero.
    pub prepared: u32,
}

impl EngineWorkingState {
    pub fn is_prepared(&self) -> bool {
        self.prepared > 0
    }
}

/// A complete fitting: the structures an instance starts from
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Fitting {
    pub prescription: Prescription,
    pub limiter: Limiter,
    pub feedback: FeedbackSettings,
}

impl Fitting {
    /// Default fitting adjusted for a chunk size
    pub fn for_chunk(chunk_size: usize) -> Self {
        Self {
            feedback: FeedbackSettings::for_chunk(chunk_size),
            ..Self::default()
        }
    }

    /// Same fitting, tagged for the given ear (0 = left, 1 = right)
    pub fn for_ear(mut self, ear: i32) -> Self {
        self.prescription.ear = ear;
        self
    }

    /// Fresh, unprepared working state built from this fitting
    pub fn working_state(&self) -> EngineWorkingState {
        EngineWorkingState {
            prescription: self.prescription,
            limiter: self.limiter,
            feedback: self.feedback,
            prepared: 0,
        }
    }
}
