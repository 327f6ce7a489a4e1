//! Parameter Index Space
//!
//! The engine keeps its tunable and structural scalars in two tables: one of
//! integers and one of floats. Both are addressed by closed enums so a float
//! slot can never be read out of the integer table (and vice versa).

use serde::{Deserialize, Serialize};

/// Integer parameter slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntParam {
    /// Adaptive-filter length (number of feedback-model coefficients)
    AdaptiveFilterLength,
    /// Whiten-filter length
    WhitenFilterLength,
    /// Band-limit-filter length
    BandLimitFilterLength,
    /// Simulated-feedback length
    FeedbackLength,
    /// Output/input hardware delay in samples
    HardwareDelay,
    /// Band-limit update period, in chunks
    BandLimitUpdatePeriod,
    /// Reinitialize flag. Zero means "restart adaptation on the next chunk";
    /// the engine sets it back to one once it has done so.
    Reinit,
}

impl IntParam {
    pub const ALL: [IntParam; 7] = [
        IntParam::AdaptiveFilterLength,
        IntParam::WhitenFilterLength,
        IntParam::BandLimitFilterLength,
        IntParam::FeedbackLength,
        IntParam::HardwareDelay,
        IntParam::BandLimitUpdatePeriod,
        IntParam::Reinit,
    ];

    /// Number of integer slots
    pub const COUNT: usize = Self::ALL.len();

    /// Position of this slot in the integer table
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short name used in operator reports
    pub const fn label(self) -> &'static str {
        match self {
            IntParam::AdaptiveFilterLength => "afl",
            IntParam::WhitenFilterLength => "wfl",
            IntParam::BandLimitFilterLength => "pfl",
            IntParam::FeedbackLength => "fbl",
            IntParam::HardwareDelay => "hdel",
            IntParam::BandLimitUpdatePeriod => "pup",
            IntParam::Reinit => "in1",
        }
    }

    /// Structural slots size buffers at prepare time and must not change afterwards
    pub const fn is_structural(self) -> bool {
        matches!(
            self,
            IntParam::AdaptiveFilterLength
                | IntParam::WhitenFilterLength
                | IntParam::BandLimitFilterLength
                | IntParam::FeedbackLength
                | IntParam::HardwareDelay
        )
    }
}

/// Float parameter slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FloatParam {
    /// Step size (mu)
    StepSize,
    /// Forgetting factor (rho)
    ForgettingFactor,
    /// Power threshold (eps)
    PowerThreshold,
    /// Band-limit update rate (alf)
    BandLimitRate,
    /// Simulated-feedback gain (fbg)
    SimulatedFeedbackGain,
    /// Feedback-model magnitude (fbm), written by the engine
    FeedbackMagnitude,
}

impl FloatParam {
    pub const ALL: [FloatParam; 6] = [
        FloatParam::StepSize,
        FloatParam::ForgettingFactor,
        FloatParam::PowerThreshold,
        FloatParam::BandLimitRate,
        FloatParam::SimulatedFeedbackGain,
        FloatParam::FeedbackMagnitude,
    ];

    /// Number of float slots
    pub const COUNT: usize = Self::ALL.len();

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn label(self) -> &'static str {
        match self {
            FloatParam::StepSize => "mu",
            FloatParam::ForgettingFactor => "rho",
            FloatParam::PowerThreshold => "eps",
            FloatParam::BandLimitRate => "alf",
            FloatParam::SimulatedFeedbackGain => "fbg",
            FloatParam::FeedbackMagnitude => "fbm",
        }
    }
}

/// The two scalar tables
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParamTables {
    ints: [i32; IntParam::COUNT],
    floats: [f64; FloatParam::COUNT],
}

impl ParamTables {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn int(&self, param: IntParam) -> i32 {
        self.ints[param.index()]
    }

    #[inline]
    pub fn set_int(&mut self, param: IntParam, value: i32) -> i32 {
        self.ints[param.index()] = value;
        value
    }

    #[inline]
    pub fn float(&self, param: FloatParam) -> f64 {
        self.floats[param.index()]
    }

    #[inline]
    pub fn set_float(&mut self, param: FloatParam, value: f64) -> f64 {
        self.floats[param.index()] = value;
        value
    }

    /// True when the engine has been asked to restart its adaptive recursion
    pub fn reinit_pending(&self) -> bool {
        self.int(IntParam::Reinit) == 0
    }
}
