//! Per-Instance Engine Memory
//!
//! `ChannelMemory` is the handle an instance passes to `prepare` and
//! `process_chunk`. It carries the two parameter tables and every buffer the
//! engine allocates at prepare time. Buffers are allocated exactly once and
//! never resized, so the audio path never allocates.

use biquad::DirectForm2Transposed;

use crate::params::{IntParam, ParamTables};

/// Working memory for one processing channel
#[derive(Debug, Clone, Default)]
pub struct ChannelMemory {
    pub(crate) params: ParamTables,

    /// Estimated-feedback coefficients (the feedback model)
    pub(crate) efb: Vec<f32>,
    /// Simulated-feedback path
    pub(crate) sfb: Vec<f32>,
    /// Whitening filter
    pub(crate) wfr: Vec<f32>,
    /// Persistent (band-limited) feedback filter
    pub(crate) ffr: Vec<f32>,
    /// Quality-metric log
    pub(crate) qm: Vec<f32>,

    /// Output history ring and its write cursor
    pub(crate) history: Vec<f32>,
    pub(crate) history_pos: usize,
    /// Whitened output history, same layout as `history`
    pub(crate) whitened: Vec<f32>,
    /// Recent error samples for whitening, newest first
    pub(crate) error_taps: Vec<f32>,
    /// Smoothed reference power
    pub(crate) power: f64,
    /// Chunks since the last band-limit update
    pub(crate) update_phase: i32,

    /// Filterbank: `stages` biquads per band, band-major
    pub(crate) filters: Vec<DirectForm2Transposed<f32>>,
    pub(crate) stages: usize,
    pub(crate) bands: usize,
    /// Per-band scratch signal, band-major, `bands * chunk_size` long
    pub(crate) band_buf: Vec<f32>,
    /// Per-band envelope followers
    pub(crate) band_env: Vec<f32>,
    /// Broadband limiter envelope
    pub(crate) limiter_env: f32,
    /// Envelope smoothing coefficients (attack, release)
    pub(crate) band_ballistics: (f32, f32),
    pub(crate) limiter_ballistics: (f32, f32),

    pub(crate) chunk_size: usize,
    pub(crate) allocated: bool,
}

impl ChannelMemory {
    /// Empty, unallocated memory. The engine fills it in `prepare`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `prepare` has allocated this memory
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Chunk size the buffers were sized for
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn params(&self) -> &ParamTables {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParamTables {
        &mut self.params
    }

    /// Number of live feedback-model coefficients: the adaptive-filter length
    /// slot, bounded by what was allocated
    pub fn feedback_model_len(&self) -> usize {
        let afl = self.params.int(IntParam::AdaptiveFilterLength).max(0) as usize;
        afl.min(self.efb.len())
    }

    /// Read-only view of the feedback model
    pub fn feedback_model(&self) -> &[f32] {
        &self.efb[..self.feedback_model_len()]
    }

    /// Mutable view of the feedback model
    pub fn feedback_model_mut(&mut self) -> &mut [f32] {
        let len = self.feedback_model_len();
        &mut self.efb[..len]
    }

    /// Quality-metric log (empty unless the fitting asked for it)
    pub fn quality_metric(&self) -> &[f32] {
        &self.qm
    }

    /// Output sample `delay` steps before the most recent one
    #[inline]
    pub(crate) fn history_at(&self, delay: usize) -> f32 {
        let len = self.history.len();
        self.history[(self.history_pos + len - 1 - delay % len) % len]
    }

    #[inline]
    pub(crate) fn whitened_at(&self, delay: usize) -> f32 {
        let len = self.whitened.len();
        self.whitened[(self.history_pos + len - 1 - delay % len) % len]
    }
}
