//! Instance Context
//!
//! One processing channel's private copy of everything the engine keeps in
//! its engine-wide storage, plus the channel's own memory (parameter tables
//! and buffers). Contexts live as long as the host that owns them.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Tuning;
use crate::error::{HostError, HostResult};
use crate::params::{ParamRange, ParameterStore};
use crate::switcher::ContextSwitcher;
use howl_dsp::{
    ChannelMemory, ChunkEngine, EngineWorkingState, Fitting, FloatParam, IntParam, IoConfig,
    ParamTables,
};

/// Where an instance is in its set-up sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Built from a fitting, engine not consulted yet
    Unconfigured,
    /// Engine `configure` has run; structural overrides still allowed
    Configuring,
    /// Buffers allocated, structural parameters frozen
    Prepared,
    /// Tunable overrides applied, processing
    Ready,
}

/// Per-channel snapshot of the engine state
#[derive(Debug, Clone)]
pub struct InstanceContext {
    name: String,
    pub(crate) local: EngineWorkingState,
    pub(crate) memory: ChannelMemory,
    pub(crate) io: IoConfig,
    lifecycle: Lifecycle,
    enabled: bool,
}

impl InstanceContext {
    /// New, unconfigured instance starting from `fitting`
    pub fn new(name: impl Into<String>, fitting: Fitting) -> Self {
        Self {
            name: name.into(),
            local: fitting.working_state(),
            memory: ChannelMemory::new(),
            io: IoConfig::default(),
            lifecycle: Lifecycle::Unconfigured,
            enabled: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_prepared(&self) -> bool {
        self.lifecycle >= Lifecycle::Prepared
    }

    pub fn io(&self) -> &IoConfig {
        &self.io
    }

    /// The snapshot as of the last swap-out
    pub fn local_state(&self) -> &EngineWorkingState {
        &self.local
    }

    pub fn memory(&self) -> &ChannelMemory {
        &self.memory
    }

    /// Run the engine's `configure` on this instance's state
    pub fn configure<E: ChunkEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        io: IoConfig,
    ) -> HostResult<()> {
        if self.is_prepared() {
            return Err(HostError::AlreadyPrepared(self.name.clone()));
        }

        let mut io = io;
        {
            let mut lease = ContextSwitcher::lease(engine, self);
            lease.configure(&mut io);
        }
        self.io = io;
        self.lifecycle = Lifecycle::Configuring;
        debug!("{}: configured at {} Hz, chunk {}", self.name, io.rate, io.chunk_size);
        Ok(())
    }

    /// Override a structural parameter before prepare
    pub fn set_structural(&mut self, param: IntParam, value: i32) -> HostResult<()> {
        if self.is_prepared() {
            return Err(HostError::StructuralParameterLocked(param));
        }
        let afc = &mut self.local.feedback;
        let field = match param {
            IntParam::AdaptiveFilterLength => &mut afc.afl,
            IntParam::WhitenFilterLength => &mut afc.wfl,
            IntParam::BandLimitFilterLength => &mut afc.pfl,
            IntParam::FeedbackLength => &mut afc.fbl,
            IntParam::HardwareDelay => &mut afc.hdel,
            other => {
                return Err(HostError::ConfigError(format!(
                    "{} is not a structural parameter",
                    other.label()
                )))
            }
        };
        *field = value;
        Ok(())
    }

    /// One-time engine prepare. A second call is an error.
    pub fn prepare<E: ChunkEngine + ?Sized>(&mut self, engine: &mut E) -> HostResult<()> {
        match self.lifecycle {
            Lifecycle::Unconfigured => return Err(HostError::NotConfigured(self.name.clone())),
            Lifecycle::Prepared | Lifecycle::Ready => {
                return Err(HostError::AlreadyPrepared(self.name.clone()))
            }
            Lifecycle::Configuring => {}
        }

        {
            let mut lease = ContextSwitcher::lease(engine, self);
            lease.prepare()?;
        }
        self.lifecycle = Lifecycle::Prepared;
        info!(
            "{}: prepared ({} feedback coefficients)",
            self.name,
            self.memory.feedback_model_len()
        );
        Ok(())
    }

    /// Apply tunable overrides and restart adaptation
    pub fn finish(&mut self, tuning: Option<&Tuning>) -> HostResult<()> {
        if !self.is_prepared() {
            return Err(HostError::NotPrepared(self.name.clone()));
        }

        let mut params = self.params_mut();
        if let Some(tuning) = tuning {
            let overrides = [
                (FloatParam::StepSize, tuning.mu),
                (FloatParam::ForgettingFactor, tuning.rho),
                (FloatParam::PowerThreshold, tuning.eps),
            ];
            for (param, value) in overrides {
                if let Some(value) = value {
                    params.set_float_within(param, value, ParamRange::UNIT);
                }
            }
        }
        params.request_reinit();

        self.lifecycle = Lifecycle::Ready;
        Ok(())
    }

    /// configure, prepare and finish in one go
    pub fn setup<E: ChunkEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        io: IoConfig,
        tuning: Option<&Tuning>,
    ) -> HostResult<()> {
        self.configure(engine, io)?;
        self.prepare(engine)?;
        self.finish(tuning)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn params(&self) -> &ParamTables {
        self.memory.params()
    }

    pub fn params_mut(&mut self) -> ParameterStore<'_> {
        let prepared = self.is_prepared();
        ParameterStore::new(self.memory.params_mut(), prepared)
    }

    /// Live feedback-model coefficients
    pub fn feedback_model(&self) -> &[f32] {
        self.memory.feedback_model()
    }

    /// Zero every coefficient of the feedback model. Returns how many were zeroed.
    pub fn reset_feedback_model(&mut self) -> usize {
        let model = self.memory.feedback_model_mut();
        model.fill(0.0);
        model.len()
    }
}
