//! Howl Core - Multi-Instance Host
//!
//! This crate hosts several independent instances of one adaptive audio
//! engine that keeps its working state in engine-wide storage:
//! - Per-instance contexts and a swap guard around every engine call
//! - Block-oriented processing over lock-free ring transports
//! - A single-byte command protocol for live tuning
//! - Paced streaming of the feedback model to a console and a remote app
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Control Thread                         │
//! │   stdin / app ──bytes──▶ Host ◀──events── (Started, ...)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ crossbeam-channel
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Audio Thread (one Rack)                     │
//! │   feed ──rtrb──▶ swap-in ▶ engine ▶ swap-out ──rtrb──▶ drain│
//! │                      ▲                                      │
//! │        left ctx / right ctx (one lease at a time)           │
//! │   commands ▶ ParameterStore     telemetry ▶ console / link  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod command;
mod config;
mod context;
mod error;
mod gain;
mod host;
mod layout;
mod message;
mod params;
mod processor;
mod rack;
mod settings;
mod sink;
mod switcher;
mod telemetry;

pub use command::{
    find_command, model_report, settings_report, CommandAction, CommandHandler, CommandProcessor,
    CommandEntry, ControlSurface, Transform, COMMANDS,
};
pub use config::{HostConfig, StreamConfig, TelemetryConfig, Tuning};
pub use context::{InstanceContext, Lifecycle};
pub use error::{HostError, HostResult};
pub use gain::{GainCommands, MasterGain};
pub use host::Host;
pub use layout::{button_text, Button, Card, Page, RemoteLayout, LAYOUT_PREFIX};
pub use message::{Command, Event};
pub use params::{ParamRange, ParamSlot, ParameterStore};
pub use processor::{
    AudioBlock, BlockProcessor, BlockTransport, ProcessorStats, RingEnds, RingTransport,
    TickOutcome, TransportStats,
};
pub use rack::{channel_name, Rack};
pub use settings::HostSettings;
pub use sink::{CapturedConsole, ChannelLink, ConsoleSink, NullLink, RemoteLink, StdoutConsole};
pub use switcher::{ContextSwitcher, EngineLease};
pub use telemetry::{console_frame, remote_frame, Pacer, TelemetryStreamer};

// Re-export engine types for convenience
pub use howl_dsp::{
    AdaptiveEngine, ChannelMemory, ChunkEngine, DspError, EngineWorkingState, FeedbackSettings,
    Fitting, FloatParam, IntParam, IoConfig, ParamTables,
};
