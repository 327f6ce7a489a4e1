//! Message Types for Thread Communication
//!
//! Commands flow from the control side -> audio thread
//! Events flow from the audio thread -> control side

use serde::{Deserialize, Serialize};

/// Commands sent to the audio thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// One byte of the operator/remote command stream
    Input(u8),

    /// Enable or disable processing for one channel
    SetEnabled { channel: usize, enabled: bool },

    /// Request a stats snapshot (triggers a Stats event)
    RequestStats,

    /// Shutdown the host
    Shutdown,
}

/// Events sent from the audio thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// Every channel prepared, processing started
    Started,

    /// Audio thread exited
    Stopped,

    /// A command byte matched neither the table nor any collaborator
    Unhandled { token: u8 },

    /// Processing counters, summed over every channel
    Stats {
        ticks: u64,
        processed: u64,
        idle: u64,
    },

    /// Error occurred
    Error { message: String },
}

impl Event {
    /// Create an error event from any error type
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }
}
