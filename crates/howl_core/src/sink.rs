//! Console and Remote-Link Sinks
//!
//! The console is the operator's text channel (help, confirmations, printed
//! models). The remote link carries framed messages to a connected app. Both
//! are fire-and-forget from the host's point of view.

use std::io::Write;
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::debug;

/// Line-oriented operator console
pub trait ConsoleSink: Send {
    fn write_line(&mut self, line: &str);
}

/// Console on the process's standard output
#[derive(Debug, Default)]
pub struct StdoutConsole;

impl ConsoleSink for StdoutConsole {
    fn write_line(&mut self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}", line);
    }
}

/// Console that keeps every line in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CapturedConsole {
    lines: Arc<Mutex<Vec<String>>>,
}

impl CapturedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every line written so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Remove and return every line written so far
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(needle))
    }
}

impl ConsoleSink for CapturedConsole {
    fn write_line(&mut self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

/// Framed-message link to a remote app
pub trait RemoteLink: Send {
    /// Queue one message. Returns false if it was dropped; never blocks.
    fn send_message(&mut self, message: &str) -> bool;
}

/// Remote link that goes nowhere
#[derive(Debug, Default)]
pub struct NullLink;

impl RemoteLink for NullLink {
    fn send_message(&mut self, _message: &str) -> bool {
        false
    }
}

/// Remote link over a bounded crossbeam channel
#[derive(Debug)]
pub struct ChannelLink {
    sender: Sender<String>,
    dropped: u64,
}

impl ChannelLink {
    /// Link plus the receiving end, holding at most `capacity` messages
    pub fn bounded(capacity: usize) -> (Self, Receiver<String>) {
        let (sender, receiver) = bounded(capacity);
        (Self { sender, dropped: 0 }, receiver)
    }

    /// Messages dropped because the queue was full or the receiver gone
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl RemoteLink for ChannelLink {
    fn send_message(&mut self, message: &str) -> bool {
        match self.sender.try_send(message.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped.is_power_of_two() {
                    debug!("Remote link congested, {} messages dropped", self.dropped);
                }
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                false
            }
        }
    }
}
