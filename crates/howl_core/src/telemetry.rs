//! Telemetry Streamer
//!
//! Periodically prints the live feedback model: to the console, one stream
//! per channel, and to the remote link as individually framed lines. Each
//! stream has its own pacer so the two never starve each other.

use crate::context::InstanceContext;
use crate::error::{HostError, HostResult};
use crate::sink::{ConsoleSink, RemoteLink};

/// Scale applied to console frames
pub const CONSOLE_SCALE: f32 = 100.0;

/// Scale applied to remote frames
pub const REMOTE_SCALE: f32 = 1.0;

/// Decimal places of every streamed value
pub const STREAM_DECIMALS: usize = 3;

/// Prefix framing each remote line
pub const REMOTE_PREFIX: char = 'P';

/// Millisecond pacer that tolerates the clock wrapping around
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    period_ms: u32,
    last_emit_ms: u32,
}

impl Pacer {
    pub fn new(period_ms: u32) -> Self {
        Self::starting_at(period_ms, 0)
    }

    /// Pacer that last fired at `last_emit_ms`
    pub fn starting_at(period_ms: u32, last_emit_ms: u32) -> Self {
        Self {
            period_ms,
            last_emit_ms,
        }
    }

    /// True when at least one period has passed since the last emission.
    /// A clock that went backwards restarts the reference at zero.
    pub fn poll(&mut self, now_ms: u32) -> bool {
        if now_ms < self.last_emit_ms {
            self.last_emit_ms = 0;
        }
        if now_ms - self.last_emit_ms >= self.period_ms {
            self.last_emit_ms = now_ms;
            true
        } else {
            false
        }
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    pub fn last_emit_ms(&self) -> u32 {
        self.last_emit_ms
    }
}

#[derive(Debug, Clone, Copy)]
struct Stream {
    enabled: bool,
    pacer: Pacer,
}

impl Stream {
    fn new(period_ms: u32) -> Self {
        Self {
            enabled: false,
            pacer: Pacer::new(period_ms),
        }
    }

    /// Enabled and due
    fn due(&mut self, now_ms: u32) -> bool {
        self.enabled && self.pacer.poll(now_ms)
    }
}

/// Header, two scale references, then one scaled value per coefficient
pub fn console_frame(model: &[f32], scale: f32) -> Vec<String> {
    let mut lines = Vec::with_capacity(model.len() + 3);
    lines.push(format!("Model_{}:", (scale + 0.5) as i32));
    lines.push(format!("{:.*}", STREAM_DECIMALS, scale));
    lines.push(format!("{:.*}", STREAM_DECIMALS, -scale));
    lines.extend(
        model
            .iter()
            .map(|c| format!("{:.*}", STREAM_DECIMALS, scale * c)),
    );
    lines
}

/// Same values as a console frame, each framed as its own remote message
pub fn remote_frame(model: &[f32], scale: f32) -> Vec<String> {
    std::iter::once(scale)
        .chain(std::iter::once(-scale))
        .chain(model.iter().map(|c| scale * c))
        .map(|v| format!("{}{:.*}\n", REMOTE_PREFIX, STREAM_DECIMALS, v))
        .collect()
}

/// Paced coefficient streaming for every channel
#[derive(Debug, Clone)]
pub struct TelemetryStreamer {
    console: Vec<Stream>,
    remote: Stream,
    remote_channel: usize,
}

impl TelemetryStreamer {
    pub fn new(channels: usize, console_period_ms: u32, remote_period_ms: u32) -> Self {
        Self {
            console: vec![Stream::new(console_period_ms); channels],
            remote: Stream::new(remote_period_ms),
            remote_channel: 0,
        }
    }

    /// Start or stop console streaming of one channel's model
    pub fn set_console_streaming(&mut self, channel: usize, enabled: bool) -> HostResult<()> {
        let stream = self
            .console
            .get_mut(channel)
            .ok_or(HostError::UnknownChannel(channel))?;
        stream.enabled = enabled;
        Ok(())
    }

    pub fn is_console_streaming(&self, channel: usize) -> bool {
        self.console.get(channel).is_some_and(|s| s.enabled)
    }

    /// Start or stop remote streaming of the first channel's model
    pub fn set_remote_streaming(&mut self, enabled: bool) {
        self.remote.enabled = enabled;
    }

    pub fn is_remote_streaming(&self) -> bool {
        self.remote.enabled
    }

    /// Emit every stream that is due. Returns the number of frames emitted.
    pub fn tick(
        &mut self,
        now_ms: u32,
        contexts: &[InstanceContext],
        console: &mut dyn ConsoleSink,
        link: &mut dyn RemoteLink,
    ) -> usize {
        let mut frames = 0;

        for (stream, ctx) in self.console.iter_mut().zip(contexts) {
            if !stream.due(now_ms) {
                continue;
            }
            let model = ctx.feedback_model();
            if model.is_empty() {
                continue;
            }
            for line in console_frame(model, CONSOLE_SCALE) {
                console.write_line(&line);
            }
            frames += 1;
        }

        if self.remote.due(now_ms) {
            if let Some(ctx) = contexts.get(self.remote_channel) {
                let model = ctx.feedback_model();
                if !model.is_empty() {
                    // Fire and continue: a congested link loses lines, not time
                    for message in remote_frame(model, REMOTE_SCALE) {
                        link.send_message(&message);
                    }
                    frames += 1;
                }
            }
        }

        frames
    }
}
