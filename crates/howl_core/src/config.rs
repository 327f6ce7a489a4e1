//! Host and Stream Configuration

use serde::{Deserialize, Serialize};

use howl_dsp::IoConfig;

/// Audio stream configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Samples per block, per channel
    pub chunk_size: usize,

    /// Number of processing channels (one engine instance each)
    pub channels: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            chunk_size: 8,
            channels: 2,
        }
    }
}

impl StreamConfig {
    /// Calculate block latency in milliseconds for this configuration
    pub fn latency_ms(&self) -> f32 {
        (self.chunk_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Engine-facing view of the stream
    pub fn io_config(&self) -> IoConfig {
        IoConfig::new(f64::from(self.sample_rate), self.chunk_size)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 192000 {
            return Err(format!("Invalid sample rate: {}", self.sample_rate));
        }
        if self.chunk_size == 0 || self.chunk_size > 4096 {
            return Err(format!("Invalid chunk size: {}", self.chunk_size));
        }
        if self.channels == 0 || self.channels > 8 {
            return Err(format!("Invalid channel count: {}", self.channels));
        }
        Ok(())
    }
}

/// Pacing of the coefficient streams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Minimum interval between console frames (ms)
    pub console_period_ms: u32,

    /// Minimum interval between remote frames (ms)
    pub remote_period_ms: u32,

    /// Capacity of the outgoing remote message queue
    pub remote_queue: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            console_period_ms: 500,
            remote_period_ms: 500,
            remote_queue: 256,
        }
    }
}

/// Start-up overrides for the tunable adaptation parameters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Tuning {
    pub mu: Option<f64>,
    pub rho: Option<f64>,
    pub eps: Option<f64>,
}

/// Overall host configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Stream configuration
    pub stream: StreamConfig,

    /// Apply parameter commands to every channel, not just the first
    pub link_channels: bool,

    /// Coefficient streaming
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Tunable overrides applied after prepare
    #[serde(default)]
    pub tuning: Option<Tuning>,

    /// Command poll interval of the host thread (ms)
    pub tick_interval_ms: u64,

    /// Ring capacity, in blocks, of each channel's transport
    pub ring_blocks: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            link_channels: true,
            telemetry: TelemetryConfig::default(),
            tuning: None,
            tick_interval_ms: 1,
            // 4 blocks worth of ring capacity
            ring_blocks: 4,
        }
    }
}

impl HostConfig {
    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 24000,
                chunk_size: 8, // ~0.33ms per block
                channels: 2,
            },
            ring_blocks: 8,
            ..Self::default()
        }
    }

    /// Create config optimized for stability
    pub fn stable() -> Self {
        Self {
            stream: StreamConfig {
                sample_rate: 24000,
                chunk_size: 64, // ~2.7ms per block
                channels: 2,
            },
            tick_interval_ms: 2,
            ring_blocks: 4,
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.stream.validate()?;
        if self.ring_blocks == 0 {
            return Err("Ring capacity must be at least one block".to_string());
        }
        if self.telemetry.remote_queue == 0 {
            return Err("Remote queue must hold at least one message".to_string());
        }
        Ok(())
    }
}
