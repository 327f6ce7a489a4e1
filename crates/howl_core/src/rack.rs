//! Rack
//!
//! Everything one cooperative loop needs: the engine, one instance context
//! and block processor per channel, the command processor and the telemetry
//! streamer. The three entry points (`tick`, `handle_byte`,
//! `service_telemetry`) run to completion and are never interleaved, so an
//! engine lease is never open while a command mutates a context.

use std::sync::Arc;

use tracing::{debug, info};

use crate::command::{CommandProcessor, ControlSurface};
use crate::config::HostConfig;
use crate::context::InstanceContext;
use crate::error::{HostError, HostResult};
use crate::gain::{GainCommands, MasterGain};
use crate::processor::{
    BlockProcessor, BlockTransport, ProcessorStats, RingEnds, RingTransport, TickOutcome,
};
use crate::sink::{ConsoleSink, RemoteLink};
use crate::telemetry::TelemetryStreamer;
use howl_dsp::{ChunkEngine, Fitting};

/// Display name of channel `index`
pub fn channel_name(index: usize) -> String {
    match index {
        0 => "left".to_string(),
        1 => "right".to_string(),
        n => format!("channel{}", n),
    }
}

/// One engine shared by every channel of a host
pub struct Rack {
    engine: Box<dyn ChunkEngine>,
    contexts: Vec<InstanceContext>,
    processors: Vec<BlockProcessor>,
    commands: CommandProcessor,
    telemetry: TelemetryStreamer,
    console: Box<dyn ConsoleSink>,
    link: Box<dyn RemoteLink>,
    gain: Arc<MasterGain>,
}

impl Rack {
    /// Build and set up one instance per transport
    ///
    /// Every instance starts from `fitting` (tagged with its ear), is
    /// configured, prepared and finished against the configured stream before
    /// this returns.
    pub fn new(
        config: &HostConfig,
        fitting: &Fitting,
        mut engine: Box<dyn ChunkEngine>,
        transports: Vec<Box<dyn BlockTransport>>,
        console: Box<dyn ConsoleSink>,
        link: Box<dyn RemoteLink>,
    ) -> HostResult<Self> {
        config.validate().map_err(HostError::ConfigError)?;
        let channels = config.stream.channels;
        if transports.len() != channels {
            return Err(HostError::ConfigError(format!(
                "{} transports for {} channels",
                transports.len(),
                channels
            )));
        }

        let io = config.stream.io_config();
        let mut contexts = Vec::with_capacity(channels);
        for index in 0..channels {
            let mut ctx = InstanceContext::new(channel_name(index), fitting.for_ear(index as i32));
            ctx.setup(engine.as_mut(), io, config.tuning.as_ref())?;
            contexts.push(ctx);
        }

        let gain = Arc::new(MasterGain::new());
        let processors = transports
            .into_iter()
            .map(|transport| BlockProcessor::new(transport).with_gain(Arc::clone(&gain)))
            .collect();

        let mut commands = CommandProcessor::new(config.link_channels);
        commands.add_handler(GainCommands::new(Arc::clone(&gain)));

        let telemetry = TelemetryStreamer::new(
            channels,
            config.telemetry.console_period_ms,
            config.telemetry.remote_period_ms,
        );

        info!(
            "Rack ready: {} engine, {} channels at {} Hz, chunk {} (~{:.2}ms)",
            engine.name(),
            channels,
            config.stream.sample_rate,
            config.stream.chunk_size,
            config.stream.latency_ms()
        );

        Ok(Self {
            engine,
            contexts,
            processors,
            commands,
            telemetry,
            console,
            link,
            gain,
        })
    }

    /// Build a rack whose channels are fed through ring transports. Returns
    /// the outside ends of each channel's rings, in channel order.
    pub fn with_rings(
        config: &HostConfig,
        fitting: &Fitting,
        engine: Box<dyn ChunkEngine>,
        console: Box<dyn ConsoleSink>,
        link: Box<dyn RemoteLink>,
    ) -> HostResult<(Self, Vec<RingEnds>)> {
        let mut transports: Vec<Box<dyn BlockTransport>> = Vec::new();
        let mut ends = Vec::new();
        for _ in 0..config.stream.channels {
            let (transport, end) =
                RingTransport::pair(config.stream.chunk_size, config.ring_blocks);
            transports.push(Box::new(transport));
            ends.push(end);
        }
        let rack = Self::new(config, fitting, engine, transports, console, link)?;
        Ok((rack, ends))
    }

    /// One tick of every block processor. Returns how many processed a block.
    pub fn tick(&mut self) -> usize {
        let engine = self.engine.as_mut();
        self.processors
            .iter_mut()
            .zip(self.contexts.iter_mut())
            .map(|(processor, ctx)| processor.update(&mut *engine, ctx))
            .filter(|outcome| matches!(outcome, TickOutcome::Processed { .. }))
            .count()
    }

    /// Feed one command byte. Returns false if nothing recognized it.
    pub fn handle_byte(&mut self, byte: u8) -> bool {
        let mut surface = ControlSurface {
            contexts: &mut self.contexts,
            telemetry: &mut self.telemetry,
            console: &mut *self.console,
            link: &mut *self.link,
        };
        self.commands.handle(byte, &mut surface)
    }

    /// Emit whatever telemetry is due at `now_ms`
    pub fn service_telemetry(&mut self, now_ms: u32) -> usize {
        self.telemetry
            .tick(now_ms, &self.contexts, &mut *self.console, &mut *self.link)
    }

    pub fn set_enabled(&mut self, channel: usize, enabled: bool) -> HostResult<()> {
        let ctx = self
            .contexts
            .get_mut(channel)
            .ok_or(HostError::UnknownChannel(channel))?;
        ctx.set_enabled(enabled);
        debug!("{}: processing {}", ctx.name(), if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn channels(&self) -> usize {
        self.contexts.len()
    }

    pub fn contexts(&self) -> &[InstanceContext] {
        &self.contexts
    }

    pub fn context(&self, channel: usize) -> Option<&InstanceContext> {
        self.contexts.get(channel)
    }

    pub fn context_mut(&mut self, channel: usize) -> Option<&mut InstanceContext> {
        self.contexts.get_mut(channel)
    }

    pub fn gain(&self) -> &Arc<MasterGain> {
        &self.gain
    }

    pub fn commands(&self) -> &CommandProcessor {
        &self.commands
    }

    pub fn telemetry(&self) -> &TelemetryStreamer {
        &self.telemetry
    }

    pub fn processor_stats(&self, channel: usize) -> Option<ProcessorStats> {
        self.processors.get(channel).map(|p| p.stats())
    }

    /// Counters summed over every channel
    pub fn stats(&self) -> ProcessorStats {
        self.processors
            .iter()
            .map(|p| p.stats())
            .fold(ProcessorStats::default(), |acc, s| ProcessorStats {
                ticks: acc.ticks + s.ticks,
                processed: acc.processed + s.processed,
                idle: acc.idle + s.idle,
                disabled: acc.disabled + s.disabled,
                rejected: acc.rejected + s.rejected,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{CapturedConsole, NullLink};
    use howl_dsp::{AdaptiveEngine, FloatParam};

    fn rack() -> (Rack, Vec<RingEnds>, CapturedConsole) {
        let console = CapturedConsole::new();
        let config = HostConfig::default();
        let (rack, ends) = Rack::with_rings(
            &config,
            &Fitting::for_chunk(config.stream.chunk_size),
            Box::new(AdaptiveEngine::new()),
            Box::new(console.clone()),
            Box::new(NullLink),
        )
        .unwrap();
        (rack, ends, console)
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(channel_name(0), "left");
        assert_eq!(channel_name(1), "right");
        assert_eq!(channel_name(2), "channel2");
    }

    #[test]
    fn test_rack_sets_up_every_channel() {
        let (rack, ends, _) = rack();
        assert_eq!(rack.channels(), 2);
        assert_eq!(ends.len(), 2);
        assert!(rack.commands().link_channels());
        for ctx in rack.contexts() {
            assert!(ctx.is_prepared());
            assert_eq!(ctx.local_state().prepared, 1);
        }
        assert_eq!(rack.context(1).unwrap().local_state().prescription.ear, 1);
    }

    #[test]
    fn test_tick_without_input_is_idle() {
        let (mut rack, _ends, _) = rack();
        assert_eq!(rack.tick(), 0);
        assert_eq!(rack.stats().idle, 2);
    }

    #[test]
    fn test_tick_processes_fed_channels() {
        let (mut rack, mut ends, _) = rack();
        for n in 0..8 {
            ends[0].feed.push((n as f32 * 0.1).sin()).unwrap();
        }
        assert_eq!(rack.tick(), 1);
        assert_eq!(ends[0].drain.slots(), 8);
        assert_eq!(rack.processor_stats(0).unwrap().processed, 1);
        assert_eq!(rack.processor_stats(1).unwrap().idle, 1);
    }

    #[test]
    fn test_handle_byte_reaches_every_channel() {
        let (mut rack, _ends, console) = rack();
        assert!(rack.handle_byte(b'm'));
        for ctx in rack.contexts() {
            assert!((ctx.params().float(FloatParam::StepSize) - 0.009214508).abs() < 1e-12);
        }
        assert!(console.contains("changing AFC mu"));
        assert!(!rack.handle_byte(b'~'));
    }

    #[test]
    fn test_set_enabled_unknown_channel() {
        let (mut rack, _ends, _) = rack();
        assert!(rack.set_enabled(1, false).is_ok());
        assert!(!rack.context(1).unwrap().is_enabled());
        assert!(matches!(rack.set_enabled(5, false), Err(HostError::UnknownChannel(5))));
    }

    #[test]
    fn test_transport_count_must_match() {
        let result = Rack::new(
            &HostConfig::default(),
            &Fitting::default(),
            Box::new(AdaptiveEngine::new()),
            Vec::new(),
            Box::new(CapturedConsole::new()),
            Box::new(NullLink),
        );
        assert!(matches!(result, Err(HostError::ConfigError(_))));
    }
}
