//! Host - Audio Thread Entry Point
//!
//! `Host` moves a fully set-up `Rack` onto a dedicated audio thread and talks
//! to it over channels. The thread alternates between draining commands,
//! ticking every block processor and servicing telemetry; each of those runs
//! to completion before the next starts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::error::{HostError, HostResult};
use crate::message::{Command, Event};
use crate::rack::Rack;

/// Most blocks each channel may process per wake-up before commands are
/// looked at again
const MAX_TICKS_PER_WAKE: usize = 64;

/// The host controller
///
/// This struct lives on the control thread and communicates with the audio
/// thread via channels.
pub struct Host {
    /// Channel for sending commands to audio thread
    command_sender: Sender<Command>,

    /// Channel for receiving events from audio thread
    event_receiver: Receiver<Event>,

    /// Handle to the audio thread
    audio_thread: Option<JoinHandle<()>>,

    /// Flag to signal shutdown
    shutdown_flag: Arc<AtomicBool>,

    /// Whether the audio loop is currently running
    is_running: Arc<AtomicBool>,
}

impl Host {
    /// Start the audio thread on `rack`, waking at least every `tick_interval`
    pub fn start(rack: Rack, tick_interval: Duration) -> HostResult<Self> {
        let (command_sender, command_receiver) = bounded::<Command>(32);
        let (event_sender, event_receiver) = unbounded::<Event>();

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let is_running = Arc::new(AtomicBool::new(false));

        let shutdown_clone = Arc::clone(&shutdown_flag);
        let running_clone = Arc::clone(&is_running);

        let audio_thread = thread::Builder::new()
            .name("howl-audio".into())
            .spawn(move || {
                Self::audio_thread_main(
                    rack,
                    tick_interval,
                    command_receiver,
                    event_sender,
                    shutdown_clone,
                    running_clone,
                );
            })
            .map_err(|e| HostError::ThreadSpawnError(e.to_string()))?;

        Ok(Self {
            command_sender,
            event_receiver,
            audio_thread: Some(audio_thread),
            shutdown_flag,
            is_running,
        })
    }

    /// Forward one command byte
    pub fn send_byte(&self, byte: u8) -> HostResult<()> {
        self.send_command(Command::Input(byte))
    }

    /// Forward every byte of `bytes`, in order
    pub fn send_bytes(&self, bytes: &[u8]) -> HostResult<()> {
        bytes.iter().try_for_each(|&b| self.send_byte(b))
    }

    pub fn set_enabled(&self, channel: usize, enabled: bool) -> HostResult<()> {
        self.send_command(Command::SetEnabled { channel, enabled })
    }

    /// Request a stats snapshot (answered with an Event::Stats)
    pub fn request_stats(&self) -> HostResult<()> {
        self.send_command(Command::RequestStats)
    }

    /// Check if the audio loop is running
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Poll for events (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn wait_event(&self, timeout: Duration) -> HostResult<Event> {
        self.event_receiver
            .recv_timeout(timeout)
            .map_err(|_| HostError::ChannelRecvError)
    }

    /// Send command to audio thread
    fn send_command(&self, command: Command) -> HostResult<()> {
        self.command_sender
            .send(command)
            .map_err(|_| HostError::ChannelSendError)
    }

    /// Audio thread main loop
    fn audio_thread_main(
        mut rack: Rack,
        tick_interval: Duration,
        command_receiver: Receiver<Command>,
        event_sender: Sender<Event>,
        shutdown_flag: Arc<AtomicBool>,
        is_running: Arc<AtomicBool>,
    ) {
        info!("Audio thread started ({} channels)", rack.channels());
        is_running.store(true, Ordering::SeqCst);
        let _ = event_sender.send(Event::Started);

        let clock = Instant::now();

        while !shutdown_flag.load(Ordering::SeqCst) {
            match command_receiver.recv_timeout(tick_interval) {
                Ok(Command::Input(byte)) => {
                    if !rack.handle_byte(byte) {
                        let _ = event_sender.send(Event::Unhandled { token: byte });
                    }
                }
                Ok(Command::SetEnabled { channel, enabled }) => {
                    if let Err(e) = rack.set_enabled(channel, enabled) {
                        warn!("{}", e);
                        let _ = event_sender.send(Event::error(e));
                    }
                }
                Ok(Command::RequestStats) => {
                    let stats = rack.stats();
                    let _ = event_sender.send(Event::Stats {
                        ticks: stats.ticks,
                        processed: stats.processed,
                        idle: stats.idle,
                    });
                }
                Ok(Command::Shutdown) => {
                    debug!("Shutdown requested");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Command channel closed");
                    break;
                }
            }

            for _ in 0..MAX_TICKS_PER_WAKE {
                if rack.tick() == 0 {
                    break;
                }
            }

            // Wraps after ~49 days; the pacers handle the wrap
            let now_ms = clock.elapsed().as_millis() as u32;
            rack.service_telemetry(now_ms);
        }

        is_running.store(false, Ordering::SeqCst);
        let _ = event_sender.send(Event::Stopped);
        info!("Audio thread shutting down");
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        // Signal shutdown
        self.shutdown_flag.store(true, Ordering::SeqCst);

        // Send shutdown command
        let _ = self.command_sender.send(Command::Shutdown);

        // Wait for audio thread to finish
        if let Some(handle) = self.audio_thread.take() {
            let _ = handle.join();
        }
    }
}
