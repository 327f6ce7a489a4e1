//! Howl CLI
//!
//! Runs a stereo rack on a synthetic tone. Bytes typed on stdin are sent to
//! the host as commands; console output goes to stdout and remote-link
//! messages are echoed with an `[app]` prefix.

use std::f32::consts::TAU;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use howl_core::{
    AdaptiveEngine, ChannelLink, Event, FeedbackSettings, Host, HostConfig, HostSettings, Rack,
    RingEnds, StdoutConsole,
};

#[derive(Parser, Debug)]
#[command(name = "howl")]
#[command(version, about = "Adaptive feedback-cancelling audio host", long_about = None)]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the low-latency preset instead of the saved stream settings
    #[arg(long, conflicts_with = "stable")]
    low_latency: bool,

    /// Use the stable preset instead of the saved stream settings
    #[arg(long)]
    stable: bool,

    /// Frequency of the synthetic input tone (Hz)
    #[arg(long, default_value_t = 1000.0)]
    tone_hz: f32,

    /// Peak level of the synthetic input tone
    #[arg(long, default_value_t = 0.1)]
    level: f32,

    /// Command bytes to send before reading stdin
    #[arg(short = 'x', long, default_value = "")]
    commands: String,

    /// Stop after this many seconds instead of at end of input
    #[arg(long)]
    seconds: Option<f64>,

    /// Save the effective settings before starting
    #[arg(long)]
    save: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("howl=debug")),
        )
        .init();

    let cli = Cli::parse();
    info!("Howl v{}", env!("CARGO_PKG_VERSION"));

    let mut settings = match &cli.config {
        Some(path) => HostSettings::load_from(path),
        None => HostSettings::load(),
    };
    if cli.low_latency {
        settings.config = preset(&settings.config, HostConfig::low_latency());
    } else if cli.stable {
        settings.config = preset(&settings.config, HostConfig::stable());
    }
    // The codec path delay follows the chunk size
    settings.fitting.feedback.hdel =
        FeedbackSettings::hardware_delay(settings.config.stream.chunk_size);

    if cli.save {
        let saved = match &cli.config {
            Some(path) => settings.save_to(path),
            None => settings.save(),
        };
        saved.context("saving settings")?;
    }

    let config = settings.config.clone();
    let (link, app_messages) = ChannelLink::bounded(config.telemetry.remote_queue);
    let (rack, ends) = Rack::with_rings(
        &config,
        &settings.fitting,
        Box::new(AdaptiveEngine::new()),
        Box::new(StdoutConsole),
        Box::new(link),
    )
    .context("setting up the rack")?;

    let host = Host::start(rack, Duration::from_millis(config.tick_interval_ms))
        .context("starting the host")?;

    let running = Arc::new(AtomicBool::new(true));
    let feeder = spawn_feeder(
        ends,
        config.stream.sample_rate,
        config.stream.chunk_size,
        cli.tone_hz,
        cli.level,
        Arc::clone(&running),
    )?;
    let app_echo = spawn_app_echo(app_messages)?;

    host.send_bytes(cli.commands.as_bytes())?;
    run_until_done(&host, cli.seconds)?;

    host.request_stats()?;
    let deadline = Instant::now() + Duration::from_secs(1);
    while let Some(timeout) = deadline.checked_duration_since(Instant::now()) {
        match host.wait_event(timeout) {
            Ok(Event::Stats {
                ticks,
                processed,
                idle,
            }) => {
                info!("{} ticks: {} blocks processed, {} idle", ticks, processed, idle);
                break;
            }
            Ok(_) => continue,
            Err(_) => break,
        }
    }

    running.store(false, Ordering::SeqCst);
    drop(host);
    let _ = feeder.join();
    let _ = app_echo.join();
    info!("Howl stopped");
    Ok(())
}

/// Stream settings from `preset`, everything else as saved
fn preset(saved: &HostConfig, preset: HostConfig) -> HostConfig {
    HostConfig {
        stream: preset.stream,
        tick_interval_ms: preset.tick_interval_ms,
        ring_blocks: preset.ring_blocks,
        ..saved.clone()
    }
}

/// Forward stdin to the host and report events until stdin closes or the
/// time limit passes
fn run_until_done(host: &Host, seconds: Option<f64>) -> Result<()> {
    let input = spawn_stdin_reader()?;
    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs_f64(s.max(0.0)));
    let mut input_open = true;

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        if input_open {
            match input.recv_timeout(Duration::from_millis(20)) {
                Ok(byte) => host.send_byte(byte)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("stdin closed");
                    input_open = false;
                    if deadline.is_none() {
                        break;
                    }
                }
            }
        } else {
            thread::sleep(Duration::from_millis(20));
        }

        while let Some(event) = host.poll_event() {
            match event {
                Event::Unhandled { token } if token.is_ascii_whitespace() => {}
                Event::Unhandled { token } => debug!("Unrecognized command {:?}", token as char),
                Event::Error { message } => warn!("{}", message),
                Event::Stopped => return Ok(()),
                other => debug!("{:?}", other),
            }
        }
    }
    Ok(())
}

fn spawn_stdin_reader() -> Result<Receiver<u8>> {
    let (sender, receiver) = unbounded();
    thread::Builder::new()
        .name("howl-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for byte in stdin.lock().bytes() {
                match byte {
                    Ok(b) if sender.send(b).is_ok() => {}
                    _ => break,
                }
            }
        })
        .context("spawning stdin reader")?;
    Ok(receiver)
}

/// Print remote-link traffic until the link is dropped
fn spawn_app_echo(messages: Receiver<String>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("howl-app".into())
        .spawn(move || {
            for message in messages {
                println!("[app] {}", message.trim_end());
            }
        })
        .context("spawning app echo")
}

/// Feed every channel a tone in real time and discard the processed output
fn spawn_feeder(
    mut ends: Vec<RingEnds>,
    sample_rate: u32,
    chunk_size: usize,
    tone_hz: f32,
    level: f32,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("howl-feed".into())
        .spawn(move || {
            let step = TAU * tone_hz / sample_rate as f32;
            let start = Instant::now();
            let mut phase = 0.0_f32;
            let mut produced = 0_u64;
            let mut overruns = 0_u64;
            let mut peak = 0.0_f32;

            while running.load(Ordering::SeqCst) {
                let due = (start.elapsed().as_secs_f64() * f64::from(sample_rate)) as u64;
                while produced + chunk_size as u64 <= due {
                    for (channel, end) in ends.iter_mut().enumerate() {
                        if end.feed.slots() < chunk_size {
                            overruns += 1;
                            continue;
                        }
                        for n in 0..chunk_size {
                            // Right channel a quarter cycle behind the left
                            let offset = channel as f32 * TAU / 4.0;
                            let sample = level * (phase + n as f32 * step - offset).sin();
                            let _ = end.feed.push(sample);
                        }
                    }
                    phase = (phase + chunk_size as f32 * step) % TAU;
                    produced += chunk_size as u64;
                }

                for end in ends.iter_mut() {
                    while let Ok(sample) = end.drain.pop() {
                        peak = peak.max(sample.abs());
                    }
                }
                thread::sleep(Duration::from_millis(1));
            }

            info!(
                "Feed stopped: {} samples per channel, {} overruns, output peak {:.3}",
                produced, overruns, peak
            );
        })
        .context("spawning feeder")
}
