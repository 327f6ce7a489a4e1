//! Command bytes and telemetry driven through a full rack

use approx::assert_relative_eq;
use crossbeam_channel::Receiver;
use std::f64::consts::SQRT_2;

use howl_core::{
    AdaptiveEngine, CapturedConsole, ChannelLink, Fitting, FloatParam, HostConfig, IntParam,
    NullLink, Rack, RingEnds, StreamConfig,
};

const MU: f64 = 0.004607254;
const RHO: f64 = 0.0072189585;

struct Bench {
    rack: Rack,
    ends: Vec<RingEnds>,
    console: CapturedConsole,
    link: Receiver<String>,
}

fn bench_with(config: HostConfig, fitting: Fitting) -> Bench {
    let console = CapturedConsole::new();
    let (link, receiver) = ChannelLink::bounded(config.telemetry.remote_queue);
    let (rack, ends) = Rack::with_rings(
        &config,
        &fitting,
        Box::new(AdaptiveEngine::new()),
        Box::new(console.clone()),
        Box::new(link),
    )
    .unwrap();
    Bench {
        rack,
        ends,
        console,
        link: receiver,
    }
}

fn bench() -> Bench {
    bench_with(HostConfig::default(), Fitting::for_chunk(8))
}

fn press(bench: &mut Bench, bytes: &[u8]) {
    for &b in bytes {
        assert!(bench.rack.handle_byte(b), "'{}' not handled", b as char);
    }
}

fn float(bench: &Bench, channel: usize, param: FloatParam) -> f64 {
    bench.rack.context(channel).unwrap().params().float(param)
}

/// Push `blocks` blocks of a test signal through channel 0
fn run(bench: &mut Bench, blocks: usize) {
    for block in 0..blocks {
        for n in 0..8 {
            let t = (block * 8 + n) as f32;
            let s = 0.3 * (t * 0.37).sin() + 0.2 * (t * 1.91).sin();
            bench.ends[0].feed.push(s).unwrap();
        }
        bench.rack.tick();
        while bench.ends[0].drain.pop().is_ok() {}
    }
}

#[test]
fn test_mu_doubles_on_every_linked_channel() {
    let mut bench = bench();
    assert_eq!(float(&bench, 0, FloatParam::StepSize), MU);

    // Clear the reinit request left by set-up
    run(&mut bench, 1);
    press(&mut bench, b"m");

    for channel in 0..2 {
        assert_relative_eq!(float(&bench, channel, FloatParam::StepSize), 0.009214508);
        let ctx = bench.rack.context(channel).unwrap();
        assert_eq!(ctx.params().int(IntParam::Reinit), 0);
    }
    assert!(bench
        .console
        .contains("Command received: changing AFC mu to 0.0092145"));
    assert!(bench
        .link
        .try_iter()
        .any(|m| m == "TEXT=BTN:valMu:0.00921451"));
}

#[test]
fn test_unlinked_channels_adjust_primary_only() {
    let config = HostConfig {
        link_channels: false,
        ..HostConfig::default()
    };
    let mut bench = bench_with(config, Fitting::for_chunk(8));
    press(&mut bench, b"m");
    assert_relative_eq!(float(&bench, 0, FloatParam::StepSize), 2.0 * MU);
    assert_relative_eq!(float(&bench, 1, FloatParam::StepSize), MU);
}

#[test]
fn test_rho_steps_through_forgetting_transform() {
    let mut bench = bench();
    press(&mut bench, b"r");
    let expected = 1.0 - (1.0 - RHO) / SQRT_2;
    assert_relative_eq!(
        float(&bench, 0, FloatParam::ForgettingFactor),
        expected,
        epsilon = 1e-12
    );
    assert!((expected - 0.298).abs() < 1e-3);

    press(&mut bench, b"R");
    assert_relative_eq!(
        float(&bench, 0, FloatParam::ForgettingFactor),
        RHO,
        epsilon = 1e-12
    );
}

#[test]
fn test_adjustments_stay_in_unit_range() {
    let mut bench = bench();
    for (token, param) in [
        (b'm', FloatParam::StepSize),
        (b'M', FloatParam::StepSize),
        (b'e', FloatParam::PowerThreshold),
        (b'E', FloatParam::PowerThreshold),
        (b'r', FloatParam::ForgettingFactor),
        (b'R', FloatParam::ForgettingFactor),
    ] {
        for _ in 0..200 {
            press(&mut bench, &[token]);
            for channel in 0..2 {
                let value = float(&bench, channel, param);
                assert!((0.0..=1.0).contains(&value), "{} gave {}", token as char, value);
            }
        }
    }
    // Doubling past the top stays pinned at the bound
    for _ in 0..250 {
        press(&mut bench, b"m");
    }
    assert_eq!(float(&bench, 0, FloatParam::StepSize), 1.0);
}

#[test]
fn test_reset_zeroes_model_and_keeps_count() {
    let mut fitting = Fitting::for_chunk(8);
    fitting.feedback.fbg = 1.0;
    fitting.feedback.fbl = 16;
    let mut bench = bench_with(HostConfig::default(), fitting);

    run(&mut bench, 400);
    let model = bench.rack.context(0).unwrap().feedback_model();
    assert_eq!(model.len(), 42);
    assert!(model.iter().any(|&c| c != 0.0), "model never adapted");

    press(&mut bench, b"q");
    let ctx = bench.rack.context(0).unwrap();
    assert_eq!(ctx.feedback_model().len(), 42);
    assert!(ctx.feedback_model().iter().all(|&c| c == 0.0));
    assert_eq!(ctx.params().int(IntParam::AdaptiveFilterLength), 42);
    assert!(bench.console.contains("(42 coefficients)"));
}

#[test]
fn test_print_settings_and_model() {
    let mut bench = bench();
    press(&mut bench, b"sf");
    let lines = bench.console.take();
    assert!(lines.iter().any(|l| l == "AFC: afl = 42"));
    assert!(lines.iter().any(|l| l == "AFC: mu = 0.00460725"));
    let model = lines.last().unwrap();
    assert_eq!(model.split(", ").count(), 42);
    assert!(model.starts_with("0.000000"));
}

#[test]
fn test_second_channel_commands_need_second_channel() {
    let config = HostConfig {
        stream: StreamConfig {
            channels: 1,
            ..StreamConfig::default()
        },
        ..HostConfig::default()
    };
    let mut bench = bench_with(config, Fitting::for_chunk(8));
    press(&mut bench, b"QSFg");
    let lines = bench.console.take();
    assert_eq!(lines.iter().filter(|l| l.contains("no channel 1")).count(), 4);
}

#[test]
fn test_help_lists_current_values_and_collaborators() {
    let mut bench = bench();
    press(&mut bench, b"h");
    assert!(bench.console.contains("current: 0.00460725"));
    assert!(bench.console.contains(" Gain:"));
    // Alias rows are not listed
    assert!(!bench.console.lines().iter().any(|l| l.starts_with(" j:")));
}

#[test]
fn test_handshake_sends_layout_then_fields() {
    let mut bench = bench();
    press(&mut bench, b"J");
    let messages: Vec<String> = bench.link.try_iter().collect();

    assert!(messages[0].starts_with("JSON="));
    assert!(messages[0].contains("AFC Parameters"));
    assert!(messages[0].contains("Digital Gain"));
    for field in [
        "TEXT=BTN:valGain:0.0",
        "TEXT=BTN:valMu:0.00460725",
        "TEXT=BTN:valAFL:42",
        "TEXT=BTN:valHDEL:54",
    ] {
        assert!(messages.iter().any(|m| m == field), "missing {}", field);
    }
    assert_eq!(bench.rack.commands().layout().unwrap().page_count(), 4);

    // The alias resends the same layout
    press(&mut bench, b"j");
    let again: Vec<String> = bench.link.try_iter().collect();
    assert_eq!(again[0], messages[0]);
}

#[test]
fn test_unknown_byte_is_dropped() {
    let mut bench = bench();
    assert!(!bench.rack.handle_byte(b'~'));
    assert!(!bench.rack.handle_byte(b'\n'));
    assert!(bench.console.lines().is_empty());
}

#[test]
fn test_mute_silences_output() {
    let mut bench = bench();
    press(&mut bench, b"z");
    for n in 0..8 {
        bench.ends[0].feed.push(0.1 * n as f32).unwrap();
    }
    assert_eq!(bench.rack.tick(), 1);
    let out: Vec<f32> = std::iter::from_fn(|| bench.ends[0].drain.pop().ok()).collect();
    assert_eq!(out, vec![0.0; 8]);
    assert!(bench.rack.gain().is_muted());
}

#[test]
fn test_console_stream_pacing() {
    let mut bench = bench();
    press(&mut bench, b"p");
    bench.console.take();

    let mut emitted = Vec::new();
    for now in [1000, 1400, 1500, 900] {
        let frames = bench.rack.service_telemetry(now);
        emitted.push(frames);
    }
    assert_eq!(emitted, vec![1, 0, 1, 1]);

    let lines = bench.console.take();
    assert_eq!(lines.iter().filter(|l| *l == "Model_100:").count(), 3);
    // Header, two references, 42 coefficients
    assert_eq!(lines.len(), 3 * 45);
    assert_eq!(lines[1], "100.000");
    assert_eq!(lines[2], "-100.000");

    press(&mut bench, b"P");
    assert_eq!(bench.rack.service_telemetry(5000), 0);
}

#[test]
fn test_remote_stream_frames_each_value() {
    let mut bench = bench();
    press(&mut bench, b"]");
    bench.link.try_iter().for_each(drop);

    assert_eq!(bench.rack.service_telemetry(600), 1);
    let messages: Vec<String> = bench.link.try_iter().collect();
    assert_eq!(messages.len(), 44);
    assert_eq!(messages[0], "P1.000\n");
    assert_eq!(messages[1], "P-1.000\n");
    assert_eq!(messages[2], "P0.000\n");

    press(&mut bench, b"}");
    assert_eq!(bench.rack.service_telemetry(2000), 0);
}

#[test]
fn test_empty_model_skips_frame() {
    let mut fitting = Fitting::for_chunk(8);
    fitting.feedback.afl = 0;
    let mut bench = bench_with(HostConfig::default(), fitting);
    press(&mut bench, b"p]");
    bench.console.take();
    assert_eq!(bench.rack.service_telemetry(1000), 0);
    assert!(bench.console.lines().is_empty());
}
