//! Command Processor
//!
//! Single-byte operator commands, from a terminal or a connected app. The
//! built-in commands are declared in `COMMANDS`; any byte not listed there is
//! offered to the registered collaborators in order.
//!
//! Adjust commands read the value from the first channel, transform and
//! clamp it, then write it to every linked channel and ask each to restart
//! adaptation.

use std::f64::consts::{FRAC_1_SQRT_2, SQRT_2};

use tracing::{debug, warn};

use crate::context::InstanceContext;
use crate::layout::{button_text, Card, RemoteLayout};
use crate::params::ParamRange;
use crate::sink::{ConsoleSink, RemoteLink};
use crate::telemetry::TelemetryStreamer;
use howl_dsp::{FloatParam, IntParam};

const SQRT_10: f64 = 3.1622776601683795;
const FRAC_1_SQRT_10: f64 = 0.31622776601683794;

/// How an adjust command maps the old value to the new one
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    /// `old * k`
    Scale(f64),
    /// `1 - (1 - old) / k`, a step in the time constant of a forgetting factor
    Forgetting(f64),
}

impl Transform {
    #[inline]
    pub fn apply(self, old: f64) -> f64 {
        match self {
            Transform::Scale(k) => old * k,
            Transform::Forgetting(k) => 1.0 - (1.0 - old) / k,
        }
    }
}

/// What a command does
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandAction {
    Adjust {
        param: FloatParam,
        transform: Transform,
        range: ParamRange,
    },
    ResetModel {
        channel: usize,
    },
    PrintParams {
        channel: usize,
    },
    PrintModel {
        channel: usize,
    },
    ConsoleStream {
        channel: usize,
        enabled: bool,
    },
    RemoteStream {
        enabled: bool,
    },
    Handshake,
    Help,
}

/// One row of the command table
#[derive(Debug, Clone, Copy)]
pub struct CommandEntry {
    pub token: u8,
    pub action: CommandAction,
    /// Help text; empty rows are not listed
    pub help: &'static str,
}

const fn adjust(
    token: u8,
    param: FloatParam,
    transform: Transform,
    help: &'static str,
) -> CommandEntry {
    CommandEntry {
        token,
        action: CommandAction::Adjust {
            param,
            transform,
            range: ParamRange::UNIT,
        },
        help,
    }
}

const fn entry(token: u8, action: CommandAction, help: &'static str) -> CommandEntry {
    CommandEntry { token, action, help }
}

/// Built-in commands
pub const COMMANDS: &[CommandEntry] = &[
    entry(b'h', CommandAction::Help, "print this help"),
    adjust(
        b'm',
        FloatParam::StepSize,
        Transform::Scale(2.0),
        "AFC: increase mu, speed of adaptation",
    ),
    adjust(b'M', FloatParam::StepSize, Transform::Scale(0.5), "AFC: decrease mu"),
    adjust(
        b'r',
        FloatParam::ForgettingFactor,
        Transform::Forgetting(SQRT_2),
        "AFC: increase rho, smoothing",
    ),
    adjust(
        b'R',
        FloatParam::ForgettingFactor,
        Transform::Forgetting(FRAC_1_SQRT_2),
        "AFC: decrease rho",
    ),
    adjust(b'e', FloatParam::PowerThreshold, Transform::Scale(SQRT_10), "AFC: increase eps"),
    adjust(
        b'E',
        FloatParam::PowerThreshold,
        Transform::Scale(FRAC_1_SQRT_10),
        "AFC: decrease eps",
    ),
    entry(b'q', CommandAction::ResetModel { channel: 0 }, "reset the left feedback model"),
    entry(b'Q', CommandAction::ResetModel { channel: 1 }, "reset the right feedback model"),
    entry(b's', CommandAction::PrintParams { channel: 0 }, "print left AFC settings"),
    entry(b'S', CommandAction::PrintParams { channel: 1 }, "print right AFC settings"),
    entry(b'f', CommandAction::PrintModel { channel: 0 }, "print the left feedback model once"),
    entry(b'F', CommandAction::PrintModel { channel: 1 }, "print the right feedback model once"),
    entry(
        b'p',
        CommandAction::ConsoleStream { channel: 0, enabled: true },
        "start repeated printing of the left feedback model",
    ),
    entry(
        b'P',
        CommandAction::ConsoleStream { channel: 0, enabled: false },
        "stop repeated printing of the left feedback model",
    ),
    entry(
        b'g',
        CommandAction::ConsoleStream { channel: 1, enabled: true },
        "start repeated printing of the right feedback model",
    ),
    entry(
        b'G',
        CommandAction::ConsoleStream { channel: 1, enabled: false },
        "stop repeated printing of the right feedback model",
    ),
    entry(
        b']',
        CommandAction::RemoteStream { enabled: true },
        "start repeated printing of the feedback model to the app",
    ),
    entry(
        b'}',
        CommandAction::RemoteStream { enabled: false },
        "stop repeated printing of the feedback model to the app",
    ),
    entry(b'J', CommandAction::Handshake, "send the app layout"),
    entry(b'j', CommandAction::Handshake, ""),
];

/// Look up a built-in command
pub fn find_command(token: u8) -> Option<&'static CommandEntry> {
    COMMANDS.iter().find(|spec| spec.token == token)
}

/// Something else that responds to command bytes
pub trait CommandHandler: Send {
    /// Handle `byte` if it is ours
    fn handle(
        &mut self,
        byte: u8,
        console: &mut dyn ConsoleSink,
        link: &mut dyn RemoteLink,
    ) -> bool;

    fn print_help(&self, console: &mut dyn ConsoleSink);

    /// Push this handler's full state to the app
    fn refresh(&self, _link: &mut dyn RemoteLink) {}

    /// Cards for the app's globals page
    fn cards(&self) -> Vec<Card> {
        Vec::new()
    }
}

/// Everything a command may touch
pub struct ControlSurface<'a> {
    pub contexts: &'a mut [InstanceContext],
    pub telemetry: &'a mut TelemetryStreamer,
    pub console: &'a mut dyn ConsoleSink,
    pub link: &'a mut dyn RemoteLink,
}

/// Dispatches command bytes
pub struct CommandProcessor {
    link_channels: bool,
    layout: Option<RemoteLayout>,
    handlers: Vec<Box<dyn CommandHandler>>,
}

impl CommandProcessor {
    pub fn new(link_channels: bool) -> Self {
        Self {
            link_channels,
            layout: None,
            handlers: Vec::new(),
        }
    }

    /// Register a collaborator; they are consulted in registration order
    pub fn add_handler<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.push(Box::new(handler));
    }

    pub fn link_channels(&self) -> bool {
        self.link_channels
    }

    /// The app layout, once a handshake has built it
    pub fn layout(&self) -> Option<&RemoteLayout> {
        self.layout.as_ref()
    }

    /// Handle one byte. Returns false if nothing recognized it.
    pub fn handle(&mut self, byte: u8, surface: &mut ControlSurface<'_>) -> bool {
        if let Some(spec) = find_command(byte) {
            debug!("Command '{}'", byte as char);
            self.execute(spec.action, surface);
            return true;
        }

        for handler in self.handlers.iter_mut() {
            if handler.handle(byte, &mut *surface.console, &mut *surface.link) {
                return true;
            }
        }

        debug!("Unhandled command byte 0x{:02x}", byte);
        false
    }

    fn execute(&mut self, action: CommandAction, surface: &mut ControlSurface<'_>) {
        match action {
            CommandAction::Adjust {
                param,
                transform,
                range,
            } => self.adjust(param, transform, range, surface),
            CommandAction::ResetModel { channel } => {
                let Some(ctx) = channel_mut(surface, channel) else {
                    return;
                };
                let name = ctx.name().to_string();
                let count = ctx.reset_feedback_model();
                surface.console.write_line(&format!(
                    "Command received: resetting {} feedback model ({} coefficients)",
                    name, count
                ));
            }
            CommandAction::PrintParams { channel } => {
                let Some(ctx) = channel_ref(surface, channel) else {
                    return;
                };
                let lines = settings_report(ctx);
                for line in lines {
                    surface.console.write_line(&line);
                }
            }
            CommandAction::PrintModel { channel } => {
                let Some(ctx) = channel_ref(surface, channel) else {
                    return;
                };
                let header = format!("Command received: {} feedback model:", ctx.name());
                let model = model_report(ctx.feedback_model());
                surface.console.write_line(&header);
                surface.console.write_line(&model);
            }
            CommandAction::ConsoleStream { channel, enabled } => {
                let Some(name) = surface.contexts.get(channel).map(|c| c.name().to_string()) else {
                    missing_channel(surface, channel);
                    return;
                };
                if surface.telemetry.set_console_streaming(channel, enabled).is_err() {
                    missing_channel(surface, channel);
                    return;
                }
                surface.console.write_line(&format!(
                    "Command received: {} printing {} feedback model",
                    if enabled { "START" } else { "STOP" },
                    name
                ));
            }
            CommandAction::RemoteStream { enabled } => {
                surface.telemetry.set_remote_streaming(enabled);
                surface.console.write_line(&format!(
                    "Command received: {} printing feedback model to the app",
                    if enabled { "START" } else { "STOP" }
                ));
            }
            CommandAction::Handshake => self.handshake(surface),
            CommandAction::Help => self.print_help(surface),
        }
    }

    fn adjust(
        &mut self,
        param: FloatParam,
        transform: Transform,
        range: ParamRange,
        surface: &mut ControlSurface<'_>,
    ) {
        let Some(primary) = surface.contexts.first() else {
            warn!("No channels to adjust {}", param.label());
            return;
        };
        let value = range.clamp(transform.apply(primary.params().float(param)));

        let targets = if self.link_channels {
            surface.contexts.len()
        } else {
            1
        };
        for ctx in surface.contexts.iter_mut().take(targets) {
            let mut params = ctx.params_mut();
            params.set_float_within(param, value, range);
            params.request_reinit();
        }

        surface.console.write_line(&format!(
            "Command received: changing AFC {} to {:.7}",
            param.label(),
            value
        ));
        self.update_tunables(surface);
    }

    fn handshake(&mut self, surface: &mut ControlSurface<'_>) {
        if self.layout.is_none() {
            let cards = self.handlers.iter().flat_map(|h| h.cards()).collect();
            self.layout = Some(RemoteLayout::tuning_panel(cards));
        }
        if let Some(layout) = &self.layout {
            let wire = layout.to_wire();
            surface.console.write_line(&wire);
            surface.link.send_message(&wire);
        }
        self.refresh(surface);
    }

    /// Push every field the app shows
    pub fn refresh(&self, surface: &mut ControlSurface<'_>) {
        for handler in &self.handlers {
            handler.refresh(&mut *surface.link);
        }
        self.update_tunables(surface);
        self.update_constants(surface);
    }

    fn update_tunables(&self, surface: &mut ControlSurface<'_>) {
        let Some(primary) = surface.contexts.first() else {
            return;
        };
        let params = primary.params();
        for (id, param) in [
            ("valMu", FloatParam::StepSize),
            ("valEps", FloatParam::PowerThreshold),
            ("valRho", FloatParam::ForgettingFactor),
        ] {
            let text = format!("{:.8}", params.float(param));
            surface.link.send_message(&button_text(id, &text));
        }
    }

    fn update_constants(&self, surface: &mut ControlSurface<'_>) {
        let Some(primary) = surface.contexts.first() else {
            return;
        };
        let params = primary.params();
        for (id, param) in [
            ("valAFL", IntParam::AdaptiveFilterLength),
            ("valWFL", IntParam::WhitenFilterLength),
            ("valPFL", IntParam::BandLimitFilterLength),
            ("valFBL", IntParam::FeedbackLength),
            ("valHDEL", IntParam::HardwareDelay),
        ] {
            surface
                .link
                .send_message(&button_text(id, &params.int(param).to_string()));
        }
        let alf = format!("{:.8}", params.float(FloatParam::BandLimitRate));
        surface.link.send_message(&button_text("valALF", &alf));
    }

    fn print_help(&self, surface: &mut ControlSurface<'_>) {
        let console = &mut *surface.console;
        console.write_line("Available commands:");
        for spec in COMMANDS.iter().filter(|spec| !spec.help.is_empty()) {
            let line = match (spec.action, surface.contexts.first()) {
                (CommandAction::Adjust { param, .. }, Some(primary)) => format!(
                    " {}: {} (current: {:.8})",
                    spec.token as char,
                    spec.help,
                    primary.params().float(param)
                ),
                _ => format!(" {}: {}", spec.token as char, spec.help),
            };
            console.write_line(&line);
        }
        for handler in &self.handlers {
            handler.print_help(&mut *console);
        }
        console.write_line("");
    }
}

fn missing_channel(surface: &mut ControlSurface<'_>, channel: usize) {
    surface
        .console
        .write_line(&format!("Command received: no channel {}", channel));
}

fn channel_ref<'s>(
    surface: &'s mut ControlSurface<'_>,
    channel: usize,
) -> Option<&'s InstanceContext> {
    if channel >= surface.contexts.len() {
        missing_channel(surface, channel);
        return None;
    }
    surface.contexts.get(channel)
}

fn channel_mut<'s>(
    surface: &'s mut ControlSurface<'_>,
    channel: usize,
) -> Option<&'s mut InstanceContext> {
    if channel >= surface.contexts.len() {
        missing_channel(surface, channel);
        return None;
    }
    surface.contexts.get_mut(channel)
}

/// Structural lengths, then the tunables
pub fn settings_report(ctx: &InstanceContext) -> Vec<String> {
    let params = ctx.params();
    let mut lines = vec![format!("Command received: {} AFC settings:", ctx.name())];
    for param in [
        IntParam::AdaptiveFilterLength,
        IntParam::WhitenFilterLength,
        IntParam::BandLimitFilterLength,
        IntParam::FeedbackLength,
        IntParam::HardwareDelay,
    ] {
        lines.push(format!("AFC: {} = {}", param.label(), params.int(param)));
    }
    for param in [
        FloatParam::StepSize,
        FloatParam::ForgettingFactor,
        FloatParam::PowerThreshold,
        FloatParam::BandLimitRate,
        FloatParam::FeedbackMagnitude,
    ] {
        lines.push(format!("AFC: {} = {:.8}", param.label(), params.float(param)));
    }
    lines
}

/// Comma-separated coefficients, 6 decimals
pub fn model_report(model: &[f32]) -> String {
    model
        .iter()
        .map(|c| format!("{:.6}", c))
        .collect::<Vec<_>>()
        .join(", ")
}
