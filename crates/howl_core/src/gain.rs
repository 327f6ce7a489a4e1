//! Digital Gain Stage
//!
//! A post-processing gain shared between the control side and every block
//! processor, plus the operator commands that drive it.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::command::CommandHandler;
use crate::layout::{button_text, Card};
use crate::sink::{ConsoleSink, RemoteLink};

/// Gain step of one command (dB)
pub const GAIN_STEP_DB: f32 = 3.0;

/// Allowed gain range (dB)
pub const MIN_GAIN_DB: f32 = -60.0;
pub const MAX_GAIN_DB: f32 = 40.0;

/// Shared gain between the control and audio sides
pub struct MasterGain {
    /// Gain in dB (stored as u32, interpreted as f32 bits)
    /// Rust pattern: AtomicF32 doesn't exist, so we use bit-casting
    gain_db_bits: AtomicU32,

    muted: AtomicBool,
}

impl MasterGain {
    pub fn new() -> Self {
        Self {
            gain_db_bits: AtomicU32::new(0.0_f32.to_bits()),
            muted: AtomicBool::new(false),
        }
    }

    /// Set the gain, clamped to the allowed range. Returns the stored value.
    pub fn set_gain_db(&self, gain_db: f32) -> f32 {
        let gain_db = gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
        self.gain_db_bits.store(gain_db.to_bits(), Ordering::Relaxed);
        gain_db
    }

    pub fn gain_db(&self) -> f32 {
        f32::from_bits(self.gain_db_bits.load(Ordering::Relaxed))
    }

    /// Muting keeps the gain setting; unmuting restores it
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Current linear gain
    pub fn linear(&self) -> f32 {
        if self.is_muted() {
            0.0
        } else {
            10.0_f32.powf(self.gain_db() / 20.0)
        }
    }

    /// Apply the gain in place
    #[inline]
    pub fn apply(&self, samples: &mut [f32]) {
        let gain = self.linear();
        if (gain - 1.0).abs() > 0.001 {
            for sample in samples.iter_mut() {
                *sample *= gain;
            }
        }
    }
}

impl Default for MasterGain {
    fn default() -> Self {
        Self::new()
    }
}

/// `k`/`K` raise/lower the gain, `z`/`Z` mute/unmute
pub struct GainCommands {
    gain: Arc<MasterGain>,
}

impl GainCommands {
    pub fn new(gain: Arc<MasterGain>) -> Self {
        Self { gain }
    }

    /// Card for the remote app's globals page
    pub fn card() -> Card {
        Card::new("Digital Gain")
            .stepper("K", "valGain", "k")
            .button("Mute", "z", "", 6)
            .button("Unmute", "Z", "", 6)
    }

    fn update_display(&self, link: &mut dyn RemoteLink) {
        let text = if self.gain.is_muted() {
            "muted".to_string()
        } else {
            format!("{:.1}", self.gain.gain_db())
        };
        link.send_message(&button_text("valGain", &text));
    }
}

impl CommandHandler for GainCommands {
    fn handle(
        &mut self,
        byte: u8,
        console: &mut dyn ConsoleSink,
        link: &mut dyn RemoteLink,
    ) -> bool {
        match byte {
            b'k' | b'K' => {
                let step = if byte == b'k' { GAIN_STEP_DB } else { -GAIN_STEP_DB };
                let gain_db = self.gain.set_gain_db(self.gain.gain_db() + step);
                console.write_line(&format!(
                    "Command received: changing gain to {:.1} dB",
                    gain_db
                ));
            }
            b'z' => {
                self.gain.set_muted(true);
                console.write_line("Command received: muting");
            }
            b'Z' => {
                self.gain.set_muted(false);
                console.write_line(&format!(
                    "Command received: unmuting (gain {:.1} dB)",
                    self.gain.gain_db()
                ));
            }
            _ => return false,
        }
        self.update_display(link);
        true
    }

    fn print_help(&self, console: &mut dyn ConsoleSink) {
        console.write_line(" Gain:");
        console.write_line(&format!(
            "   k/K: incr/decrease gain (current: {:.1} dB)",
            self.gain.gain_db()
        ));
        console.write_line("   z/Z: mute/unmute");
    }

    fn refresh(&self, link: &mut dyn RemoteLink) {
        self.update_display(link);
    }

    fn cards(&self) -> Vec<Card> {
        vec![Self::card()]
    }
}
