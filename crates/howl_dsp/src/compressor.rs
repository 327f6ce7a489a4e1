//! Wide Dynamic Range Compression
//!
//! Per-band compression over the filterbank output and a broadband limiter
//! on the synthesized signal. Both use the same static curve: linear gain
//! below the kneepoint, reduced slope above it, and a hard ceiling at the
//! limiting threshold.

use crate::fitting::{Limiter, Prescription};
use crate::memory::ChannelMemory;

/// Smallest envelope level considered (about -120 dBFS)
const ENV_FLOOR: f32 = 1e-6;

/// One-pole smoothing coefficient for a time constant in milliseconds
pub(crate) fn ballistic(time_ms: f64, sample_rate: f64) -> f32 {
    let samples = time_ms * sample_rate / 1000.0;
    if samples <= 0.0 {
        0.0
    } else {
        (-1.0 / samples).exp() as f32
    }
}

/// Static gain (dB) for an input level (dB SPL)
#[inline]
pub(crate) fn curve_gain_db(level_db: f64, tkgain: f64, tk: f64, cr: f64, bolt: f64) -> f64 {
    let mut gain = tkgain;
    if level_db > tk && cr > 0.0 {
        gain += (level_db - tk) * (1.0 / cr - 1.0);
    }
    let out = level_db + gain;
    if out > bolt {
        gain -= out - bolt;
    }
    gain
}

#[inline]
fn follow(env: f32, sample: f32, (attack, release): (f32, f32)) -> f32 {
    let level = sample.abs();
    let coeff = if level > env { attack } else { release };
    level + coeff * (env - level)
}

#[inline]
fn level_db(env: f32, maxdb: f64) -> f64 {
    maxdb + 20.0 * f64::from(env.max(ENV_FLOOR)).log10()
}

#[inline]
fn db_to_amplitude(db: f64) -> f32 {
    10.0_f64.powf(db / 20.0) as f32
}

/// Compress each band of `memory.band_buf` in place
pub(crate) fn compress_bands(memory: &mut ChannelMemory, prescription: &Prescription, cs: usize) {
    let ballistics = memory.band_ballistics;
    for band in 0..memory.bands {
        let signal = &mut memory.band_buf[band * cs..(band + 1) * cs];
        let mut env = memory.band_env[band];
        for sample in signal.iter_mut() {
            env = follow(env, *sample, ballistics);
            let gain = curve_gain_db(
                level_db(env, prescription.maxdb),
                prescription.tkgain[band],
                prescription.tk[band],
                prescription.cr[band],
                prescription.bolt[band],
            );
            *sample *= db_to_amplitude(gain);
        }
        memory.band_env[band] = env;
    }
}

/// Broadband limiter, in place
pub(crate) fn limit(memory: &mut ChannelMemory, limiter: &Limiter, y: &mut [f32]) {
    let mut env = memory.limiter_env;
    for sample in y.iter_mut() {
        env = follow(env, *sample, memory.limiter_ballistics);
        let gain = curve_gain_db(
            level_db(env, limiter.maxdb),
            limiter.tkgain,
            limiter.tk,
            limiter.cr,
            limiter.bolt,
        );
        *sample *= db_to_amplitude(gain);
    }
    memory.limiter_env = env;
}
