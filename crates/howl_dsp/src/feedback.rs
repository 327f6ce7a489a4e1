//! Adaptive Feedback Cancellation
//!
//! A normalized-LMS estimate of the acoustic path from the output back to
//! the input. `cancel` runs on the input side of a chunk and subtracts the
//! estimated feedback; `record` runs on the output side and stores what was
//! sent so the next chunk can reference it.

use crate::fitting::FeedbackSettings;
use crate::memory::ChannelMemory;
use crate::params::{FloatParam, IntParam};

/// Pre-emphasis coefficient of the whitening filter
const WHITEN_POLE: f32 = 0.7;

/// Allocate the feedback buffers and seed the parameter tables
pub(crate) fn prepare(memory: &mut ChannelMemory, afc: &FeedbackSettings, chunk_size: usize) {
    let afl = afc.afl.max(0) as usize;
    let wfl = afc.wfl.max(0) as usize;
    let pfl = afc.pfl.max(0) as usize;
    let fbl = afc.fbl.max(0) as usize;
    let hdel = afc.hdel.max(0) as usize;

    memory.efb = vec![0.0; afl];
    memory.ffr = vec![0.0; pfl];
    memory.qm = vec![0.0; afc.nqm.max(0) as usize];

    // Simulated acoustic path: a delayed, decaying ringing tail
    memory.sfb = (0..fbl)
        .map(|k| 0.05 * (-0.8_f32).powi(k as i32))
        .collect();

    // Whitening filter: 1, -a, then zeros (zero length disables whitening)
    memory.wfr = (0..wfl)
        .map(|k| match k {
            0 => 1.0,
            1 => -WHITEN_POLE,
            _ => 0.0,
        })
        .collect();
    memory.error_taps = vec![0.0; wfl];

    let ring = hdel + afl + fbl + chunk_size + 1;
    memory.history = vec![0.0; ring];
    memory.whitened = vec![0.0; ring];
    memory.history_pos = 0;
    memory.power = 0.0;
    memory.update_phase = 0;

    let params = &mut memory.params;
    params.set_int(IntParam::AdaptiveFilterLength, afc.afl);
    params.set_int(IntParam::WhitenFilterLength, afc.wfl);
    params.set_int(IntParam::BandLimitFilterLength, afc.pfl);
    params.set_int(IntParam::FeedbackLength, afc.fbl);
    params.set_int(IntParam::HardwareDelay, afc.hdel);
    params.set_int(IntParam::BandLimitUpdatePeriod, afc.pup);
    params.set_int(IntParam::Reinit, 0);
    params.set_float(FloatParam::StepSize, afc.mu);
    params.set_float(FloatParam::ForgettingFactor, afc.rho);
    params.set_float(FloatParam::PowerThreshold, afc.eps);
    params.set_float(FloatParam::BandLimitRate, afc.alf);
    params.set_float(FloatParam::SimulatedFeedbackGain, afc.fbg);
    params.set_float(FloatParam::FeedbackMagnitude, 0.0);
}

/// Restart the adaptive recursion if the reinit flag is down
fn reinitialize_if_requested(memory: &mut ChannelMemory) {
    if memory.params.reinit_pending() {
        memory.power = 0.0;
        memory.error_taps.fill(0.0);
        memory.update_phase = 0;
        memory.params.set_int(IntParam::Reinit, 1);
    }
}

/// Input side: add simulated feedback (if any), subtract the estimate, adapt
pub(crate) fn cancel(memory: &mut ChannelMemory, x: &mut [f32]) {
    reinitialize_if_requested(memory);

    let afl = memory.feedback_model_len();
    let hdel = memory.params.int(IntParam::HardwareDelay).max(0) as usize;
    let mu = memory.params.float(FloatParam::StepSize);
    let rho = memory.params.float(FloatParam::ForgettingFactor);
    let eps = memory.params.float(FloatParam::PowerThreshold);
    let fbg = memory.params.float(FloatParam::SimulatedFeedbackGain) as f32;

    for (n, sample) in x.iter_mut().enumerate() {
        // Output history has not seen this chunk yet; reach back past it
        if fbg != 0.0 {
            let simulated: f32 = memory
                .sfb
                .iter()
                .enumerate()
                .map(|(k, c)| c * memory.history_at(k.saturating_sub(n)))
                .sum();
            *sample += fbg * simulated;
        }

        // Delay of the output that reached the input `hdel` samples ago
        let base = hdel.saturating_sub(n + 1);
        let mut estimate = 0.0_f32;
        for k in 0..afl {
            estimate += memory.efb[k] * memory.history_at(base + k);
        }
        let error = *sample - estimate;
        *sample = error;

        if afl == 0 {
            continue;
        }

        // Whitened error
        let mut whitened_error = error;
        if !memory.error_taps.is_empty() {
            memory.error_taps.rotate_right(1);
            memory.error_taps[0] = error;
            whitened_error = memory
                .wfr
                .iter()
                .zip(&memory.error_taps)
                .map(|(w, e)| w * e)
                .sum();
        }

        let reference = memory.whitened_at(base);
        memory.power = rho * f64::from(reference * reference) + (1.0 - rho) * memory.power;
        let step = (mu / (afl as f64 * memory.power + eps)) as f32;

        for k in 0..afl {
            let u = memory.whitened_at(base + k);
            memory.efb[k] += step * whitened_error * u;
        }
    }
}

/// Output side: store the chunk, run the band-limit update and the metrics
pub(crate) fn record(memory: &mut ChannelMemory, afc: &mut FeedbackSettings, y: &[f32]) {
    let len = memory.history.len();
    if len == 0 {
        return;
    }

    for &sample in y {
        let pos = memory.history_pos;
        memory.history[pos] = sample;
        memory.history_pos = (pos + 1) % len;

        let whitened: f32 = memory
            .wfr
            .iter()
            .enumerate()
            .map(|(k, w)| w * memory.history_at(k))
            .sum();
        memory.whitened[pos] = if memory.wfr.is_empty() { sample } else { whitened };
    }

    let pup = memory.params.int(IntParam::BandLimitUpdatePeriod).max(1);
    memory.update_phase += 1;
    if memory.update_phase >= pup {
        memory.update_phase = 0;
        let alf = memory.params.float(FloatParam::BandLimitRate) as f32;
        for (persistent, &estimate) in memory.ffr.iter_mut().zip(&memory.efb) {
            *persistent += alf * (estimate - *persistent);
        }
    }

    let magnitude: f32 = memory.feedback_model().iter().map(|c| c * c).sum::<f32>().sqrt();
    memory
        .params
        .set_float(FloatParam::FeedbackMagnitude, f64::from(magnitude));

    if afc.sqm != 0 && !memory.qm.is_empty() {
        let nqm = memory.qm.len();
        let index = afc.iqm.max(0) as usize % nqm;
        memory.qm[index] = misalignment(&memory.efb, &memory.sfb);
        afc.iqm = ((index + 1) % nqm) as i32;
    }
}

/// Normalized distance between the estimate and the simulated path
fn misalignment(estimate: &[f32], truth: &[f32]) -> f32 {
    let len = estimate.len().max(truth.len());
    let mut error = 0.0_f32;
    let mut norm = 0.0_f32;
    for k in 0..len {
        let e = estimate.get(k).copied().unwrap_or(0.0);
        let t = truth.get(k).copied().unwrap_or(0.0);
        error += (e - t) * (e - t);
        norm += t * t;
    }
    if norm > 0.0 {
        error / norm
    } else {
        error
    }
}
