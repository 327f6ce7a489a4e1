//! IIR Filterbank
//!
//! Splits a chunk into `nchannel` bands with cascaded biquads: a low-pass
//! below the first band edge, band-passes between edges, and a high-pass
//! above the last edge. Synthesis is a plain sum of the bands.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};

use crate::error::DspError;
use crate::fitting::{Prescription, MAX_BANDS};
use crate::memory::ChannelMemory;

/// Number of bands a prescription asks for
pub(crate) fn band_count(prescription: &Prescription) -> Result<usize, DspError> {
    let nc = prescription.nchannel;
    if nc < 1 || nc as usize > MAX_BANDS {
        return Err(DspError::InvalidChannelCount(nc));
    }
    Ok(nc as usize)
}

fn band_coefficients(
    prescription: &Prescription,
    band: usize,
    bands: usize,
    sample_rate: f64,
) -> Result<Coefficients<f32>, DspError> {
    let edges = &prescription.cross_freq;
    let (filter, frequency, q) = if band == 0 {
        (Type::LowPass, edges[0], Q_BUTTERWORTH_F32)
    } else if band == bands - 1 {
        (Type::HighPass, edges[band - 1], Q_BUTTERWORTH_F32)
    } else {
        let (lo, hi) = (edges[band - 1], edges[band]);
        let center = (lo * hi).sqrt();
        (Type::BandPass, center, (center / (hi - lo).max(1.0)) as f32)
    };

    Coefficients::<f32>::from_params(filter, (sample_rate as f32).hz(), (frequency as f32).hz(), q)
        .map_err(|_| DspError::InvalidCoefficients {
            frequency,
            sample_rate,
        })
}

/// Design the filterbank into `memory`. `order` is the filter order; every
/// two orders add one biquad stage per band.
pub(crate) fn design(
    memory: &mut ChannelMemory,
    prescription: &Prescription,
    sample_rate: f64,
    order: i32,
    chunk_size: usize,
) -> Result<(), DspError> {
    let bands = band_count(prescription)?;
    let stages = (order.max(2) / 2) as usize;

    let mut filters = Vec::with_capacity(bands * stages);
    if bands > 1 {
        for band in 0..bands {
            let coeffs = band_coefficients(prescription, band, bands, sample_rate)?;
            for _ in 0..stages {
                filters.push(DirectForm2Transposed::<f32>::new(coeffs));
            }
        }
    }

    memory.filters = filters;
    memory.stages = stages;
    memory.bands = bands;
    memory.band_buf = vec![0.0; bands * chunk_size];
    memory.band_env = vec![0.0; bands];
    Ok(())
}

/// Split `x` into bands in `memory.band_buf`
pub(crate) fn analyze(memory: &mut ChannelMemory, x: &[f32]) {
    let cs = x.len();
    let ChannelMemory {
        filters,
        stages,
        bands,
        band_buf,
        ..
    } = memory;

    if *bands == 1 {
        band_buf[..cs].copy_from_slice(x);
        return;
    }

    for band in 0..*bands {
        let chain = &mut filters[band * *stages..(band + 1) * *stages];
        let out = &mut band_buf[band * cs..(band + 1) * cs];
        for (y, &sample) in out.iter_mut().zip(x) {
            let mut s = sample;
            for stage in chain.iter_mut() {
                s = stage.run(s);
            }
            *y = s;
        }
    }
}

/// Sum the bands back into `y`
pub(crate) fn synthesize(memory: &ChannelMemory, y: &mut [f32]) {
    let cs = y.len();
    y.fill(0.0);
    for band in 0..memory.bands {
        let src = &memory.band_buf[band * cs..(band + 1) * cs];
        for (out, &s) in y.iter_mut().zip(src) {
            *out += s;
        }
    }
}
