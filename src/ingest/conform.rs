//! Sample-level conforming: downmix, resample, window and length fitting.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::{StrategyError, Window};

/// Sinc filter length in input frames.
const SINC_LEN: usize = 128;

/// Average interleaved frames down to one channel.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Band-limited sinc resampler. Output length is the input duration at the
/// new rate, aligned with the input (the filter delay is dropped).
pub fn resample(samples: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>, StrategyError> {
    let input_rate = input_rate.max(1);
    let output_rate = output_rate.max(1);
    if samples.is_empty() || input_rate == output_rate {
        return Ok(samples.to_vec());
    }
    let ratio = output_rate as f64 / input_rate as f64;
    let out_len = ((samples.len() as f64 * ratio).round() as usize).max(1);

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    // Whole clip as one chunk, with a zero tail to flush the filter
    let mut padded = samples.to_vec();
    padded.resize(samples.len() + SINC_LEN, 0.0);
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, padded.len(), 1)
        .map_err(|e| StrategyError::Resample(e.to_string()))?;
    let delay = resampler.output_delay();

    let input = vec![padded];
    let output = resampler
        .process(&input, None)
        .map_err(|e| StrategyError::Resample(e.to_string()))?;
    let aligned: Vec<f32> = output
        .into_iter()
        .next()
        .unwrap_or_default()
        .into_iter()
        .skip(delay)
        .collect();
    Ok(fit_length(aligned, out_len))
}

pub fn seconds_to_samples(seconds: f32, sample_rate: u32) -> usize {
    (seconds.max(0.0) as f64 * sample_rate as f64).round() as usize
}

/// Slice `[offset, offset + duration)` out of the signal, clamped to its end.
/// Shorter clips yield a shorter (possibly empty) window; nothing is padded.
pub fn take_window(samples: &[f32], sample_rate: u32, window: &Window) -> Vec<f32> {
    let start = seconds_to_samples(window.offset_secs, sample_rate).min(samples.len());
    let len = seconds_to_samples(window.duration_secs, sample_rate);
    let end = start.saturating_add(len).min(samples.len());
    samples[start..end].to_vec()
}

/// Truncate or zero-pad at the end to exactly `len` samples.
pub fn fit_length(mut samples: Vec<f32>, len: usize) -> Vec<f32> {
    samples.resize(len, 0.0);
    samples
}
