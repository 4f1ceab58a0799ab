//! Acoustic feature extraction: mean MFCC summary of a mono waveform.

pub mod mel;

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use serde::Serialize;
use thiserror::Error;

use crate::ingest::Waveform;
use mel::MelBank;

/// Coefficient count of the live upload path.
pub const LIVE_MFCC: usize = 13;
/// Coefficient count of the batch recommendation path.
pub const BATCH_MFCC: usize = 40;

const AMIN: f32 = 1e-10;
const TOP_DB: f32 = 80.0;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("Waveform is empty after conforming")]
    EmptyWaveform,
    #[error("Invalid MFCC parameters: {0}")]
    InvalidParameters(String),
}

/// Fixed-length vector of per-coefficient means.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcousticDescriptor(Vec<f32>);

impl AcousticDescriptor {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MfccConfig {
    pub n_mfcc: usize,
    pub n_fft: usize,
    pub hop: usize,
    pub n_mels: usize,
}

impl MfccConfig {
    pub fn with_coefficients(n_mfcc: usize) -> Self {
        Self {
            n_mfcc,
            n_fft: 2048,
            hop: 512,
            n_mels: 128,
        }
    }

    pub fn live() -> Self {
        Self::with_coefficients(LIVE_MFCC)
    }

    pub fn batch() -> Self {
        Self::with_coefficients(BATCH_MFCC)
    }

    fn validate(&self) -> Result<(), FeatureError> {
        if self.n_fft < 2 || self.hop == 0 {
            return Err(FeatureError::InvalidParameters(format!(
                "n_fft {} / hop {}",
                self.n_fft, self.hop
            )));
        }
        if self.n_mfcc == 0 || self.n_mfcc > self.n_mels {
            return Err(FeatureError::InvalidParameters(format!(
                "n_mfcc {} must be in 1..={}",
                self.n_mfcc, self.n_mels
            )));
        }
        Ok(())
    }
}

/// Reduces a waveform to an [`AcousticDescriptor`] of `n_mfcc` values.
///
/// Frames are centred (the signal is zero-padded by `n_fft / 2` on both
/// sides) and Hann-windowed. The log-mel matrix is floored at 80 dB below
/// its peak before the orthonormal DCT-II.
pub struct FeatureExtractor {
    config: MfccConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl FeatureExtractor {
    pub fn new(config: MfccConfig) -> Result<Self, FeatureError> {
        config.validate()?;
        let fft = FftPlanner::new().plan_fft_forward(config.n_fft);
        Ok(Self {
            config,
            fft,
            window: hann_periodic(config.n_fft),
        })
    }

    pub fn width(&self) -> usize {
        self.config.n_mfcc
    }

    pub fn extract(&self, waveform: &Waveform) -> Result<AcousticDescriptor, FeatureError> {
        if waveform.is_empty() {
            return Err(FeatureError::EmptyWaveform);
        }
        let log_mel = self.log_mel_frames(&waveform.samples, waveform.sample_rate);
        let n_frames = log_mel.len();

        let mut sums = vec![0.0_f64; self.config.n_mfcc];
        for frame in &log_mel {
            for (k, slot) in sums.iter_mut().enumerate() {
                *slot += dct2_ortho(frame, k);
            }
        }
        let means = sums.into_iter().map(|s| (s / n_frames as f64) as f32).collect();
        Ok(AcousticDescriptor(means))
    }

    /// Power-to-dB mel frames, clamped to `TOP_DB` below the global maximum.
    fn log_mel_frames(&self, samples: &[f32], sample_rate: u32) -> Vec<Vec<f32>> {
        let n_fft = self.config.n_fft;
        let pad = n_fft / 2;
        let n_frames = 1 + samples.len() / self.config.hop;
        let bank = MelBank::new(sample_rate, n_fft, self.config.n_mels);

        let mut buf = vec![Complex::new(0.0_f32, 0.0); n_fft];
        let mut power = vec![0.0_f32; n_fft / 2 + 1];
        let mut frames = Vec::with_capacity(n_frames);
        let mut peak = f32::NEG_INFINITY;

        for frame_idx in 0..n_frames {
            // Position in the padded signal is frame_idx * hop; shift back by pad
            let start = (frame_idx * self.config.hop) as isize - pad as isize;
            for (i, slot) in buf.iter_mut().enumerate() {
                let pos = start + i as isize;
                let sample = if pos >= 0 {
                    samples.get(pos as usize).copied().unwrap_or(0.0)
                } else {
                    0.0
                };
                *slot = Complex::new(sample * self.window[i], 0.0);
            }
            self.fft.process(&mut buf);
            for (p, c) in power.iter_mut().zip(&buf) {
                *p = c.norm_sqr();
            }

            let mut mel = vec![0.0_f32; bank.len()];
            bank.apply_into(&power, &mut mel);
            for v in mel.iter_mut() {
                *v = 10.0 * v.max(AMIN).log10();
                peak = peak.max(*v);
            }
            frames.push(mel);
        }

        let floor = peak - TOP_DB;
        for v in frames.iter_mut().flatten() {
            *v = v.max(floor);
        }
        frames
    }
}

fn hann_periodic(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / n as f64).cos()) as f32)
        .collect()
}

/// Coefficient `k` of the orthonormal DCT-II of `x`.
fn dct2_ortho(x: &[f32], k: usize) -> f64 {
    let n = x.len() as f64;
    let sum: f64 = x
        .iter()
        .enumerate()
        .map(|(i, &v)| v as f64 * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n)).cos())
        .sum();
    let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
    sum * scale
}
