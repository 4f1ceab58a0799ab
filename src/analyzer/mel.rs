//! Slaney-style mel filterbank (area-normalized triangles on the Slaney mel scale).

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4_f64.ln() / 27.0
}

pub(crate) fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub(crate) fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        mel * F_SP
    }
}

/// Sparse triangular filters over the `n_fft / 2 + 1` power bins.
pub(crate) struct MelBank {
    filters: Vec<Vec<(usize, f32)>>,
}

impl MelBank {
    pub(crate) fn new(sample_rate: u32, n_fft: usize, n_mels: usize) -> Self {
        let sr = sample_rate.max(1) as f64;
        let n_bins = n_fft / 2 + 1;
        let fft_freqs: Vec<f64> = (0..n_bins).map(|k| k as f64 * sr / n_fft as f64).collect();

        let mel_max = hz_to_mel(sr / 2.0);
        let mel_f: Vec<f64> = (0..n_mels + 2)
            .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
            .collect();

        let filters = (0..n_mels)
            .map(|m| {
                let (lo, mid, hi) = (mel_f[m], mel_f[m + 1], mel_f[m + 2]);
                let enorm = 2.0 / (hi - lo);
                fft_freqs
                    .iter()
                    .enumerate()
                    .filter_map(|(bin, &f)| {
                        let lower = (f - lo) / (mid - lo);
                        let upper = (hi - f) / (hi - mid);
                        let w = lower.min(upper).max(0.0) * enorm;
                        (w > 0.0).then_some((bin, w as f32))
                    })
                    .collect()
            })
            .collect();
        Self { filters }
    }

    pub(crate) fn len(&self) -> usize {
        self.filters.len()
    }

    pub(crate) fn apply_into(&self, power: &[f32], out: &mut [f32]) {
        for (slot, filter) in out.iter_mut().zip(&self.filters) {
            let sum: f64 = filter
                .iter()
                .map(|&(bin, w)| power.get(bin).copied().unwrap_or(0.0) as f64 * w as f64)
                .sum();
            *slot = sum as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mel_scale_is_linear_below_1khz() {
        assert!((hz_to_mel(200.0) - 3.0).abs() < 1e-9);
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-9);
        for hz in [50.0, 440.0, 1000.0, 4000.0, 16_000.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
        }
    }

    #[test]
    fn test_every_band_has_weight_at_44k() {
        let bank = MelBank::new(44_100, 2048, 128);
        assert_eq!(bank.len(), 128);
        assert!(bank.filters.iter().all(|f| !f.is_empty()));
        assert!(bank.filters.iter().flatten().all(|&(bin, w)| bin <= 1024 && w > 0.0));
    }

    #[test]
    fn test_tone_lands_in_matching_band() {
        let bank = MelBank::new(16_000, 512, 40);
        // Energy only in the bin nearest 1 kHz
        let mut power = vec![0.0_f32; 257];
        power[32] = 1.0;
        let mut out = vec![0.0_f32; 40];
        bank.apply_into(&power, &mut out);

        let hot = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let mel_max = hz_to_mel(8000.0);
        let center_hz = mel_to_hz(mel_max * (hot + 1) as f64 / 41.0);
        assert!((center_hz - 1000.0).abs() < 150.0, "band centre {center_hz}");
    }
}
