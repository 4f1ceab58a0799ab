use std::path::Path;

use super::conform::downmix_to_mono;
use super::generic::decode_with_symphonia;
use super::{DecodeStrategy, IngestProfile, StrategyError, Waveform, extension_of, finish_windowed};

/// Strategy 1: decode at the resource's own encoding, then cut the window at
/// its offset.
///
/// WAV and FLAC go through their dedicated strict readers. Any other name is
/// identified by content, so an upload saved as `.webm` that really holds
/// WAV or MP3 data still gets the offset window.
pub struct DirectDecode;

impl DecodeStrategy for DirectDecode {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn decode(&self, path: &Path, profile: &IngestProfile) -> Result<Waveform, StrategyError> {
        let (interleaved, sample_rate, channels) = match extension_of(path).as_str() {
            "wav" | "wave" => read_wav(path)?,
            "flac" => read_flac(path)?,
            _ => decode_with_symphonia(path)?,
        };
        let mono = downmix_to_mono(&interleaved, channels);
        finish_windowed(mono, sample_rate, profile)
    }
}

/// Read a WAV file into interleaved f32 in [-1, 1].
pub fn read_wav(path: &Path) -> Result<(Vec<f32>, u32, usize), StrategyError> {
    let reader = hound::WavReader::open(path).map_err(|e| StrategyError::Decode(e.to_string()))?;
    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| StrategyError::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample as u32);
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(|e| StrategyError::Decode(e.to_string()))?
        }
    };
    Ok((samples, spec.sample_rate, spec.channels.max(1) as usize))
}

fn read_flac(path: &Path) -> Result<(Vec<f32>, u32, usize), StrategyError> {
    let mut reader =
        claxon::FlacReader::open(path).map_err(|e| StrategyError::Decode(e.to_string()))?;
    let info = reader.streaminfo();
    let scale = int_scale(info.bits_per_sample);
    let samples: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 * scale))
        .collect::<Result<_, _>>()
        .map_err(|e| StrategyError::Decode(e.to_string()))?;
    Ok((samples, info.sample_rate, info.channels.max(1) as usize))
}

/// Full-scale factor for signed integer PCM of the given width.
fn int_scale(bits: u32) -> f32 {
    1.0 / (1u64 << bits.clamp(1, 32).saturating_sub(1)) as f32
}
