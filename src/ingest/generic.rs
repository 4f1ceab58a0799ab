use std::fs::File;
use std::path::Path;

use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
    io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};

use super::conform::{downmix_to_mono, fit_length, resample, seconds_to_samples};
use super::{DecodeStrategy, IngestProfile, StrategyError, Waveform, extension_of};

/// Strategy 2: permissive container/codec probe, then conform by hand.
///
/// The window here always starts at zero: the clip is truncated or zero-padded
/// at the end to the window duration.
pub struct GenericDecode;

impl DecodeStrategy for GenericDecode {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn decode(&self, path: &Path, profile: &IngestProfile) -> Result<Waveform, StrategyError> {
        let (interleaved, native_rate, channels) = decode_with_symphonia(path)?;
        let mono = downmix_to_mono(&interleaved, channels);
        if mono.is_empty() {
            return Err(StrategyError::Empty);
        }

        let (mono, sample_rate) = match profile.target_rate {
            Some(rate) => (resample(&mono, native_rate, rate)?, rate),
            None => (mono, native_rate),
        };
        let samples = match &profile.window {
            Some(window) => fit_length(mono, seconds_to_samples(window.duration_secs, sample_rate)),
            None => mono,
        };
        Ok(Waveform { samples, sample_rate })
    }
}

/// Decode every packet of the default track into interleaved f32.
/// The container is identified by content; the extension is only a hint.
pub(crate) fn decode_with_symphonia(path: &Path) -> Result<(Vec<f32>, u32, usize), StrategyError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    let ext = extension_of(path);
    if !ext.is_empty() {
        hint.with_extension(&ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| StrategyError::Decode(format!("probe: {e}")))?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| StrategyError::Decode("no default track".into()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| StrategyError::Decode("missing sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| StrategyError::Decode(format!("codec: {e}")))?;

    let mut samples = Vec::new();
    let mut channels = codec_params.channels.map(|c| c.count()).unwrap_or(0);
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // End of stream
            Err(Error::IoError(_)) => break,
            Err(Error::ResetRequired) => break,
            Err(e) => return Err(StrategyError::Decode(format!("packet: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let audio_buf = match decoder.decode(&packet) {
            Ok(buf) => buf,
            // Corrupt frame: skip it, keep the rest
            Err(Error::DecodeError(e)) => {
                log::debug!("Skipping undecodable packet in {}: {e}", path.display());
                continue;
            }
            Err(e) => return Err(StrategyError::Decode(format!("decode: {e}"))),
        };
        let spec = *audio_buf.spec();
        channels = spec.channels.count();
        let mut sample_buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(audio_buf);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() {
        return Err(StrategyError::Empty);
    }
    Ok((samples, sample_rate, channels.max(1)))
}
