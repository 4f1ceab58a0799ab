use std::path::Path;
use std::process::Command;

use super::conform::downmix_to_mono;
use super::native::read_wav;
use super::{
    DecodeStrategy, IngestProfile, StrategyError, TranscodeSettings, Waveform, finish_windowed,
};

/// Strategy 3: normalize through ffmpeg into a scratch WAV, then decode that.
pub struct TranscodeDecode {
    settings: TranscodeSettings,
}

impl TranscodeDecode {
    pub fn new(settings: TranscodeSettings) -> Self {
        Self { settings }
    }

    fn ffmpeg_available(&self) -> bool {
        Command::new(&self.settings.ffmpeg)
            .arg("-version")
            .output()
            .is_ok()
    }
}

impl DecodeStrategy for TranscodeDecode {
    fn name(&self) -> &'static str {
        "transcode"
    }

    fn decode(&self, path: &Path, profile: &IngestProfile) -> Result<Waveform, StrategyError> {
        if !self.ffmpeg_available() {
            return Err(StrategyError::TranscoderNotFound(
                self.settings.ffmpeg.display().to_string(),
            ));
        }

        // The scratch WAV is deleted when `scratch` drops, on every return path.
        let scratch = tempfile::Builder::new()
            .prefix("moodshift-transcode-")
            .suffix(".wav")
            .tempfile_in(&self.settings.scratch_dir)?
            .into_temp_path();

        let mut cmd = Command::new(&self.settings.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(path)
            .args(["-vn", "-ac", "1"]);
        if let Some(rate) = profile.target_rate {
            cmd.arg("-ar").arg(rate.to_string());
        }
        cmd.args(["-f", "wav", "-acodec", "pcm_s16le"]).arg(&*scratch);

        let output = cmd.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StrategyError::Transcoder(stderr.trim().to_string()));
        }

        let (interleaved, sample_rate, channels) = read_wav(&scratch)?;
        let mono = downmix_to_mono(&interleaved, channels);
        finish_windowed(mono, sample_rate, profile)
    }
}
