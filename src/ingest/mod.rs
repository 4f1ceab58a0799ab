//! Audio ingestion: turn an arbitrary uploaded or on-disk audio resource into
//! a mono waveform, trying an ordered chain of decode strategies.
//!
//! 1. [`native::DirectDecode`]: the resource's own encoding (WAV via hound, FLAC via claxon,
//!    anything else identified by content), windowed at the offset
//! 2. [`generic::GenericDecode`]: symphonia probe + manual conform (mono, rate, length)
//! 3. [`transcode::TranscodeDecode`]: ffmpeg into a scratch WAV, then decode that
//!
//! A strategy runs only if every earlier one failed. Adding a strategy means
//! pushing another [`DecodeStrategy`] onto the chain.

pub mod conform;
pub mod generic;
pub mod native;
pub mod transcode;

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Target rate of the live emotion path.
pub const LIVE_SAMPLE_RATE: u32 = 44_100;
pub const LIVE_OFFSET_SECS: f32 = 0.5;
pub const LIVE_DURATION_SECS: f32 = 2.5;

/// Mono samples plus their rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Fixed analysis window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub offset_secs: f32,
    pub duration_secs: f32,
}

/// How decoded audio is conformed before it leaves the ingestor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestProfile {
    /// Resample to this rate; `None` keeps the native rate.
    pub target_rate: Option<u32>,
    /// Fixed window; `None` keeps the whole signal.
    pub window: Option<Window>,
}

impl IngestProfile {
    /// Live inference path: fixed rate and fixed window.
    pub fn live(sample_rate: u32, offset_secs: f32, duration_secs: f32) -> Self {
        Self {
            target_rate: Some(sample_rate),
            window: Some(Window { offset_secs, duration_secs }),
        }
    }

    /// Offline path: native rate, whole file.
    pub fn offline() -> Self {
        Self { target_rate: None, window: None }
    }
}

impl Default for IngestProfile {
    fn default() -> Self {
        Self::live(LIVE_SAMPLE_RATE, LIVE_OFFSET_SECS, LIVE_DURATION_SECS)
    }
}

/// Failure of a single strategy. Never escapes the chain on its own.
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("resample failed: {0}")]
    Resample(String),
    #[error("decoded zero samples")]
    Empty,
    #[error("clip is shorter than the {offset_secs}s window offset")]
    WindowEmpty { offset_secs: f32 },
    #[error("ffmpeg not found at '{0}'")]
    TranscoderNotFound(String),
    #[error("ffmpeg failed: {0}")]
    Transcoder(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Unsupported audio format for {}: {}", path.display(), attempts.join("; "))]
    UnsupportedFormat { path: PathBuf, attempts: Vec<String> },
    #[error("Audio resource not found: {}", .0.display())]
    NotFound(PathBuf),
}

/// One way of producing a waveform from a resource.
pub trait DecodeStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn decode(&self, path: &Path, profile: &IngestProfile) -> Result<Waveform, StrategyError>;
}

/// Where strategy 3 finds its transcoder and writes its scratch artifacts.
#[derive(Debug, Clone)]
pub struct TranscodeSettings {
    pub ffmpeg: PathBuf,
    pub scratch_dir: PathBuf,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

pub struct AudioIngestor {
    profile: IngestProfile,
    strategies: Vec<Box<dyn DecodeStrategy>>,
}

impl AudioIngestor {
    /// The standard three-strategy chain.
    pub fn new(profile: IngestProfile, transcode: TranscodeSettings) -> Self {
        Self::with_strategies(
            profile,
            vec![
                Box::new(native::DirectDecode),
                Box::new(generic::GenericDecode),
                Box::new(transcode::TranscodeDecode::new(transcode)),
            ],
        )
    }

    pub fn with_strategies(profile: IngestProfile, strategies: Vec<Box<dyn DecodeStrategy>>) -> Self {
        Self { profile, strategies }
    }

    /// Try each strategy in order; the first waveform wins.
    pub fn ingest(&self, path: &Path) -> Result<Waveform, IngestError> {
        if !path.exists() {
            return Err(IngestError::NotFound(path.to_path_buf()));
        }

        let mut attempts = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            match strategy.decode(path, &self.profile) {
                Ok(waveform) => {
                    log::debug!(
                        "Decoded {} with {} ({} samples @ {} Hz)",
                        path.display(),
                        strategy.name(),
                        waveform.samples.len(),
                        waveform.sample_rate
                    );
                    return Ok(waveform);
                }
                Err(e) => {
                    log::debug!("{} failed for {}: {}", strategy.name(), path.display(), e);
                    attempts.push(format!("{}: {}", strategy.name(), e));
                }
            }
        }

        log::warn!("All decode strategies failed for {}", path.display());
        Err(IngestError::UnsupportedFormat {
            path: path.to_path_buf(),
            attempts,
        })
    }
}

/// Lowercased file extension, or "" if there is none.
pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Shared by the strategies that decode at a fixed offset/duration: resample,
/// then cut the window. An empty window fails the strategy.
pub(crate) fn finish_windowed(
    mono: Vec<f32>,
    native_rate: u32,
    profile: &IngestProfile,
) -> Result<Waveform, StrategyError> {
    if mono.is_empty() {
        return Err(StrategyError::Empty);
    }
    let (samples, sample_rate) = match profile.target_rate {
        Some(rate) => (conform::resample(&mono, native_rate, rate)?, rate),
        None => (mono, native_rate),
    };
    let samples = match &profile.window {
        Some(window) => {
            let cut = conform::take_window(&samples, sample_rate, window);
            if cut.is_empty() {
                return Err(StrategyError::WindowEmpty { offset_secs: window.offset_secs });
            }
            cut
        }
        None => samples,
    };
    Ok(Waveform { samples, sample_rate })
}


#[cfg(test)]
mod tests {
    use super::test_support::{sine, write_wav};
    use super::*;
    use tempfile::TempDir;

    fn isolated_ingestor(profile: IngestProfile, scratch: &Path) -> AudioIngestor {
        AudioIngestor::new(
            profile,
            TranscodeSettings {
                ffmpeg: PathBuf::from("ffmpeg"),
                scratch_dir: scratch.to_path_buf(),
            },
        )
    }

    #[test]
    fn test_live_wav_conformed_to_window() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir.path().join("voice.wav"), 16_000, 1, &sine(220.0, 16_000, 4.0));
        let ingestor = isolated_ingestor(IngestProfile::default(), dir.path());

        let wf = ingestor.ingest(&path).unwrap();
        assert_eq!(wf.sample_rate, LIVE_SAMPLE_RATE);
        assert_eq!(wf.samples.len(), 110_250);
    }

    #[test]
    fn test_silent_audio_is_not_a_failure() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir.path().join("silence.wav"), 22_050, 1, &vec![0.0; 22_050 * 3]);
        let ingestor = isolated_ingestor(IngestProfile::default(), dir.path());

        let wf = ingestor.ingest(&path).unwrap();
        assert!(!wf.is_empty());
        assert!(wf.samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_very_short_clip_is_padded() {
        let dir = TempDir::new().unwrap();
        // 0.2 s: shorter than the 0.5 s offset, so the direct strategy's window is empty
        let path = write_wav(&dir.path().join("blip.wav"), 44_100, 1, &sine(440.0, 44_100, 0.2));
        let ingestor = isolated_ingestor(IngestProfile::default(), dir.path());

        let wf = ingestor.ingest(&path).unwrap();
        assert_eq!(wf.samples.len(), 110_250);
        // Tail is zero padding
        assert!(wf.samples[9_000..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_mislabelled_container_falls_through_to_generic() {
        let dir = TempDir::new().unwrap();
        // WAV bytes behind a .flac extension: the native FLAC reader rejects the header
        let path = write_wav(&dir.path().join("upload.flac"), 16_000, 2, &sine(330.0, 16_000, 3.0));

        assert!(native::DirectDecode.decode(&path, &IngestProfile::default()).is_err());

        let ingestor = isolated_ingestor(IngestProfile::default(), dir.path());
        let wf = ingestor.ingest(&path).unwrap();
        assert_eq!(wf.sample_rate, LIVE_SAMPLE_RATE);
        assert_eq!(wf.samples.len(), 110_250);
    }

    #[test]
    fn test_damaged_wav_header_recovered_by_generic() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir.path().join("stream.wav"), 44_100, 1, &sine(440.0, 44_100, 3.0));

        // Streamed-WAV sizes: RIFF and data lengths both 0xFFFFFFFF
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        let data = bytes.windows(4).position(|w| w == b"data").unwrap();
        bytes[data + 4..data + 8].copy_from_slice(&u32::MAX.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let profile = IngestProfile::default();
        assert!(native::DirectDecode.decode(&path, &profile).is_err());

        let ingestor = AudioIngestor::with_strategies(
            profile,
            vec![Box::new(native::DirectDecode), Box::new(generic::GenericDecode)],
        );
        let wf = ingestor.ingest(&path).unwrap();
        assert_eq!(wf.samples.len(), 110_250);
        // Generic keeps the clip from 0 s, so the sine's zero crossing leads
        assert!(wf.samples[0].abs() < 1e-3);
        assert!(wf.samples.iter().any(|&s| s.abs() > 0.1));
    }

    #[test]
    fn test_garbage_exhausts_chain_and_leaves_no_scratch() {
        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir_all(&scratch).unwrap();
        let path = dir.path().join("noise.webm");
        std::fs::write(&path, b"definitely not audio, just some bytes".repeat(64)).unwrap();

        let ingestor = isolated_ingestor(IngestProfile::default(), &scratch);
        match ingestor.ingest(&path) {
            Err(IngestError::UnsupportedFormat { attempts, .. }) => assert_eq!(attempts.len(), 3),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn test_offline_profile_keeps_native_rate_and_length() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir.path().join("long.wav"), 22_050, 2, &sine(100.0, 22_050, 2.0));
        let ingestor = isolated_ingestor(IngestProfile::offline(), dir.path());

        let wf = ingestor.ingest(&path).unwrap();
        assert_eq!(wf.sample_rate, 22_050);
        // Interleaved stereo of 44_100 values → 22_050 mono frames
        assert_eq!(wf.samples.len(), 22_050);
    }

    #[test]
    fn test_missing_file() {
        let ingestor = AudioIngestor::new(IngestProfile::default(), TranscodeSettings::default());
        assert!(matches!(
            ingestor.ingest(Path::new("/nonexistent/clip.wav")),
            Err(IngestError::NotFound(_))
        ));
    }

    struct Fails;
    impl DecodeStrategy for Fails {
        fn name(&self) -> &'static str {
            "fails"
        }
        fn decode(&self, _: &Path, _: &IngestProfile) -> Result<Waveform, StrategyError> {
            Err(StrategyError::Decode("nope".into()))
        }
    }

    struct Constant(u32);
    impl DecodeStrategy for Constant {
        fn name(&self) -> &'static str {
            "constant"
        }
        fn decode(&self, _: &Path, _: &IngestProfile) -> Result<Waveform, StrategyError> {
            Ok(Waveform { samples: vec![0.1; 4], sample_rate: self.0 })
        }
    }

    #[test]
    fn test_first_success_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("any.bin");
        std::fs::write(&path, b"x").unwrap();

        let ingestor = AudioIngestor::with_strategies(
            IngestProfile::default(),
            vec![Box::new(Fails), Box::new(Constant(8_000)), Box::new(Constant(16_000))],
        );
        assert_eq!(ingestor.ingest(&path).unwrap().sample_rate, 8_000);
    }
}
