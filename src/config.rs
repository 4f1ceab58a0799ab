use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

use crate::analyzer::{BATCH_MFCC, LIVE_MFCC};
use crate::ingest::{LIVE_DURATION_SECS, LIVE_OFFSET_SECS, LIVE_SAMPLE_RATE};
use crate::weather::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_SECS};

/// Application configuration loaded from TOML config file.
/// Every field has a default; the file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub models: ModelsConfig,
    pub audio: AudioConfig,
    pub weather: WeatherConfig,
    pub server: ServerConfig,
    /// `index,name` genre table.
    pub genre_table: PathBuf,
    /// Holiday dates (`YYYY-MM-DD`) for the day-type code.
    pub holidays: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            models: ModelsConfig::default(),
            audio: AudioConfig::default(),
            weather: WeatherConfig::default(),
            server: ServerConfig::default(),
            genre_table: PathBuf::from("code_text_genre.csv"),
            holidays: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Batch emotion model (40 MFCC in, 8 emotions out).
    pub emotion: PathBuf,
    /// Live emotion model (13 MFCC in, one output per training label).
    pub live_emotion: PathBuf,
    /// Features CSV whose `labels` column fixes the live model's output order.
    pub live_labels: PathBuf,
    /// Genre recommender (12-column context vector in).
    pub genre: PathBuf,
    /// TensorFlow Lite C library.
    pub runtime: PathBuf,
    pub threads: i32,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            emotion: PathBuf::from("models/emotion_batch.tflite"),
            live_emotion: PathBuf::from("models/emotion_live.tflite"),
            live_labels: PathBuf::from("features.csv"),
            genre: PathBuf::from("models/genre.tflite"),
            runtime: PathBuf::from(default_runtime_library()),
            threads: 1,
        }
    }
}

fn default_runtime_library() -> &'static str {
    if cfg!(target_os = "macos") {
        "libtensorflowlite_c.dylib"
    } else if cfg!(target_os = "windows") {
        "tensorflowlite_c.dll"
    } else {
        "libtensorflowlite_c.so"
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub live_sample_rate: u32,
    pub live_offset_secs: f32,
    pub live_duration_secs: f32,
    pub live_mfcc: usize,
    pub batch_mfcc: usize,
    pub ffmpeg: PathBuf,
    /// Uploads and transcoded artifacts. Defaults to the system temp dir.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            live_sample_rate: LIVE_SAMPLE_RATE,
            live_offset_secs: LIVE_OFFSET_SECS,
            live_duration_secs: LIVE_DURATION_SECS,
            live_mfcc: LIVE_MFCC,
            batch_mfcc: BATCH_MFCC,
            ffmpeg: PathBuf::from("ffmpeg"),
            scratch_dir: None,
        }
    }
}

impl AudioConfig {
    pub fn resolve_scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
    pub units: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            units: "metric".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5001,
        }
    }
}

impl AppConfig {
    /// Load config from `explicit`, or `~/.config/moodshift/config.toml`.
    /// Returns defaults if the file doesn't exist.
    /// Logs a warning if the file exists but can't be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Self {
        let config_path = explicit.map(Path::to_path_buf).or_else(Self::config_path);
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Some(path) if explicit.is_some() => {
                log::warn!("Config file {} not found. Using defaults.", path.display());
                Self::default()
            }
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.audio.live_sample_rate, 44_100);
        assert_eq!(config.audio.live_mfcc, 13);
        assert_eq!(config.audio.batch_mfcc, 40);
        assert_eq!(config.weather.timeout_secs, 10);
        assert_eq!(config.genre_table, PathBuf::from("code_text_genre.csv"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = AppConfig::parse(
            r#"
            holidays = ["2024-12-25", "2025-01-01"]

            [server]
            port = 8080

            [models]
            runtime = "/opt/tflite/libtensorflowlite_c.so"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.holidays.len(), 2);
        assert_eq!(config.models.runtime, PathBuf::from("/opt/tflite/libtensorflowlite_c.so"));
        assert_eq!(config.models.threads, 1);
        assert_eq!(config.audio.live_offset_secs, 0.5);
    }

    #[test]
    fn test_unparseable_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        let config = AppConfig::load(Some(&path));
        assert_eq!(config.server.port, 5001);
    }

    #[test]
    fn test_explicit_file_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("moodshift.toml");
        std::fs::write(&path, "[weather]\nunits = \"imperial\"\n").unwrap();
        let config = AppConfig::load(Some(&path));
        assert_eq!(config.weather.units, "imperial");
        assert_eq!(config.weather.timeout_secs, 10);
    }

    #[test]
    fn test_missing_explicit_file_uses_defaults() {
        let config = AppConfig::load(Some(Path::new("/nonexistent/moodshift.toml")));
        assert_eq!(config.server.port, 5001);
    }
}
