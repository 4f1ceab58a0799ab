use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use moodshift::analyzer::{FeatureExtractor, MfccConfig};
use moodshift::codes::HolidaySet;
use moodshift::config::AppConfig;
use moodshift::context::{ContextEncoder, UserContext};
use moodshift::genres::GenreLabelTable;
use moodshift::ingest::{AudioIngestor, IngestProfile, TranscodeSettings};
use moodshift::model::{EmotionLabels, TfliteModel};
use moodshift::pipeline::{EmotionPipeline, Recommender, TOP_K};
use moodshift::server::{self, ServiceContext};
use moodshift::weather::WeatherResolver;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "moodshift",
    version,
    about = "Voice mood + situational context → genre recommendations"
)]
struct Cli {
    /// Config file (defaults to ~/.config/moodshift/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend genres for a voice sample and the current context
    Recommend {
        /// Voice sample (WAV, FLAC, MP3, M4A, or anything ffmpeg reads)
        audio: PathBuf,

        /// City for the weather lookup
        #[arg(long)]
        city: String,

        /// OpenWeatherMap API key
        #[arg(long)]
        weather_api_key: String,

        /// home, public place, friends house
        #[arg(long, default_value = "home")]
        location: String,

        /// alone, my partner, friends, colleagues, parents, public, my family
        #[arg(long, default_value = "alone")]
        social: String,

        /// healthy or anything else
        #[arg(long, default_value = "healthy")]
        physical: String,

        /// user (decided) or given
        #[arg(long, default_value = "user")]
        decision: String,

        /// 1 for the first interaction, n for the n-th
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        interaction: u32,

        /// Extra holidays (YYYY-MM-DD), added to the config file's list
        #[arg(long, num_args = 0..)]
        holidays: Vec<String>,

        /// index,name genre table (overrides config)
        #[arg(long)]
        genre_map: Option<PathBuf>,

        /// Print the full recommendation as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the live emotion service (POST /predict)
    Serve {
        /// Port (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load(cli.config.as_deref());

    match cli.command {
        Commands::Recommend {
            audio,
            city,
            weather_api_key,
            location,
            social,
            physical,
            decision,
            interaction,
            holidays,
            genre_map,
            json,
        } => {
            // Models first: nothing useful happens without them
            let emotion_model = load_model(&config, &config.models.emotion, "emotion model")?;
            let genre_model = load_model(&config, &config.models.genre, "genre model")?;

            let emotion = EmotionPipeline::new(
                AudioIngestor::new(IngestProfile::offline(), transcode_settings(&config)),
                FeatureExtractor::new(MfccConfig::with_coefficients(config.audio.batch_mfcc))
                    .context("Invalid batch MFCC settings")?,
                Arc::new(emotion_model),
                EmotionLabels::batch(),
            )
            .context("Emotion model does not fit the batch feature settings")?;

            let holidays = HolidaySet::new(config.holidays.iter().cloned().chain(holidays));
            let genre_table = genre_map.unwrap_or_else(|| config.genre_table.clone());
            let weather = WeatherResolver::new(
                &config.weather.endpoint,
                &weather_api_key,
                Duration::from_secs(config.weather.timeout_secs),
                &config.weather.units,
            );

            let recommender = Recommender::new(
                emotion,
                Box::new(genre_model),
                ContextEncoder::new(holidays),
                GenreLabelTable::load(&genre_table),
                Box::new(weather),
            );
            let user = UserContext {
                location,
                social,
                physical,
                decision,
                interaction,
            };

            let now = chrono::Local::now().naive_local();
            let rec = recommender
                .recommend(&audio, &city, &user, now)
                .with_context(|| format!("Failed to process {}", audio.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&rec)?);
            } else {
                println!("Detected emotion: {}", rec.emotion.label);
                println!("Context vector: {}", rec.context);
                println!("Top-{TOP_K} genres: {:?}", rec.genre_names());
            }
        }

        Commands::Serve { port, bind } => {
            let labels = EmotionLabels::from_features_csv(&config.models.live_labels)
                .with_context(|| {
                    format!(
                        "Failed to load emotion labels from {}",
                        config.models.live_labels.display()
                    )
                })?;
            let model = load_model(&config, &config.models.live_emotion, "live emotion model")?;

            let profile = IngestProfile::live(
                config.audio.live_sample_rate,
                config.audio.live_offset_secs,
                config.audio.live_duration_secs,
            );
            let emotion = EmotionPipeline::new(
                AudioIngestor::new(profile, transcode_settings(&config)),
                FeatureExtractor::new(MfccConfig::with_coefficients(config.audio.live_mfcc))
                    .context("Invalid live MFCC settings")?,
                Arc::new(model),
                labels,
            )
            .context("Live emotion model does not fit the live feature settings")?;

            let ctx = Arc::new(ServiceContext {
                emotion,
                scratch_dir: config.audio.resolve_scratch_dir(),
            });

            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let port = port.unwrap_or(config.server.port);
            let ip: IpAddr = bind
                .parse()
                .with_context(|| format!("Invalid bind address {bind}"))?;
            let addr = SocketAddr::new(ip, port);

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime
                .block_on(server::serve(ctx, addr))
                .with_context(|| format!("Server on {addr} failed"))?;
        }
    }

    Ok(())
}

fn load_model(config: &AppConfig, path: &Path, what: &str) -> Result<TfliteModel> {
    TfliteModel::load(path, &config.models.runtime, config.models.threads)
        .with_context(|| format!("Failed to load {what} from {}", path.display()))
}

fn transcode_settings(config: &AppConfig) -> TranscodeSettings {
    TranscodeSettings {
        ffmpeg: config.audio.ffmpeg.clone(),
        scratch_dir: config.audio.resolve_scratch_dir(),
    }
}
