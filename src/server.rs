//! Live upload service: `POST /predict` with a multipart `file` field.

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::ingest::IngestError;
use crate::model::EmotionResult;
use crate::pipeline::{EmotionPipeline, PipelineError};

pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;
const DEFAULT_UPLOAD_EXT: &str = "webm";

const NO_FILE_PART: &str = "No file part";
const NO_SELECTED_FILE: &str = "No selected file";
const UNSUPPORTED: &str = "Unsupported audio format. Please try recording again.";
const PROCESSING_FAILED: &str = "Failed to process audio. Please try again.";

/// Everything a request needs, built once at startup and shared read-only.
pub struct ServiceContext {
    pub emotion: EmotionPipeline,
    /// Uploads are persisted here for the duration of one request.
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub gender: String,
    pub emotion: String,
    pub label_raw: String,
    pub probabilities: Vec<f32>,
    pub confidence: f32,
    pub predicted_class: usize,
}

impl From<EmotionResult> for PredictResponse {
    fn from(result: EmotionResult) -> Self {
        Self {
            gender: result.gender().to_string(),
            emotion: result.emotion().to_string(),
            label_raw: result.label,
            probabilities: result.probabilities,
            confidence: result.confidence,
            predicted_class: result.index,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

fn error(status: StatusCode, message: &'static str) -> Response {
    (status, Json(ErrorBody { error: message })).into_response()
}

pub fn router(ctx: Arc<ServiceContext>) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

pub async fn serve(ctx: Arc<ServiceContext>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Cannot listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}

struct Upload {
    filename: Option<String>,
    data: Vec<u8>,
}

async fn predict(
    State(ctx): State<Arc<ServiceContext>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(e) => {
            log::debug!("Rejected non-multipart request: {e}");
            return error(StatusCode::BAD_REQUEST, NO_FILE_PART);
        }
    };

    let mut upload: Option<Upload> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                log::warn!("Malformed multipart body: {e}");
                return error(e.status(), PROCESSING_FAILED);
            }
        };
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        match field.bytes().await {
            Ok(bytes) => {
                upload = Some(Upload {
                    filename,
                    data: bytes.to_vec(),
                });
            }
            Err(e) => {
                log::warn!("Failed to read upload: {e}");
                return error(e.status(), PROCESSING_FAILED);
            }
        }
    }

    let Some(upload) = upload else {
        return error(StatusCode::BAD_REQUEST, NO_FILE_PART);
    };
    // A `file` field without a filename is a form value, not a file part
    let filename = match upload.filename {
        None => return error(StatusCode::BAD_REQUEST, NO_FILE_PART),
        Some(name) if name.is_empty() => return error(StatusCode::BAD_REQUEST, NO_SELECTED_FILE),
        Some(name) => name,
    };
    log::debug!("Received {filename} ({} bytes)", upload.data.len());

    let scratch = match persist_upload(&ctx.scratch_dir, &filename, &upload.data) {
        Ok(file) => file,
        Err(e) => {
            log::error!("Cannot persist upload {filename}: {e}");
            return error(StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_FAILED);
        }
    };

    let worker_ctx = Arc::clone(&ctx);
    let outcome = tokio::task::spawn_blocking(move || {
        let result = worker_ctx.emotion.detect(scratch.path());
        // Upload removed here, before the response is built
        drop(scratch);
        result
    })
    .await;

    match outcome {
        Ok(Ok(result)) => (StatusCode::OK, Json(PredictResponse::from(result))).into_response(),
        Ok(Err(PipelineError::Ingest(e @ IngestError::UnsupportedFormat { .. }))) => {
            log::warn!("{e}");
            error(StatusCode::BAD_REQUEST, UNSUPPORTED)
        }
        Ok(Err(e)) => {
            log::error!("Processing {filename} failed: {e}");
            error(StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_FAILED)
        }
        Err(e) => {
            log::error!("Worker for {filename} panicked: {e}");
            error(StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_FAILED)
        }
    }
}

/// Write the upload to a scratch file that keeps the client's extension.
fn persist_upload(
    scratch_dir: &Path,
    filename: &str,
    data: &[u8],
) -> std::io::Result<tempfile::NamedTempFile> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(DEFAULT_UPLOAD_EXT);
    let mut file = tempfile::Builder::new()
        .prefix("moodshift-upload-")
        .suffix(&format!(".{ext}"))
        .tempfile_in(scratch_dir)?;
    file.write_all(data)?;
    file.flush()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{FeatureExtractor, MfccConfig};
    use crate::ingest::test_support::{sine, write_wav};
    use crate::ingest::{AudioIngestor, IngestProfile, TranscodeSettings};
    use crate::model::EmotionLabels;
    use crate::pipeline::fakes::FixedEmotion;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "moodshift-test-boundary";

    fn app(scratch: &Path) -> Router {
        let emotion = EmotionPipeline::new(
            AudioIngestor::new(
                IngestProfile::default(),
                TranscodeSettings {
                    ffmpeg: "ffmpeg".into(),
                    scratch_dir: scratch.to_path_buf(),
                },
            ),
            FeatureExtractor::new(MfccConfig::live()).unwrap(),
            Arc::new(FixedEmotion {
                width: 13,
                probabilities: vec![0.2, 0.8],
            }),
            EmotionLabels::from_labels(vec!["female_calm".into(), "male_angry".into()]),
        )
        .unwrap();
        router(Arc::new(ServiceContext {
            emotion,
            scratch_dir: scratch.to_path_buf(),
        }))
    }

    fn upload(field: &str, filename: Option<&str>, data: &[u8]) -> Request<Body> {
        let mut body = format!("--{BOUNDARY}\r\n").into_bytes();
        let disposition = match filename {
            Some(f) => format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{f}\"\r\n"),
            None => format!("Content-Disposition: form-data; name=\"{field}\"\r\n"),
        };
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .header("origin", "http://localhost:3000")
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn wav_bytes(dir: &Path) -> Vec<u8> {
        let path = write_wav(&dir.join("fixture.wav"), 22_050, 1, &sine(200.0, 22_050, 3.5));
        let bytes = std::fs::read(&path).unwrap();
        std::fs::remove_file(path).unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_predict_success() {
        let dir = TempDir::new().unwrap();
        let data = wav_bytes(dir.path());

        let response = app(dir.path())
            .oneshot(upload("file", Some("take1.wav"), &data))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("access-control-allow-origin"));

        let body = json_body(response).await;
        assert_eq!(body["gender"], "male");
        assert_eq!(body["emotion"], "angry");
        assert_eq!(body["label_raw"], "male_angry");
        assert_eq!(body["predicted_class"], 1);
        assert_eq!(body["probabilities"].as_array().unwrap().len(), 2);
        // Upload scratch file is gone
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_file_part() {
        let dir = TempDir::new().unwrap();
        let response = app(dir.path())
            .oneshot(upload("audio", Some("take1.wav"), b"RIFF"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], NO_FILE_PART);
    }

    #[tokio::test]
    async fn test_empty_filename() {
        let dir = TempDir::new().unwrap();
        let response = app(dir.path())
            .oneshot(upload("file", Some(""), b"RIFF"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], NO_SELECTED_FILE);
    }

    #[tokio::test]
    async fn test_file_field_without_filename() {
        let dir = TempDir::new().unwrap();
        let response = app(dir.path())
            .oneshot(upload("file", None, b"RIFF"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], NO_FILE_PART);
    }

    #[tokio::test]
    async fn test_not_multipart() {
        let dir = TempDir::new().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app(dir.path()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], NO_FILE_PART);
    }

    #[tokio::test]
    async fn test_unsupported_audio_cleans_up() {
        let dir = TempDir::new().unwrap();
        let junk = b"this is not a recording".repeat(32);
        let response = app(dir.path())
            .oneshot(upload("file", Some("blob"), &junk))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], UNSUPPORTED);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_persist_upload_keeps_extension() {
        let dir = TempDir::new().unwrap();
        let kept = persist_upload(dir.path(), "voice.ogg", b"x").unwrap();
        assert_eq!(kept.path().extension().unwrap(), "ogg");
        let defaulted = persist_upload(dir.path(), "voice", b"x").unwrap();
        assert_eq!(defaulted.path().extension().unwrap(), "webm");
        drop((kept, defaulted));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
