use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::models::{ErrorResponse, ProcessRequest};
use super::state::ServerState;
use crate::pipeline::{failure_report, Pipeline, Report};
use crate::settings::Settings;
use crate::storage::Storage;

const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

pub async fn run_server(settings: Settings, addr: String) -> Result<()> {
    let storage = Storage::new(&settings);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            storage.sweep_stale();
        }
    });

    let state = Arc::new(ServerState {
        pipeline: Pipeline::new(&settings),
    });
    let app = Router::new()
        .route("/", get(info_page))
        .route("/health", get(health))
        .route("/process", post(process))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware));

    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| "failed to bind server address")?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn info_page() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "furigana-annotator-rust",
        "status": "operational",
        "stages": ["extract", "tokenize", "reconcile", "layout"],
        "features": [
            "OCR text extraction (tesseract)",
            "Japanese tokenization (mecab + kakasi)",
            "Glossary lookup (JMdict-style export)",
            "Translation and grammar analysis (LLM)",
            "Reading annotation overlay"
        ],
        "endpoints": {
            "POST /process": "Process a Japanese text image"
        }
    }))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

async fn process(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<ProcessRequest>,
) -> Result<Json<Report>, (StatusCode, Json<ErrorResponse>)> {
    let filename = payload.filename.unwrap_or_default();
    let Some(extension) = allowed_extension(&filename) else {
        return Err(bad_request("only PNG, JPG, JPEG images are supported"));
    };
    let Some(data_base64) = payload.data_base64.filter(|value| !value.trim().is_empty()) else {
        return Err(bad_request("data_base64 is required"));
    };
    let bytes = BASE64
        .decode(data_base64.trim())
        .map_err(|_| bad_request("data_base64 is not valid base64"))?;
    match infer::get(&bytes) {
        Some(kind) if kind.mime_type().starts_with("image/") => {}
        _ => return Err(bad_request("upload does not look like an image")),
    }

    let mut upload = tempfile::Builder::new()
        .suffix(&format!(".{extension}"))
        .tempfile()
        .map_err(|err| internal_error(format!("failed to stage upload: {err}")))?;
    upload
        .write_all(&bytes)
        .map_err(|err| internal_error(format!("failed to stage upload: {err}")))?;

    match state.pipeline.process(upload.path()).await {
        Ok(report) => Ok(Json(report)),
        Err(err) => {
            let failure = failure_report(&format!("processing failed: {err:#}"));
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    success: failure.success,
                    error: failure.error,
                    timestamp: failure.timestamp,
                }),
            ))
        }
    }
}

fn allowed_extension(filename: &str) -> Option<String> {
    let extension = filename.rsplit_once('.')?.1.to_lowercase();
    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Some(extension)
    } else {
        None
    }
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message)))
}

fn internal_error(message: String) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(message)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extensions_are_accepted_case_insensitively() {
        assert_eq!(allowed_extension("page.png").as_deref(), Some("png"));
        assert_eq!(allowed_extension("scan.JPG").as_deref(), Some("jpg"));
        assert_eq!(allowed_extension("photo.jpeg").as_deref(), Some("jpeg"));
    }

    #[test]
    fn other_uploads_are_rejected() {
        assert!(allowed_extension("notes.pdf").is_none());
        assert!(allowed_extension("archive.png.zip").is_none());
        assert!(allowed_extension("no-extension").is_none());
        assert!(allowed_extension("").is_none());
    }
}
