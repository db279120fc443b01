//! HTTP server.
//!
//! Exposes the analysis and narration flows over a small JSON/binary API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/extract?input=` | Extract readable content only |
//! | `POST` | `/extract` | Same, with a JSON body |
//! | `POST` | `/clearview` | Analyze input, return report metadata and the PDF (base64) |
//! | `POST` | `/audio` | Narrate input, return `audio/mpeg` bytes |
//! | `GET`  | `/clearview/{id}` | Download a stored report |
//! | `GET`  | `/audio/{id}` | Download stored audio |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "unprocessable_input", "message": "Input text is empty." } }
//! ```
//!
//! Error codes: `unprocessable_input` (422), `not_found` (404),
//! `rendering_failed` (500), `speech_unavailable` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends
//! can call the API directly.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::models::{suggested_filename, ArtifactKind, AssessmentResult, ExtractionResult};
use crate::pipeline::{Pipeline, PipelineError};

/// Header carrying the store id of freshly produced audio.
pub const RECORD_ID_HEADER: &str = "x-record-id";
/// Header naming the speech provider that produced the audio.
pub const PROVIDER_HEADER: &str = "x-speech-provider";

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Builds the production pipeline from `config` and serves it on `[server].bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(config).await?;
    serve(&config.server.bind, Arc::new(pipeline)).await
}

pub async fn serve(bind_addr: &str, pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    let app = router(pipeline);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
    println!("Clearview listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// All routes over an existing pipeline. Used directly by tests.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/extract", get(handle_extract_get).post(handle_extract_post))
        .route("/clearview", post(handle_clearview))
        .route("/clearview/{id}", get(handle_get_report))
        .route("/audio", post(handle_audio))
        .route("/audio/{id}", get(handle_get_audio))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { pipeline })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn unprocessable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        code: "unprocessable_input",
        message: message.into(),
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let message = err.to_string();
        let (status, code) = match err {
            PipelineError::InputUnprocessable(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_input")
            }
            PipelineError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            PipelineError::Rendering(_) => (StatusCode::INTERNAL_SERVER_ERROR, "rendering_failed"),
            PipelineError::SpeechUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "speech_unavailable")
            }
            PipelineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(code, error = %message, "request failed");
        }
        AppError {
            status,
            code,
            message,
        }
    }
}

fn binary_response(
    bytes: Vec<u8>,
    content_type: &str,
    disposition: String,
    extra: &[(&'static str, &str)],
) -> Response {
    let len = bytes.len();
    let mut resp = (StatusCode::OK, bytes).into_response();
    let headers = resp.headers_mut();
    if let Ok(v) = HeaderValue::from_str(content_type) {
        headers.insert(header::CONTENT_TYPE, v);
    }
    if let Ok(v) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, v);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    for (name, value) in extra {
        if let Ok(v) = HeaderValue::from_str(value) {
            headers.insert(*name, v);
        }
    }
    resp
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /extract, POST /extract ============

#[derive(Deserialize)]
struct AnalyzeRequest {
    input: String,
}

async fn handle_extract_get(
    State(state): State<AppState>,
    query: Result<Query<AnalyzeRequest>, QueryRejection>,
) -> Result<Json<ExtractionResult>, AppError> {
    let Query(req) = query.map_err(|e| unprocessable(e.body_text()))?;
    extract_only(&state, &req.input).await
}

async fn handle_extract_post(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<ExtractionResult>, AppError> {
    let Json(req) = body.map_err(|e| unprocessable(e.body_text()))?;
    extract_only(&state, &req.input).await
}

async fn extract_only(
    state: &AppState,
    input: &str,
) -> Result<Json<ExtractionResult>, AppError> {
    let extraction = state.pipeline.extract(input).await?;
    Ok(Json(Arc::unwrap_or_clone(extraction)))
}

// ============ POST /clearview ============

/// JSON body for `POST /clearview`.
#[derive(Serialize)]
struct ClearviewResponse {
    id: Option<String>,
    title: String,
    source: String,
    input_type: String,
    word_count: usize,
    extraction_method: String,
    /// Cleaned article text, paragraphs separated by blank lines.
    content: String,
    summary: Option<String>,
    /// Per-aspect result keyed by aspect name.
    aspects: BTreeMap<String, AssessmentResult>,
    /// Base64-encoded PDF.
    pdf: String,
    error: Option<String>,
}

async fn handle_clearview(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<ClearviewResponse>, AppError> {
    let Json(req) = body.map_err(|e| unprocessable(e.body_text()))?;
    let outcome = state.pipeline.analyze_and_report(&req.input).await?;

    let extraction = &outcome.extraction;
    Ok(Json(ClearviewResponse {
        id: outcome.id.clone(),
        title: extraction.title.clone(),
        source: extraction.source.clone(),
        input_type: extraction.input_type.to_string(),
        word_count: extraction.word_count,
        extraction_method: extraction.extraction_method.clone(),
        content: extraction.content.clone(),
        summary: outcome.summary.clone(),
        aspects: outcome
            .results
            .iter()
            .map(|(aspect, result)| (aspect.to_string(), result.clone()))
            .collect(),
        pdf: base64::engine::general_purpose::STANDARD.encode(&outcome.pdf),
        error: outcome.error.clone(),
    }))
}

// ============ POST /audio ============

#[derive(Deserialize)]
struct AudioRequest {
    input: String,
    #[serde(default)]
    voice_id: Option<String>,
}

async fn handle_audio(
    State(state): State<AppState>,
    body: Result<Json<AudioRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = body.map_err(|e| unprocessable(e.body_text()))?;
    let outcome = state
        .pipeline
        .analyze_and_narrate(&req.input, req.voice_id.as_deref())
        .await?;

    let filename = suggested_filename(&outcome.extraction.title, ArtifactKind::Audio);
    let mut extra = vec![(PROVIDER_HEADER, outcome.provider.as_str())];
    if let Some(id) = outcome.id.as_deref() {
        extra.push((RECORD_ID_HEADER, id));
    }
    Ok(binary_response(
        outcome.audio.clone(),
        ArtifactKind::Audio.content_type(),
        format!("inline; filename=\"{}\"", filename),
        &extra,
    ))
}

// ============ GET /clearview/{id}, GET /audio/{id} ============

async fn handle_get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    download(&state, ArtifactKind::Report, &id).await
}

async fn handle_get_audio(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    download(&state, ArtifactKind::Audio, &id).await
}

async fn download(state: &AppState, kind: ArtifactKind, id: &str) -> Result<Response, AppError> {
    let record = state.pipeline.fetch(kind, id).await?;
    let filename = suggested_filename(&record.title, kind);
    Ok(binary_response(
        record.bytes,
        &record.content_type,
        format!("attachment; filename=\"{}\"", filename),
        &[],
    ))
}
