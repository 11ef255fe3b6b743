//! JSON HTTP API for document ingestion and question answering.
//!
//! # Endpoints
//!
//! | Method   | Path | Description |
//! |----------|------|-------------|
//! | `POST`   | `/documents` | Ingest a document; returns a corpus handle |
//! | `GET`    | `/documents/{handle}/status` | Lifecycle status of a corpus |
//! | `POST`   | `/documents/{handle}/questions` | Ask a question against a corpus |
//! | `DELETE` | `/documents/{handle}` | Evict a corpus (idempotent) |
//! | `GET`    | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no corpus with that handle" } }
//! ```
//!
//! Error codes: `bad_request` (400), `format_mismatch` (400), `too_large` (400),
//! `unsupported_media_type` (400), `not_found` (404), `conflict` (409),
//! `timeout` (408), `internal` (500).
//!
//! A question with no supporting evidence is NOT an error: it returns `200`
//! with `"no_evidence": true`, a null answer, and no citations.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::corpus::CorpusManager;
use crate::error::{AskError, ParseError};
use crate::models::{Citation, CorpusStatus};
use crate::synthesize::Synthesis;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    manager: Arc<CorpusManager>,
}

/// Builds the Axum router. Exposed separately from [`run_server`] so tests
/// can mount the app on an ephemeral port.
pub fn app(manager: Arc<CorpusManager>) -> Router {
    let body_limit = manager.config().document.max_bytes;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/documents", post(handle_ingest))
        .route("/documents/{handle}/status", get(handle_status))
        .route("/documents/{handle}/questions", post(handle_ask))
        .route("/documents/{handle}", delete(handle_evict))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(AppState { manager })
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let manager = Arc::new(CorpusManager::new(Arc::new(config)));
    let app = app(manager);

    println!("cortexqa listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: code.to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn conflict(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "conflict".to_string(),
        message: message.into(),
    }
}

fn timeout_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::REQUEST_TIMEOUT,
        code: "timeout".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Maps synchronous ingest validation failures to their 400 variants.
fn ingest_error(err: ParseError) -> AppError {
    let msg = err.to_string();
    match err {
        ParseError::FormatMismatch { .. } => bad_request("format_mismatch", msg),
        ParseError::TooLarge { .. } => bad_request("too_large", msg),
        ParseError::UnsupportedMediaType(_) => bad_request("unsupported_media_type", msg),
        ParseError::CorruptDocument(_) => bad_request("bad_request", msg),
    }
}

/// Maps question failures to the error contract. Domain errors travel as
/// [`AskError`] inside the `anyhow` error; anything else is a 500.
fn ask_error(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<AskError>() {
        Some(AskError::CorpusNotFound) => not_found("no corpus with that handle"),
        Some(AskError::CorpusNotReady(status)) => {
            conflict(format!("corpus is not ready yet (status: {})", status))
        }
        Some(AskError::CorpusFailed(reason)) => {
            conflict(format!("corpus ingestion failed: {}", reason))
        }
        None => internal(err.to_string()),
    }
}

fn parse_handle(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| not_found(format!("invalid corpus handle: {}", raw)))
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /documents ============

/// JSON response body for `POST /documents`.
#[derive(Serialize)]
struct IngestResponse {
    corpus_handle: Uuid,
    status: CorpusStatus,
}

/// Handler for `POST /documents`.
///
/// The raw document travels as the request body; the declared format comes
/// from `Content-Type` and an optional display name from `X-Document-Name`.
/// Size and signature validation run synchronously and map to `400`;
/// parse-time corruption is detected asynchronously and surfaces via the
/// status endpoint as a terminal `failed` state.
async fn handle_ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<IngestResponse>, AppError> {
    // The body limiter rejects before the handler runs; fold its length
    // rejection into the same 400 envelope the validator uses so oversized
    // documents are reported as `too_large`, not a bare 413.
    let body = match body {
        Ok(body) => body,
        Err(rej) if rej.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return Err(bad_request(
                "too_large",
                format!(
                    "document exceeds the {} byte limit",
                    state.manager.config().document.max_bytes
                ),
            ));
        }
        Err(rej) => return Err(bad_request("bad_request", rej.body_text())),
    };

    let media_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .ok_or_else(|| bad_request("bad_request", "missing Content-Type header"))?;

    let name = headers
        .get("x-document-name")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let handle = state
        .manager
        .ingest(body.to_vec(), media_type, name)
        .map_err(ingest_error)?;

    Ok(Json(IngestResponse {
        corpus_handle: handle,
        status: CorpusStatus::Pending,
    }))
}

// ============ GET /documents/{handle}/status ============

/// JSON response body for `GET /documents/{handle}/status`.
#[derive(Serialize)]
struct StatusResponse {
    status: CorpusStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    passage_count: Option<usize>,
    document: DocumentInfo,
}

/// Source document summary echoed back with the status.
#[derive(Serialize)]
struct DocumentInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    media_type: String,
    size_bytes: usize,
    created_at: chrono::DateTime<chrono::Utc>,
}

/// Handler for `GET /documents/{handle}/status`.
async fn handle_status(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let handle = parse_handle(&handle)?;
    let report = state
        .manager
        .status(handle)
        .ok_or_else(|| not_found("no corpus with that handle"))?;
    let meta = state
        .manager
        .document_meta(handle)
        .ok_or_else(|| not_found("no corpus with that handle"))?;

    Ok(Json(StatusResponse {
        status: report.status,
        reason: report.reason,
        passage_count: report.passage_count,
        document: DocumentInfo {
            name: meta.name,
            media_type: meta.media_type,
            size_bytes: meta.size_bytes,
            created_at: meta.created_at,
        },
    }))
}

// ============ POST /documents/{handle}/questions ============

/// JSON request body for `POST /documents/{handle}/questions`.
#[derive(Deserialize)]
struct AskRequest {
    question: String,
    /// Optional override for how many passages to retrieve.
    top_k: Option<usize>,
}

/// JSON response body for `POST /documents/{handle}/questions`.
#[derive(Serialize)]
struct AskResponse {
    answer: Option<String>,
    no_evidence: bool,
    citations: Vec<Citation>,
}

/// Handler for `POST /documents/{handle}/questions`.
///
/// Returns `200` for both outcomes: an answered question carries the answer
/// text plus citations; a question with no supporting evidence carries
/// `no_evidence: true` with a null answer. `404` for unknown handles, `409`
/// when the corpus is still indexing or has failed, `408` on timeout.
async fn handle_ask(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let handle = parse_handle(&handle)?;
    if req.question.trim().is_empty() {
        return Err(bad_request("bad_request", "question must not be empty"));
    }

    let deadline = Duration::from_secs(state.manager.config().corpus.ask_timeout_secs);
    let synthesis = tokio::time::timeout(
        deadline,
        state.manager.ask(handle, &req.question, req.top_k),
    )
    .await
    .map_err(|_| timeout_error("question timed out"))?
    .map_err(ask_error)?;

    Ok(Json(match synthesis {
        Synthesis::Answer(answer) => AskResponse {
            answer: Some(answer.text),
            no_evidence: false,
            citations: answer.citations,
        },
        Synthesis::NoEvidence => AskResponse {
            answer: None,
            no_evidence: true,
            citations: Vec::new(),
        },
    }))
}

// ============ DELETE /documents/{handle} ============

/// JSON response body for `DELETE /documents/{handle}`.
#[derive(Serialize)]
struct EvictResponse {
    evicted: bool,
}

/// Handler for `DELETE /documents/{handle}`.
///
/// Idempotent: deleting an unknown or already-evicted handle returns `200`
/// with `evicted: false`.
async fn handle_evict(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<EvictResponse>, AppError> {
    let handle = parse_handle(&handle)?;
    Ok(Json(EvictResponse {
        evicted: state.manager.evict(handle),
    }))
}
