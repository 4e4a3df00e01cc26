//! HTTP API.
//!
//! Exposes the core pipeline over JSON endpoints, mirroring the upload /
//! chat / grammar surface consumed by the web UI:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Multipart document upload; ingests into the corpus |
//! | `POST` | `/chat` | Question + chat history → answer with sources |
//! | `POST` | `/grammar` | Grammar analysis of arbitrary text |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses use one JSON envelope:
//!
//! ```json
//! { "error": { "code": "unsupported_format", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `unsupported_format` (400),
//! `extraction_failed` (400), `capability_error` (502), `internal` (500).
//! Capability errors are embedding/generation outages surfaced as-is; the
//! core performs no retry.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::corpus::ActiveCorpus;
use crate::embedding::{create_embedder, EmbeddingError};
use crate::engine::QueryEngine;
use crate::extract::ExtractError;
use crate::generation::{create_generator, GenerationError, Generator};
use crate::grammar;
use crate::models::ConversationTurn;
use crate::rewrite::RewriteError;

/// Request body ceiling for document uploads. Axum's built-in default of
/// 2 MB is smaller than an ordinary PDF.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    corpus: Arc<ActiveCorpus>,
    engine: Arc<QueryEngine>,
    generator: Arc<dyn Generator>,
    upload_dir: std::path::PathBuf,
}

/// Start the HTTP server: build the capability providers, reopen any
/// persisted index, and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let embedder: Arc<dyn crate::embedding::Embedder> =
        Arc::from(create_embedder(&config.embedding)?);
    let generator: Arc<dyn Generator> = Arc::from(create_generator(&config.generation)?);
    let corpus = Arc::new(ActiveCorpus::load_or_create(config, embedder.clone()).await?);
    let engine = Arc::new(QueryEngine::new(
        corpus.clone(),
        embedder,
        generator.clone(),
        config,
    ));

    std::fs::create_dir_all(&config.storage.upload_dir)?;

    let state = AppState {
        corpus,
        engine,
        generator,
        upload_dir: config.storage.upload_dir.clone(),
    };

    let app = build_router(state);

    let bind_addr = &config.server.bind;
    tracing::info!(addr = %bind_addr, "docqa server listening");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(handle_upload))
        .route("/chat", post(handle_chat))
        .route("/grammar", post(handle_grammar))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
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

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map pipeline failures onto HTTP statuses: format and extraction problems
/// are the caller's fault (400), capability outages are upstream (502),
/// everything else is internal (500).
fn classify_error(err: anyhow::Error) -> AppError {
    if let Some(e) = err.downcast_ref::<ExtractError>() {
        return match e {
            ExtractError::UnsupportedFormat(_) => bad_request("unsupported_format", e.to_string()),
            _ => bad_request("extraction_failed", e.to_string()),
        };
    }
    if err.downcast_ref::<EmbeddingError>().is_some()
        || err.downcast_ref::<GenerationError>().is_some()
        || err.downcast_ref::<RewriteError>().is_some()
    {
        return AppError {
            status: StatusCode::BAD_GATEWAY,
            code: "capability_error".to_string(),
            message: err.to_string(),
        };
    }
    internal(err.to_string())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    /// Currently active document, if any.
    active_document: Option<String>,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let active_document = state.corpus.active_file().await.unwrap_or(None);
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_document,
    })
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    status: String,
    message: String,
    filename: String,
    chunk_count: usize,
}

/// Save the uploaded file under the upload directory, then ingest it. The
/// saved file is removed again when ingestion fails.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut saved: Option<std::path::PathBuf> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request("bad_request", e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        // Keep only the base name so the client cannot steer the path.
        let file_name = field
            .file_name()
            .map(|n| n.to_string())
            .and_then(|n| {
                std::path::Path::new(&n)
                    .file_name()
                    .map(|b| b.to_string_lossy().into_owned())
            })
            .ok_or_else(|| bad_request("bad_request", "file field has no filename"))?;

        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request("bad_request", e.to_string()))?;

        let path = state.upload_dir.join(&file_name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| internal(e.to_string()))?;
        saved = Some(path);
        break;
    }

    let path = saved.ok_or_else(|| bad_request("bad_request", "missing 'file' field"))?;

    match state.corpus.ingest(&path).await {
        Ok(report) => Ok(Json(UploadResponse {
            status: "success".to_string(),
            message: format!(
                "Corpus replaced; {} chunks indexed from {}",
                report.chunk_count, report.file_name
            ),
            filename: report.file_name,
            chunk_count: report.chunk_count,
        })),
        Err(err) => {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "could not remove failed upload");
            }
            Err(classify_error(err))
        }
    }
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
    #[serde(default)]
    history: Vec<ConversationTurn>,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    sources: Vec<String>,
    rewritten_query: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if request.query.trim().is_empty() {
        return Err(bad_request("bad_request", "query must not be empty"));
    }

    let result = state
        .engine
        .ask(&request.query, &request.history)
        .await
        .map_err(classify_error)?;

    let mut sources: Vec<String> = result.sources.into_iter().collect();
    sources.sort();

    Ok(Json(ChatResponse {
        answer: result.answer,
        sources,
        rewritten_query: result.rewritten_query,
    }))
}

// ============ POST /grammar ============

#[derive(Deserialize)]
struct GrammarRequest {
    text: String,
}

#[derive(Serialize)]
struct GrammarResponse {
    analysis: String,
}

async fn handle_grammar(
    State(state): State<AppState>,
    Json(request): Json<GrammarRequest>,
) -> Result<Json<GrammarResponse>, AppError> {
    if request.text.trim().is_empty() {
        return Err(bad_request("bad_request", "text must not be empty"));
    }

    let analysis = grammar::analyze(state.generator.as_ref(), &request.text)
        .await
        .map_err(|e| classify_error(e.into()))?;

    Ok(Json(GrammarResponse { analysis }))
}
