//! HTTP surface for the assistant.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Answer a question about the persona |
//! | `POST` | `/api/rebuild` | Reload the knowledge file and rebuild the index |
//! | `GET`  | `/api/health` | Readiness and index status |
//!
//! # Error Contract
//!
//! Handlers always answer `200 OK` with a `success` flag; failures carry a
//! human-readable `error`:
//!
//! ```json
//! { "success": false, "error": "Message is required" }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! on another origin can call the API.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::Config;
use crate::generation::credentials_present;
use crate::pipeline::Pipeline;

/// Header carrying the caller's conversation id.
pub const SESSION_HEADER: &str = "session-id";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Build the router over an existing pipeline.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/rebuild", post(handle_rebuild))
        .route("/api/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { pipeline })
}

/// Serve `pipeline` on an already-bound listener until the process ends.
pub async fn serve(listener: TcpListener, pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    axum::serve(listener, router(pipeline)).await?;
    Ok(())
}

/// Starts the HTTP server on `[server] bind`.
///
/// Restores the persisted index, optionally rebuilds it first
/// (`[server] rebuild_on_start`), then serves until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pipeline = Arc::new(Pipeline::from_config(config.clone()).await?);

    if config.server.rebuild_on_start {
        let chunks = pipeline.rebuild_from_file().await?;
        println!("Index rebuilt: {} chunks", chunks);
    }

    let status = pipeline.status();
    if !status.built {
        tracing::warn!("index has never been built; answers will have no context until POST /api/rebuild");
    }

    let listener = TcpListener::bind(&bind_addr).await?;
    println!("Assistant listening on http://{}", bind_addr);
    serve(listener, pipeline).await
}

// ============ POST /api/chat ============

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

/// JSON response body for `POST /api/chat`.
#[derive(Debug, Serialize, Default)]
struct ChatResponse {
    response: String,
    success: bool,
    context_used: String,
    session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refined_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ChatResponse {
    fn failure(session_id: String, error: impl Into<String>) -> Self {
        Self {
            session_id,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Json<ChatResponse> {
    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let message = match body {
        Ok(Json(request)) => request.message,
        Err(rejection) => {
            tracing::warn!(session_id = %session_id, error = %rejection.body_text(), "malformed chat request");
            return Json(ChatResponse::failure(session_id, rejection.body_text()));
        }
    };
    if message.trim().is_empty() {
        return Json(ChatResponse::failure(session_id, "Message is required"));
    }

    tracing::info!(session_id = %session_id, message = %message, "chat request");

    match state.pipeline.ask(&message).await {
        Ok(answer) => {
            tracing::info!(
                session_id = %session_id,
                no_context = answer.no_context,
                response = %answer.text,
                "chat response"
            );
            Json(ChatResponse {
                response: answer.text,
                success: true,
                context_used: answer.context_used,
                session_id,
                refined_query: answer.refined_query,
                error: None,
            })
        }
        Err(e) => {
            tracing::error!(session_id = %session_id, kind = e.kind(), error = %e, "chat failed");
            Json(ChatResponse::failure(
                session_id,
                format!("Failed to get AI response: {}", e),
            ))
        }
    }
}

// ============ POST /api/rebuild ============

#[derive(Debug, Serialize)]
struct RebuildResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

async fn handle_rebuild(State(state): State<AppState>) -> Json<RebuildResponse> {
    match state.pipeline.rebuild_from_file().await {
        Ok(chunks) => Json(RebuildResponse {
            success: true,
            chunks: Some(chunks),
            error: None,
        }),
        Err(e) => Json(RebuildResponse {
            success: false,
            chunks: None,
            error: Some(format!("Failed to rebuild index: {}", e)),
        }),
    }
}

// ============ GET /api/health ============

/// JSON response body for `GET /api/health`.
#[derive(Debug, Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: &'static str,
    version: &'static str,
    index_built: bool,
    indexed_chunks: usize,
    /// Whether the generation provider's credential is configured. No
    /// request is made to the provider.
    generation_credentials: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    if let Err(e) = state.pipeline.refresh().await {
        tracing::warn!(error = %e, "could not check for a newer index generation");
    }
    let status = state.pipeline.status();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        index_built: status.built,
        indexed_chunks: status.chunks,
        generation_credentials: credentials_present(&state.pipeline.config().generation),
    })
}
