use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use repoviz_core::{AnalysisKind, AnalysisMode, AnalysisResult};
use repoviz_session::Analyzer;

// ── Config ──

pub struct ServeConfig {
    pub bind: String,
    pub port: u16,
    /// Analyses allowed to run at once; further requests wait for a slot.
    pub max_concurrent: usize,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 5002,
            max_concurrent: 4,
        }
    }
}

// ── App State ──

struct AppState {
    analyzer: Arc<Analyzer>,
    permits: Semaphore,
    shutdown: CancellationToken,
}

// ── Error Handling ──

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    error: String,
}

impl AppError {
    fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.error });
        (self.status, Json(body)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: err.into().to_string(),
        }
    }
}

// ── Entrypoint ──

/// Bind and serve until `shutdown` is cancelled. Cancelling also aborts
/// in-flight analyses, which still tear down their sessions and workspaces.
pub async fn serve(
    config: ServeConfig,
    analyzer: Arc<Analyzer>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = build_router(analyzer, config.max_concurrent, shutdown.clone());

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "repoviz HTTP server listening");
    eprintln!("repoviz HTTP server listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Build the router (for testing without binding to a port).
pub fn router(analyzer: Arc<Analyzer>, max_concurrent: usize) -> Router {
    build_router(analyzer, max_concurrent, CancellationToken::new())
}

fn build_router(
    analyzer: Arc<Analyzer>,
    max_concurrent: usize,
    shutdown: CancellationToken,
) -> Router {
    let state = Arc::new(AppState {
        analyzer,
        permits: Semaphore::new(max_concurrent.max(1)),
        shutdown,
    });
    Router::new()
        .route("/api/health", get(health))
        .route("/api/analyze", post(post_analyze))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": "repoviz" }))
}

// ── POST /api/analyze ──

#[derive(Deserialize)]
struct AnalyzeBody {
    #[serde(default)]
    repo_url: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    mode: Option<String>,
}

fn parse_mode(raw: Option<&str>) -> AnalysisMode {
    match raw.map(str::trim) {
        Some(m) if m.eq_ignore_ascii_case("remote") => AnalysisMode::Remote,
        _ => AnalysisMode::Local,
    }
}

async fn post_analyze(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AnalysisResult>, AppError> {
    let body: AnalyzeBody = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("Invalid request body: {e}")))?;
    let repo_url = body.repo_url.unwrap_or_default();
    if repo_url.trim().is_empty() {
        return Err(AppError::bad_request("Repository URL is required"));
    }
    let kind = AnalysisKind::parse_lossy(body.kind.as_deref().unwrap_or_default());
    let mode = parse_mode(body.mode.as_deref());

    let _permit = state.permits.acquire().await?;
    let result = state
        .analyzer
        .analyze(&repo_url, kind, mode, state.shutdown.child_token())
        .await
        .inspect_err(|e| warn!(repo_url = %repo_url, error = %e, "analysis failed"))?;
    Ok(Json(result))
}
