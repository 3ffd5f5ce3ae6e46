//! Oracle HTTP Server
//!
//! Exposes the tool surface over HTTP:
//!
//! ```text
//! GET  /health       -> "OK"
//! GET  /             -> server instructions
//! GET  /tools        -> tool catalog
//! POST /tools/:name  -> invoke a tool with a JSON object of arguments
//! ```

use crate::config::OracleConfig;
use crate::tools::{Oracle, ToolError, INSTRUCTIONS, TOOLS};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Largest accepted tool-call body; signed events are well under this
const MAX_BODY_BYTES: usize = 64 * 1024;

// ============================================================================
// HANDLERS
// ============================================================================

async fn health_check() -> &'static str {
    "OK"
}

async fn instructions() -> &'static str {
    INSTRUCTIONS
}

async fn list_tools() -> Json<Value> {
    Json(json!({ "tools": TOOLS }))
}

async fn call_tool(
    State(oracle): State<Arc<Oracle>>,
    Path(name): Path<String>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let args = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(v) => v,
            Err(e) => {
                return failure(
                    StatusCode::BAD_REQUEST,
                    format!("Request body is not valid JSON: {}", e),
                )
            }
        }
    };

    match oracle.dispatch(&name, args).await {
        Ok(result) => (StatusCode::OK, Json(result)),
        Err(e @ ToolError::UnknownTool(_)) => failure(StatusCode::NOT_FOUND, e.to_string()),
        Err(e @ ToolError::InvalidArguments { .. }) => {
            warn!("Rejected call to {}: {}", name, e);
            failure(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e @ ToolError::Registry(_)) => failure(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

fn failure(status: StatusCode, error: String) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "success": false, "error": error })))
}

// ============================================================================
// SERVER STARTUP
// ============================================================================

pub fn router(oracle: Arc<Oracle>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(instructions))
        .route("/tools", get(list_tools))
        .route("/tools/:name", post(call_tool))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(oracle)
}

pub async fn run_server(config: OracleConfig, host: &str, port: u16) -> anyhow::Result<()> {
    let oracle = Arc::new(Oracle::new(&config)?);
    let app = router(oracle);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let commits = if config.github_token.is_some() {
        "enabled"
    } else {
        "disabled (no GITHUB_TOKEN)"
    };

    info!("╔══════════════════════════════════════════════════════════════╗");
    info!("║          DPYC Oracle - Honor Chain Community Concierge       ║");
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║  Registry:     {:45} ║", config.community_base_url);
    info!("║  Repository:   {:45} ║", config.community_repo);
    info!("║  Commits:      {:45} ║", commits);
    info!("║  Listening on: {:45} ║", addr);
    info!("╠══════════════════════════════════════════════════════════════╣");
    info!("║  Endpoints:                                                  ║");
    info!("║    GET  /health      - Health check                          ║");
    info!("║    GET  /            - Server instructions                   ║");
    info!("║    GET  /tools       - Tool catalog                          ║");
    info!("║    POST /tools/:name - Invoke a tool                         ║");
    info!("╚══════════════════════════════════════════════════════════════╝");

    axum::serve(listener, app).await?;

    Ok(())
}
