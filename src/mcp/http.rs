//! Streamable HTTP transport for the MCP server
//!
//! Routes:
//!
//! - `POST /`: one JSON-RPC message per request, answered with
//!   `application/json`. `initialize` responses carry a fresh
//!   `Mcp-Session-Id`. Notifications are acknowledged with `202`.
//! - `GET /health`: liveness check, `{"status":"ok"}`.
//!
//! Inbound headers are forwarded to the tools, which is how the
//! passthrough credential provider reaches the caller's bearer token.

use super::server::{parse_request, McpServer};
use super::types::{JsonRpcResponse, METHOD_INITIALIZE};
use crate::central::RequestMeta;
use crate::error::Result;
use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Session header issued on `initialize`
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Upper bound for draining connections after a shutdown signal
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the MCP router
pub fn router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .route("/health", get(health))
        .with_state(server)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn handle_rpc(
    State(server): State<Arc<McpServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(error) => {
            tracing::warn!(error = %error, "Rejected malformed MCP message");
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::failure(serde_json::Value::Null, error)),
            )
                .into_response();
        }
    };

    let is_initialize = request.method == METHOD_INITIALIZE;
    let meta = request_meta(&headers);

    // Cancel the call when the client goes away and axum drops this future.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let Some(response) = server.handle_request(request, meta, cancel).await else {
        return StatusCode::ACCEPTED.into_response();
    };

    let mut http_response = Json(response).into_response();
    if is_initialize {
        let session_id = uuid::Uuid::new_v4().to_string();
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            tracing::info!(session_id = %session_id, "MCP session started");
            http_response.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    http_response
}

fn request_meta(headers: &HeaderMap) -> RequestMeta {
    RequestMeta::with_headers(headers.iter().filter_map(|(name, value)| {
        value
            .to_str()
            .ok()
            .map(|value| (name.as_str().to_string(), value.to_string()))
    }))
}

/// Serve the router on `address:port` until `shutdown` resolves
///
/// After the signal, open connections get [`SHUTDOWN_TIMEOUT`] to finish.
///
/// # Errors
///
/// Returns an error when binding fails or the server stops abnormally.
pub async fn serve<F>(server: Arc<McpServer>, address: &str, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", address, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;

    tracing::info!(address = %address, port, "Starting MCP server");
    serve_listener(server, listener, shutdown).await
}

/// Serve on an already bound listener
pub async fn serve_listener<F>(
    server: Arc<McpServer>,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let drained = CancellationToken::new();
    let signalled = drained.clone();

    let server_future = axum::serve(listener, router(server))
        .with_graceful_shutdown(async move {
            shutdown.await;
            signalled.cancel();
        })
        .into_future();
    tokio::pin!(server_future);

    tokio::select! {
        result = &mut server_future => {
            result.context("MCP HTTP server error")?;
        }
        _ = async {
            drained.cancelled().await;
            tokio::time::sleep(SHUTDOWN_TIMEOUT).await;
        } => {
            tracing::warn!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Graceful shutdown timed out, dropping open connections"
            );
        }
    }

    tracing::info!("MCP HTTP server stopped");
    Ok(())
}
