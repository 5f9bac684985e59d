//! Ambient A2 — the HTTP surface for the deep-research pipeline: a
//! non-streaming run endpoint, an SSE streaming endpoint, and an
//! unauthenticated health probe, gated by the configured API-key header
//! the same way `main.rs` composes its own router with `CorsLayer`/
//! `TraceLayer`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{extract::Request, Router};
use futures::stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use super::orchestrator::ResearchService;
use super::sse;
use super::types::DeepSearchRequest;

pub fn router(service: Arc<ResearchService>) -> Router {
    let protected = Router::new()
        .route("/deepsearch/run", post(run_handler))
        .route("/deepsearch/run/stream", post(run_stream_handler))
        .layer(middleware::from_fn_with_state(Arc::clone(&service), api_key_gate));

    Router::new()
        .route("/deepsearch/healthz", get(healthz_handler))
        .merge(protected)
        .with_state(service)
}

/// Rejects requests missing (or mismatching) the configured API-key
/// header; a deployment that never sets `api_key_header_value` leaves the
/// gate open, matching `ResearchConfig::critical_config_missing`'s
/// treatment of the auth key as a deployment choice, not a hard
/// requirement.
async fn api_key_gate(State(service): State<Arc<ResearchService>>, headers: HeaderMap, request: Request, next: Next) -> Response {
    let Some(expected) = service.config.api_key_header_value.as_ref() else {
        return next.run(request).await;
    };
    let provided = headers.get(&service.config.api_key_header_name).and_then(|v| v.to_str().ok());
    if provided == Some(expected.as_str()) {
        next.run(request).await
    } else {
        (StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "success": false, "message": "invalid or missing API key" }))).into_response()
    }
}

async fn healthz_handler(State(service): State<Arc<ResearchService>>) -> Json<serde_json::Value> {
    let stats = service.monitor.stats().await;
    Json(serde_json::json!({
        "status": "healthy",
        "service": "deepsearch",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sse_connections": stats.active_connections,
    }))
}

async fn run_handler(State(service): State<Arc<ResearchService>>, Json(request): Json<DeepSearchRequest>) -> Response {
    match service.run(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            let status = match &e {
                super::errors::ResearchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                super::errors::ResearchError::Unauthorized => StatusCode::UNAUTHORIZED,
                super::errors::ResearchError::ConfigMissing(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(serde_json::json!({ "success": false, "message": e.to_string() }))).into_response()
        }
    }
}

async fn run_stream_handler(
    State(service): State<Arc<ResearchService>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    Json(request): Json<DeepSearchRequest>,
) -> Response {
    // Validation failures are rejected as a plain 4xx before any SSE
    // stream opens (§7: "4xx HTTP before streaming begins").
    if let Err(message) = request.validate() {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "success": false, "message": message }))).into_response();
    }

    let (connection_id, rx) = service.run_stream(request, Some(addr.ip().to_string())).await;

    let stream = ReceiverStream::new(rx).map(|event| -> Result<axum::response::sse::Event, Infallible> { sse::to_axum_event(&event) });

    let mut response = Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    if let Ok(value) = connection_id.parse() {
        response.headers_mut().insert("X-Connection-ID", value);
    }
    response
}

#[allow(dead_code)]
fn _assert_stream<S: Stream>() {}
