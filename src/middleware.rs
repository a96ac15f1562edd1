//! Request-scoped middleware: access logging and a per-request deadline.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::{Duration, Instant};

use crate::errors::AppError;

/// Log method, path (with query), status and latency for every request.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency = ?start.elapsed(),
        "incoming request"
    );
    response
}

/// Abort requests that run past `timeout` with 504.
pub async fn enforce_timeout(
    State(timeout): State<Duration>,
    req: Request,
    next: Next,
) -> Response {
    match tokio::time::timeout(timeout, next.run(req)).await {
        Ok(response) => response,
        Err(_) => AppError::new(
            axum::http::StatusCode::GATEWAY_TIMEOUT,
            "request timed out",
        )
        .into_response(),
    }
}
