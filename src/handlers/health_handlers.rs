//! Health & readiness handlers.
//!
//! - GET /healthz        -> liveness ("ok")
//! - GET /readyz         -> readiness: metadata database and payload directory
//! - GET /api/v1/health  -> status, environment name and server time

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

use crate::state::AppState;

/// `GET /healthz`
///
/// Never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /api/v1/health`
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(ServiceHealth {
        status: "ok",
        env: state.env.clone(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}

/// `GET /readyz`
///
/// Runs `SELECT 1` against SQLite and a write/read/delete probe under the
/// payload directory. 200 when both pass, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let sqlite = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*state.disk.db)
        .await
    {
        Ok(1) => CheckStatus::ok(),
        Ok(v) => CheckStatus::failed(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    };

    let probe = state
        .disk
        .base_path
        .join(format!(".readyz-{}", Uuid::new_v4()));
    let disk = match fs::write(&probe, b"readyz").await {
        Ok(()) => {
            let check = match fs::read(&probe).await {
                Ok(bytes) if bytes == b"readyz" => CheckStatus::ok(),
                Ok(_) => CheckStatus::failed("file content mismatch".to_string()),
                Err(e) => CheckStatus::failed(format!("could not read probe file: {}", e)),
            };
            if let Err(e) = fs::remove_file(&probe).await {
                tracing::warn!(path = %probe.display(), "could not remove probe file: {}", e);
            }
            check
        }
        Err(e) => CheckStatus::failed(format!("could not write probe file: {}", e)),
    };

    let ready = sqlite.ok && disk.ok;
    let checks = HashMap::from([("sqlite", sqlite), ("disk", disk)]);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if ready { "ok" } else { "error" },
            checks,
        }),
    )
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ServiceHealth {
    status: &'static str,
    env: String,
    timestamp: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
