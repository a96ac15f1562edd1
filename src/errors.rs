use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::services::storage_error::{ErrorKind, StorageError};

/// HTTP-facing error: a status plus the message safe to show the caller.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

/// Each error kind maps to one status. Unexpected failures are logged and
/// replaced with a generic message.
impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err.kind() {
            ErrorKind::Validation | ErrorKind::SecurityRejection => {
                AppError::bad_request(err.to_string())
            }
            ErrorKind::Conflict => AppError::new(StatusCode::CONFLICT, err.to_string()),
            ErrorKind::NotFound => AppError::new(StatusCode::NOT_FOUND, err.to_string()),
            ErrorKind::Timeout => AppError::new(StatusCode::GATEWAY_TIMEOUT, "request timed out"),
            ErrorKind::Unexpected => {
                tracing::error!("request failed: {}", err);
                AppError::internal("an unexpected error occurred")
            }
        }
    }
}
