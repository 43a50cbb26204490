//! Error types for the observer API.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use railsync_core::gateway::CommandError;

/// Errors that can occur in the observer API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The addressed entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request body or path is unusable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The store is not connected or the engine is not running.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The store rejected or timed out the operation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CommandError> for ObserverError {
    fn from(err: CommandError) -> Self {
        let message = err.to_string();
        match err {
            CommandError::EntityNotFound { .. } => Self::NotFound(message),
            CommandError::NotConnected | CommandError::EngineStopped => Self::Unavailable(message),
            CommandError::Query(_) => Self::Internal(message),
        }
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
