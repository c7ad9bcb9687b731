//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use study_deck_core::ports::PortError;
use tracing::error;

use crate::web::protocol::ErrorResponse;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure while applying database migrations at startup.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request itself is malformed.
    #[error("{0}")]
    BadRequest(String),

    /// The request is well-formed but not authorised, e.g. a bad URL signature.
    #[error("{0}")]
    Forbidden(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Port(PortError::NotFound(what)) => (StatusCode::NOT_FOUND, what.clone()),
            ApiError::Port(PortError::InvalidInput(why)) => (StatusCode::BAD_REQUEST, why.clone()),
            ApiError::Port(PortError::Unexpected(why)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, why.clone())
            }
            ApiError::BadRequest(why) => (StatusCode::BAD_REQUEST, why.clone()),
            ApiError::Forbidden(why) => (StatusCode::FORBIDDEN, why.clone()),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
