//! Flux API: error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use flux_core::error::FluxError;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer error that implements `IntoResponse`.
#[derive(Debug)]
pub enum ApiError {
    /// An error raised by the store or request validation.
    Flux(FluxError),
    /// No event has the requested id.
    EventNotFound(Uuid),
}

impl From<FluxError> for ApiError {
    fn from(err: FluxError) -> Self {
        Self::Flux(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Self::EventNotFound(id) => (
                StatusCode::NOT_FOUND,
                "event_not_found",
                format!("event not found: {id}"),
            ),
            Self::Flux(err) => {
                let (status, code) = match err {
                    FluxError::Validation(_) => {
                        (StatusCode::UNPROCESSABLE_ENTITY, "validation_error")
                    }
                    FluxError::ConcurrencyConflict { .. } => {
                        (StatusCode::CONFLICT, "concurrency_conflict")
                    }
                    FluxError::Decode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "decode_error"),
                    FluxError::Serialization(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error")
                    }
                    FluxError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
                    FluxError::Handler(_) => (StatusCode::INTERNAL_SERVER_ERROR, "handler_error"),
                };
                (status, code, err.to_string())
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
        }

        let body = ErrorBody {
            error: error_code,
            message,
        };

        (status, Json(body)).into_response()
    }
}
