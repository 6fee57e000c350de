//! The custom `ApiError` type for the HTTP server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::{persistence::error::PersistenceError, scanner::ScanError};

/// An API error convertible into an HTTP response with a `detail` body.
pub enum ApiError {
    /// Invalid input (bad URL, interval out of range).
    BadRequest(String),

    /// The requested resource does not exist.
    NotFound(String),

    /// An admission-control limit was hit (monitor cap).
    Conflict(String),

    /// The store could not service the request.
    ServiceUnavailable(String),

    /// Anything else.
    InternalServerError(String),
}

/// Lets handlers use `?` on store calls.
impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(msg) => ApiError::NotFound(msg),
            PersistenceError::InvalidInput(msg) => ApiError::BadRequest(msg),
            PersistenceError::LimitExceeded(msg) => ApiError::Conflict(msg),
            PersistenceError::OperationFailed(msg) => ApiError::ServiceUnavailable(msg),
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}

/// Lets handlers use `?` on pipeline calls.
impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::InvalidTarget(e) => ApiError::BadRequest(e.to_string()),
            ScanError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, detail) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::ServiceUnavailable(message) => {
                tracing::error!("Store unavailable: {}", message);
                (StatusCode::SERVICE_UNAVAILABLE, "Scan store unavailable".to_string())
            }
            ApiError::InternalServerError(message) => {
                tracing::error!("Internal server error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal server error occurred".to_string())
            }
        };

        let body = Json(json!({ "detail": detail }));
        (status, body).into_response()
    }
}
