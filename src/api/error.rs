//! API error types and conversions

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::device::DeviceError;
use crate::health::HealthError;
use crate::ledger::LedgerError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Invalid request parameters
    InvalidRequest(String),

    /// Resource not found
    NotFound(String),

    /// Request conflicts with current state (duplicate, disabled check)
    Conflict(String),

    /// Internal server error
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<HealthError> for ApiError {
    fn from(err: HealthError) -> Self {
        match err {
            HealthError::CheckNotFound(_) | HealthError::ResultNotFound { .. } => {
                ApiError::NotFound(err.to_string())
            }
            HealthError::CheckDisabled(_) | HealthError::StaleResult { .. } => {
                ApiError::Conflict(err.to_string())
            }
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AlreadyRegistered(_) => ApiError::Conflict(err.to_string()),
            LedgerError::NotFound(_) => ApiError::NotFound(err.to_string()),
            LedgerError::Load { .. } | LedgerError::Save { .. } => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<DeviceError> for ApiError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::NotFound(_) => ApiError::NotFound(err.to_string()),
            DeviceError::Unavailable(_) | DeviceError::Timeout(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{err:#}"))
    }
}
