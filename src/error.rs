//! Unified error handling
//!
//! Provides the application-level error type and response mapping:
//! - [`AppError`] - application error enum
//! - [`AppResult`] - result alias used by handlers and services
//!
//! Validation / not-found / conflict errors carry an actionable message and
//! are surfaced verbatim to the caller. Gateway and reconciliation errors
//! raised inside a sweep are captured per item and never reach this layer
//! as a whole-request failure.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::gateway::GatewayError;

/// Application-level Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error enum
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ========== Business errors (4xx) ==========
    #[error("Validation failed: {0}")]
    /// Bad input or closed window (400)
    Validation(String),

    #[error("Resource not found: {0}")]
    /// Missing event/modality/order (404)
    NotFound(String),

    #[error("Conflict: {0}")]
    /// Duplicate active order, sold-out size/slot, exhausted coupon (409)
    Conflict(String),

    // ========== Integration errors ==========
    #[error("Credential error: {0}")]
    /// Malformed or tampered processor token (502, isolated per organizer)
    Credential(String),

    #[error(transparent)]
    /// Payment processor call failed (502, or 400 for sandbox mismatch)
    Gateway(#[from] GatewayError),

    #[error("Reconciliation failed: {0}")]
    /// Single-order reconciliation failure (502)
    Reconciliation(String),

    // ========== System errors (5xx) ==========
    #[error("Database error: {0}")]
    /// Database error (500)
    Database(String),

    #[error("Internal server error: {0}")]
    /// Internal error (500)
    Internal(String),
}

impl AppError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a credential error
    pub fn credential(msg: impl Into<String>) -> Self {
        Self::Credential(msg.into())
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Credential(_) => "credential",
            AppError::Gateway(_) => "gateway",
            AppError::Reconciliation(_) => "reconciliation",
            AppError::Database(_) => "database",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

/// Error body returned to clients
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            // A sandbox/production account mismatch is a request problem,
            // not a processor outage.
            AppError::Gateway(GatewayError::SandboxCounterpart(_)) => StatusCode::BAD_REQUEST,
            AppError::Credential(_) | AppError::Gateway(_) | AppError::Reconciliation(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(code = self.code(), "{self}");
        }

        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
