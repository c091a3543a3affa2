//! Error type system for lendkeeper
//!
//! This module provides the crate-wide error taxonomy with:
//! - Explicit variants for ledger conflicts and lookup misses
//! - Provider/auth failure classification
//! - HTTP status code mapping for the status API
//! - Error responses with trace IDs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Main error type for the lendkeeper system
#[derive(Debug, thiserror::Error)]
pub enum LendError {
    // System-level errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task error: {0}")]
    TaskError(String),

    // Request-level errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Ledger errors (explicit result variants, callers must handle)
    #[error("Not borrowed: {0}")]
    NotBorrowed(String),

    #[error("Loan limit reached: {0}")]
    LoanLimitReached(String),

    // Provider errors (stopped at the resolver boundary)
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Credential error: {0}")]
    CredentialError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    // Notification errors (logged and skipped by the sweep)
    #[error("Notification failure: {0}")]
    NotificationFailure(String),
}

impl LendError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            LendError::InvalidRequest(_) | LendError::ValidationError(_) => {
                StatusCode::BAD_REQUEST
            }

            // 401 Unauthorized
            LendError::AuthError(_) => StatusCode::UNAUTHORIZED,

            // 404 Not Found
            LendError::NotFound(_) | LendError::NotBorrowed(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            LendError::LoanLimitReached(_) => StatusCode::CONFLICT,

            // 502 Bad Gateway
            LendError::ProviderError(_) | LendError::ProviderUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }

            // 500 Internal Server Error
            LendError::ConfigError(_)
            | LendError::DatabaseError(_)
            | LendError::IoError(_)
            | LendError::TaskError(_)
            | LendError::CredentialError(_)
            | LendError::NotificationFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type name for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            LendError::ConfigError(_) => "ConfigError",
            LendError::DatabaseError(_) => "DatabaseError",
            LendError::IoError(_) => "IoError",
            LendError::TaskError(_) => "TaskError",
            LendError::InvalidRequest(_) => "InvalidRequest",
            LendError::ValidationError(_) => "ValidationError",
            LendError::NotFound(_) => "NotFound",
            LendError::NotBorrowed(_) => "NotBorrowed",
            LendError::LoanLimitReached(_) => "LoanLimitReached",
            LendError::ProviderError(_) => "ProviderError",
            LendError::ProviderUnavailable(_) => "ProviderUnavailable",
            LendError::CredentialError(_) => "CredentialError",
            LendError::AuthError(_) => "AuthError",
            LendError::NotificationFailure(_) => "NotificationFailure",
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LendError::DatabaseError(_)
                | LendError::ProviderError(_)
                | LendError::ProviderUnavailable(_)
                | LendError::NotificationFailure(_)
        )
    }

    /// Check if this error stops at the resolver boundary instead of
    /// propagating to the caller; these degrade to an empty candidate
    /// list
    pub fn is_provider_level(&self) -> bool {
        matches!(
            self,
            LendError::ProviderError(_)
                | LendError::ProviderUnavailable(_)
                | LendError::CredentialError(_)
                | LendError::AuthError(_)
        )
    }
}

/// Error response structure for API endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Unique trace ID for this error
    pub trace_id: String,
}

impl ErrorResponse {
    /// Create a new error response with a generated trace ID
    pub fn new(error: String, message: String) -> Self {
        Self {
            error,
            message,
            trace_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an error response from a LendError
    pub fn from_error(error: &LendError) -> Self {
        Self::new(error.error_type().to_string(), error.to_string())
    }
}

/// Implement IntoResponse for LendError to enable automatic error handling in Axum
impl IntoResponse for LendError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_response = ErrorResponse::from_error(&self);

        tracing::error!(
            error_type = self.error_type(),
            trace_id = %error_response.trace_id,
            status_code = %status_code,
            "Request failed: {}",
            self
        );

        (status_code, Json(error_response)).into_response()
    }
}

/// Result type alias for operations that can fail with LendError
pub type Result<T> = std::result::Result<T, LendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            LendError::ValidationError("test".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            LendError::AuthError("test".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            LendError::NotBorrowed("test".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            LendError::LoanLimitReached("test".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            LendError::ProviderUnavailable("test".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            LendError::DatabaseError(rusqlite::Error::InvalidQuery).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_types() {
        assert_eq!(
            LendError::NotBorrowed("test".into()).error_type(),
            "NotBorrowed"
        );
        assert_eq!(
            LendError::CredentialError("test".into()).error_type(),
            "CredentialError"
        );
    }

    #[test]
    fn test_error_retryable() {
        assert!(LendError::ProviderError("test".into()).is_retryable());
        assert!(LendError::NotificationFailure("test".into()).is_retryable());
        assert!(!LendError::ValidationError("test".into()).is_retryable());
        assert!(!LendError::NotBorrowed("test".into()).is_retryable());
    }

    #[test]
    fn test_provider_level_classification() {
        assert!(LendError::ProviderError("test".into()).is_provider_level());
        assert!(LendError::AuthError("test".into()).is_provider_level());
        assert!(!LendError::ValidationError("test".into()).is_provider_level());
        assert!(!LendError::NotBorrowed("test".into()).is_provider_level());
    }

    #[test]
    fn test_error_response_creation() {
        let error = LendError::NotFound("no such loan".into());
        let response = ErrorResponse::from_error(&error);

        assert_eq!(response.error, "NotFound");
        assert!(response.message.contains("no such loan"));
        assert!(!response.trace_id.is_empty());
    }
}
