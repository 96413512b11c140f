//! Error types for chgk-import
//!
//! Two layers:
//! - [`ImportError`]: job-level failure carrying a kind, a retry decision and
//!   the message shown to the uploader. This is what ends up on the job record.
//! - [`ApiError`]: HTTP error for the status API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Classification of a failed import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Bad input file or manifest
    Validation,
    /// Source document could not be read
    Extraction,
    /// No recoverable structure (no tours or no questions)
    Parsing,
    /// Network or lock contention, worth retrying
    Transient,
    /// Persistence failure, transaction rolled back
    Database,
    Cancelled,
    Timeout,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Extraction => "EXTRACTION",
            ErrorKind::Parsing => "PARSING",
            ErrorKind::Transient => "TRANSIENT",
            ErrorKind::Database => "DATABASE",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Timeout => "TIMEOUT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "VALIDATION" => Some(ErrorKind::Validation),
            "EXTRACTION" => Some(ErrorKind::Extraction),
            "PARSING" => Some(ErrorKind::Parsing),
            "TRANSIENT" => Some(ErrorKind::Transient),
            "DATABASE" => Some(ErrorKind::Database),
            "CANCELLED" => Some(ErrorKind::Cancelled),
            "TIMEOUT" => Some(ErrorKind::Timeout),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job-level import failure
#[derive(Debug, Clone, Error)]
#[error("{kind}: {user_message}")]
pub struct ImportError {
    pub kind: ErrorKind,
    pub retriable: bool,
    /// Message safe to show to the uploader
    pub user_message: String,
}

impl ImportError {
    fn new(kind: ErrorKind, user_message: impl Into<String>) -> Self {
        Self {
            kind,
            retriable: kind == ErrorKind::Transient,
            user_message: user_message.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, msg)
    }

    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Extraction, msg)
    }

    pub fn parsing(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parsing, msg)
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, msg)
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, msg)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Import was cancelled")
    }

    pub fn timeout(limit_secs: u64) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("Import did not finish within {} seconds", limit_secs),
        )
    }
}

impl From<chgk_common::Error> for ImportError {
    fn from(err: chgk_common::Error) -> Self {
        use chgk_common::Error;

        if err.is_database_locked() {
            return ImportError::transient(format!("Database busy: {}", err));
        }

        match err {
            Error::Database(e) => ImportError::database(format!("Database error: {}", e)),
            Error::Io(e) => ImportError::extraction(format!("File error: {}", e)),
            Error::Config(msg) | Error::InvalidInput(msg) | Error::NotFound(msg) => {
                ImportError::validation(msg)
            }
            Error::Internal(msg) => ImportError::database(msg),
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upload exceeds configured limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Common error: {0}")]
    Common(#[from] chgk_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retriable() {
        assert!(ImportError::transient("net").retriable);
        assert!(!ImportError::validation("bad").retriable);
        assert!(!ImportError::extraction("corrupt").retriable);
        assert!(!ImportError::parsing("empty").retriable);
        assert!(!ImportError::database("fk").retriable);
        assert!(!ImportError::cancelled().retriable);
        assert!(!ImportError::timeout(10).retriable);
    }

    #[test]
    fn test_kind_string_roundtrip() {
        for kind in [
            ErrorKind::Validation,
            ErrorKind::Extraction,
            ErrorKind::Parsing,
            ErrorKind::Transient,
            ErrorKind::Database,
            ErrorKind::Cancelled,
            ErrorKind::Timeout,
        ] {
            assert_eq!(ErrorKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ErrorKind::parse("nope"), None);
    }

    #[test]
    fn test_common_error_mapping() {
        let err: ImportError = chgk_common::Error::InvalidInput("bad title".into()).into();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.user_message, "bad title");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ImportError = chgk_common::Error::Io(io).into();
        assert_eq!(err.kind, ErrorKind::Extraction);
    }

    #[test]
    fn test_display_includes_kind() {
        let err = ImportError::timeout(30);
        assert_eq!(err.to_string(), "TIMEOUT: Import did not finish within 30 seconds");
    }
}
