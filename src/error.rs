//! Error types for the comment storage engine.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - A coarse category per code so callers can branch on kind
//! - Structured JSON output for logs and admin tooling
//!
//! Domain errors (`ThreadNotFound`, `CommentNotFound`, `InvalidRelationship`)
//! are meant to be translated into responses by the caller. Everything in
//! the I/O category is backend failure and is never retried here.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Not Found
    ThreadNotFound,
    CommentNotFound,

    // Relationship
    InvalidRelationship,

    // Config
    ConfigError,

    // I/O
    DatabaseError,
    BackendError,
    IoError,
    JsonError,
}

/// Coarse grouping of error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Relationship,
    Config,
    Io,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::ThreadNotFound => "THREAD_NOT_FOUND",
            Self::CommentNotFound => "COMMENT_NOT_FOUND",
            Self::InvalidRelationship => "INVALID_RELATIONSHIP",
            Self::ConfigError => "CONFIG_ERROR",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::BackendError => "BACKEND_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
        }
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::ThreadNotFound | Self::CommentNotFound => ErrorCategory::NotFound,
            Self::InvalidRelationship => ErrorCategory::Relationship,
            Self::ConfigError => ErrorCategory::Config,
            Self::DatabaseError | Self::BackendError | Self::IoError | Self::JsonError => {
                ErrorCategory::Io
            }
        }
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in storage operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Thread not found: {path}")]
    ThreadNotFound { path: String },

    #[error("Comment not found: {id}")]
    CommentNotFound { id: Uuid },

    #[error("Invalid reply target: {reply_to}")]
    InvalidRelationship { reply_to: Uuid },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[cfg(any(feature = "postgres", feature = "mysql"))]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::ThreadNotFound { .. } => ErrorCode::ThreadNotFound,
            Self::CommentNotFound { .. } => ErrorCode::CommentNotFound,
            Self::InvalidRelationship { .. } => ErrorCode::InvalidRelationship,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Database(_) => ErrorCode::DatabaseError,
            #[cfg(any(feature = "postgres", feature = "mysql"))]
            Self::Sqlx(_) => ErrorCode::DatabaseError,
            Self::Backend(_) => ErrorCode::BackendError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.error_code().category(), ErrorCategory::NotFound)
    }

    /// Backend or I/O failure; the only category a retry could help with.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.error_code().category(), ErrorCategory::Io)
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "transient": self.is_transient(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_map_to_categories() {
        let err = Error::CommentNotFound { id: Uuid::nil() };
        assert_eq!(err.error_code(), ErrorCode::CommentNotFound);
        assert!(err.is_not_found());
        assert!(!err.is_transient());

        let err = Error::InvalidRelationship { reply_to: Uuid::nil() };
        assert_eq!(err.error_code().category(), ErrorCategory::Relationship);
        assert!(!err.is_not_found());

        let err = Error::Backend("throttled".to_string());
        assert!(err.is_transient());
        assert_eq!(err.error_code().as_str(), "BACKEND_ERROR");
    }

    #[test]
    fn test_structured_json() {
        let err = Error::ThreadNotFound {
            path: "/missing/".to_string(),
        };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "THREAD_NOT_FOUND");
        assert_eq!(json["error"]["message"], "Thread not found: /missing/");
        assert_eq!(json["error"]["transient"], false);
    }
}
