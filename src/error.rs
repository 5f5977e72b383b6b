//! Error types for grabbit
//!
//! This module provides the error taxonomy for grab jobs:
//! - Configuration errors (the job never starts)
//! - Transport errors against the source server (connect, timeout, HTTP status)
//! - Destination session errors
//! - Validation aborts raised by policy guards
//! - HTTP status code mapping for the status API
//!
//! Resource release failures are deliberately absent here. They are recorded
//! by [`crate::context::ReleaseReport`] and never propagate.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for grabbit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for grabbit
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "path")
        key: Option<String>,
    },

    /// Request against the source server failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Destination repository session could not be obtained or used
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// A policy guard rejected the job
    #[error("validation aborted: {0}")]
    ValidationAbort(String),

    /// A processing step failed
    #[error("step '{step}' failed: {message}")]
    Step {
        /// Name of the failing step
        step: String,
        /// What went wrong
        message: String,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Job or transaction not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new transactions
    #[error("shutdown in progress: not accepting new transactions")]
    ShuttingDown,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Errors raised while talking to the source server
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not connect to the source server
    #[error("connection to {url} failed: {message}")]
    Connect {
        /// Request URL (credentials are never part of it)
        url: String,
        /// Underlying error
        message: String,
    },

    /// The request did not complete within the configured timeout
    #[error("request to {url} timed out")]
    Timeout {
        /// Request URL
        url: String,
    },

    /// The source server answered with a non-2xx status
    #[error("source server returned HTTP {status} for {url}")]
    Status {
        /// Request URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Any other request failure (client construction, body read, ...)
    #[error("request to {url} failed: {message}")]
    Request {
        /// Request URL
        url: String,
        /// Underlying error
        message: String,
    },
}

impl TransportError {
    /// Classify a reqwest error into connect / timeout / generic failure
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_connect() {
            TransportError::Connect {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            TransportError::Request {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Errors raised while acquiring a destination repository session
#[derive(Debug, Error)]
pub enum SessionError {
    /// The repository could not be reached
    #[error("repository unreachable: {0}")]
    Unreachable(String),

    /// The identity is unknown or not permitted to write
    #[error("invalid identity '{0}'")]
    InvalidIdentity(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "not found: job 123",
///     "details": { "job_execution_id": 123 }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "config_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::ValidationAbort(_) => 422,
            Error::NotFound(_) => 404,

            Error::Step { .. } => 500,
            Error::Database(_) => 500,
            Error::Sqlx(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // The source server or destination repository misbehaved
            Error::Transport(TransportError::Timeout { .. }) => 504,
            Error::Transport(_) => 502,
            Error::Session(_) => 502,

            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Transport(e) => match e {
                TransportError::Connect { .. } => "connect_failed",
                TransportError::Timeout { .. } => "timeout",
                TransportError::Status { .. } => "upstream_status",
                TransportError::Request { .. } => "request_failed",
            },
            Error::Session(e) => match e {
                SessionError::Unreachable(_) => "repository_unreachable",
                SessionError::InvalidIdentity(_) => "invalid_identity",
            },
            Error::ValidationAbort(_) => "validation_failed",
            Error::Step { .. } => "step_failed",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            Error::Transport(TransportError::Status { url, status }) => Some(serde_json::json!({
                "url": url,
                "status": status,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
