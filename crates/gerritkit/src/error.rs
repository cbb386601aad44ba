//! Error types for Gerrit REST operations.
//!
//! HTTP statuses are classified into the engine's
//! [`ErrorCategory`](declarative::ErrorCategory) so the reconciler can tell a
//! refused write from a lost connection.

use declarative::{ErrorCategory, ResourceKind};
use thiserror::Error;

/// Result type alias for Gerrit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to Gerrit.
#[derive(Debug, Error)]
pub enum Error {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Connection, TLS or timeout failure.
    #[error("connection failed: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// The server has no API for the requested change.
    #[error("{0}")]
    Unsupported(String),

    /// Bad client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Create an HTTP status error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Get the error category.
    ///
    /// 404 means the addressed resource is missing. Authentication failures,
    /// throttling and server errors stop the run; any other 4xx is a refusal
    /// of this one request.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Http { status: 404, .. } => ErrorCategory::NotFound,
            Error::Http {
                status: 401 | 403 | 408 | 429,
                ..
            } => ErrorCategory::Transport,
            Error::Http { status, .. } if *status >= 500 => ErrorCategory::Transport,
            Error::Http { .. } | Error::Unsupported(_) => ErrorCategory::Rejected,
            Error::Transport(_) | Error::InvalidResponse(_) => ErrorCategory::Transport,
            Error::Config(_) => ErrorCategory::Validation,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            // Credentials will not start working on the next attempt
            Error::Http {
                status: 401 | 403, ..
            } => false,
            _ => self.category().is_retryable(),
        }
    }

    /// Convert a failed read of `kind`/`identity` into an engine error.
    pub fn into_read_error(self, kind: ResourceKind, identity: &str) -> declarative::Error {
        match self.category() {
            ErrorCategory::NotFound => declarative::Error::NotFound {
                kind,
                identity: identity.to_string(),
            },
            _ => self.into(),
        }
    }

    /// Convert a failed write into an engine error.
    ///
    /// The resource was just read, so a 404 on a write names a missing
    /// member or referenced group, which is a refusal of that one change.
    pub fn into_write_error(self) -> declarative::Error {
        match self.category() {
            ErrorCategory::NotFound => declarative::Error::rejected(self.to_string()),
            _ => self.into(),
        }
    }
}

impl From<Error> for declarative::Error {
    fn from(err: Error) -> Self {
        match err.category() {
            ErrorCategory::Rejected | ErrorCategory::NotFound => Self::rejected(err.to_string()),
            ErrorCategory::Validation => Self::rejected(err.to_string()),
            ErrorCategory::Transport | ErrorCategory::Cancelled => Self::transport(err.to_string()),
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::http(code, format!("HTTP {code}")),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
