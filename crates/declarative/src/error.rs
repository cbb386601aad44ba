//! Error types for reconciliation.
//!
//! Errors are categorized so the engine can decide whether a failure stops
//! the current invocation (transport, cancellation) or is recorded against a
//! single field and the loop continues (rejection).

use crate::resource::ResourceKind;
use std::fmt;
use thiserror::Error;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad declared field name or value; raised before any remote call
    Validation,
    /// Resource does not exist on the server
    NotFound,
    /// Connection, authentication or server failure
    Transport,
    /// The server refused one specific write
    Rejected,
    /// The caller cancelled the invocation
    Cancelled,
}

impl ErrorCategory {
    /// Whether an error of this category ends the current invocation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Transport | Self::Cancelled)
    }

    /// Whether an adapter may transparently retry a read that failed this way.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Validation => "Invalid declared state",
            Self::NotFound => "Resource not found",
            Self::Transport => "Connection to the review server failed",
            Self::Rejected => "Server rejected the change",
            Self::Cancelled => "Reconciliation cancelled",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Validation => "Check field names and values against the resource schema",
            Self::NotFound => "The resource will be created on the next present run",
            Self::Transport => "Check the server URL, credentials and network, then re-run",
            Self::Rejected => "Check the value is accepted by the server for this field",
            Self::Cancelled => "Re-run to apply the remaining changes",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors raised by the engine and by [`Remote`](crate::context::Remote) adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A declared key is not part of the kind's schema
    #[error("unknown field '{key}' for {kind}")]
    UnknownField {
        /// Resource kind being validated
        kind: ResourceKind,
        /// The offending key
        key: String,
    },

    /// A declared value cannot be coerced to the field's type
    #[error("invalid value for {kind} field '{key}': {message}")]
    InvalidValue {
        /// Resource kind being validated
        kind: ResourceKind,
        /// The offending key
        key: String,
        /// What was wrong with the value
        message: String,
    },

    /// The resource does not exist remotely
    #[error("{kind} '{identity}' not found")]
    NotFound {
        /// Resource kind
        kind: ResourceKind,
        /// Identity that was looked up
        identity: String,
    },

    /// Connection-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The server refused a write
    #[error("rejected: {0}")]
    Rejected(String),

    /// Two invocations in one plan address the same resource
    #[error("duplicate invocation for {kind} '{identity}'")]
    DuplicateIdentity {
        /// Resource kind
        kind: ResourceKind,
        /// Identity declared twice
        identity: String,
    },

    /// The apply loop was cancelled before all operations ran
    #[error("reconciliation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a rejection error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Create an invalid-value error.
    pub fn invalid(kind: ResourceKind, key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            kind,
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnknownField { .. }
            | Error::InvalidValue { .. }
            | Error::DuplicateIdentity { .. } => ErrorCategory::Validation,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Transport(_) => ErrorCategory::Transport,
            Error::Rejected(_) => ErrorCategory::Rejected,
            Error::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Whether this error ends the current invocation.
    pub fn is_terminal(&self) -> bool {
        self.category().is_terminal()
    }

    /// Whether this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_categories() {
        assert!(ErrorCategory::Transport.is_terminal());
        assert!(ErrorCategory::Cancelled.is_terminal());
        assert!(!ErrorCategory::Rejected.is_terminal());
        assert!(!ErrorCategory::NotFound.is_terminal());
        assert!(!ErrorCategory::Validation.is_terminal());
    }

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(ErrorCategory::Transport.is_retryable());
        assert!(!ErrorCategory::Rejected.is_retryable());
        assert!(!ErrorCategory::Cancelled.is_retryable());
    }

    #[test]
    fn test_error_category_mapping() {
        let err = Error::UnknownField {
            kind: ResourceKind::Group,
            key: "memebers".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(err.to_string(), "unknown field 'memebers' for group");

        assert!(Error::transport("connection reset").is_terminal());
        assert!(!Error::rejected("bad email").is_terminal());
        assert!(
            Error::NotFound {
                kind: ResourceKind::Project,
                identity: "tools".into()
            }
            .is_not_found()
        );
    }
}
