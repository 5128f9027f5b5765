//! Error types for dailypapers.
//!
//! Library crates use [`DigestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all dailypapers operations.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network, HTTP, or render failure while talking to a remote.
    #[error("transport error: {0}")]
    Transport(String),

    /// HTML/Atom parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The ranking source produced nothing for the requested date.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// No rate-limit permit became available before the deadline.
    #[error("rate limit permit not granted within {waited:?}")]
    RateLimitTimeout { waited: Duration },

    /// A single listing entry is missing a required field.
    #[error("malformed entry: {reason}")]
    MalformedEntry { reason: String },

    /// Detail-report collaborator failure for one document.
    #[error("report error: {0}")]
    Report(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad date, empty identifier, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DigestError>;

impl DigestError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a malformed-entry error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEntry {
            reason: reason.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether retrying the failed call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DigestError::config("top_n must be positive");
        assert_eq!(err.to_string(), "config error: top_n must be positive");

        let err = DigestError::malformed("entry without id");
        assert!(err.to_string().contains("entry without id"));
    }

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(DigestError::Transport("connection reset".into()).is_retryable());
        assert!(!DigestError::parse("bad xml").is_retryable());
        assert!(
            !DigestError::RateLimitTimeout {
                waited: Duration::from_secs(1)
            }
            .is_retryable()
        );
    }
}
