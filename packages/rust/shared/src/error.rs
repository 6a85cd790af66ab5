//! Error types for kybcheck.
//!
//! Library crates use [`KybError`] via `thiserror`.
//! The server binary wraps this with `color-eyre` for rich diagnostics.
//!
//! Registry failures are split into distinct variants because the pipeline
//! treats them differently: not-found is a conclusive outcome, auth and
//! rate-limit errors are surfaced without retry, and everything else is a
//! generic upstream failure that falls through to the next strategy.

use std::path::PathBuf;

/// Top-level error type for all kybcheck operations.
#[derive(Debug, thiserror::Error)]
pub enum KybError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during scraping, discovery, or lookups.
    #[error("network error: {0}")]
    Network(String),

    /// HTML or response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// AI provider error (request, API, or response parsing).
    #[error("ai provider error: {0}")]
    Ai(String),

    /// Registry lookup found no company for the given CRN (HTTP 404).
    #[error("registry: no company found for {0}")]
    RegistryNotFound(String),

    /// Registry rejected our credentials (HTTP 401/403).
    #[error("registry auth error: {0}")]
    RegistryAuth(String),

    /// Registry rate limit hit (HTTP 429). Never silently retried.
    #[error("registry rate limit: {0}")]
    RegistryRateLimit(String),

    /// Any other registry API failure.
    #[error("registry api error: {0}")]
    RegistryApi(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, invalid format, illegal transition).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KybError>;

impl KybError {
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

    /// Whether this error is a transient upstream failure the pipeline may
    /// recover from by falling through to its next strategy.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Parse { .. } | Self::Ai(_) | Self::RegistryApi(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = KybError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = KybError::RegistryNotFound("12345678".into());
        assert!(err.to_string().contains("12345678"));
    }

    #[test]
    fn recoverability_classification() {
        assert!(KybError::Network("timeout".into()).is_recoverable());
        assert!(KybError::Ai("empty response".into()).is_recoverable());
        assert!(!KybError::RegistryAuth("bad key".into()).is_recoverable());
        assert!(!KybError::RegistryRateLimit("slow down".into()).is_recoverable());
        assert!(!KybError::RegistryNotFound("00000000".into()).is_recoverable());
    }
}
