//! Error types for blockctx.
//!
//! Library crates use [`BlockCtxError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! [`RecordError`] describes one bad record; compilation collects these and
//! keeps going.

use std::path::PathBuf;

/// Top-level error type for all blockctx operations.
#[derive(Debug, thiserror::Error)]
pub enum BlockCtxError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed hierarchical or tabular source. Fatal for that source.
    #[error("source format error: {message}")]
    SourceFormat { message: String },

    /// A persisted dictionary could not be understood.
    #[error("dictionary error: {message}")]
    Dictionary { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// JSON/CSV serialization error on output.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BlockCtxError>;

impl BlockCtxError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a source format error from any displayable message.
    pub fn source_format(msg: impl Into<String>) -> Self {
        Self::SourceFormat {
            message: msg.into(),
        }
    }

    /// Create a source format error pinned to a byte offset in the source.
    pub fn source_format_at(offset: u64, msg: impl std::fmt::Display) -> Self {
        Self::SourceFormat {
            message: format!("{msg} (at byte {offset})"),
        }
    }

    /// Create a dictionary error from any displayable message.
    pub fn dictionary(msg: impl Into<String>) -> Self {
        Self::Dictionary {
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
}

/// A single record that failed normalization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("row {row}{}: {message}", .name.as_deref().map(|n| format!(" ({n})")).unwrap_or_default())]
pub struct RecordError {
    /// 1-based data row within the source, header excluded.
    pub row: usize,
    /// Reference name, when it could be read.
    pub name: Option<String>,
    /// What went wrong.
    pub message: String,
}

impl RecordError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            name: None,
            message: message.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = BlockCtxError::config("budget must be at least 1");
        assert_eq!(err.to_string(), "config error: budget must be at least 1");

        let err = BlockCtxError::source_format_at(42, "unterminated element");
        assert_eq!(
            err.to_string(),
            "source format error: unterminated element (at byte 42)"
        );
    }

    #[test]
    fn record_error_display() {
        let err = RecordError::new(7, "wrong field count");
        assert_eq!(err.to_string(), "row 7: wrong field count");

        let err = RecordError::new(3, "bad row").with_name("SET_IGN_ON");
        assert_eq!(err.to_string(), "row 3 (SET_IGN_ON): bad row");
    }
}
