//! Centralized error types for mboxlens.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mboxlens library.
///
/// Decode problems (malformed headers, encoded-words, dates) never show up
/// here — they degrade to placeholder values and are logged. Cancellation is
/// a distinct variant so callers can keep partial progress instead of
/// treating it as a failure.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("archive file not found: {0}")]
    FileNotFound(PathBuf),

    /// A byte range outside the source was requested.
    #[error("invalid range {start}..{end} for source of {size} bytes")]
    InvalidRange { start: u64, end: u64, size: u64 },

    /// The operation was cancelled via its [`CancelToken`](crate::cancel::CancelToken).
    #[error("operation cancelled")]
    Cancelled,
}

/// Convenience alias for `Result<T, ArchiveError>`.
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a cancellation (partial work already produced
    /// by the caller remains usable).
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
