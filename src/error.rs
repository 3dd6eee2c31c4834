//! Error types for spectrum parsing and processing.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for all core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the batch orchestrator. The core fails fast per
/// call; batch-level continuation is the caller's decision.
#[derive(Debug, Error)]
pub enum Error {
    /// No registered detector tag matches the filename. Never defaulted
    /// silently; the caller must disambiguate.
    #[error("could not resolve a detector from '{0}'")]
    UnresolvedDetector(String),

    /// Detector tag is known but absent from the registry configuration.
    #[error("detector '{0}' is not configured")]
    UnknownDetector(String),

    /// File extension outside the supported set.
    #[error("unsupported file extension: .{0}")]
    UnsupportedFormat(String),

    /// Structural marker missing or file shorter than the format allows.
    #[error("format violation in '{path}': {reason}")]
    FormatViolation { path: PathBuf, reason: String },

    /// Summation over an empty list of spectra.
    #[error("cannot sum an empty list of spectra")]
    EmptyBatch,

    /// Summation inputs of unequal channel count.
    #[error("channel count mismatch: expected {expected}, got {found} in '{name}'")]
    ShapeMismatch {
        expected: usize,
        found: usize,
        name: String,
    },

    /// Operation needs acquisition times the spectrum does not carry.
    #[error("spectrum '{0}' has no acquisition time metadata")]
    MissingTimes(String),

    /// File unreadable or unwritable.
    #[error("i/o failure on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Attach a path to a raw [`std::io::Error`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for a [`Error::FormatViolation`].
    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::FormatViolation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
