//! Error types for the log follow library.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by consumer callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a path was rejected at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTargetKind {
    NotFound,
    PermissionDenied,
    IsDirectory,
}

impl fmt::Display for InvalidTargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            InvalidTargetKind::NotFound => "does not exist",
            InvalidTargetKind::PermissionDenied => "is not readable",
            InvalidTargetKind::IsDirectory => "is a directory",
        };
        f.write_str(reason)
    }
}

/// The main error type for log follow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors surfaced outside the follow loop (registration probing, stdout).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A path cannot be followed. Only raised by registration.
    #[error("Invalid follow target '{}': {kind}", .path.display())]
    InvalidTarget { path: PathBuf, kind: InvalidTargetKind },

    /// Configuration values out of range.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The consumer callback failed; the loop stops.
    #[error("Consumer failed: {0}")]
    Consumer(#[source] BoxError),

    /// Stream has been closed or dropped.
    #[error("Stream closed")]
    StreamClosed,
}

impl Error {
    /// Wraps a consumer error.
    pub fn consumer<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Consumer(err.into())
    }

    pub(crate) fn invalid_target(path: impl Into<PathBuf>, kind: InvalidTargetKind) -> Self {
        Error::InvalidTarget {
            path: path.into(),
            kind,
        }
    }
}

/// A convenient Result type for log follow operations.
pub type Result<T> = std::result::Result<T, Error>;
