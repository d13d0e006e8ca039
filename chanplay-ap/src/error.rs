//! Error types for chanplay-ap
//!
//! Per-item failures (`SourceUnavailable`, `Transcode`, `Playback`) are
//! absorbed by the worker loops. `QueueClosed`, `Unparseable` and
//! `InvalidArgument` surface to the caller. `Cancelled` only unwinds.

use thiserror::Error;

/// Main error type for chanplay-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Operation attempted on a stopped worker
    #[error("Queue closed")]
    QueueClosed,

    /// Cooperative cancellation
    #[error("Operation cancelled")]
    Cancelled,

    /// Source could not be opened or read
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// External transcoder failed
    #[error("Transcode error: {0}")]
    Transcode(String),

    /// No request parser accepted the input
    #[error("Unparseable request: {0}")]
    Unparseable(String),

    /// Caller supplied an invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Output sink errors
    #[error("Output sink error: {0}")]
    Sink(String),

    /// Playback pipeline misuse or failure
    #[error("Playback error: {0}")]
    Playback(String),

    /// File store errors
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// True for cooperative cancellation, which callers must not log as a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<chanplay_common::Error> for Error {
    fn from(err: chanplay_common::Error) -> Self {
        match err {
            chanplay_common::Error::Io(e) => Error::Io(e),
            chanplay_common::Error::InvalidInput(msg) => Error::InvalidArgument(msg),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Convenience Result type using chanplay-ap Error
pub type Result<T> = std::result::Result<T, Error>;
