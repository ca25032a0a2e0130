//! Error types for the sync pipeline.
//!
//! `SyncError` aborts a run before (or instead of) processing. `WriteError` is
//! per-track: the orchestrator records it and moves on to the next track.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or invalid run configuration (no playlist name, bad config file)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("playlist not found: {0}")]
    PlaylistNotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The target library could not be read
    #[error("library error: {0}")]
    Library(String),
}

/// Failure of a single external field write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("track {0} not found in library")]
    NotFound(String),

    #[error("library rejected write: {0}")]
    Rejected(String),

    #[error("could not reach library: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
