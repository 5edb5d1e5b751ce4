//! Presence errors

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the presence registry and its stores
#[derive(Error, Debug)]
pub enum PresenceError {
    /// Heartbeat without a caller identity
    #[error("Not authenticated: sign in to share presence")]
    Unauthenticated,

    /// Failed to open the presence database
    #[error("Failed to open presence database '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type for presence operations
pub type PresenceResult<T> = Result<T, PresenceError>;
