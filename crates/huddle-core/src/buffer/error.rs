//! Buffer storage errors
//!
//! Typed errors for the storage backends behind the local edit buffer.
//! [`LocalBuffer`](super::LocalBuffer) swallows them, but they are logged
//! with enough detail to explain why an edit was not staged.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in a buffer storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create the directory holding the buffer file
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The write would grow the buffer past its configured quota
    #[error("Buffer quota exceeded: writing {needed} bytes to '{path}' exceeds the {quota} byte limit")]
    QuotaExceeded {
        path: PathBuf,
        needed: u64,
        quota: u64,
    },

    /// Disk is full
    #[error(
        "Disk full or quota exceeded while writing to '{path}'. Free up disk space and try again."
    )]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read file
    #[error("Failed to read '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write file
    #[error("Failed to write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Buffer file exists but is not a JSON object of strings
    #[error("Invalid buffer format in '{path}': {details}")]
    InvalidFormat { path: PathBuf, details: String },

    /// Entry could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File not found (when expected to exist)
    #[error("File not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Atomic write failed during rename
    #[error("Atomic write failed: could not rename '{from}' to '{to}': {source}")]
    AtomicWriteFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind (permission, disk full, etc.)
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied {
                path,
                source: error,
            },
            io::ErrorKind::NotFound => StorageError::NotFound { path },
            _ if is_disk_full_error(&error) => StorageError::DiskFull {
                path,
                source: error,
            },
            _ => StorageError::WriteError {
                path,
                source: error,
            },
        }
    }

    /// True for errors caused by running out of space
    pub fn is_out_of_space(&self) -> bool {
        matches!(
            self,
            StorageError::QuotaExceeded { .. } | StorageError::DiskFull { .. }
        )
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
