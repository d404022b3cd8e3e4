// error.rs — Error types for hashing and snapshotting.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while hashing files or models.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to read a file for hashing.
    #[error("failed to hash file at {path}: {source}")]
    HashFileFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize model content into its canonical form.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
