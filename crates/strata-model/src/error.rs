// error.rs — Error types for the model subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, mutating, or saving a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A YAML model file could not be parsed or written.
    #[error("YAML error in {path}: {source}")]
    YamlError {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// An element field map could not be converted into an element.
    #[error("invalid element: {0}")]
    InvalidElement(#[from] serde_json::Error),

    /// The named layer does not exist in the model.
    #[error("layer not found: '{0}'")]
    LayerNotFound(String),

    /// The named element does not exist in the model.
    #[error("element not found: '{0}'")]
    ElementNotFound(String),
}
