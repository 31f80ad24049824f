//! Error types for cvm-inventory.
//!
//! Classification drops are not errors; everything here ends the run.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ConfigError;
use crate::directory::DirectoryError;

/// Result type alias for inventory operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Settings could not be loaded or were invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The directory client failed.
    #[error("directory request failed: {0}")]
    Directory(#[from] DirectoryError),

    /// A cache file could not be read or written.
    #[error("cache file '{path}': {source}")]
    Cache {
        /// Path of the cache file
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Creates a new cache IO error.
    pub fn cache(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Cache {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 2,
            Error::Directory(DirectoryError::NotConfigured(_)) => 2,
            Error::Directory(_) => 3,
            Error::Cache { .. } => 4,
            Error::Json(_) => 1,
        }
    }
}
