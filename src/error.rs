//! Error types for datadex

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for datadex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in datadex operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid <hash>: {0}")]
    InvalidHash(String),

    #[error("at least one <hash> argument required")]
    EmptyBatch,

    #[error("Invalid dataset handle: {0}")]
    InvalidHandle(String),

    #[error("Invalid manifest: {0}")]
    Manifest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Integrity check failed: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("blob {hash} ({}): {source}", .path.display())]
    Transfer {
        hash: String,
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap an error with the blob it was raised for
    pub fn in_transfer(self, hash: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Error::Transfer {
            hash: hash.into(),
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through transfer context
    pub fn root(&self) -> &Error {
        match self {
            Error::Transfer { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound(_))
    }

    /// Malformed input rejected before any I/O was attempted
    pub fn is_validation(&self) -> bool {
        matches!(
            self.root(),
            Error::InvalidHash(_) | Error::EmptyBatch | Error::InvalidHandle(_)
        )
    }

    pub fn is_io(&self) -> bool {
        matches!(self.root(), Error::Io(_))
    }
}
