//! Error types for vaultbridge

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the vaultbridge Error
pub type Result<T> = std::result::Result<T, Error>;

/// vaultbridge error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Vault registry at {path} is corrupt: {source}")]
    RegistryCorruption {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Resource not found: {kind} with id {id}")]
    NotFound { kind: String, id: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid open URI: {0}")]
    InvalidUri(String),
}

impl Error {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }
}
