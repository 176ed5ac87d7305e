//! Agent error types

use std::path::PathBuf;
use thiserror::Error;

pub type AgentResult<T> = Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Vault directory does not exist: {0}")]
    VaultMissing(PathBuf),

    #[error("No vault to open: pass --vault or an open URI")]
    NoVault,

    #[error("Vault registry error: {0}")]
    Registry(#[from] vaultbridge_common::Error),

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tokio_util::codec::LinesCodecError> for AgentError {
    fn from(e: tokio_util::codec::LinesCodecError) -> Self {
        match e {
            tokio_util::codec::LinesCodecError::Io(io) => AgentError::Io(io),
            other => AgentError::Transport(other.to_string()),
        }
    }
}
