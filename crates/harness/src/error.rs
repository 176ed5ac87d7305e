//! Error types for the test harness

use thiserror::Error;
use vaultbridge_common::{ErrorCode, RemoteError};

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Host application not found. Set host.program in the harness config")]
    HostNotFound,

    #[error("Host failed to start: {0}")]
    HostStartup(String),

    #[error("Remote invocation failed: {0}")]
    RemoteInvocation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Indexing did not complete within {timeout_ms} ms")]
    IndexingTimeout { timeout_ms: u64 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Bridge disconnected")]
    Disconnected,

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("{0}")]
    Common(vaultbridge_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<vaultbridge_common::Error> for HarnessError {
    fn from(e: vaultbridge_common::Error) -> Self {
        match e {
            vaultbridge_common::Error::UnsupportedPlatform(msg) => {
                HarnessError::UnsupportedPlatform(msg)
            }
            other => HarnessError::Common(other),
        }
    }
}

impl HarnessError {
    /// Map a failure reported by the remote context
    pub fn from_remote(error: RemoteError, timeout_ms: Option<u64>) -> Self {
        match error.code {
            ErrorCode::NotFound => HarnessError::NotFound(error.message),
            ErrorCode::Timeout => HarnessError::IndexingTimeout {
                timeout_ms: timeout_ms.unwrap_or_default(),
            },
            ErrorCode::BadRequest => HarnessError::Protocol(error.message),
            ErrorCode::Failed => HarnessError::RemoteInvocation(error.message),
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
