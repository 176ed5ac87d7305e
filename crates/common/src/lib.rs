//! vaultbridge Common Library
//!
//! Shared pieces used on both sides of the bridge: the wire protocol, the
//! host application's vault registry, line ending normalization and the
//! common error type.

pub mod error;
pub mod protocol;
pub mod registry;
pub mod text;

// Re-export commonly used types
pub use error::{Error, Result};
pub use protocol::{
    Command, ErrorCode, Event, ExecutionResult, FileHandle, FileStat, Frame, ReadMode,
    RemoteError, Request, Response,
};
pub use registry::{Platform, RegistryFile, VaultRegistry, VaultRegistryEntry};
pub use text::normalize_eol;

/// vaultbridge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default wait for the indexer's completion signal
pub const DEFAULT_INDEXING_TIMEOUT_MS: u64 = 10_000;
