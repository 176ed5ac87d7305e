//! vaultbridge agent
//!
//! The remote side of the bridge. It keeps the live state of one open vault
//! (content index, content cache, link table, background indexer) and runs
//! bridge commands against it through a fixed handler table.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod indexer;
pub mod server;
pub mod vault;

pub use config::AgentConfig;
pub use context::{AppContext, IndexState};
pub use dispatch::dispatch;
pub use error::{AgentError, AgentResult};
pub use indexer::{IndexerHandle, IndexerOptions};
pub use server::{serve, serve_tcp};
pub use vault::VaultApp;
