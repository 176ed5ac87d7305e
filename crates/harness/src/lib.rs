//! vaultbridge test harness
//!
//! Drives a running note-taking application from Rust tests:
//! - Registers the test vault and launches the host with its open URI
//! - Runs typed commands in the host through the bridge
//! - Waits for the host's indexer before tests inspect content
//! - Reads and asserts on vault files
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Session                                     │
//! │    ├── HostHandle  (spawn / stop)            │
//! │    └── Bridge ── Transport (JSON lines)      │
//! │          ├── content::*                      │
//! │          ├── indexing::wait_for_*            │
//! │          └── assertions::assert_*            │
//! ├──────────────────────────────────────────────┤
//! │  vaultbridge-agent (remote side)             │
//! │    └── dispatch(AppContext, Command)         │
//! └──────────────────────────────────────────────┘
//! ```

pub mod assertions;
pub mod bridge;
pub mod config;
pub mod content;
pub mod error;
pub mod indexing;
pub mod launcher;
pub mod session;

pub use bridge::{Bridge, LineTransport, Transport};
pub use config::{HarnessConfig, HostConfig};
pub use error::{HarnessError, HarnessResult};
pub use indexing::{wait_for_index_settled, wait_for_indexing_complete, DEFAULT_INDEXING_TIMEOUT};
pub use launcher::HostHandle;
pub use session::{Session, SessionOptions};
pub use vaultbridge_common::ReadMode;
