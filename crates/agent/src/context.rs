//! Application context handed to every command handler
//!
//! Handlers never reach for global state; whatever they touch comes
//! through this trait, so tests can swap in a scripted application.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io;
use tokio::sync::watch;
use vaultbridge_common::FileHandle;

/// Progress of the background indexer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexState {
    /// Number of completed indexing passes
    pub generation: u64,
    /// A pass is queued or running
    pub pending: bool,
}

impl IndexState {
    /// At least one pass finished and nothing is queued
    pub fn is_settled(&self) -> bool {
        self.generation > 0 && !self.pending
    }
}

/// Live application state for one open vault
#[async_trait]
pub trait AppContext: Send + Sync {
    /// Look up a vault-relative path in the content index
    fn file_by_path(&self, path: &str) -> Option<FileHandle>;

    /// Every indexed file, sorted by path
    fn files(&self) -> Vec<FileHandle>;

    /// First destination of a link target as seen from `source_path`
    fn first_linkpath_dest(&self, linkpath: &str, source_path: &str) -> Option<FileHandle>;

    /// Destinations resolved by the last indexing pass for `path`
    fn resolved_links(&self, path: &str) -> Option<BTreeMap<String, u32>>;

    /// Content from the application cache, falling back to the store
    async fn cached_read(&self, file: &FileHandle) -> io::Result<String>;

    /// Content straight from the store
    async fn read(&self, file: &FileHandle) -> io::Result<String>;

    /// Subscribe to indexer progress
    fn index_state(&self) -> watch::Receiver<IndexState>;
}
