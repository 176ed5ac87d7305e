//! Test session: a running host, its bridge and the helpers tests use

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use vaultbridge_common::{FileHandle, ReadMode};

use crate::assertions;
use crate::bridge::Bridge;
use crate::config::HarnessConfig;
use crate::content;
use crate::error::{HarnessError, HarnessResult};
use crate::indexing;
use crate::launcher::HostHandle;

/// Per-test options
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Vault to open, overriding the configured one
    pub vault: Option<PathBuf>,
}

pub struct Session {
    bridge: Bridge,
    host: Option<HostHandle>,
}

impl Session {
    /// Launch the host and wait until its index has settled
    ///
    /// The host usually finishes its first pass before the bridge is ready,
    /// so this accepts an already settled index instead of waiting for the
    /// next pass. An indexing timeout here is logged and ignored; the
    /// session is usable either way.
    pub async fn launch(config: &HarnessConfig, options: SessionOptions) -> HarnessResult<Self> {
        let mut config = config.clone();
        if options.vault.is_some() {
            config.vault = options.vault;
        }

        let (host, bridge) = HostHandle::spawn(&config).await?;
        let session = Session {
            bridge,
            host: Some(host),
        };

        await_initial_index(&session.bridge, config.indexing_timeout()).await?;
        Ok(session)
    }

    /// Wrap an already connected bridge with no host process behind it
    pub fn attach(bridge: Bridge) -> Self {
        Session { bridge, host: None }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn host(&self) -> Option<&HostHandle> {
        self.host.as_ref()
    }

    pub async fn resolve_file(&self, path: &str) -> HarnessResult<FileHandle> {
        content::resolve_file(&self.bridge, path).await
    }

    pub async fn read_file(&self, path: &str, mode: ReadMode) -> HarnessResult<String> {
        content::read_file(&self.bridge, path, mode).await
    }

    pub async fn resolve_link(
        &self,
        linkpath: &str,
        source_path: &str,
    ) -> HarnessResult<Option<FileHandle>> {
        content::resolve_link(&self.bridge, linkpath, source_path).await
    }

    pub async fn list_files(&self) -> HarnessResult<Vec<FileHandle>> {
        content::list_files(&self.bridge).await
    }

    pub async fn resolved_links(&self, path: &str) -> HarnessResult<BTreeMap<String, u32>> {
        content::resolved_links(&self.bridge, path).await
    }

    pub async fn wait_for_indexing_complete(&self, timeout: Duration) -> HarnessResult<()> {
        indexing::wait_for_indexing_complete(&self.bridge, timeout).await
    }

    pub async fn wait_for_index_settled(&self, timeout: Duration) -> HarnessResult<()> {
        indexing::wait_for_index_settled(&self.bridge, timeout).await
    }

    pub async fn assert_file_equals(
        &self,
        path: &str,
        expected: &str,
        mode: ReadMode,
    ) -> HarnessResult<()> {
        assertions::assert_file_equals(&self.bridge, path, expected, mode).await
    }

    pub async fn assert_line_equals(
        &self,
        path: &str,
        line: usize,
        expected: &str,
        mode: ReadMode,
    ) -> HarnessResult<()> {
        assertions::assert_line_equals(&self.bridge, path, line, expected, mode).await
    }

    pub async fn assert_lines_equal(
        &self,
        path: &str,
        start: usize,
        end: usize,
        expected: &str,
        mode: ReadMode,
    ) -> HarnessResult<()> {
        assertions::assert_lines_equal(&self.bridge, path, start, end, expected, mode).await
    }

    /// Stop the host, if this session started one
    pub async fn close(mut self) {
        if let Some(mut host) = self.host.take() {
            host.stop().await;
        }
    }
}

async fn await_initial_index(bridge: &Bridge, timeout: Duration) -> HarnessResult<()> {
    match indexing::wait_for_index_settled(bridge, timeout).await {
        Ok(()) => info!("Metadata cache resolved"),
        Err(HarnessError::IndexingTimeout { .. }) => {
            warn!("Timed out waiting for metadata cache, continuing")
        }
        Err(e) => return Err(e),
    }
    Ok(())
}
