//! Background indexing loop
//!
//! Runs an indexing pass at startup and again whenever the vault changes
//! on disk. Every finished pass publishes a new [`IndexState`] generation,
//! which is the completion signal bridge callers wait on.
//!
//! [`IndexState`]: crate::context::IndexState

use crate::error::AgentResult;
use crate::vault::VaultApp;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Indexer settings
#[derive(Debug, Clone, Default)]
pub struct IndexerOptions {
    /// Delay before each pass, simulating a slow background indexer
    pub delay: Duration,

    /// Re-index when files change on disk
    pub watch: bool,
}

/// Handle to the running indexer; dropping it stops the loop
pub struct IndexerHandle {
    trigger: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
    _watcher: Option<RecommendedWatcher>,
}

impl IndexerHandle {
    /// Queue another indexing pass
    pub fn reindex(&self) {
        if self.trigger.send(()).is_err() {
            warn!("Indexer loop has stopped; reindex request dropped");
        }
    }
}

impl Drop for IndexerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start the indexing loop for `app`
pub fn spawn(app: Arc<VaultApp>, options: IndexerOptions) -> AgentResult<IndexerHandle> {
    let (trigger, rx) = mpsc::unbounded_channel();

    let watcher = if options.watch {
        Some(watch_vault(app.clone(), trigger.clone())?)
    } else {
        None
    };

    // Initial pass
    let _ = trigger.send(());

    let task = tokio::spawn(run(app, options.delay, rx));

    Ok(IndexerHandle {
        trigger,
        task,
        _watcher: watcher,
    })
}

async fn run(app: Arc<VaultApp>, delay: Duration, mut rx: mpsc::UnboundedReceiver<()>) {
    info!("Indexer started");

    while rx.recv().await.is_some() {
        // Coalesce bursts of change notifications into one pass
        while rx.try_recv().is_ok() {}

        app.mark_pending();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        app.rescan();
        app.index_pass().await;
    }

    debug!("Indexer stopped");
}

fn watch_vault(
    app: Arc<VaultApp>,
    trigger: mpsc::UnboundedSender<()>,
) -> AgentResult<RecommendedWatcher> {
    let root = app.root().to_path_buf();
    let watched = root.clone();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => {
                let relevant = event.paths.iter().any(|p| match p.strip_prefix(&root) {
                    Ok(rel) => !app.is_ignored(rel),
                    Err(_) => false,
                });
                if relevant {
                    debug!("Vault change: {:?}", event.kind);
                    app.mark_pending();
                    let _ = trigger.send(());
                }
            }
            Err(e) => warn!("Watch error: {}", e),
        }
    })?;

    watcher.watch(&watched, RecursiveMode::Recursive)?;
    info!("Watching {} for changes", watched.display());
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use crate::context::AppContext;

    #[tokio::test]
    async fn test_initial_pass_and_reindex() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.md"), "one").unwrap();
        let app = VaultApp::open(tmp.path(), vec![]).unwrap();
        let mut state = app.index_state();

        let handle = spawn(app.clone(), IndexerOptions::default()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| s.generation >= 1))
            .await
            .unwrap()
            .unwrap();

        std::fs::write(tmp.path().join("b.md"), "two").unwrap();
        handle.reindex();
        tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| s.generation >= 2))
            .await
            .unwrap()
            .unwrap();

        assert!(app.file_by_path("b.md").is_some());
    }

    #[tokio::test]
    async fn test_delay_keeps_index_pending() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.md"), "one").unwrap();
        let app = VaultApp::open(tmp.path(), vec![]).unwrap();

        let _handle = spawn(
            app.clone(),
            IndexerOptions {
                delay: Duration::from_millis(300),
                watch: false,
            },
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let state = *app.index_state().borrow();
        assert!(state.pending);
        assert_eq!(state.generation, 0);
    }

    #[tokio::test]
    async fn test_pass_settles_after_vault_root_disappears() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("vault");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join("a.md"), "one").unwrap();
        let app = VaultApp::open(&root, vec![]).unwrap();
        let mut state = app.index_state();

        let handle = spawn(app.clone(), IndexerOptions::default()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| s.generation >= 1))
            .await
            .unwrap()
            .unwrap();

        std::fs::remove_dir_all(&root).unwrap();
        handle.reindex();
        let settled = tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| s.generation >= 2 && !s.pending),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(settled.is_settled());
        assert!(app.files().is_empty());
    }
}
