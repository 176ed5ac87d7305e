//! Command handler table
//!
//! Every [`Command`] maps to exactly one handler below. Handlers receive
//! the application context explicitly and return a JSON value or a
//! [`RemoteError`]; nothing they did before failing is rolled back.

use crate::context::AppContext;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use vaultbridge_common::{Command, ErrorCode, ExecutionResult, FileHandle, ReadMode, RemoteError};

/// Run one command against `ctx`
pub async fn dispatch<C>(ctx: &C, command: Command) -> ExecutionResult
where
    C: AppContext + ?Sized,
{
    debug!(op = command.op(), "Dispatching command");

    match command {
        Command::Ping => Ok(Value::String(vaultbridge_common::VERSION.to_string())),
        Command::Echo { value } => Ok(value),
        Command::ResolveFile { path } => resolve_file(ctx, &path).and_then(|f| to_value(&f)),
        Command::ReadFile { path, mode } => read_file(ctx, &path, mode).await,
        Command::ResolveLink {
            linkpath,
            source_path,
        } => to_value(&ctx.first_linkpath_dest(&linkpath, &source_path)),
        Command::ListFiles => to_value(&ctx.files()),
        Command::ResolvedLinks { path } => {
            resolve_file(ctx, &path)?;
            to_value(&ctx.resolved_links(&path).unwrap_or_default())
        }
        Command::WaitForIndexing {
            timeout_ms,
            accept_settled,
        } => wait_for_indexing(ctx, Duration::from_millis(timeout_ms), accept_settled).await,
    }
}

fn resolve_file<C>(ctx: &C, path: &str) -> Result<FileHandle, RemoteError>
where
    C: AppContext + ?Sized,
{
    ctx.file_by_path(path)
        .ok_or_else(|| RemoteError::not_found(format!("File does not exist in vault: {}", path)))
}

async fn read_file<C>(ctx: &C, path: &str, mode: ReadMode) -> ExecutionResult
where
    C: AppContext + ?Sized,
{
    let file = resolve_file(ctx, path)?;
    let content = match mode {
        ReadMode::Cached => ctx.cached_read(&file).await,
        ReadMode::Authoritative => ctx.read(&file).await,
    }
    .map_err(|e| RemoteError::failed(format!("read {}: {}", path, e)))?;
    Ok(Value::String(content))
}

/// Race the indexer's next completion against `timeout`
///
/// The subscription is dropped on every exit path. Without
/// `accept_settled` a pass that finished before the subscription does not
/// count.
async fn wait_for_indexing<C>(ctx: &C, timeout: Duration, accept_settled: bool) -> ExecutionResult
where
    C: AppContext + ?Sized,
{
    let mut rx = ctx.index_state();
    let settled = rx.borrow_and_update().is_settled();
    if accept_settled && settled {
        return Ok(Value::Null);
    }

    let signal = async {
        loop {
            if rx.changed().await.is_err() {
                return false;
            }
            if !rx.borrow_and_update().pending {
                return true;
            }
        }
    };

    tokio::select! {
        fired = signal => {
            if fired {
                Ok(Value::Null)
            } else {
                Err(RemoteError::failed("indexer stopped before completing"))
            }
        }
        _ = tokio::time::sleep(timeout) => {
            warn!("No indexing completion within {} ms", timeout.as_millis());
            Err(RemoteError::new(
                ErrorCode::Timeout,
                format!("timeout after {} ms waiting for indexing", timeout.as_millis()),
            ))
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> ExecutionResult {
    serde_json::to_value(value).map_err(|e| RemoteError::failed(format!("unserializable result: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::IndexState;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::io;
    use std::time::Instant;
    use tokio::sync::watch;
    use vaultbridge_common::FileStat;

    /// Scripted application with a fixed file set
    struct FakeApp {
        cached: Mutex<BTreeMap<String, String>>,
        stored: Mutex<BTreeMap<String, String>>,
        index: watch::Sender<IndexState>,
    }

    impl FakeApp {
        fn new(files: &[(&str, &str)], index: IndexState) -> Self {
            let map: BTreeMap<String, String> = files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect();
            Self {
                cached: Mutex::new(map.clone()),
                stored: Mutex::new(map),
                index: watch::channel(index).0,
            }
        }
    }

    #[async_trait]
    impl AppContext for FakeApp {
        fn file_by_path(&self, path: &str) -> Option<FileHandle> {
            self.stored
                .lock()
                .contains_key(path)
                .then(|| FileHandle::new(path, FileStat::default()))
        }

        fn files(&self) -> Vec<FileHandle> {
            self.stored
                .lock()
                .keys()
                .map(|p| FileHandle::new(p.clone(), FileStat::default()))
                .collect()
        }

        fn first_linkpath_dest(&self, linkpath: &str, _source_path: &str) -> Option<FileHandle> {
            self.file_by_path(&format!("{}.md", linkpath))
        }

        fn resolved_links(&self, _path: &str) -> Option<BTreeMap<String, u32>> {
            None
        }

        async fn cached_read(&self, file: &FileHandle) -> io::Result<String> {
            Ok(self.cached.lock().get(&file.path).cloned().unwrap_or_default())
        }

        async fn read(&self, file: &FileHandle) -> io::Result<String> {
            Ok(self.stored.lock().get(&file.path).cloned().unwrap_or_default())
        }

        fn index_state(&self) -> watch::Receiver<IndexState> {
            self.index.subscribe()
        }
    }

    fn settled() -> IndexState {
        IndexState {
            generation: 1,
            pending: false,
        }
    }

    #[tokio::test]
    async fn test_echo_round_trips_json() {
        let app = FakeApp::new(&[], settled());
        let value = json!({"a": [1, 2.5, null, true], "b": {"nested": "x"}});
        let result = dispatch(&app, Command::Echo { value: value.clone() }).await;
        assert_eq!(result, Ok(value));
    }

    #[tokio::test]
    async fn test_resolve_missing_file_is_not_found() {
        let app = FakeApp::new(&[("Welcome.md", "hi")], settled());
        let err = dispatch(
            &app,
            Command::ResolveFile {
                path: "does/not/exist.md".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_read_modes() {
        let app = FakeApp::new(&[("a.md", "old")], settled());
        app.stored.lock().insert("a.md".to_string(), "new".to_string());

        let cached = dispatch(
            &app,
            Command::ReadFile {
                path: "a.md".to_string(),
                mode: ReadMode::Cached,
            },
        )
        .await;
        assert_eq!(cached, Ok(json!("old")));

        let fresh = dispatch(
            &app,
            Command::ReadFile {
                path: "a.md".to_string(),
                mode: ReadMode::Authoritative,
            },
        )
        .await;
        assert_eq!(fresh, Ok(json!("new")));
    }

    #[tokio::test]
    async fn test_resolve_link_returns_null_when_unresolved() {
        let app = FakeApp::new(&[("Welcome.md", "")], settled());
        let hit = dispatch(
            &app,
            Command::ResolveLink {
                linkpath: "Welcome".to_string(),
                source_path: "/".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(hit["basename"], json!("Welcome"));

        let miss = dispatch(
            &app,
            Command::ResolveLink {
                linkpath: "Nope".to_string(),
                source_path: String::new(),
            },
        )
        .await;
        assert_eq!(miss, Ok(Value::Null));
    }

    #[tokio::test]
    async fn test_wait_times_out_without_signal() {
        let app = FakeApp::new(&[], settled());
        let start = Instant::now();
        let err = dispatch(
            &app,
            Command::WaitForIndexing {
                timeout_ms: 150,
                accept_settled: false,
            },
        )
        .await
        .unwrap_err();

        let elapsed = start.elapsed();
        assert_eq!(err.code, ErrorCode::Timeout);
        assert!(elapsed >= Duration::from_millis(150));
        assert!(elapsed < Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_wait_resolves_on_next_completion() {
        let app = std::sync::Arc::new(FakeApp::new(
            &[],
            IndexState {
                generation: 0,
                pending: true,
            },
        ));

        let signaller = app.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            signaller.index.send_modify(|s| {
                s.generation += 1;
                s.pending = false;
            });
        });

        let result = dispatch(
            app.as_ref(),
            Command::WaitForIndexing {
                timeout_ms: 5_000,
                accept_settled: false,
            },
        )
        .await;
        assert_eq!(result, Ok(Value::Null));
    }

    #[tokio::test]
    async fn test_pending_only_change_is_not_completion() {
        let app = std::sync::Arc::new(FakeApp::new(&[], settled()));

        let signaller = app.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            signaller.index.send_modify(|s| s.pending = true);
        });

        let err = dispatch(
            app.as_ref(),
            Command::WaitForIndexing {
                timeout_ms: 200,
                accept_settled: false,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn test_accept_settled_returns_immediately() {
        let app = FakeApp::new(&[], settled());
        let start = Instant::now();
        let result = dispatch(
            &app,
            Command::WaitForIndexing {
                timeout_ms: 5_000,
                accept_settled: true,
            },
        )
        .await;
        assert_eq!(result, Ok(Value::Null));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
