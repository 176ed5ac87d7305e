//! Waiting for the remote indexer
//!
//! The remote side races the indexer's completion signal against a timer.
//! Locally the round trip gets a little more time than the remote timer so
//! that a silent remote still fails the call instead of hanging it.

use std::time::Duration;
use tracing::debug;
use vaultbridge_common::{Command, DEFAULT_INDEXING_TIMEOUT_MS};

use crate::bridge::Bridge;
use crate::error::{HarnessError, HarnessResult};

/// Timeout used when callers don't pick one
pub const DEFAULT_INDEXING_TIMEOUT: Duration = Duration::from_millis(DEFAULT_INDEXING_TIMEOUT_MS);

/// Extra time the local deadline allows on top of the remote timer
const LOCAL_GRACE: Duration = Duration::from_secs(2);

/// Wait for the next indexing pass to finish
///
/// Only a pass that completes after the remote side subscribed counts. If
/// the indexer finished just before this call and nothing triggers another
/// pass, this times out; use [`wait_for_index_settled`] when that matters.
pub async fn wait_for_indexing_complete(bridge: &Bridge, timeout: Duration) -> HarnessResult<()> {
    wait(bridge, timeout, false).await
}

/// Wait until at least one pass has finished and none is pending
pub async fn wait_for_index_settled(bridge: &Bridge, timeout: Duration) -> HarnessResult<()> {
    wait(bridge, timeout, true).await
}

async fn wait(bridge: &Bridge, timeout: Duration, accept_settled: bool) -> HarnessResult<()> {
    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    debug!(timeout_ms, accept_settled, "Waiting for indexing");

    let command = Command::WaitForIndexing {
        timeout_ms,
        accept_settled,
    };
    match bridge.execute_within(command, timeout.saturating_add(LOCAL_GRACE)).await {
        Ok(_) => Ok(()),
        Err(HarnessError::Timeout(_)) => Err(HarnessError::IndexingTimeout { timeout_ms }),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Transport;
    use async_trait::async_trait;
    use vaultbridge_common::{ErrorCode, Frame, RemoteError, Request, Response};

    /// Answers every request after `delay` with `reply`
    struct SlowTransport {
        delay: Duration,
        reply: Option<Result<serde_json::Value, RemoteError>>,
        pending: Option<u64>,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn send(&mut self, request: &Request) -> HarnessResult<()> {
            self.pending = Some(request.id);
            Ok(())
        }

        async fn recv(&mut self) -> HarnessResult<Option<Frame>> {
            tokio::time::sleep(self.delay).await;
            let id = self.pending.take().unwrap_or_default();
            Ok(self.reply.take().map(|r| Frame::Response(Response::from_result(id, r))))
        }
    }

    #[tokio::test]
    async fn test_remote_timeout_maps_to_indexing_timeout() {
        let bridge = Bridge::new(SlowTransport {
            delay: Duration::ZERO,
            reply: Some(Err(RemoteError::new(ErrorCode::Timeout, "timeout"))),
            pending: None,
        });

        let err = wait_for_indexing_complete(&bridge, Duration::from_millis(250))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::IndexingTimeout { timeout_ms: 250 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_remote_hits_local_deadline() {
        let bridge = Bridge::new(SlowTransport {
            delay: Duration::from_secs(3600),
            reply: None,
            pending: None,
        });

        let err = wait_for_index_settled(&bridge, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::IndexingTimeout { timeout_ms: 100 }));
    }

    #[tokio::test]
    async fn test_completion_is_ok() {
        let bridge = Bridge::new(SlowTransport {
            delay: Duration::from_millis(5),
            reply: Some(Ok(serde_json::Value::Null)),
            pending: None,
        });

        wait_for_indexing_complete(&bridge, DEFAULT_INDEXING_TIMEOUT)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unbounded_timeout_is_accepted() {
        let bridge = Bridge::new(SlowTransport {
            delay: Duration::ZERO,
            reply: Some(Ok(serde_json::Value::Null)),
            pending: None,
        });

        wait_for_index_settled(&bridge, Duration::MAX).await.unwrap();
    }
}
