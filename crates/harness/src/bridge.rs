//! Remote execution bridge client
//!
//! Sends one [`Command`] at a time to the remote context and waits for the
//! matching response. Calls are serialized by a mutex around the
//! transport, so overlapping callers queue up rather than interleave.
//! Events that arrive while waiting are forwarded to `tracing`.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, trace, warn};
use vaultbridge_common::protocol::{EVENT_CONSOLE, EVENT_READY, EVENT_RESOLVED};
use vaultbridge_common::{Command, Event, Frame, Request};

use crate::error::{HarnessError, HarnessResult};

/// Moves frames between the test process and the remote context
#[async_trait]
pub trait Transport: Send {
    /// Write one request
    async fn send(&mut self, request: &Request) -> HarnessResult<()>;

    /// Next frame from the remote side, `None` once it has closed
    async fn recv(&mut self) -> HarnessResult<Option<Frame>>;
}

/// Newline-delimited JSON over any byte stream pair
pub struct LineTransport<R, W> {
    reader: FramedRead<R, LinesCodec>,
    writer: FramedWrite<W, LinesCodec>,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FramedRead::new(reader, LinesCodec::new()),
            writer: FramedWrite::new(writer, LinesCodec::new()),
        }
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, request: &Request) -> HarnessResult<()> {
        let line = serde_json::to_string(request)?;
        trace!("Bridge request: {}", line);
        self.writer.send(line).await.map_err(codec_error)
    }

    async fn recv(&mut self) -> HarnessResult<Option<Frame>> {
        loop {
            let Some(line) = self.reader.next().await else {
                return Ok(None);
            };
            let line = line.map_err(codec_error)?;
            if line.trim().is_empty() {
                continue;
            }
            trace!("Bridge frame: {}", line);
            return serde_json::from_str(&line)
                .map(Some)
                .map_err(|e| HarnessError::Protocol(format!("invalid frame {:?}: {}", line, e)));
        }
    }
}

fn codec_error(e: LinesCodecError) -> HarnessError {
    match e {
        LinesCodecError::Io(io) => HarnessError::Io(io),
        other => HarnessError::Protocol(other.to_string()),
    }
}

/// Client half of the remote execution bridge
pub struct Bridge {
    transport: Mutex<Box<dyn Transport>>,
    next_id: AtomicU64,
}

impl Bridge {
    /// Wrap a transport without waiting for the ready event
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Mutex::new(Box::new(transport)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Wrap a transport and wait until the remote context announces itself
    pub async fn connect(
        transport: impl Transport + 'static,
        startup_timeout: Duration,
    ) -> HarnessResult<Self> {
        let bridge = Self::new(transport);
        bridge.wait_ready(startup_timeout).await?;
        Ok(bridge)
    }

    async fn wait_ready(&self, startup_timeout: Duration) -> HarnessResult<()> {
        let mut transport = self.transport.lock().await;

        tokio::time::timeout(startup_timeout, read_until_ready(&mut **transport))
            .await
            .map_err(|_| {
                HarnessError::HostStartup(format!(
                    "no ready event within {} ms",
                    startup_timeout.as_millis()
                ))
            })?
    }

    /// Run `command` in the remote context and return its JSON result
    pub async fn execute(&self, command: Command) -> HarnessResult<Value> {
        let timeout_hint = match &command {
            Command::WaitForIndexing { timeout_ms, .. } => Some(*timeout_ms),
            _ => None,
        };
        let op = command.op();

        let mut transport = self.transport.lock().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, op, "Bridge call");
        transport.send(&Request { id, command }).await?;

        loop {
            match transport.recv().await? {
                None => return Err(HarnessError::Disconnected),
                Some(Frame::Event(event)) => forward_event(&event),
                Some(Frame::Response(response)) if response.id != id => {
                    warn!(
                        "Discarding stale response {} while waiting for {}",
                        response.id, id
                    );
                }
                Some(Frame::Response(response)) => {
                    return response
                        .into_result()
                        .map_err(|e| HarnessError::from_remote(e, timeout_hint));
                }
            }
        }
    }

    /// Like [`Bridge::execute`], abandoning the call after `deadline`
    ///
    /// The remote side keeps running an abandoned command; its late
    /// response is discarded by the next call.
    pub async fn execute_within(&self, command: Command, deadline: Duration) -> HarnessResult<Value> {
        let op = command.op();
        tokio::time::timeout(deadline, self.execute(command))
            .await
            .map_err(|_| {
                HarnessError::Timeout(format!("{} response after {} ms", op, deadline.as_millis()))
            })?
    }

    /// Run `command` and deserialize its result
    pub async fn call<T: DeserializeOwned>(&self, command: Command) -> HarnessResult<T> {
        let value = self.execute(command).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Remote agent version
    pub async fn ping(&self) -> HarnessResult<String> {
        self.call(Command::Ping).await
    }

    /// Send `value` through the remote context and back
    pub async fn echo(&self, value: Value) -> HarnessResult<Value> {
        self.execute(Command::Echo { value }).await
    }
}

async fn read_until_ready(transport: &mut dyn Transport) -> HarnessResult<()> {
    loop {
        match transport.recv().await? {
            None => return Err(HarnessError::Disconnected),
            Some(Frame::Event(event)) if event.event == EVENT_READY => {
                info!("Remote context ready: {}", event.data);
                return Ok(());
            }
            Some(Frame::Event(event)) => forward_event(&event),
            Some(Frame::Response(response)) => {
                warn!("Ignoring response {} received before ready", response.id);
            }
        }
    }
}

/// Forward a remote event to the local log
fn forward_event(event: &Event) {
    match event.event.as_str() {
        EVENT_CONSOLE => {
            let level = event.data.get("level").and_then(Value::as_str).unwrap_or("info");
            let message = match event.data.get("message") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => event.data.to_string(),
            };
            match level {
                "error" => error!(target: "vaultbridge::console", "{}", message),
                "warn" | "warning" => warn!(target: "vaultbridge::console", "{}", message),
                "debug" => debug!(target: "vaultbridge::console", "{}", message),
                _ => info!(target: "vaultbridge::console", "{}", message),
            }
        }
        EVENT_RESOLVED => debug!("Remote indexing pass finished: {}", event.data),
        other => debug!("Remote event {}: {}", other, event.data),
    }
}
