//! Line-delimited JSON server for bridge requests
//!
//! Requests on one connection are handled strictly one after another. A
//! `ready` event is written before the first request is read, and a
//! `resolved` event follows every finished indexing pass.

use crate::context::AppContext;
use crate::dispatch::dispatch;
use crate::error::AgentResult;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn};
use vaultbridge_common::protocol::{EVENT_READY, EVENT_RESOLVED};
use vaultbridge_common::{ErrorCode, Event, Frame, RemoteError, Request, Response};

/// Longest accepted request line
const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// Serve one connection until the peer closes it
pub async fn serve<R, W, C>(reader: R, writer: W, ctx: Arc<C>) -> AgentResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    C: AppContext + ?Sized,
{
    serve_with_limit(reader, writer, ctx, MAX_LINE_LENGTH).await
}

async fn serve_with_limit<R, W, C>(
    reader: R,
    writer: W,
    ctx: Arc<C>,
    max_line_length: usize,
) -> AgentResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    C: AppContext + ?Sized,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(max_line_length));
    let mut sink = FramedWrite::new(writer, LinesCodec::new());

    let mut index = ctx.index_state();
    let mut announced = index.borrow_and_update().generation;
    let mut index_open = true;

    send_frame(
        &mut sink,
        &Frame::Event(Event::new(
            EVENT_READY,
            json!({ "version": vaultbridge_common::VERSION }),
        )),
    )
    .await?;
    debug!("Sent ready event");

    loop {
        tokio::select! {
            line = lines.next() => {
                let Some(line) = line else {
                    info!("Peer closed the connection");
                    return Ok(());
                };
                let response = match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => handle_line(ctx.as_ref(), &line).await,
                    Err(LinesCodecError::MaxLineLengthExceeded) => {
                        warn!("Rejecting request longer than {} bytes", max_line_length);
                        Response::from_result(
                            0,
                            Err(RemoteError::new(
                                ErrorCode::BadRequest,
                                format!("request exceeds {} bytes", max_line_length),
                            )),
                        )
                    }
                    Err(e) => return Err(e.into()),
                };
                send_frame(&mut sink, &Frame::Response(response)).await?;
            }
            changed = index.changed(), if index_open => {
                if changed.is_err() {
                    index_open = false;
                    continue;
                }
                let state = *index.borrow_and_update();
                if !state.pending && state.generation != announced {
                    announced = state.generation;
                    send_frame(
                        &mut sink,
                        &Frame::Event(Event::new(
                            EVENT_RESOLVED,
                            json!({ "generation": state.generation }),
                        )),
                    )
                    .await?;
                }
            }
        }
    }
}

/// Accept TCP connections and serve each one on its own task
pub async fn serve_tcp<C>(listener: TcpListener, ctx: Arc<C>) -> AgentResult<()>
where
    C: AppContext + 'static,
{
    info!("Listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("Bridge connection from {}", peer);
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            if let Err(e) = serve(reader, writer, ctx).await {
                error!("Connection {} failed: {}", peer, e);
            }
        });
    }
}

async fn handle_line<C>(ctx: &C, line: &str) -> Response
where
    C: AppContext + ?Sized,
{
    match serde_json::from_str::<Request>(line) {
        Ok(request) => {
            let op = request.command.op();
            let result = dispatch(ctx, request.command).await;
            if let Err(e) = &result {
                debug!(op, id = request.id, "Command failed: {}", e);
            }
            Response::from_result(request.id, result)
        }
        Err(e) => {
            // Answer with the id if the line had one so the caller is not left waiting
            let id = serde_json::from_str::<Value>(line)
                .ok()
                .and_then(|v| v.get("id").and_then(Value::as_u64))
                .unwrap_or(0);
            warn!("Rejecting malformed request {}: {}", id, e);
            Response::from_result(
                id,
                Err(RemoteError::new(
                    ErrorCode::BadRequest,
                    format!("malformed request: {}", e),
                )),
            )
        }
    }
}

async fn send_frame<W>(sink: &mut FramedWrite<W, LinesCodec>, frame: &Frame) -> AgentResult<()>
where
    W: AsyncWrite + Unpin,
{
    let line = serde_json::to_string(frame)?;
    sink.send(line).await?;
    Ok(())
}
