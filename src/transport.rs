//! # Transport Pumps
//!
//! Drives a pre-established connection through the session engine: the
//! WebSocket pump shuttles envelopes in and control messages out with a
//! periodic heartbeat; the SSE pump feeds a byte stream through a
//! [`FrameAssembler`] until it ends or is aborted.
//!
//! Connection establishment, authentication and reconnect policy live with
//! the caller; the pumps only consume connections they are handed.

use crate::error::{EngineError, EngineResult};
use crate::session::engine::Session;
use crate::stream::assembler::FrameAssembler;
use crate::stream::decoder::decode_frame;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio_stream::Stream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

/// Run the WebSocket side of a session until the connection ends.
///
/// ## Loop Duties:
/// - Inbound text messages decode through the session
/// - Outbound control messages drain from the session's queue
/// - A client ping is emitted every `ping_interval`
/// - Close frames, stream end and protocol errors all land in
///   [`Session::on_transport_closed`], which is terminal for the session
pub async fn run_websocket<S>(
    ws: WebSocketStream<S>,
    session: &mut Session,
    ping_interval: Duration,
) -> EngineResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let mut outbound = session.take_outbound().ok_or_else(|| {
        EngineError::Session("outbound receiver already taken".to_string())
    })?;

    let mut heartbeat = tokio::time::interval(ping_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; the connection is fresh
    heartbeat.tick().await;

    loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    session.handle_ws_text(&text);
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(len = data.len(), "Ignoring unexpected binary message");
                }
                Some(Ok(Message::Ping(payload))) => {
                    sink.send(Message::Pong(payload)).await?;
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("code {}: {}", f.code, f.reason))
                        .unwrap_or_else(|| "closed".to_string());
                    session.on_transport_closed(&reason);
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    let reason = err.to_string();
                    session.on_transport_closed(&reason);
                    return Err(err.into());
                }
                None => {
                    session.on_transport_closed("stream ended");
                    return Ok(());
                }
            },
            outgoing = outbound.recv() => match outgoing {
                Some(message) => {
                    let text = serde_json::to_string(&message)
                        .map_err(|err| EngineError::Transport(err.to_string()))?;
                    sink.send(Message::Text(text)).await?;
                }
                // The session dropped its sender: nothing left to pump
                None => return Ok(()),
            },
            _ = heartbeat.tick() => {
                session.send_ping();
            }
        }
    }
}

/// Feed an SSE byte stream through the session until it ends or aborts.
///
/// Abort (firing or dropping the handle's sender) stops frame delivery
/// immediately: the partially-assembled frame is discarded, never flushed.
/// Stream errors are terminal for the session.
pub async fn run_sse_stream<S, E>(
    mut stream: S,
    session: &mut Session,
    mut abort: oneshot::Receiver<()>,
) -> EngineResult<()>
where
    S: Stream<Item = Result<Vec<u8>, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut assembler = FrameAssembler::new();

    let result = loop {
        tokio::select! {
            // Abort takes priority over buffered chunks
            biased;

            _ = &mut abort => {
                debug!("Stream aborted; discarding any partial frame");
                break Ok(());
            }
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    for frame in assembler.feed(&bytes) {
                        session.apply_event(decode_frame(&frame));
                    }
                }
                Some(Err(err)) => {
                    let reason = err.to_string();
                    session.on_transport_closed(&reason);
                    break Err(EngineError::Transport(reason));
                }
                None => {
                    assembler.finish();
                    break Ok(());
                }
            }
        }
    };

    session.record_frame_counters(assembler.assembled(), assembler.dropped());
    result
}
