//! Per-connection loops.
//!
//! [`run_session`] owns one upgraded socket. The read loop runs on the
//! connection's own task; the write loop and the keepalive loop are spawned
//! beside it and share the sink through an async mutex.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::histogram;
use tokio::sync::{Mutex, mpsc};
use tokio::time;
use tracing::{Instrument, Span, debug, instrument, warn};

use super::keepalive::{KeepaliveResult, run_keepalive};
use super::session::{Payload, Session};
use crate::errors::TransportError;
use crate::hub::NotificationHub;
use crate::metrics::WS_CONNECTION_DURATION_SECONDS;
use crate::protocol::decode_client_message;

/// Write half of a connection, shared by the write and keepalive loops.
pub type SharedSink<S> = Arc<Mutex<S>>;

/// Why the read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The client closed the connection or the stream ended.
    Disconnected,
    /// Reading from the transport failed.
    TransportError,
    /// The client sent a command that could not be decoded.
    Malformed,
    /// The session was torn down elsewhere.
    Closed,
}

/// Why the write loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The session closed or its queue was dropped.
    Closed,
    /// A frame could not be written in time.
    SendFailed,
}

/// Drive one upgraded connection until it is torn down.
#[instrument(skip_all, fields(session_id = tracing::field::Empty))]
pub async fn run_session(socket: WebSocket, hub: Arc<NotificationHub>) {
    let (session, queue) = hub.open_session();
    let _ = Span::current().record("session_id", session.id());

    let config = hub.config();
    let (ping_period, pong_wait, write_wait) =
        (config.ping_period, config.pong_wait, config.write_wait);
    let (sink, mut stream) = socket.split();
    let sink: SharedSink<_> = Arc::new(Mutex::new(sink));

    let writer = {
        let (session, hub, sink) = (Arc::clone(&session), Arc::clone(&hub), Arc::clone(&sink));
        tokio::spawn(
            async move {
                let outcome = write_loop(&session, &sink, queue, write_wait).await;
                if outcome == WriteOutcome::SendFailed {
                    let _ = hub.teardown(&session);
                }
            }
            .instrument(Span::current()),
        )
    };

    let keepalive = {
        let (session, hub, sink) = (Arc::clone(&session), Arc::clone(&hub), Arc::clone(&sink));
        tokio::spawn(
            async move {
                let result = run_keepalive(&session, ping_period, pong_wait, || {
                    send_frame(&sink, Message::Ping(Bytes::new()), write_wait)
                })
                .await;
                if result != KeepaliveResult::Closed {
                    let _ = hub.teardown(&session);
                }
            }
            .instrument(Span::current()),
        )
    };

    let outcome = read_loop(&session, &hub, &mut stream).await;
    debug!(?outcome, "read loop finished");
    let _ = hub.teardown(&session);

    let (w, k) = tokio::join!(writer, keepalive);
    if let Err(e) = w.and(k) {
        warn!(error = %e, "connection task failed");
    }
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(session.age().as_secs_f64());
}

/// Read client frames and apply commands until the connection ends.
///
/// Ping and pong frames refresh liveness. The first undecodable command ends
/// the loop with [`ReadOutcome::Malformed`].
pub async fn read_loop<St, E>(
    session: &Arc<Session>,
    hub: &NotificationHub,
    stream: &mut St,
) -> ReadOutcome
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let frame = tokio::select! {
            biased;
            () = session.closed() => return ReadOutcome::Closed,
            frame = stream.next() => frame,
        };
        let message = match frame {
            None => return ReadOutcome::Disconnected,
            Some(Err(e)) => {
                debug!(session_id = session.id(), error = %e, "read failed");
                return ReadOutcome::TransportError;
            }
            Some(Ok(message)) => message,
        };
        let accepted = match message {
            Message::Text(text) => apply_command(session, hub, text.as_str().as_bytes()),
            Message::Binary(data) => apply_command(session, hub, &data),
            Message::Ping(_) | Message::Pong(_) => {
                session.mark_alive();
                true
            }
            Message::Close(_) => return ReadOutcome::Disconnected,
        };
        if !accepted {
            return ReadOutcome::Malformed;
        }
    }
}

fn apply_command(session: &Arc<Session>, hub: &NotificationHub, raw: &[u8]) -> bool {
    match decode_client_message(raw) {
        Ok(message) => {
            hub.apply(session, message);
            true
        }
        Err(e) => {
            warn!(session_id = session.id(), error = %e, "malformed client message, closing");
            false
        }
    }
}

/// Drain the session's queue into the sink, one text frame per payload.
///
/// Exits when the session closes or a write fails, then closes the sink.
pub async fn write_loop<S>(
    session: &Session,
    sink: &SharedSink<S>,
    mut queue: mpsc::Receiver<Payload>,
    write_wait: Duration,
) -> WriteOutcome
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let outcome = loop {
        let payload = tokio::select! {
            biased;
            () = session.closed() => break WriteOutcome::Closed,
            payload = queue.recv() => payload,
        };
        let Some(payload) = payload else {
            break WriteOutcome::Closed;
        };
        let frame = Message::Text(payload.as_str().into());
        if let Err(e) = send_frame(sink, frame, write_wait).await {
            debug!(session_id = session.id(), error = %e, "write failed");
            break WriteOutcome::SendFailed;
        }
    };
    drop(queue);
    close_sink(sink, write_wait).await;
    outcome
}

/// Write one frame, giving up after `deadline`.
pub async fn send_frame<S>(
    sink: &SharedSink<S>,
    frame: Message,
    deadline: Duration,
) -> Result<(), TransportError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let write = async {
        let mut sink = sink.lock().await;
        sink.send(frame).await
    };
    match time::timeout(deadline, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TransportError::Send(e.to_string())),
        Err(_) => Err(TransportError::Timeout(deadline)),
    }
}

async fn close_sink<S>(sink: &SharedSink<S>, deadline: Duration)
where
    S: Sink<Message> + Unpin,
{
    let close = async {
        let mut sink = sink.lock().await;
        sink.close().await
    };
    let _ = time::timeout(deadline, close).await;
}
