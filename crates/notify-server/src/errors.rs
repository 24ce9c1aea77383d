//! Error types for the relay.

use std::time::Duration;

use axum::extract::rejection::BytesRejection;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

/// A client command or ingested event could not be decoded.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Invalid JSON, unknown command type, or a field of the wrong shape.
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    /// A required field is absent or not a string.
    #[error("missing or invalid field `{0}`")]
    MissingField(&'static str),
}

/// A payload could not be placed on a session's outbound queue.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    /// The queue is at capacity.
    #[error("outbound queue full")]
    Full,
    /// The session has been torn down.
    #[error("session closed")]
    Closed,
}

/// A frame could not be written to the client.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The write did not complete within its deadline.
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
    /// The underlying sink rejected the frame.
    #[error("write failed: {0}")]
    Send(String),
}

/// Server startup failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The Prometheus recorder could not be installed.
    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Errors returned by HTTP handlers. All of them answer `500` with an empty
/// body, and are logged.
#[derive(Debug, Error)]
pub enum AppError {
    /// The request on `/` was not a valid `WebSocket` upgrade.
    #[error("failed to upgrade http to websocket: {0}")]
    Upgrade(#[from] WebSocketUpgradeRejection),
    /// The ingestion body could not be read.
    #[error("failed to read request body: {0}")]
    Body(#[from] BytesRejection),
    /// The ingestion body was not a valid event envelope.
    #[error("invalid event: {0}")]
    Protocol(#[from] ProtocolError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %self, "internal server error");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}
