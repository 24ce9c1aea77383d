//! `NotificationServer`: Axum HTTP + `WebSocket` server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::StatusCode;
use axum::response::{Json, Response};
use axum::routing::{any, get, post};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::errors::{AppError, ServerError};
use crate::health::{self, HealthResponse};
use crate::hub::NotificationHub;
use crate::metrics::{EVENTS_DISCARDED_TOTAL, EVENTS_INGESTED_TOTAL};
use crate::protocol::decode_event;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::run_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay state.
    pub hub: Arc<NotificationHub>,
    /// When the server started.
    pub start_time: Instant,
    /// Renders `/metrics`.
    pub metrics: PrometheusHandle,
    /// Largest inbound `WebSocket` message, in bytes.
    pub max_message_size: usize,
}

/// The notification relay server.
pub struct NotificationServer {
    config: ServerConfig,
    hub: Arc<NotificationHub>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl NotificationServer {
    /// Create a server. Nothing is bound until [`NotificationServer::listen`].
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        Self {
            hub: Arc::new(NotificationHub::new(config.session.clone())),
            config,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            max_message_size: self.config.max_message_size,
        };

        Router::new()
            .route("/", any(ws_handler))
            .route("/events", post(ingest_handler))
            .route("/events/", post(ingest_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve in the background.
    ///
    /// Returns the bound address and the serving task. The task ends after
    /// [`ShutdownCoordinator::shutdown`] fires and every session is closed.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let router = self.router();
        let token = self.shutdown.token();
        let hub = Arc::clone(&self.hub);
        let stop = async move {
            token.cancelled().await;
            let closed = hub.close_all();
            info!(closed, "closing sessions for shutdown");
        };

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(stop)
                .await
            {
                error!(error = %e, "server exited with error");
            }
        });
        info!(%local_addr, "notification server listening");
        Ok((local_addr, handle))
    }

    /// Relay state.
    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// ANY /: `WebSocket` upgrade.
async fn ws_handler(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    let hub = state.hub;
    Ok(upgrade?
        .max_message_size(state.max_message_size)
        .on_failed_upgrade(|e| warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| run_session(socket, hub)))
}

/// POST /events: ingest one event and fan it out.
async fn ingest_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<StatusCode, AppError> {
    let body = body?;
    match decode_event(&body)? {
        Some(event) => {
            counter!(EVENTS_INGESTED_TOTAL, "kind" => event.kind().as_str()).increment(1);
            let _ = state.hub.dispatch(&event);
        }
        None => {
            counter!(EVENTS_DISCARDED_TOTAL).increment(1);
            debug!("discarding event of unknown kind");
        }
    }
    Ok(StatusCode::OK)
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let hub = &state.hub;
    Json(health::health_check(
        state.start_time,
        hub.registry().len(),
        hub.index().topic_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}
