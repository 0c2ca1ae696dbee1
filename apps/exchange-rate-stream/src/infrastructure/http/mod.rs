//! HTTP Server
//!
//! Serves the SSE price stream alongside health checks and Prometheus
//! metrics on a single port.
//!
//! # Endpoints
//!
//! - `GET /exchange-rates/stream` - SSE price stream
//! - `GET /exchange-rates/health` - Feed health as JSON
//! - `GET /healthz` - Liveness probe
//! - `GET /readyz` - Readiness probe
//! - `GET /metrics` - Prometheus metrics

pub mod health;
pub mod heartbeat;
pub mod payload;
pub mod stream;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::SharedFeed;
use crate::infrastructure::config::StreamSettings;

pub use health::{FeedHealthResponse, HealthStatus};
pub use heartbeat::HeartbeatTicker;
pub use payload::{FeedStatus, PayloadKind, StreamPayload};
pub use stream::StreamSession;

// =============================================================================
// Server State
// =============================================================================

/// Shared state for HTTP handlers.
pub struct AppState {
    feed: SharedFeed,
    settings: StreamSettings,
    shutdown: CancellationToken,
    started_at: Instant,
    stream_clients: Arc<AtomicUsize>,
}

impl AppState {
    /// Create handler state.
    ///
    /// `shutdown` ends every open stream when cancelled.
    #[must_use]
    pub fn new(feed: SharedFeed, settings: StreamSettings, shutdown: CancellationToken) -> Self {
        Self {
            feed,
            settings,
            shutdown,
            started_at: Instant::now(),
            stream_clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The backing feed.
    #[must_use]
    pub const fn feed(&self) -> &SharedFeed {
        &self.feed
    }

    /// Stream settings.
    #[must_use]
    pub const fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Shutdown token.
    #[must_use]
    pub const fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Time since the state was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Number of connected stream clients.
    #[must_use]
    pub fn stream_clients(&self) -> usize {
        self.stream_clients.load(Ordering::Acquire)
    }

    fn stream_clients_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.stream_clients)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("source", &self.feed.source())
            .field("settings", &self.settings)
            .field("stream_clients", &self.stream_clients())
            .finish_non_exhaustive()
    }
}

/// Build the router for all endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/exchange-rates/stream", get(stream::stream_handler))
        .route("/exchange-rates/health", get(health::feed_health_handler))
        .route("/healthz", get(health::liveness_handler))
        .route("/readyz", get(health::readiness_handler))
        .route("/metrics", get(health::metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// HTTP server for the stream and health endpoints.
pub struct HttpServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
