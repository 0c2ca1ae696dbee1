//! Exchange Rate Stream Binary
//!
//! Starts the price feed and the HTTP server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin exchange-rate-stream
//! ```
//!
//! # Environment Variables
//!
//! - `FINNHUB_API_KEY`: Finnhub API key (live feed stays disconnected without it)
//! - `FINNHUB_WS_URL`: Finnhub endpoint (default: wss://ws.finnhub.io)
//! - `PRICE_FEED`: "live" | "synthetic" (default: live)
//! - `FEED_RECONNECT_DELAY_MS`: Reconnect delay (default: 5000)
//! - `STREAM_HEARTBEAT_INTERVAL_MS`: SSE heartbeat interval (default: 30000)
//! - `STREAM_CLIENT_BUFFER`: Per-client SSE buffer (default: 256)
//! - `SYNTHETIC_INTERVAL_MS`: Synthetic tick interval (default: 2000)
//! - `SYNTHETIC_SEED`: Synthetic generator seed (default: 42)
//! - `HTTP_PORT`: HTTP port (default: 3000)
//! - `OTEL_ENABLED`: Export traces over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: exchange_rate_stream=info)

use std::sync::Arc;
use std::time::Duration;

use exchange_rate_stream::infrastructure::telemetry;
use exchange_rate_stream::{
    AppState, FeedMode, FinnhubFeed, HttpServer, PriceFeed, SharedFeed, StreamConfig,
    SyntheticFeed, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Exchange Rate Stream");

    let _metrics_handle = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed; /metrics disabled");
            None
        }
    };

    let config = StreamConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let feed: SharedFeed = match config.feed_mode {
        FeedMode::Live => Arc::new(FinnhubFeed::new(config.finnhub.client_config())),
        FeedMode::Synthetic => Arc::new(SyntheticFeed::new(config.synthetic.feed_config())),
    };
    feed.start();

    let state = Arc::new(AppState::new(
        Arc::clone(&feed),
        config.stream,
        shutdown_token.clone(),
    ));
    let server = HttpServer::new(config.server.http_port, state, shutdown_token.clone());
    let mut server_task = tokio::spawn(server.run());

    tracing::info!(source = feed.source(), "Exchange Rate Stream ready");

    tokio::select! {
        () = await_shutdown() => {}
        result = &mut server_task => {
            match result {
                Ok(Err(e)) => tracing::error!(error = %e, "HTTP server error"),
                Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
                Ok(Ok(())) => {}
            }
        }
    }

    shutdown_token.cancel();
    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        feed.stop().await;
        if !server_task.is_finished() {
            let _ = server_task.await;
        }
    })
    .await
    .is_err()
    {
        tracing::warn!("Shutdown timed out");
    }

    tracing::info!("Exchange Rate Stream stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &StreamConfig) {
    tracing::info!(
        feed = config.feed_mode.as_str(),
        http_port = config.server.http_port,
        heartbeat_ms =
            u64::try_from(config.stream.heartbeat_interval.as_millis()).unwrap_or(u64::MAX),
        client_buffer = config.stream.client_buffer,
        "Configuration loaded"
    );
    tracing::debug!(finnhub = ?config.finnhub, synthetic = ?config.synthetic, "Feed settings");
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
