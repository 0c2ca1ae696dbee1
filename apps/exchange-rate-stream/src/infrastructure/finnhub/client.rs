//! Finnhub WebSocket Client
//!
//! Owns the single upstream connection to Finnhub's trade stream.
//!
//! # Stream URL
//!
//! `wss://ws.finnhub.io?token=<api key>`
//!
//! # Lifecycle
//!
//! One background task drives the connection:
//!
//! 1. `Connecting`: the handshake is raced against shutdown
//! 2. `Open`: one subscribe directive per tracked pair, then read frames
//! 3. `RetryPending`: after any close, wait the fixed reconnect delay
//!
//! Shutdown while `Open` unsubscribes every pair before closing. Shutdown
//! while `Connecting` or `RetryPending` abandons the handshake or the timer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::codec::JsonCodec;
use super::connector::{Connector, FeedError, UpstreamConnection, UpstreamSink, WebSocketConnector};
use super::ingest::TradeIngestor;
use super::messages::{Directive, DirectiveKind};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{ConnectionState, PriceFeed};
use crate::domain::pricing::{PriceCache, PriceSnapshot};
use crate::domain::symbols;
use crate::infrastructure::broadcast::{FanOutPublisher, Listener, ListenerHandle};
use crate::infrastructure::metrics;

/// Default Finnhub WebSocket endpoint.
pub const DEFAULT_FINNHUB_WS_URL: &str = "wss://ws.finnhub.io";

/// Source name reported downstream.
pub const FINNHUB_SOURCE: &str = "Finnhub";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Finnhub client.
#[derive(Clone)]
pub struct FinnhubClientConfig {
    /// WebSocket endpoint without the token.
    pub url: String,
    /// API key. `None` disables the feed.
    pub api_key: Option<String>,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
}

impl FinnhubClientConfig {
    /// Create a configuration. An empty key counts as absent.
    #[must_use]
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Set the reconnection configuration.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Full URL including the token, or `None` without a key.
    #[must_use]
    pub fn connect_url(&self) -> Option<String> {
        self.api_key
            .as_ref()
            .map(|key| format!("{}?token={key}", self.url))
    }
}

impl Default for FinnhubClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FINNHUB_WS_URL, None)
    }
}

impl std::fmt::Debug for FinnhubClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinnhubClientConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

// =============================================================================
// Connection Task
// =============================================================================

/// Why a connection session ended.
enum SessionEnd {
    /// The connection closed or never opened; reconnect.
    Closed,
    /// Shutdown was requested.
    Shutdown,
}

struct Shared {
    config: FinnhubClientConfig,
    connector: Arc<dyn Connector>,
    ingestor: TradeIngestor,
    codec: JsonCodec,
    state: RwLock<ConnectionState>,
    connect_attempts: AtomicU64,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Finnhub connection state changed");
            metrics::set_upstream_connected(state.is_open());
        }
    }

    async fn run(self: Arc<Self>, url: String, cancel: CancellationToken) {
        let mut policy = ReconnectPolicy::new(self.config.reconnect);

        loop {
            if let SessionEnd::Shutdown = self.connect_and_run(&url, &cancel, &mut policy).await {
                break;
            }

            self.set_state(ConnectionState::RetryPending);

            let delay = policy.next_delay();
            metrics::record_reconnect();
            tracing::info!(
                attempt = policy.consecutive_attempts(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting to Finnhub"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!("Finnhub client cancelled during reconnect delay");
                    break;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
    }

    async fn connect_and_run(
        &self,
        url: &str,
        cancel: &CancellationToken,
        policy: &mut ReconnectPolicy,
    ) -> SessionEnd {
        self.set_state(ConnectionState::Connecting);
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
        tracing::info!(url = %self.config.url, "Connecting to Finnhub");

        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!("Finnhub client cancelled during connect");
                return SessionEnd::Shutdown;
            }
            result = self.connector.connect(url) => result,
        };

        let UpstreamConnection {
            mut sink,
            mut stream,
        } = match connected {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(error = %e, "Finnhub connection failed");
                return SessionEnd::Closed;
            }
        };

        if cancel.is_cancelled() {
            // Handshake finished after shutdown began; never report Open.
            let _ = sink.close().await;
            return SessionEnd::Shutdown;
        }

        self.set_state(ConnectionState::Open);
        policy.reset();
        tracing::info!("Finnhub WebSocket connected");

        if let Err(e) = self.send_directives(&mut sink, DirectiveKind::Subscribe).await {
            tracing::warn!(error = %e, "Subscription interrupted");
        }

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let unsubscribed =
                        self.send_directives(&mut sink, DirectiveKind::Unsubscribe).await;
                    if let Err(e) = unsubscribed {
                        tracing::debug!(error = %e, "Unsubscribe interrupted");
                    }
                    if let Err(e) = sink.close().await {
                        tracing::debug!(error = %e, "Error closing Finnhub connection");
                    }
                    tracing::info!("Finnhub connection closed for shutdown");
                    return SessionEnd::Shutdown;
                }
                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.ingestor.handle_text(&text);
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            self.ingestor.handle_bytes(&bytes);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = sink.send(Message::Pong(data)).await {
                                tracing::warn!(error = %e, "Failed to answer ping");
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Finnhub sent close frame");
                            return SessionEnd::Closed;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::error!(error = %e, "Finnhub WebSocket error");
                            return SessionEnd::Closed;
                        }
                        None => {
                            tracing::info!("Finnhub stream ended");
                            return SessionEnd::Closed;
                        }
                    }
                }
            }
        }
    }

    /// Send one directive per tracked pair, in registry order.
    async fn send_directives(
        &self,
        sink: &mut UpstreamSink,
        kind: DirectiveKind,
    ) -> Result<(), FeedError> {
        for &pair in symbols::all_tracked_ids() {
            self.send_directive(sink, Directive::new(kind, pair)).await?;
        }
        Ok(())
    }

    /// Send a directive. A no-op unless the connection is `Open`.
    async fn send_directive(
        &self,
        sink: &mut UpstreamSink,
        directive: Directive,
    ) -> Result<(), FeedError> {
        if !self.state().is_open() {
            tracing::trace!(kind = directive.kind.as_str(), "Skipping directive while not open");
            return Ok(());
        }

        let json = self.codec.encode(&directive)?;
        tracing::debug!(
            kind = directive.kind.as_str(),
            symbol = %directive.symbol,
            "Sending directive"
        );
        sink.send(Message::Text(json.into())).await?;
        Ok(())
    }
}

// =============================================================================
// Finnhub Feed
// =============================================================================

/// Live price feed backed by Finnhub.
///
/// # Example
///
/// ```rust,no_run
/// use exchange_rate_stream::application::ports::PriceFeed;
/// use exchange_rate_stream::infrastructure::finnhub::{FinnhubClientConfig, FinnhubFeed};
///
/// # async fn example() {
/// let feed = FinnhubFeed::new(FinnhubClientConfig::new(
///     "wss://ws.finnhub.io",
///     Some("api-key".to_string()),
/// ));
/// feed.start();
/// // ...
/// feed.stop().await;
/// # }
/// ```
pub struct FinnhubFeed {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl FinnhubFeed {
    /// Create a feed that dials real WebSocket connections.
    #[must_use]
    pub fn new(config: FinnhubClientConfig) -> Self {
        Self::with_connector(config, Arc::new(WebSocketConnector))
    }

    /// Create a feed with a custom connector.
    #[must_use]
    pub fn with_connector(config: FinnhubClientConfig, connector: Arc<dyn Connector>) -> Self {
        let ingestor = TradeIngestor::new(
            Arc::new(PriceCache::new()),
            Arc::new(FanOutPublisher::new()),
        );

        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                ingestor,
                codec: JsonCodec::new(),
                state: RwLock::new(ConnectionState::Disconnected),
                connect_attempts: AtomicU64::new(0),
            }),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Number of connection attempts made so far.
    #[must_use]
    pub fn connect_attempts(&self) -> u64 {
        self.shared.connect_attempts.load(Ordering::Relaxed)
    }

    /// The publisher batches are emitted to.
    #[must_use]
    pub fn publisher(&self) -> &Arc<FanOutPublisher> {
        self.shared.ingestor.publisher()
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &FinnhubClientConfig {
        &self.shared.config
    }
}

#[async_trait]
impl PriceFeed for FinnhubFeed {
    fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::debug!("Finnhub feed already started");
            return;
        }

        let Some(url) = self.shared.config.connect_url() else {
            tracing::error!("FINNHUB_API_KEY is not configured; Finnhub feed disabled");
            return;
        };

        if self.cancel.is_cancelled() {
            return;
        }

        let handle = tokio::spawn(Arc::clone(&self.shared).run(url, self.cancel.clone()));
        *self.task.lock() = Some(handle);
    }

    async fn stop(&self) {
        self.cancel.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Finnhub connection task ended abnormally");
            }
            tracing::info!("Finnhub feed stopped");
        }
    }

    fn current_prices(&self) -> PriceSnapshot {
        self.shared.ingestor.cache().snapshot()
    }

    fn is_connected(&self) -> bool {
        self.shared.state().is_open()
    }

    fn subscribe_to_updates(&self, listener: Listener) -> ListenerHandle {
        self.publisher().subscribe_arc(listener)
    }

    fn source(&self) -> &'static str {
        FINNHUB_SOURCE
    }
}

impl std::fmt::Debug for FinnhubFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinnhubFeed")
            .field("config", &self.shared.config)
            .field("state", &self.shared.state())
            .field("listeners", &self.publisher().listener_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use futures::channel::mpsc;

    use super::*;
    use crate::domain::pricing::PriceObservation;
    use crate::domain::symbols::TradingPair;
    use crate::infrastructure::finnhub::connector::WsError;

    fn channel_sink() -> (UpstreamSink, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded();
        (Box::pin(tx.sink_map_err(|_| WsError::ConnectionClosed)), rx)
    }

    fn test_shared(connector: Arc<dyn Connector>) -> Shared {
        Shared {
            config: FinnhubClientConfig::new(DEFAULT_FINNHUB_WS_URL, Some("key".to_string())),
            connector,
            ingestor: TradeIngestor::new(
                Arc::new(PriceCache::new()),
                Arc::new(FanOutPublisher::new()),
            ),
            codec: JsonCodec::new(),
            state: RwLock::new(ConnectionState::Disconnected),
            connect_attempts: AtomicU64::new(0),
        }
    }

    /// Completes the handshake but cancels `cancel` while doing so.
    struct CancelDuringHandshake {
        cancel: CancellationToken,
        server: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    }

    #[async_trait]
    impl Connector for CancelDuringHandshake {
        async fn connect(&self, _url: &str) -> Result<UpstreamConnection, FeedError> {
            let (sink, rx) = channel_sink();
            *self.server.lock() = Some(rx);
            let (_inbound, stream) = mpsc::unbounded::<Result<Message, WsError>>();

            self.cancel.cancel();
            Ok(UpstreamConnection {
                sink,
                stream: Box::pin(stream),
            })
        }
    }

    #[test]
    fn connect_url_appends_token() {
        let config = FinnhubClientConfig::new("wss://ws.finnhub.io", Some("abc".to_string()));
        assert_eq!(
            config.connect_url().as_deref(),
            Some("wss://ws.finnhub.io?token=abc")
        );
    }

    #[test]
    fn empty_key_counts_as_absent() {
        let config = FinnhubClientConfig::new(DEFAULT_FINNHUB_WS_URL, Some("  ".to_string()));
        assert!(config.api_key.is_none());
        assert!(config.connect_url().is_none());
    }

    #[test]
    fn debug_redacts_api_key() {
        let config =
            FinnhubClientConfig::new(DEFAULT_FINNHUB_WS_URL, Some("secret-key".to_string()));
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn fresh_feed_is_empty_and_disconnected() {
        let feed = FinnhubFeed::new(FinnhubClientConfig::default());
        assert!(feed.current_prices().is_empty());
        assert!(!feed.is_connected());
        assert_eq!(feed.connection_state(), ConnectionState::Disconnected);
        assert_eq!(feed.source(), "Finnhub");
    }

    #[tokio::test]
    async fn start_without_key_is_noop() {
        let feed = FinnhubFeed::new(FinnhubClientConfig::default());
        feed.start();
        tokio::task::yield_now().await;

        assert_eq!(feed.connect_attempts(), 0);
        assert!(!feed.is_connected());
        feed.stop().await;
        assert_eq!(feed.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn directives_are_noops_unless_open() {
        let shared = test_shared(Arc::new(WebSocketConnector));
        let (mut sink, mut server) = channel_sink();

        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::RetryPending,
        ] {
            shared.set_state(state);
            let sent = shared
                .send_directive(&mut sink, Directive::subscribe(TradingPair::EthUsdc))
                .await;
            assert!(sent.is_ok());
            assert!(
                shared
                    .send_directives(&mut sink, DirectiveKind::Unsubscribe)
                    .await
                    .is_ok()
            );
        }
        assert!(server.next().now_or_never().is_none());

        shared.set_state(ConnectionState::Open);
        shared
            .send_directive(&mut sink, Directive::subscribe(TradingPair::EthUsdc))
            .await
            .unwrap();
        assert!(matches!(
            server.next().now_or_never(),
            Some(Some(Message::Text(_)))
        ));
    }

    #[tokio::test]
    async fn handshake_finished_after_shutdown_is_closed_unopened() {
        let cancel = CancellationToken::new();
        let connector = Arc::new(CancelDuringHandshake {
            cancel: cancel.clone(),
            server: Mutex::new(None),
        });
        let shared = test_shared(Arc::clone(&connector) as Arc<dyn Connector>);
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());

        let end = shared
            .connect_and_run("wss://ws.finnhub.io?token=key", &cancel, &mut policy)
            .await;

        assert!(matches!(end, SessionEnd::Shutdown));
        assert_eq!(shared.state(), ConnectionState::Connecting);
        let mut server = connector.server.lock().take().unwrap();
        assert!(server.next().await.is_none());
    }

    #[test]
    fn subscribe_to_updates_registers_with_publisher() {
        let feed = FinnhubFeed::new(FinnhubClientConfig::default());
        let handle = feed.subscribe_to_updates(Arc::new(|_: &[PriceObservation]| Ok(())));
        assert_eq!(feed.publisher().listener_count(), 1);
        handle.unsubscribe();
        assert_eq!(feed.publisher().listener_count(), 0);
    }
}
