//! Port Interfaces
//!
//! The feed capability the transport layer is written against. Two adapters
//! implement it:
//!
//! - `FinnhubFeed`: live trades from Finnhub's WebSocket
//! - `SyntheticFeed`: generated prices for local development
//!
//! One of them is chosen once at startup and shared behind [`SharedFeed`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::pricing::PriceSnapshot;
use crate::infrastructure::broadcast::{Listener, ListenerHandle};

/// Upstream connection lifecycle.
///
/// `Disconnected → Connecting → Open → RetryPending → Connecting → …`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and no attempt scheduled.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Connected and receiving.
    Open,
    /// Closed; a reconnect is scheduled.
    RetryPending,
}

impl ConnectionState {
    /// Lowercase name for logs and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::RetryPending => "retry_pending",
        }
    }

    /// Whether this is exactly `Open`.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source of live prices.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Begin producing prices. Calling it again is a no-op.
    fn start(&self);

    /// Stop producing prices and release the upstream. Idempotent.
    async fn stop(&self);

    /// Copy of the latest price per pair.
    fn current_prices(&self) -> PriceSnapshot;

    /// Whether the feed is currently live.
    fn is_connected(&self) -> bool;

    /// Register a listener for every published batch.
    fn subscribe_to_updates(&self, listener: Listener) -> ListenerHandle;

    /// Name reported to downstream clients.
    fn source(&self) -> &'static str;
}

/// Shared feed reference.
pub type SharedFeed = Arc<dyn PriceFeed>;
