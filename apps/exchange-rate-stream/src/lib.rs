#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Exchange Rate Stream - Price Feed Fan-Out
//!
//! Keeps a single connection to Finnhub's trade WebSocket, maintains the
//! latest price for a small fixed set of trading pairs, and streams updates
//! and heartbeats to any number of SSE clients.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure pricing types
//!   - `symbols`: Tracked pairs and display names
//!   - `pricing`: Price observations and the latest-price cache
//!
//! - **Application**: Port definitions
//!   - `ports`: The `PriceFeed` capability and connection state
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `finnhub`: Live WebSocket feed with fixed-delay reconnect
//!   - `synthetic`: Generated prices for local development
//!   - `broadcast`: Listener registry and fan-out
//!   - `http`: SSE stream, health, and metrics endpoints
//!   - `config`: Environment configuration
//!
//! # Data Flow
//!
//! ```text
//!                   ┌─────────────┐
//! Finnhub WS ──────►│ PriceFeed   │──► PriceCache (latest per pair)
//!   (or synthetic)  │             │
//!                   └──────┬──────┘
//!                          │ publish(batch)
//!                   ┌──────▼──────┐     ┌────────────┐
//!                   │  FanOut     │────►│ SSE client │──► Client 1
//!                   │  Publisher  │────►│ sessions   │──► Client N
//!                   └─────────────┘     └────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pricing types with no I/O.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::pricing::{PriceCache, PriceObservation, PriceSnapshot};
pub use domain::symbols::TradingPair;

// Ports
pub use application::ports::{ConnectionState, PriceFeed, SharedFeed};

// Configuration
pub use infrastructure::config::{
    ConfigError, FeedMode, FinnhubSettings, ServerSettings, StreamConfig, StreamSettings,
    SyntheticSettings,
};

// Feeds
pub use infrastructure::finnhub::{FinnhubClientConfig, FinnhubFeed};
pub use infrastructure::synthetic::{SyntheticConfig, SyntheticFeed};

// Fan-out
pub use infrastructure::broadcast::{
    DeliveryReport, FanOutPublisher, Listener, ListenerError, ListenerHandle, ListenerId,
};

// HTTP server
pub use infrastructure::http::{AppState, HttpServer, HttpServerError, StreamPayload, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
