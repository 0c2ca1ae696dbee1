//! Finnhub WebSocket Message Types
//!
//! Wire format types for Finnhub's trade stream.
//!
//! # Inbound
//! - `trade`: batch of trade ticks
//! - `ping`: keep-alive from the server
//! - `error`: error description
//!
//! # Outbound
//! - `subscribe` / `unsubscribe`: one directive per symbol
//!
//! # References
//!
//! - [Finnhub WebSocket Trades](https://finnhub.io/docs/api/websocket-trades)

use serde::{Deserialize, Serialize};

use crate::domain::symbols::TradingPair;

// =============================================================================
// Inbound Messages
// =============================================================================

/// A message received from the Finnhub stream, discriminated by `type`.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "trade", "data": [{"s": "BINANCE:ETHUSDC", "p": 2000.5, "t": 1700000000000, "v": 0.12}]}
/// {"type": "ping"}
/// {"type": "error", "msg": "Invalid symbol"}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FinnhubMessage {
    /// Trade ticks. Null entries inside `data` are tolerated and skipped.
    Trade {
        /// Ticks in arrival order.
        #[serde(default)]
        data: Option<Vec<Option<TradeTick>>>,
    },
    /// Server keep-alive.
    Ping,
    /// Server-side error.
    Error {
        /// Error description.
        #[serde(default)]
        msg: String,
    },
    /// Any other message kind.
    #[serde(other)]
    Other,
}

/// A single trade tick.
///
/// # Wire Format (JSON)
/// ```json
/// {"s": "BINANCE:ETHUSDC", "p": 2000.5, "t": 1700000000000, "v": 0.12, "c": ["1"]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTick {
    /// Upstream symbol.
    #[serde(rename = "s")]
    pub symbol: String,

    /// Trade price.
    #[serde(rename = "p")]
    pub price: f64,

    /// Trade time in Unix milliseconds.
    #[serde(rename = "t")]
    pub timestamp: i64,

    /// Trade volume.
    #[serde(rename = "v", default)]
    pub volume: f64,

    /// Trade conditions.
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<String>>,
}

// =============================================================================
// Outbound Directives
// =============================================================================

/// Kind of subscription directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveKind {
    /// Start receiving trades for a symbol.
    Subscribe,
    /// Stop receiving trades for a symbol.
    Unsubscribe,
}

impl DirectiveKind {
    /// Lowercase name, as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

/// Subscription directive for one symbol.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "subscribe", "symbol": "BINANCE:ETHUSDC"}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Directive {
    /// Directive kind.
    #[serde(rename = "type")]
    pub kind: DirectiveKind,
    /// Upstream symbol.
    pub symbol: TradingPair,
}

impl Directive {
    /// Subscribe directive for a pair.
    #[must_use]
    pub const fn subscribe(symbol: TradingPair) -> Self {
        Self {
            kind: DirectiveKind::Subscribe,
            symbol,
        }
    }

    /// Unsubscribe directive for a pair.
    #[must_use]
    pub const fn unsubscribe(symbol: TradingPair) -> Self {
        Self {
            kind: DirectiveKind::Unsubscribe,
            symbol,
        }
    }

    /// Directive of the given kind for a pair.
    #[must_use]
    pub const fn new(kind: DirectiveKind, symbol: TradingPair) -> Self {
        Self { kind, symbol }
    }
}
