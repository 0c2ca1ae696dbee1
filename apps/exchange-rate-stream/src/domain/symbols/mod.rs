//! Tracked Symbol Registry
//!
//! The fixed universe of trading pairs the service follows, keyed by the
//! identifier the upstream feed uses, with the display name shown to clients.
//!
//! Declaration order is significant: it drives the order of upstream
//! subscribe/unsubscribe directives and the default ordering of snapshots.

use std::fmt;

use serde::{Serialize, Serializer};

// =============================================================================
// Trading Pair
// =============================================================================

/// A tracked trading pair.
///
/// Variants are declared in registry order, and `Ord` follows that order so
/// ordered collections keyed by `TradingPair` iterate in registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TradingPair {
    /// Ether quoted in USD Coin.
    EthUsdc,
    /// Ether quoted in Tether.
    EthUsdt,
    /// Ether quoted in Bitcoin.
    EthBtc,
}

impl TradingPair {
    /// Every tracked pair, in registry order.
    pub const ALL: [Self; 3] = [Self::EthUsdc, Self::EthUsdt, Self::EthBtc];

    /// Upstream feed identifier (e.g. `BINANCE:ETHUSDC`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EthUsdc => "BINANCE:ETHUSDC",
            Self::EthUsdt => "BINANCE:ETHUSDT",
            Self::EthBtc => "BINANCE:ETHBTC",
        }
    }

    /// Human-readable name (e.g. `ETH/USDC`).
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::EthUsdc => "ETH/USDC",
            Self::EthUsdt => "ETH/USDT",
            Self::EthBtc => "ETH/BTC",
        }
    }

    /// Resolve an upstream identifier. Matching is exact.
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|pair| pair.as_str() == symbol)
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TradingPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// =============================================================================
// Registry Lookups
// =============================================================================

/// Check whether an upstream identifier belongs to the tracked universe.
#[must_use]
pub fn is_tracked(symbol: &str) -> bool {
    TradingPair::from_symbol(symbol).is_some()
}

/// Display name for an upstream identifier, if it is tracked.
#[must_use]
pub fn display_name_of(symbol: &str) -> Option<&'static str> {
    TradingPair::from_symbol(symbol).map(TradingPair::display_name)
}

/// All tracked pairs in registry order.
#[must_use]
pub const fn all_tracked_ids() -> &'static [TradingPair] {
    &TradingPair::ALL
}
