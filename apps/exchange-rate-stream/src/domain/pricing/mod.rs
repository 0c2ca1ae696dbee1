//! Price Types and Cache
//!
//! Normalized price observations handed to listeners, and the in-memory
//! latest-price cache written by a feed.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::symbols::TradingPair;

/// Latest price per tracked pair, iterated in registry order.
pub type PriceSnapshot = BTreeMap<TradingPair, f64>;

// =============================================================================
// Price Observation
// =============================================================================

/// A single normalized price point delivered to listeners.
///
/// # Wire Format (JSON)
/// ```json
/// {"symbol": "ETH/USDC", "price": 2000.5, "timestamp": 1700000000000}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceObservation {
    /// Display name of the pair.
    pub symbol: &'static str,
    /// Trade price.
    pub price: f64,
    /// Observation time in Unix milliseconds.
    pub timestamp: i64,
}

impl PriceObservation {
    /// Build an observation for a tracked pair.
    #[must_use]
    pub const fn new(pair: TradingPair, price: f64, timestamp: i64) -> Self {
        Self {
            symbol: pair.display_name(),
            price,
            timestamp,
        }
    }
}

/// Render a snapshot as observations stamped with a single time, in registry
/// order.
#[must_use]
pub fn snapshot_observations(snapshot: &PriceSnapshot, timestamp: i64) -> Vec<PriceObservation> {
    snapshot
        .iter()
        .map(|(pair, price)| PriceObservation::new(*pair, *price, timestamp))
        .collect()
}

// =============================================================================
// Price Cache
// =============================================================================

/// In-memory latest price per tracked pair.
///
/// Writes are last-write-wins with no ordering checks; ordering is the
/// writer's responsibility. Reads only ever hand out copies.
#[derive(Debug, Default)]
pub struct PriceCache {
    prices: RwLock<HashMap<TradingPair, f64>>,
}

impl PriceCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the price for a pair.
    pub fn upsert(&self, pair: TradingPair, price: f64) {
        self.prices.write().insert(pair, price);
    }

    /// Copy of the current contents, ordered by registry order.
    #[must_use]
    pub fn snapshot(&self) -> PriceSnapshot {
        self.prices
            .read()
            .iter()
            .map(|(pair, price)| (*pair, *price))
            .collect()
    }

    /// Number of pairs with a known price.
    #[must_use]
    pub fn size(&self) -> usize {
        self.prices.read().len()
    }

    /// Whether no price has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.read().is_empty()
    }
}
