//! SSE Payloads
//!
//! JSON carried in each SSE `data:` line.
//!
//! # Wire Format (JSON)
//! ```json
//! {"rates": [{"symbol": "ETH/USDC", "price": 3200.5, "timestamp": 1700000000000}],
//!  "source": "Finnhub", "status": "live", "type": "update"}
//! ```
//!
//! The initial snapshot omits `type`.

use chrono::Utc;
use serde::Serialize;

use crate::domain::pricing::{PriceObservation, PriceSnapshot, snapshot_observations};

/// Feed status reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedStatus {
    /// Prices are flowing.
    Live,
    /// Connected to the stream but no price known yet.
    Waiting,
    /// The feed is not connected upstream.
    Disconnected,
}

/// Kind of payload after the initial snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    /// Tick-driven batch.
    Update,
    /// Timer-driven snapshot.
    Heartbeat,
}

/// One SSE payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamPayload {
    /// Prices carried by this payload.
    pub rates: Vec<PriceObservation>,
    /// Feed name.
    pub source: &'static str,
    /// Feed status.
    pub status: FeedStatus,
    /// Payload kind; absent on the initial snapshot.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<PayloadKind>,
}

impl StreamPayload {
    /// Snapshot sent when a client connects.
    #[must_use]
    pub fn snapshot(prices: &PriceSnapshot, source: &'static str) -> Self {
        let rates = snapshot_observations(prices, Utc::now().timestamp_millis());
        let status = if rates.is_empty() {
            FeedStatus::Waiting
        } else {
            FeedStatus::Live
        };

        Self {
            rates,
            source,
            status,
            kind: None,
        }
    }

    /// Batch pushed by the feed.
    #[must_use]
    pub fn update(batch: &[PriceObservation], source: &'static str) -> Self {
        Self {
            rates: batch.to_vec(),
            source,
            status: FeedStatus::Live,
            kind: Some(PayloadKind::Update),
        }
    }

    /// Periodic liveness snapshot.
    #[must_use]
    pub fn heartbeat(prices: &PriceSnapshot, connected: bool, source: &'static str) -> Self {
        Self {
            rates: snapshot_observations(prices, Utc::now().timestamp_millis()),
            source,
            status: if connected {
                FeedStatus::Live
            } else {
                FeedStatus::Disconnected
            },
            kind: Some(PayloadKind::Heartbeat),
        }
    }
}
