//! Stream Heartbeat
//!
//! Periodic liveness payloads for SSE clients. Each tick reads a fresh price
//! snapshot and the feed's connection status, independent of trade activity,
//! and is sent even when no prices are known yet.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::payload::StreamPayload;
use crate::application::ports::SharedFeed;

/// Emits heartbeat payloads on a fixed interval.
pub struct HeartbeatTicker {
    interval: Duration,
    feed: SharedFeed,
}

impl HeartbeatTicker {
    /// Create a ticker reading from `feed`.
    #[must_use]
    pub fn new(interval: Duration, feed: SharedFeed) -> Self {
        Self { interval, feed }
    }

    /// Build the payload for one tick.
    #[must_use]
    pub fn beat(&self) -> StreamPayload {
        StreamPayload::heartbeat(
            &self.feed.current_prices(),
            self.feed.is_connected(),
            self.feed.source(),
        )
    }

    /// Send a heartbeat every interval until cancelled or the receiver goes
    /// away. The first heartbeat is sent one interval after the call.
    pub async fn run(self, tx: mpsc::Sender<StreamPayload>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::trace!("Heartbeat ticker cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if tx.send(self.beat()).await.is_err() {
                        tracing::trace!("Stream closed, stopping heartbeat");
                        break;
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for HeartbeatTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatTicker")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
