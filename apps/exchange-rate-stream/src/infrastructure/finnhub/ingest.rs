//! Trade Ingestion
//!
//! Turns decoded Finnhub messages into cache updates and fan-out batches.
//!
//! A trade message carries a batch of ticks in arrival order. The batch is
//! walked in reverse and only the first tick seen per pair is kept, which is
//! the latest one in the batch regardless of its timestamp. Ticks for
//! untracked symbols are dropped. When the latest tick for a pair carries an
//! unusable price, that pair is left out of the batch and its older ticks do
//! not stand in for it. Survivors update the cache and are published
//! together as one batch, in the order the reverse walk produced them.

use std::collections::HashSet;
use std::sync::Arc;

use super::codec::JsonCodec;
use super::messages::{FinnhubMessage, TradeTick};
use crate::domain::pricing::{PriceCache, PriceObservation};
use crate::domain::symbols::TradingPair;
use crate::infrastructure::broadcast::FanOutPublisher;
use crate::infrastructure::metrics::{self, TickOutcome};

// =============================================================================
// Batch Selection
// =============================================================================

/// Result of selecting the latest tick per pair from a batch.
#[derive(Debug, Default)]
pub struct LatestTicks<'a> {
    /// Surviving ticks, in reverse arrival order.
    pub survivors: Vec<(TradingPair, &'a TradeTick)>,
    /// Ticks naming a symbol outside the tracked universe.
    pub untracked: u64,
    /// Ticks superseded by a later tick for the same pair.
    pub superseded: u64,
    /// Latest ticks with a non-positive or non-finite price.
    pub invalid_price: u64,
}

/// Select the latest usable tick for each tracked pair in a batch.
#[must_use]
pub fn latest_per_pair(ticks: &[Option<TradeTick>]) -> LatestTicks<'_> {
    let mut latest = LatestTicks::default();
    let mut seen = HashSet::with_capacity(TradingPair::ALL.len());

    for tick in ticks.iter().rev().flatten() {
        let Some(pair) = TradingPair::from_symbol(&tick.symbol) else {
            latest.untracked += 1;
            continue;
        };
        if !seen.insert(pair) {
            latest.superseded += 1;
            continue;
        }
        if !tick.price.is_finite() || tick.price <= 0.0 {
            latest.invalid_price += 1;
            continue;
        }
        latest.survivors.push((pair, tick));
    }

    latest
}

// =============================================================================
// Trade Ingestor
// =============================================================================

/// What happened to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Prices were updated and one batch was published.
    Published {
        /// Observations in the published batch.
        observations: usize,
        /// Listeners that accepted the batch.
        delivered: usize,
    },
    /// A trade batch in which every tick was filtered out.
    Filtered,
    /// A message kind that carries no prices.
    Ignored,
    /// The payload could not be parsed.
    Malformed,
}

/// Applies upstream messages to the price cache and publisher.
#[derive(Debug)]
pub struct TradeIngestor {
    codec: JsonCodec,
    cache: Arc<PriceCache>,
    publisher: Arc<FanOutPublisher>,
}

impl TradeIngestor {
    /// Create an ingestor writing to `cache` and publishing to `publisher`.
    #[must_use]
    pub const fn new(cache: Arc<PriceCache>, publisher: Arc<FanOutPublisher>) -> Self {
        Self {
            codec: JsonCodec::new(),
            cache,
            publisher,
        }
    }

    /// The cache this ingestor writes to.
    #[must_use]
    pub const fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }

    /// The publisher this ingestor emits to.
    #[must_use]
    pub const fn publisher(&self) -> &Arc<FanOutPublisher> {
        &self.publisher
    }

    /// Decode and apply a text frame. Malformed payloads are logged and
    /// swallowed.
    pub fn handle_text(&self, text: &str) -> IngestOutcome {
        metrics::record_upstream_message();

        match self.codec.decode(text) {
            Ok(message) => self.ingest(message),
            Err(e) => {
                metrics::record_malformed_message();
                tracing::warn!(error = %e, "Failed to parse Finnhub message");
                IngestOutcome::Malformed
            }
        }
    }

    /// Decode and apply a binary frame carrying UTF-8 JSON.
    pub fn handle_bytes(&self, bytes: &[u8]) -> IngestOutcome {
        metrics::record_upstream_message();

        match self.codec.decode_bytes(bytes) {
            Ok(message) => self.ingest(message),
            Err(e) => {
                metrics::record_malformed_message();
                tracing::warn!(error = %e, "Failed to parse Finnhub binary message");
                IngestOutcome::Malformed
            }
        }
    }

    /// Apply a decoded message.
    pub fn ingest(&self, message: FinnhubMessage) -> IngestOutcome {
        match message {
            FinnhubMessage::Trade { data: Some(ticks) } if !ticks.is_empty() => {
                self.ingest_trades(&ticks)
            }
            FinnhubMessage::Trade { .. } => IngestOutcome::Ignored,
            FinnhubMessage::Ping => {
                tracing::trace!("Finnhub ping");
                IngestOutcome::Ignored
            }
            FinnhubMessage::Error { msg } => {
                tracing::warn!(error = %msg, "Finnhub reported an error");
                IngestOutcome::Ignored
            }
            FinnhubMessage::Other => {
                tracing::trace!("Ignoring unhandled message type");
                IngestOutcome::Ignored
            }
        }
    }

    /// Apply a batch of trade ticks.
    pub fn ingest_trades(&self, ticks: &[Option<TradeTick>]) -> IngestOutcome {
        let latest = latest_per_pair(ticks);

        metrics::record_ticks(TickOutcome::Untracked, latest.untracked);
        metrics::record_ticks(TickOutcome::Superseded, latest.superseded);
        metrics::record_ticks(TickOutcome::InvalidPrice, latest.invalid_price);

        if latest.survivors.is_empty() {
            return IngestOutcome::Filtered;
        }

        let observations: Vec<PriceObservation> = latest
            .survivors
            .iter()
            .map(|(pair, tick)| {
                self.cache.upsert(*pair, tick.price);
                PriceObservation::new(*pair, tick.price, tick.timestamp)
            })
            .collect();

        metrics::record_ticks(TickOutcome::Accepted, observations.len() as u64);
        tracing::debug!(
            symbols = ?observations.iter().map(|o| o.symbol).collect::<Vec<_>>(),
            "Updating prices"
        );

        let report = self.publisher.publish(&observations);

        IngestOutcome::Published {
            observations: observations.len(),
            delivered: report.delivered,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use proptest::prelude::*;

    use crate::infrastructure::broadcast::ListenerHandle;

    use super::*;

    fn tick(symbol: &str, price: f64, timestamp: i64) -> Option<TradeTick> {
        Some(TradeTick {
            symbol: symbol.to_string(),
            price,
            timestamp,
            volume: 1.0,
            conditions: None,
        })
    }

    type Received = Arc<Mutex<Vec<Vec<PriceObservation>>>>;

    fn make_ingestor() -> (TradeIngestor, Received, ListenerHandle) {
        let publisher = Arc::new(FanOutPublisher::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let handle = publisher.subscribe(move |batch| {
            sink.lock().unwrap().push(batch.to_vec());
            Ok(())
        });
        let ingestor = TradeIngestor::new(Arc::new(PriceCache::new()), publisher);
        (ingestor, received, handle)
    }

    #[test]
    fn single_trade_updates_cache() {
        let (ingestor, received, _handle) = make_ingestor();

        let outcome = ingestor.handle_text(
            r#"{"type":"trade","data":[{"s":"BINANCE:ETHUSDC","p":2000.5,"t":1700000000000,"v":100}]}"#,
        );

        assert_eq!(
            outcome,
            IngestOutcome::Published {
                observations: 1,
                delivered: 1
            }
        );
        assert_eq!(ingestor.cache().snapshot()[&TradingPair::EthUsdc], 2000.5);

        let batches = received.lock().unwrap();
        assert_eq!(
            batches[0],
            vec![PriceObservation::new(
                TradingPair::EthUsdc,
                2000.5,
                1_700_000_000_000
            )]
        );
    }

    #[test]
    fn later_arrival_wins_regardless_of_timestamp() {
        let (ingestor, _received, _handle) = make_ingestor();

        ingestor.ingest_trades(&[
            tick("BINANCE:ETHUSDT", 3000.0, 2_000),
            tick("BINANCE:ETHUSDT", 3001.0, 1_000),
        ]);

        assert_eq!(ingestor.cache().snapshot()[&TradingPair::EthUsdt], 3001.0);
    }

    #[test]
    fn three_ticks_same_pair_keeps_last() {
        let (ingestor, received, _handle) = make_ingestor();

        ingestor.ingest_trades(&[
            tick("BINANCE:ETHBTC", 0.061, 1),
            tick("BINANCE:ETHBTC", 0.062, 2),
            tick("BINANCE:ETHBTC", 0.063, 3),
        ]);

        assert_eq!(ingestor.cache().snapshot()[&TradingPair::EthBtc], 0.063);
        let batches = received.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].price, 0.063);
    }

    #[test]
    fn batch_is_emitted_in_reverse_arrival_order() {
        let (ingestor, received, _handle) = make_ingestor();

        ingestor.ingest_trades(&[
            tick("BINANCE:ETHUSDC", 2000.0, 1),
            tick("BINANCE:ETHBTC", 0.065, 2),
            tick("BINANCE:ETHUSDT", 2001.0, 3),
        ]);

        let batches = received.lock().unwrap();
        let symbols: Vec<&str> = batches[0].iter().map(|o| o.symbol).collect();
        assert_eq!(symbols, vec!["ETH/USDT", "ETH/BTC", "ETH/USDC"]);
    }

    #[test]
    fn unknown_symbol_leaves_cache_unchanged() {
        let (ingestor, received, _handle) = make_ingestor();

        let outcome = ingestor.ingest_trades(&[tick("UNKNOWN:SYMBOL", 1.0, 1)]);

        assert_eq!(outcome, IngestOutcome::Filtered);
        assert!(ingestor.cache().snapshot().is_empty());
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_symbol_does_not_block_known_ones() {
        let (ingestor, _received, _handle) = make_ingestor();

        ingestor.ingest_trades(&[
            tick("BINANCE:ETHUSDC", 2000.0, 1),
            tick("UNKNOWN:SYMBOL", 1.0, 2),
        ]);

        let snapshot = ingestor.cache().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&TradingPair::EthUsdc], 2000.0);
    }

    #[test]
    fn malformed_payload_is_swallowed() {
        let (ingestor, received, _handle) = make_ingestor();
        ingestor.ingest_trades(&[tick("BINANCE:ETHUSDC", 2000.0, 1)]);

        assert_eq!(ingestor.handle_text("{not json"), IngestOutcome::Malformed);
        assert_eq!(ingestor.handle_text("plain text"), IngestOutcome::Malformed);
        assert_eq!(
            ingestor.handle_text(r#"{"type":"trade","data":"oops"}"#),
            IngestOutcome::Malformed
        );

        assert_eq!(ingestor.cache().size(), 1);
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[test]
    fn non_trade_messages_are_ignored() {
        let (ingestor, received, _handle) = make_ingestor();

        assert_eq!(ingestor.handle_text(r#"{"type":"ping"}"#), IngestOutcome::Ignored);
        assert_eq!(
            ingestor.handle_text(r#"{"type":"error","msg":"bad"}"#),
            IngestOutcome::Ignored
        );
        assert_eq!(ingestor.handle_text(r#"{"type":"news"}"#), IngestOutcome::Ignored);
        assert_eq!(
            ingestor.handle_text(r#"{"type":"trade","data":[]}"#),
            IngestOutcome::Ignored
        );
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn null_entries_are_skipped() {
        let (ingestor, _received, _handle) = make_ingestor();

        let outcome = ingestor.handle_text(
            r#"{"type":"trade","data":[null,{"s":"BINANCE:ETHBTC","p":0.065,"t":1,"v":1},null]}"#,
        );

        assert!(matches!(outcome, IngestOutcome::Published { observations: 1, .. }));
    }

    #[test]
    fn non_positive_price_is_dropped() {
        let (ingestor, _received, _handle) = make_ingestor();

        let outcome = ingestor.ingest_trades(&[
            tick("BINANCE:ETHUSDT", -5.0, 1),
            tick("BINANCE:ETHBTC", 0.065, 2),
        ]);

        assert!(matches!(outcome, IngestOutcome::Published { observations: 1, .. }));
        let snapshot = ingestor.cache().snapshot();
        assert_eq!(snapshot[&TradingPair::EthBtc], 0.065);
        assert!(!snapshot.contains_key(&TradingPair::EthUsdt));
    }

    #[test]
    fn invalid_latest_tick_is_not_replaced_by_older_one() {
        let (ingestor, received, _handle) = make_ingestor();
        ingestor.ingest_trades(&[tick("BINANCE:ETHUSDC", 1999.0, 1)]);

        let outcome = ingestor.ingest_trades(&[
            tick("BINANCE:ETHUSDC", 2000.0, 2),
            tick("BINANCE:ETHUSDC", 0.0, 3),
        ]);

        assert_eq!(outcome, IngestOutcome::Filtered);
        assert_eq!(ingestor.cache().snapshot()[&TradingPair::EthUsdc], 1999.0);
        assert_eq!(received.lock().unwrap().len(), 1);

        let ticks = [
            tick("BINANCE:ETHUSDC", 2000.0, 2),
            tick("BINANCE:ETHUSDC", f64::INFINITY, 3),
        ];
        let latest = latest_per_pair(&ticks);
        assert!(latest.survivors.is_empty());
        assert_eq!(latest.superseded, 1);
        assert_eq!(latest.invalid_price, 1);
    }

    #[test]
    fn binary_frames_are_decoded() {
        let (ingestor, _received, _handle) = make_ingestor();

        let outcome = ingestor.handle_bytes(
            br#"{"type":"trade","data":[{"s":"BINANCE:ETHUSDT","p":3000.0,"t":1,"v":1}]}"#,
        );

        assert!(matches!(outcome, IngestOutcome::Published { .. }));
        assert_eq!(ingestor.handle_bytes(&[0xc3, 0x28]), IngestOutcome::Malformed);
    }

    #[test]
    fn selection_counts_filtered_ticks() {
        let ticks = [
            tick("BINANCE:ETHUSDC", 1.0, 1),
            tick("BINANCE:ETHUSDC", 2.0, 2),
            tick("NASDAQ:AAPL", 3.0, 3),
            tick("BINANCE:ETHBTC", f64::NAN, 4),
        ];

        let latest = latest_per_pair(&ticks);
        assert_eq!(latest.survivors.len(), 1);
        assert_eq!(latest.superseded, 1);
        assert_eq!(latest.untracked, 1);
        assert_eq!(latest.invalid_price, 1);
    }

    fn arb_tick() -> impl Strategy<Value = Option<TradeTick>> {
        let symbols = prop::sample::select(vec![
            "BINANCE:ETHUSDC",
            "BINANCE:ETHUSDT",
            "BINANCE:ETHBTC",
            "UNKNOWN:SYMBOL",
            "COINBASE:ETH-USD",
        ]);
        let prices = prop_oneof![
            8 => 0.0001f64..100_000.0,
            1 => Just(0.0),
            1 => Just(-1.0),
            1 => Just(f64::NAN),
        ];
        (symbols, prices, 0i64..2_000_000_000_000)
            .prop_map(|(s, p, t)| tick(s, p, t))
    }

    proptest! {
        #[test]
        fn survivors_are_tracked_and_unique(ticks in prop::collection::vec(arb_tick(), 0..40)) {
            let latest = latest_per_pair(&ticks);
            let mut seen = HashSet::new();
            for (pair, tick) in &latest.survivors {
                prop_assert!(TradingPair::from_symbol(&tick.symbol) == Some(*pair));
                prop_assert!(seen.insert(*pair));
            }
        }

        #[test]
        fn cache_holds_last_arrival_per_pair(ticks in prop::collection::vec(arb_tick(), 1..40)) {
            let (ingestor, _received, _handle) = make_ingestor();
            ingestor.ingest_trades(&ticks);
            let snapshot = ingestor.cache().snapshot();

            for pair in TradingPair::ALL {
                let expected = ticks
                    .iter()
                    .flatten()
                    .filter(|t| t.symbol == pair.as_str())
                    .last()
                    .map(|t| t.price)
                    .filter(|p| p.is_finite() && *p > 0.0);
                prop_assert_eq!(snapshot.get(&pair).copied(), expected);
            }
        }
    }
}
