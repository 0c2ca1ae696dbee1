//! Synthetic Price Feed
//!
//! Generated prices for local development without a Finnhub key. Every pair
//! starts at a fixed base price; each interval, while at least one listener
//! is registered, every pair moves to a random price within ±2% of its base
//! and one batch is published in registry order.
//!
//! The generator is a seeded `StdRng`, so a given seed always produces the
//! same sequence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::PriceFeed;
use crate::domain::pricing::{PriceCache, PriceObservation, PriceSnapshot};
use crate::domain::symbols::{self, TradingPair};
use crate::infrastructure::broadcast::{FanOutPublisher, Listener, ListenerHandle};

/// Source name reported downstream.
pub const SYNTHETIC_SOURCE: &str = "Synthetic";

/// Default interval between generated batches.
pub const DEFAULT_SYNTHETIC_INTERVAL: Duration = Duration::from_millis(2000);

/// Default generator seed.
pub const DEFAULT_SYNTHETIC_SEED: u64 = 42;

/// Maximum relative distance from the base price.
const MAX_DEVIATION: f64 = 0.02;

/// Starting price for a pair.
#[must_use]
pub const fn base_price(pair: TradingPair) -> f64 {
    match pair {
        TradingPair::EthUsdc | TradingPair::EthUsdt => 3200.0,
        TradingPair::EthBtc => 0.065,
    }
}

/// Configuration for the synthetic feed.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticConfig {
    /// Interval between batches.
    pub interval: Duration,
    /// Generator seed.
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNTHETIC_INTERVAL,
            seed: DEFAULT_SYNTHETIC_SEED,
        }
    }
}

struct Generator {
    cache: PriceCache,
    publisher: Arc<FanOutPublisher>,
    rng: Mutex<StdRng>,
    connected: AtomicBool,
}

impl Generator {
    fn seed_cache(&self) {
        for &pair in symbols::all_tracked_ids() {
            self.cache.upsert(pair, base_price(pair));
        }
    }

    /// Produce and publish one batch. Skipped while nobody is listening.
    fn tick(&self) -> Option<Vec<PriceObservation>> {
        if self.publisher.listener_count() == 0 {
            tracing::trace!("No listeners, skipping synthetic tick");
            return None;
        }

        let timestamp = Utc::now().timestamp_millis();
        let batch: Vec<PriceObservation> = {
            let mut rng = self.rng.lock();
            symbols::all_tracked_ids()
                .iter()
                .map(|&pair| {
                    let drift = rng.random_range(-MAX_DEVIATION..=MAX_DEVIATION);
                    let price = base_price(pair) * (1.0 + drift);
                    self.cache.upsert(pair, price);
                    PriceObservation::new(pair, price, timestamp)
                })
                .collect()
        };

        tracing::debug!(count = batch.len(), "Publishing synthetic prices");
        self.publisher.publish(&batch);
        Some(batch)
    }

    async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!("Synthetic feed cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }
    }
}

/// Price feed that generates prices locally.
pub struct SyntheticFeed {
    config: SyntheticConfig,
    generator: Arc<Generator>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl SyntheticFeed {
    /// Create a stopped synthetic feed.
    #[must_use]
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            generator: Arc::new(Generator {
                cache: PriceCache::new(),
                publisher: Arc::new(FanOutPublisher::new()),
                rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
                connected: AtomicBool::new(false),
            }),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// The publisher batches are emitted to.
    #[must_use]
    pub fn publisher(&self) -> &Arc<FanOutPublisher> {
        &self.generator.publisher
    }

    /// The feed configuration.
    #[must_use]
    pub const fn config(&self) -> &SyntheticConfig {
        &self.config
    }
}

#[async_trait]
impl PriceFeed for SyntheticFeed {
    fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) || self.cancel.is_cancelled() {
            return;
        }

        self.generator.seed_cache();
        self.generator.connected.store(true, Ordering::Release);

        let handle = tokio::spawn(
            Arc::clone(&self.generator).run(self.config.interval, self.cancel.clone()),
        );
        *self.task.lock() = Some(handle);

        tracing::info!(
            interval_ms = u64::try_from(self.config.interval.as_millis()).unwrap_or(u64::MAX),
            seed = self.config.seed,
            "Synthetic price feed started"
        );
    }

    async fn stop(&self) {
        self.cancel.cancel();
        self.generator.connected.store(false, Ordering::Release);

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Synthetic feed task ended abnormally");
            }
            tracing::info!("Synthetic price feed stopped");
        }
    }

    fn current_prices(&self) -> PriceSnapshot {
        self.generator.cache.snapshot()
    }

    fn is_connected(&self) -> bool {
        self.generator.connected.load(Ordering::Acquire)
    }

    fn subscribe_to_updates(&self, listener: Listener) -> ListenerHandle {
        self.generator.publisher.subscribe_arc(listener)
    }

    fn source(&self) -> &'static str {
        SYNTHETIC_SOURCE
    }
}

impl std::fmt::Debug for SyntheticFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticFeed")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    type Received = Arc<StdMutex<Vec<Vec<PriceObservation>>>>;

    fn recording(feed: &SyntheticFeed) -> (Received, ListenerHandle) {
        let received = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let handle = feed.subscribe_to_updates(Arc::new(move |batch: &[PriceObservation]| {
            sink.lock().unwrap().push(batch.to_vec());
            Ok(())
        }));
        (received, handle)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn stopped_feed_is_empty_and_disconnected() {
        let feed = SyntheticFeed::new(SyntheticConfig::default());
        assert!(feed.current_prices().is_empty());
        assert!(!feed.is_connected());
        assert_eq!(feed.source(), "Synthetic");
    }

    #[tokio::test(start_paused = true)]
    async fn start_seeds_base_prices() {
        let feed = SyntheticFeed::new(SyntheticConfig::default());
        feed.start();

        let prices = feed.current_prices();
        assert_eq!(prices[&TradingPair::EthUsdc], 3200.0);
        assert_eq!(prices[&TradingPair::EthUsdt], 3200.0);
        assert_eq!(prices[&TradingPair::EthBtc], 0.065);
        assert!(feed.is_connected());

        feed.stop().await;
        assert!(!feed.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_batch_each_interval_in_registry_order() {
        let feed = SyntheticFeed::new(SyntheticConfig::default());
        let (received, _handle) = recording(&feed);
        feed.start();
        settle().await;

        tokio::time::advance(Duration::from_millis(1999)).await;
        settle().await;
        assert!(received.lock().unwrap().is_empty());

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;

        let batches = received.lock().unwrap().clone();
        assert_eq!(batches.len(), 1);
        let symbols: Vec<&str> = batches[0].iter().map(|o| o.symbol).collect();
        assert_eq!(symbols, vec!["ETH/USDC", "ETH/USDT", "ETH/BTC"]);

        for (observation, pair) in batches[0].iter().zip(TradingPair::ALL) {
            let base = base_price(pair);
            assert!((observation.price - base).abs() <= base * MAX_DEVIATION + f64::EPSILON);
            assert_eq!(feed.current_prices()[&pair], observation.price);
        }

        feed.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_listeners_means_no_ticks() {
        let feed = SyntheticFeed::new(SyntheticConfig::default());
        feed.start();
        settle().await;

        tokio::time::advance(Duration::from_millis(10_000)).await;
        settle().await;

        assert_eq!(feed.current_prices()[&TradingPair::EthUsdc], 3200.0);
        feed.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_publication() {
        let feed = SyntheticFeed::new(SyntheticConfig::default());
        let (received, _handle) = recording(&feed);
        feed.start();
        feed.stop().await;
        feed.stop().await;

        tokio::time::advance(Duration::from_millis(10_000)).await;
        settle().await;
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn same_seed_same_prices() {
        let first = SyntheticFeed::new(SyntheticConfig::default());
        let second = SyntheticFeed::new(SyntheticConfig::default());
        let _h1 = first.publisher().subscribe(|_| Ok(()));
        let _h2 = second.publisher().subscribe(|_| Ok(()));

        let a: Vec<f64> = first.generator.tick().unwrap().iter().map(|o| o.price).collect();
        let b: Vec<f64> = second.generator.tick().unwrap().iter().map(|o| o.price).collect();
        assert_eq!(a, b);
    }
}
