//! Prometheus Metrics Module
//!
//! Exposes feed and fan-out metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Upstream**: Messages received, malformed payloads, connection state
//! - **Ingestion**: Trade ticks accepted and filtered
//! - **Fan-out**: Batches published, listener failures, active listeners
//! - **Clients**: Active SSE stream clients
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Later calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns `BuildError` if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "exchange_rate_upstream_messages_total",
        "Total messages received from the upstream feed"
    );
    describe_counter!(
        "exchange_rate_upstream_malformed_total",
        "Upstream messages that could not be parsed"
    );
    describe_counter!(
        "exchange_rate_ticks_total",
        "Trade ticks processed, by outcome"
    );
    describe_counter!(
        "exchange_rate_batches_published_total",
        "Price batches handed to the fan-out publisher"
    );
    describe_counter!(
        "exchange_rate_deliveries_total",
        "Successful listener deliveries"
    );
    describe_counter!(
        "exchange_rate_listener_failures_total",
        "Listener callbacks that failed or panicked"
    );
    describe_counter!(
        "exchange_rate_reconnects_total",
        "Upstream reconnection attempts"
    );
    describe_gauge!(
        "exchange_rate_upstream_connected",
        "1 when the upstream connection is open, 0 otherwise"
    );
    describe_gauge!(
        "exchange_rate_listeners",
        "Number of registered fan-out listeners"
    );
    describe_gauge!(
        "exchange_rate_stream_clients",
        "Number of connected SSE stream clients"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for a processed trade tick.
#[derive(Debug, Clone, Copy)]
pub enum TickOutcome {
    /// Tick updated the cache and was published.
    Accepted,
    /// Tick named an instrument outside the tracked universe.
    Untracked,
    /// Tick was superseded by a later tick for the same pair in its batch.
    Superseded,
    /// Tick carried an unusable price.
    InvalidPrice,
}

impl TickOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Untracked => "untracked",
            Self::Superseded => "superseded",
            Self::InvalidPrice => "invalid_price",
        }
    }
}

/// Record a message received from upstream.
pub fn record_upstream_message() {
    counter!("exchange_rate_upstream_messages_total").increment(1);
}

/// Record an upstream message that failed to parse.
pub fn record_malformed_message() {
    counter!("exchange_rate_upstream_malformed_total").increment(1);
}

/// Record processed trade ticks.
pub fn record_ticks(outcome: TickOutcome, count: u64) {
    if count == 0 {
        return;
    }
    counter!("exchange_rate_ticks_total", "outcome" => outcome.as_str()).increment(count);
}

/// Record a published batch and how many listeners accepted it.
pub fn record_batch_published(batch_len: usize, delivered: usize) {
    if batch_len == 0 {
        return;
    }
    counter!("exchange_rate_batches_published_total").increment(1);
    counter!("exchange_rate_deliveries_total").increment(delivered as u64);
}

/// Record a failed listener callback.
pub fn record_listener_failure() {
    counter!("exchange_rate_listener_failures_total").increment(1);
}

/// Record an upstream reconnection attempt.
pub fn record_reconnect() {
    counter!("exchange_rate_reconnects_total").increment(1);
}

/// Update the upstream connection gauge.
pub fn set_upstream_connected(connected: bool) {
    gauge!("exchange_rate_upstream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Update the registered listener gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_listeners(count: usize) {
    gauge!("exchange_rate_listeners").set(count as f64);
}

/// Adjust the SSE client gauge.
pub fn adjust_stream_clients(delta: f64) {
    gauge!("exchange_rate_stream_clients").increment(delta);
}

// =============================================================================
// Tests
// =============================================================================
