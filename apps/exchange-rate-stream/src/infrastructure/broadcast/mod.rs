//! Fan-Out Publisher
//!
//! Delivers every price batch produced by a feed to all registered
//! listeners.
//!
//! # Design
//!
//! Listeners live in a registry keyed by a monotonically increasing
//! [`ListenerId`]. Registration returns a [`ListenerHandle`]; unsubscribing
//! through the handle (or dropping it) removes exactly that entry, and doing
//! so twice is a no-op.
//!
//! `publish` copies the current listener set out of the lock and then calls
//! each listener in registration order, so listeners may subscribe or
//! unsubscribe (themselves or others) while a delivery is in flight. A
//! listener that returns an error or panics is logged and skipped; it never
//! prevents delivery to the rest and never reaches the publisher's caller.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::domain::pricing::PriceObservation;
use crate::infrastructure::metrics;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a registered listener.
pub type ListenerId = u64;

/// Callback invoked with each published batch.
pub type Listener = Arc<dyn Fn(&[PriceObservation]) -> Result<(), ListenerError> + Send + Sync>;

/// Failure reported by a listener callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    /// The listener's downstream side has gone away.
    #[error("listener closed")]
    Closed,
    /// The listener could not accept the batch.
    #[error("listener rejected batch: {0}")]
    Rejected(String),
}

/// Outcome of a single `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Listeners that accepted the batch.
    pub delivered: usize,
    /// Listeners that returned an error or panicked.
    pub failed: usize,
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Default)]
struct Registry {
    listeners: RwLock<BTreeMap<ListenerId, Listener>>,
    next_id: AtomicU64,
}

impl Registry {
    fn insert(&self, listener: Listener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let count = {
            let mut listeners = self.listeners.write();
            listeners.insert(id, listener);
            listeners.len()
        };
        metrics::set_listeners(count);
        id
    }

    fn remove(&self, id: ListenerId) -> bool {
        let (removed, count) = {
            let mut listeners = self.listeners.write();
            let removed = listeners.remove(&id).is_some();
            (removed, listeners.len())
        };
        metrics::set_listeners(count);
        removed
    }

    fn snapshot(&self) -> Vec<(ListenerId, Listener)> {
        self.listeners
            .read()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect()
    }

    fn len(&self) -> usize {
        self.listeners.read().len()
    }
}

// =============================================================================
// Listener Handle
// =============================================================================

/// Registration token returned by [`FanOutPublisher::subscribe`].
///
/// Dropping the handle unsubscribes the listener.
#[must_use = "dropping the handle unsubscribes the listener immediately"]
pub struct ListenerHandle {
    id: ListenerId,
    registry: Weak<Registry>,
    active: AtomicBool,
}

impl ListenerHandle {
    /// Identifier of the registered listener.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    /// Whether `unsubscribe` has not been called yet.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Remove the listener. Calls after the first are no-ops.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade()
            && registry.remove(self.id)
        {
            tracing::debug!(listener_id = self.id, "Listener unsubscribed");
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

// =============================================================================
// Fan-Out Publisher
// =============================================================================

/// Synchronous, failure-isolated fan-out of price batches.
///
/// # Example
///
/// ```rust
/// use exchange_rate_stream::infrastructure::broadcast::FanOutPublisher;
///
/// let publisher = FanOutPublisher::new();
/// let handle = publisher.subscribe(|batch| {
///     println!("{} prices", batch.len());
///     Ok(())
/// });
/// assert_eq!(publisher.listener_count(), 1);
///
/// handle.unsubscribe();
/// assert_eq!(publisher.listener_count(), 0);
/// ```
#[derive(Default)]
pub struct FanOutPublisher {
    registry: Arc<Registry>,
}

impl FanOutPublisher {
    /// Create a publisher with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn subscribe<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&[PriceObservation]) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.subscribe_arc(Arc::new(listener))
    }

    /// Register an already shared listener.
    pub fn subscribe_arc(&self, listener: Listener) -> ListenerHandle {
        let id = self.registry.insert(listener);
        tracing::debug!(listener_id = id, "Listener subscribed");
        ListenerHandle {
            id,
            registry: Arc::downgrade(&self.registry),
            active: AtomicBool::new(true),
        }
    }

    /// Deliver a batch to every listener registered when the call starts.
    pub fn publish(&self, batch: &[PriceObservation]) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for (id, listener) in self.registry.snapshot() {
            match catch_unwind(AssertUnwindSafe(|| listener(batch))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    metrics::record_listener_failure();
                    tracing::warn!(listener_id = id, error = %e, "Listener failed to accept batch");
                }
                Err(_) => {
                    report.failed += 1;
                    metrics::record_listener_failure();
                    tracing::error!(listener_id = id, "Listener panicked during delivery");
                }
            }
        }

        metrics::record_batch_published(batch.len(), report.delivered);
        report
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }
}

impl fmt::Debug for FanOutPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOutPublisher")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::domain::symbols::TradingPair;

    fn make_batch() -> Vec<PriceObservation> {
        vec![
            PriceObservation::new(TradingPair::EthUsdc, 2000.5, 1),
            PriceObservation::new(TradingPair::EthBtc, 0.065, 2),
        ]
    }

    fn recording_listener() -> (
        Arc<Mutex<Vec<Vec<PriceObservation>>>>,
        impl Fn(&[PriceObservation]) -> Result<(), ListenerError> + Send + Sync + 'static,
    ) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let listener = move |batch: &[PriceObservation]| {
            sink.lock().unwrap().push(batch.to_vec());
            Ok(())
        };
        (received, listener)
    }

    #[test]
    fn publisher_starts_empty() {
        let publisher = FanOutPublisher::new();
        assert_eq!(publisher.listener_count(), 0);
        assert_eq!(publisher.publish(&make_batch()), DeliveryReport::default());
    }

    #[test]
    fn both_listeners_receive_identical_batch() {
        let publisher = FanOutPublisher::new();
        let (first, l1) = recording_listener();
        let (second, l2) = recording_listener();
        let _h1 = publisher.subscribe(l1);
        let _h2 = publisher.subscribe(l2);

        let batch = make_batch();
        let report = publisher.publish(&batch);

        assert_eq!(report.delivered, 2);
        assert_eq!(first.lock().unwrap().as_slice(), &[batch.clone()]);
        assert_eq!(second.lock().unwrap().as_slice(), &[batch]);
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let publisher = FanOutPublisher::new();
        let _failing = publisher.subscribe(|_| Err(ListenerError::Rejected("boom".into())));
        let (received, listener) = recording_listener();
        let _ok = publisher.subscribe(listener);

        let report = publisher.publish(&make_batch());

        assert_eq!(report, DeliveryReport { delivered: 1, failed: 1 });
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let publisher = FanOutPublisher::new();
        let _panicking = publisher.subscribe(|_| panic!("listener bug"));
        let (received, listener) = recording_listener();
        let _ok = publisher.subscribe(listener);

        let report = publisher.publish(&make_batch());

        assert_eq!(report.failed, 1);
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[test]
    fn unsubscribe_twice_is_safe() {
        let publisher = FanOutPublisher::new();
        let (received, listener) = recording_listener();
        let handle = publisher.subscribe(listener);

        handle.unsubscribe();
        handle.unsubscribe();
        assert!(!handle.is_active());
        assert_eq!(publisher.listener_count(), 0);

        publisher.publish(&make_batch());
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn unsubscribe_removes_only_its_listener() {
        let publisher = FanOutPublisher::new();
        let (first, l1) = recording_listener();
        let (second, l2) = recording_listener();
        let h1 = publisher.subscribe(l1);
        let _h2 = publisher.subscribe(l2);

        h1.unsubscribe();
        publisher.publish(&make_batch());

        assert!(first.lock().unwrap().is_empty());
        assert_eq!(second.lock().unwrap().len(), 1);
    }

    #[test]
    fn dropping_handle_unsubscribes() {
        let publisher = FanOutPublisher::new();
        {
            let _handle = publisher.subscribe(|_| Ok(()));
            assert_eq!(publisher.listener_count(), 1);
        }
        assert_eq!(publisher.listener_count(), 0);
    }

    #[test]
    fn handle_outliving_publisher_is_harmless() {
        let publisher = FanOutPublisher::new();
        let handle = publisher.subscribe(|_| Ok(()));
        drop(publisher);
        handle.unsubscribe();
    }

    #[test]
    fn listener_ids_are_unique() {
        let publisher = FanOutPublisher::new();
        let h1 = publisher.subscribe(|_| Ok(()));
        let h2 = publisher.subscribe(|_| Ok(()));
        assert_ne!(h1.id(), h2.id());
    }

    #[test]
    fn unsubscribe_during_delivery_still_reaches_snapshot() {
        let publisher = Arc::new(FanOutPublisher::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let victim: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));

        // First listener removes the second mid-delivery.
        let victim_slot = Arc::clone(&victim);
        let _remover = publisher.subscribe(move |_| {
            if let Some(handle) = victim_slot.lock().unwrap().take() {
                handle.unsubscribe();
            }
            Ok(())
        });

        let counter = Arc::clone(&calls);
        let handle = publisher.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        *victim.lock().unwrap() = Some(handle);

        let report = publisher.publish(&make_batch());
        assert_eq!(report.delivered, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(publisher.listener_count(), 1);

        publisher.publish(&make_batch());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribe_during_delivery_does_not_deadlock() {
        let publisher = Arc::new(FanOutPublisher::new());
        let late: Arc<Mutex<Vec<ListenerHandle>>> = Arc::new(Mutex::new(Vec::new()));

        let inner = Arc::clone(&publisher);
        let late_slot = Arc::clone(&late);
        let _h = publisher.subscribe(move |_| {
            late_slot.lock().unwrap().push(inner.subscribe(|_| Ok(())));
            Ok(())
        });

        let report = publisher.publish(&make_batch());
        assert_eq!(report.delivered, 1);
        assert_eq!(publisher.listener_count(), 2);
    }
}
