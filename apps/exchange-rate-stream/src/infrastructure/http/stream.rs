//! SSE Price Stream
//!
//! `GET /exchange-rates/stream`
//!
//! Each client gets its own session:
//!
//! 1. the current snapshot, right away
//! 2. an `update` payload for every batch the feed publishes
//! 3. a `heartbeat` payload on the configured interval
//!
//! Payloads go through a bounded per-client buffer. Delivery never waits on
//! a slow client; when its buffer is full, new updates for that client are
//! dropped. The session unsubscribes and stops its heartbeat when the client
//! disconnects, and the stream ends when the server shuts down.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::DropGuard;

use super::AppState;
use super::heartbeat::HeartbeatTicker;
use super::payload::StreamPayload;
use crate::domain::pricing::PriceObservation;
use crate::infrastructure::broadcast::{ListenerError, ListenerHandle};
use crate::infrastructure::metrics;

/// Resources held for one connected client.
///
/// Dropping the session unsubscribes its listener and cancels its heartbeat.
pub struct StreamSession {
    listener: ListenerHandle,
    clients: Arc<AtomicUsize>,
    _heartbeat: DropGuard,
}

impl StreamSession {
    /// Start a session that writes payloads to `tx`.
    #[must_use]
    pub fn open(state: &AppState, tx: mpsc::Sender<StreamPayload>) -> Self {
        let feed = state.feed();
        let source = feed.source();

        if tx
            .try_send(StreamPayload::snapshot(&feed.current_prices(), source))
            .is_err()
        {
            tracing::debug!("Client went away before the initial snapshot");
        }

        let listener_tx = tx.clone();
        let listener = feed.subscribe_to_updates(Arc::new(move |batch: &[PriceObservation]| {
            listener_tx
                .try_send(StreamPayload::update(batch, source))
                .map_err(|e| match e {
                    TrySendError::Full(_) => {
                        ListenerError::Rejected("client buffer full".to_string())
                    }
                    TrySendError::Closed(_) => ListenerError::Closed,
                })
        }));

        let heartbeat_cancel = state.shutdown().child_token();
        let ticker = HeartbeatTicker::new(state.settings().heartbeat_interval, Arc::clone(feed));
        tokio::spawn(ticker.run(tx, heartbeat_cancel.clone()));

        let clients = state.stream_clients_counter();
        let connected = clients.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::adjust_stream_clients(1.0);
        tracing::info!(listener_id = listener.id(), clients = connected, "Stream client connected");

        Self {
            listener,
            clients,
            _heartbeat: heartbeat_cancel.drop_guard(),
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        let remaining = self.clients.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        metrics::adjust_stream_clients(-1.0);
        tracing::info!(
            listener_id = self.listener.id(),
            clients = remaining,
            "Stream client disconnected"
        );
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

/// SSE handler for the price stream.
pub async fn stream_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::channel(state.settings().client_buffer);
    let session = StreamSession::open(&state, tx);

    let events = ReceiverStream::new(rx)
        .map(move |payload| {
            // The session lives exactly as long as the response stream.
            let _session = &session;
            Event::default().json_data(&payload)
        })
        .take_until(state.shutdown().clone().cancelled_owned());

    Sse::new(events).keep_alive(KeepAlive::default())
}
