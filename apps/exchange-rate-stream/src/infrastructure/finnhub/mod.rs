//! Finnhub WebSocket Adapter
//!
//! Live trade ingestion from Finnhub:
//!
//! - **Client**: connection lifecycle and reconnection
//! - **Ingest**: latest-per-pair selection, cache writes, fan-out
//! - **Codec/Messages**: JSON wire format

pub mod client;
pub mod codec;
pub mod connector;
pub mod ingest;
pub mod messages;
pub mod reconnect;

pub use client::{DEFAULT_FINNHUB_WS_URL, FINNHUB_SOURCE, FinnhubClientConfig, FinnhubFeed};
pub use codec::{CodecError, JsonCodec};
pub use connector::{
    Connector, FeedError, UpstreamConnection, UpstreamSink, UpstreamStream, WebSocketConnector,
    WsError,
};
pub use ingest::{IngestOutcome, TradeIngestor, latest_per_pair};
pub use messages::{Directive, DirectiveKind, FinnhubMessage, TradeTick};
pub use reconnect::{DEFAULT_RECONNECT_DELAY, ReconnectConfig, ReconnectPolicy};
