//! Upstream Connector
//!
//! Opens the message-oriented connection the feed runs over. The production
//! connector dials a real WebSocket; tests substitute an in-memory pair of
//! channels through the same trait.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;

/// Transport error type shared by every connector.
pub type WsError = tokio_tungstenite::tungstenite::Error;

/// Outbound half of an upstream connection.
pub type UpstreamSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Inbound half of an upstream connection.
pub type UpstreamStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// Errors surfaced by the feed's connection layer.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The handshake could not be completed.
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket error on an open connection.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Directive could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] super::codec::CodecError),
}

/// An open upstream connection, split into its two halves.
pub struct UpstreamConnection {
    /// Frames sent to the server.
    pub sink: UpstreamSink,
    /// Frames received from the server.
    pub stream: UpstreamStream,
}

impl std::fmt::Debug for UpstreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConnection").finish_non_exhaustive()
    }
}

/// Opens upstream connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `url` and return the split connection.
    async fn connect(&self, url: &str) -> Result<UpstreamConnection, FeedError>;
}

/// Connector backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<UpstreamConnection, FeedError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| FeedError::ConnectionFailed(e.to_string()))?;

        let (sink, stream) = ws_stream.split();

        Ok(UpstreamConnection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}
