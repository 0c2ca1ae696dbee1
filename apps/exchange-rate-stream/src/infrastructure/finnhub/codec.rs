//! Stream Codec Module
//!
//! JSON encoding and decoding for the Finnhub WebSocket stream. Finnhub sends
//! one JSON object per text frame.

use super::messages::{Directive, FinnhubMessage};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    /// Binary frame that is not valid UTF-8.
    #[error("binary frame is not valid UTF-8")]
    InvalidUtf8,
}

/// JSON codec for the Finnhub trade stream.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into a `FinnhubMessage`.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object or does not match
    /// any known message shape.
    pub fn decode(&self, text: &str) -> Result<FinnhubMessage, CodecError> {
        let trimmed = text.trim();

        if !trimmed.starts_with('{') {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {preview}..."
            )));
        }

        Ok(serde_json::from_str(trimmed)?)
    }

    /// Decode a binary frame carrying UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not UTF-8 or fail to decode.
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<FinnhubMessage, CodecError> {
        let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
        self.decode(text)
    }

    /// Encode a subscription directive.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, directive: &Directive) -> Result<String, CodecError> {
        Ok(serde_json::to_string(directive)?)
    }
}
