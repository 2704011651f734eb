//! Feed Codec
//!
//! JSON encoding and decoding for the market data feed.
//!
//! Inbound messages are single JSON objects whose `type` field selects the
//! variant. Unknown types decode to `None` and are dropped by the caller;
//! malformed JSON, non-object payloads and a missing `type` are errors.

use super::{InboundMessage, News, PriceUpdate, SubscriptionRequest, Trade};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// The message has no string `type` field.
    #[error("message has no type field")]
    MissingType,

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the feed.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedCodec;

impl FeedCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// Returns `Ok(None)` for well-formed messages with an unrecognized
    /// `type`.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON parsing fails, the payload is not an object,
    /// the `type` field is missing, or a known variant has missing or
    /// mistyped fields.
    pub fn decode(&self, text: &str) -> Result<Option<InboundMessage>, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text.trim())?;

        if !value.is_object() {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}...",
                truncate(text.trim(), 50)
            )));
        }

        let Some(msg_type) = value.get("type").and_then(|v| v.as_str()) else {
            return Err(CodecError::MissingType);
        };

        let message = match msg_type {
            "price_update" => {
                let m: PriceUpdate = serde_json::from_value(value)?;
                InboundMessage::PriceUpdate(m)
            }
            "trade" => {
                let m: Trade = serde_json::from_value(value)?;
                InboundMessage::Trade(m)
            }
            "news" => InboundMessage::News(News { payload: value }),
            other => {
                tracing::trace!(msg_type = other, "Ignoring unrecognized message type");
                return Ok(None);
            }
        };

        Ok(Some(message))
    }

    /// Encode a subscription request.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_request(&self, request: &SubscriptionRequest) -> Result<String, CodecError> {
        Ok(serde_json::to_string(request)?)
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(idx, _)| &text[..idx])
}
