//! Market Data Streaming Types
//!
//! Wire and domain types for the feed: inbound price updates, trades and
//! news, and outbound subscribe/unsubscribe requests.
//!
//! # Inbound Wire Format (JSON)
//!
//! ```json
//! {"type":"price_update","symbol":"AAPL","price":189.21,"change":1.04,"changePercent":0.55}
//! {"type":"trade","symbol":"AAPL","price":189.20,"volume":1200}
//! {"type":"news","headline":"...","symbols":["AAPL"]}
//! ```
//!
//! # Outbound Wire Format (JSON)
//!
//! ```json
//! {"action":"subscribe","symbols":["AAPL","MSFT"]}
//! {"action":"unsubscribe","symbols":["MSFT"]}
//! ```

pub mod codec;
pub mod display;

pub use codec::{CodecError, FeedCodec};
pub use display::{PriceAlert, PriceDirection, format_change, format_price, format_volume};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::subscription::Symbol;

// =============================================================================
// Inbound Messages
// =============================================================================

/// Last price and day change for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Last price.
    pub price: Decimal,
    /// Absolute change.
    pub change: Decimal,
    /// Percent change.
    #[serde(rename = "changePercent")]
    pub change_percent: Decimal,
}

/// An executed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Trade price.
    pub price: Decimal,
    /// Traded volume.
    pub volume: Decimal,
}

/// A news item. The payload is the full inbound object and is not
/// interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct News {
    /// Raw news object.
    pub payload: serde_json::Value,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// `price_update`
    PriceUpdate(PriceUpdate),
    /// `trade`
    Trade(Trade),
    /// `news`
    News(News),
}

impl InboundMessage {
    /// Wire tag of the message.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::PriceUpdate(_) => "price_update",
            Self::Trade(_) => "trade",
            Self::News(_) => "news",
        }
    }
}

// =============================================================================
// Outbound Requests
// =============================================================================

/// Subscription request action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionAction {
    /// Start receiving updates.
    Subscribe,
    /// Stop receiving updates.
    Unsubscribe,
}

/// Subscribe/unsubscribe request sent to the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Request action.
    pub action: SubscriptionAction,
    /// Symbols the action applies to.
    pub symbols: Vec<Symbol>,
}

impl SubscriptionRequest {
    /// Create a subscribe request.
    #[must_use]
    pub fn subscribe(symbols: impl IntoIterator<Item = impl Into<Symbol>>) -> Self {
        Self {
            action: SubscriptionAction::Subscribe,
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an unsubscribe request.
    #[must_use]
    pub fn unsubscribe(symbols: impl IntoIterator<Item = impl Into<Symbol>>) -> Self {
        Self {
            action: SubscriptionAction::Unsubscribe,
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_request_wire_format() {
        let request = SubscriptionRequest::subscribe(["AAPL"]);
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"action":"subscribe","symbols":["AAPL"]}"#);
    }

    #[test]
    fn unsubscribe_request_wire_format() {
        let request = SubscriptionRequest::unsubscribe(vec!["MSFT".to_string()]);
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"action":"unsubscribe","symbols":["MSFT"]}"#);
    }

    #[test]
    fn message_type_names() {
        let news = InboundMessage::News(News {
            payload: serde_json::json!({"type": "news"}),
        });
        assert_eq!(news.type_name(), "news");
    }
}
