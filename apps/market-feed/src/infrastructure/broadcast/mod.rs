//! Broadcast Channel Adapters
//!
//! Fans decoded feed data and connection notifications out to any number
//! of in-process consumers using tokio broadcast channels.
//!
//! # Architecture
//!
//! The `BroadcastHub` provides one channel per event kind:
//! - Price updates, trades and news from the feed
//! - Connection status changes
//! - Price alerts derived from large moves
//!
//! `BroadcastSink` is the display sink handed to the connection manager.
//! It publishes into the hub, raises price alerts, revalues an optional
//! portfolio and records metrics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::BroadcastSettings;
use crate::application::ports::FeedHandler;
use crate::domain::connection::{ConnectionStatus, FeedError};
use crate::domain::portfolio::PortfolioCalculator;
use crate::domain::streaming::{News, PriceAlert, PriceUpdate, Trade};
use crate::infrastructure::metrics;

// =============================================================================
// Broadcast Messages
// =============================================================================

/// Connection status change with the time it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    /// New status.
    pub status: ConnectionStatus,
    /// When the manager reported it.
    pub at: DateTime<Utc>,
}

// =============================================================================
// Broadcast Hub
// =============================================================================

/// Configuration for broadcast channel capacities.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Capacity for the price update channel.
    pub price_updates_capacity: usize,
    /// Capacity for the trade channel.
    pub trades_capacity: usize,
    /// Capacity for the news channel.
    pub news_capacity: usize,
    /// Capacity for the status channel.
    pub status_capacity: usize,
    /// Capacity for the alert channel.
    pub alerts_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        BroadcastSettings::default().into()
    }
}

impl From<BroadcastSettings> for BroadcastConfig {
    fn from(settings: BroadcastSettings) -> Self {
        Self {
            price_updates_capacity: settings.price_updates_capacity,
            trades_capacity: settings.trades_capacity,
            news_capacity: settings.news_capacity,
            status_capacity: settings.status_capacity,
            alerts_capacity: settings.alerts_capacity,
        }
    }
}

/// Central hub for all broadcast channels.
///
/// # Example
///
/// ```rust
/// use market_feed::infrastructure::broadcast::{BroadcastConfig, BroadcastHub};
///
/// let hub = BroadcastHub::new(BroadcastConfig::default());
///
/// // Get a receiver for price updates
/// let mut rx = hub.price_updates_rx();
/// assert_eq!(hub.stats().total_receivers(), 1);
/// ```
#[derive(Debug)]
#[allow(clippy::struct_field_names)]
pub struct BroadcastHub {
    price_updates_tx: broadcast::Sender<PriceUpdate>,
    trades_tx: broadcast::Sender<Trade>,
    news_tx: broadcast::Sender<News>,
    status_tx: broadcast::Sender<StatusEvent>,
    alerts_tx: broadcast::Sender<PriceAlert>,
}

impl BroadcastHub {
    /// Create a new broadcast hub with the given configuration.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            price_updates_tx: broadcast::channel(config.price_updates_capacity.max(1)).0,
            trades_tx: broadcast::channel(config.trades_capacity.max(1)).0,
            news_tx: broadcast::channel(config.news_capacity.max(1)).0,
            status_tx: broadcast::channel(config.status_capacity.max(1)).0,
            alerts_tx: broadcast::channel(config.alerts_capacity.max(1)).0,
        }
    }

    /// Create a new broadcast hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BroadcastConfig::default())
    }

    /// Send a price update to all subscribers.
    ///
    /// Returns the number of receivers that got the message, or `None` if
    /// there are no active receivers.
    #[must_use]
    pub fn send_price_update(&self, update: PriceUpdate) -> Option<usize> {
        self.price_updates_tx.send(update).ok()
    }

    /// Get a new receiver for price updates.
    #[must_use]
    pub fn price_updates_rx(&self) -> broadcast::Receiver<PriceUpdate> {
        self.price_updates_tx.subscribe()
    }

    /// Send a trade to all subscribers.
    #[must_use]
    pub fn send_trade(&self, trade: Trade) -> Option<usize> {
        self.trades_tx.send(trade).ok()
    }

    /// Get a new receiver for trades.
    #[must_use]
    pub fn trades_rx(&self) -> broadcast::Receiver<Trade> {
        self.trades_tx.subscribe()
    }

    /// Send a news item to all subscribers.
    #[must_use]
    pub fn send_news(&self, news: News) -> Option<usize> {
        self.news_tx.send(news).ok()
    }

    /// Get a new receiver for news.
    #[must_use]
    pub fn news_rx(&self) -> broadcast::Receiver<News> {
        self.news_tx.subscribe()
    }

    /// Send a status change to all subscribers.
    #[must_use]
    pub fn send_status(&self, event: StatusEvent) -> Option<usize> {
        self.status_tx.send(event).ok()
    }

    /// Get a new receiver for status changes.
    #[must_use]
    pub fn status_rx(&self) -> broadcast::Receiver<StatusEvent> {
        self.status_tx.subscribe()
    }

    /// Send a price alert to all subscribers.
    #[must_use]
    pub fn send_alert(&self, alert: PriceAlert) -> Option<usize> {
        self.alerts_tx.send(alert).ok()
    }

    /// Get a new receiver for price alerts.
    #[must_use]
    pub fn alerts_rx(&self) -> broadcast::Receiver<PriceAlert> {
        self.alerts_tx.subscribe()
    }

    /// Get statistics about all channels.
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            price_updates_receivers: self.price_updates_tx.receiver_count(),
            trades_receivers: self.trades_tx.receiver_count(),
            news_receivers: self.news_tx.receiver_count(),
            status_receivers: self.status_tx.receiver_count(),
            alerts_receivers: self.alerts_tx.receiver_count(),
        }
    }
}

/// Shared broadcast hub reference.
pub type SharedBroadcastHub = Arc<BroadcastHub>;

/// Statistics about broadcast channels.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BroadcastStats {
    /// Number of price update receivers.
    pub price_updates_receivers: usize,
    /// Number of trade receivers.
    pub trades_receivers: usize,
    /// Number of news receivers.
    pub news_receivers: usize,
    /// Number of status receivers.
    pub status_receivers: usize,
    /// Number of alert receivers.
    pub alerts_receivers: usize,
}

impl BroadcastStats {
    /// Get total number of receivers across all channels.
    #[must_use]
    pub const fn total_receivers(&self) -> usize {
        self.price_updates_receivers
            + self.trades_receivers
            + self.news_receivers
            + self.status_receivers
            + self.alerts_receivers
    }
}

// =============================================================================
// Broadcast Sink
// =============================================================================

/// Portfolio shared between the sink and whoever reads valuations.
pub type SharedPortfolio = Arc<Mutex<PortfolioCalculator>>;

/// Display sink that publishes manager notifications into a hub.
///
/// With [`BroadcastSink::with_portfolio`] every price update also revalues
/// the shared portfolio. A price whose valuation overflows is logged and
/// the portfolio keeps its last good valuation; the update is still
/// published.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    hub: SharedBroadcastHub,
    alert_threshold: Decimal,
    portfolio: Option<SharedPortfolio>,
}

impl BroadcastSink {
    /// Create a sink publishing into `hub`, alerting on moves larger than
    /// `alert_threshold` percent.
    #[must_use]
    pub const fn new(hub: SharedBroadcastHub, alert_threshold: Decimal) -> Self {
        Self {
            hub,
            alert_threshold,
            portfolio: None,
        }
    }

    /// Revalue `portfolio` on every price update.
    #[must_use]
    pub fn with_portfolio(mut self, portfolio: SharedPortfolio) -> Self {
        self.portfolio = Some(portfolio);
        self
    }

    /// The hub this sink publishes into.
    #[must_use]
    pub const fn hub(&self) -> &SharedBroadcastHub {
        &self.hub
    }
}

impl FeedHandler for BroadcastSink {
    fn on_price_update(&mut self, update: PriceUpdate) {
        metrics::record_message_received("price_update");

        if let Some(portfolio) = &self.portfolio {
            if let Err(e) = portfolio.lock().apply_update(&update) {
                tracing::warn!(error = %e, price = %update.price, "Skipping portfolio revaluation");
            }
        }

        if let Some(alert) = PriceAlert::detect(&update, self.alert_threshold) {
            tracing::info!(
                symbol = %alert.symbol,
                change_percent = %alert.change_percent,
                "{}",
                alert.message()
            );
            metrics::record_price_alert(alert.direction);
            let _ = self.hub.send_alert(alert);
        }

        let _ = self.hub.send_price_update(update);
    }

    fn on_trade(&mut self, trade: Trade) {
        metrics::record_message_received("trade");
        let _ = self.hub.send_trade(trade);
    }

    fn on_news(&mut self, news: News) {
        metrics::record_message_received("news");
        let _ = self.hub.send_news(news);
    }

    fn on_connection_status(&mut self, status: ConnectionStatus) {
        metrics::record_status(status);
        let _ = self.hub.send_status(StatusEvent {
            status,
            at: Utc::now(),
        });
    }

    fn on_error(&mut self, error: &FeedError) {
        metrics::record_error(error.kind());
        match error {
            FeedError::MessageParse(_) => metrics::record_parse_error(),
            FeedError::RetryBudgetExhausted { .. } => metrics::record_reconnect_exhausted(),
            _ => {}
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::domain::streaming::{FeedCodec, InboundMessage};

    fn price(symbol: &str, change_percent: &str) -> PriceUpdate {
        PriceUpdate {
            symbol: symbol.to_string(),
            price: Decimal::from_str("100.00").unwrap(),
            change: Decimal::ONE,
            change_percent: Decimal::from_str(change_percent).unwrap(),
        }
    }

    fn sink() -> BroadcastSink {
        BroadcastSink::new(
            Arc::new(BroadcastHub::with_defaults()),
            Decimal::from(5),
        )
    }

    #[test]
    fn broadcast_hub_creation() {
        let hub = BroadcastHub::with_defaults();
        assert_eq!(hub.stats().total_receivers(), 0);
    }

    #[tokio::test]
    async fn zero_capacity_hub_still_delivers() {
        let hub = BroadcastHub::new(BroadcastConfig {
            price_updates_capacity: 0,
            trades_capacity: 0,
            news_capacity: 0,
            status_capacity: 0,
            alerts_capacity: 0,
        });
        let mut status = hub.status_rx();

        hub.send_status(StatusEvent {
            status: ConnectionStatus::Connected,
            at: Utc::now(),
        });
        assert_eq!(status.recv().await.unwrap().status, ConnectionStatus::Connected);
    }

    #[test]
    fn receiver_count_decreases_on_drop() {
        let hub = BroadcastHub::with_defaults();

        {
            let _rx1 = hub.trades_rx();
            let _rx2 = hub.trades_rx();
            assert_eq!(hub.stats().trades_receivers, 2);
        }

        assert_eq!(hub.stats().trades_receivers, 0);
    }

    #[test]
    fn send_with_no_receivers_returns_none() {
        let hub = BroadcastHub::with_defaults();
        assert!(hub.send_price_update(price("AAPL", "0.1")).is_none());
    }

    #[tokio::test]
    async fn multiple_receivers_get_same_message() {
        let hub = BroadcastHub::with_defaults();
        let mut rx1 = hub.price_updates_rx();
        let mut rx2 = hub.price_updates_rx();

        assert_eq!(hub.send_price_update(price("AAPL", "0.1")), Some(2));

        assert_eq!(rx1.recv().await.unwrap().symbol, "AAPL");
        assert_eq!(rx2.recv().await.unwrap().symbol, "AAPL");
    }

    #[tokio::test]
    async fn sink_publishes_price_and_alert() {
        let mut sink = sink();
        let mut prices = sink.hub().price_updates_rx();
        let mut alerts = sink.hub().alerts_rx();

        sink.on_price_update(price("TSLA", "-7.5"));

        assert_eq!(prices.recv().await.unwrap().symbol, "TSLA");
        let alert = alerts.recv().await.unwrap();
        assert_eq!(alert.title(), "📉 TSLA");
    }

    #[tokio::test]
    async fn small_moves_raise_no_alert() {
        let mut sink = sink();
        let mut alerts = sink.hub().alerts_rx();

        sink.on_price_update(price("TSLA", "5"));

        assert!(matches!(
            alerts.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn sink_publishes_status() {
        let mut sink = sink();
        let mut status = sink.hub().status_rx();

        sink.on_connection_status(ConnectionStatus::Exhausted);
        assert_eq!(status.recv().await.unwrap().status, ConnectionStatus::Exhausted);
    }

    #[test]
    fn sink_revalues_portfolio() {
        let portfolio: SharedPortfolio = Arc::new(Mutex::new(PortfolioCalculator::new()));
        portfolio
            .lock()
            .update_position("AAPL", Decimal::from(2), Decimal::from(90), Decimal::from(80))
            .unwrap();

        let mut sink = sink().with_portfolio(Arc::clone(&portfolio));
        sink.on_price_update(price("AAPL", "1"));

        assert_eq!(portfolio.lock().totals().total_value, Decimal::from(200));
    }

    #[tokio::test]
    async fn oversized_price_keeps_last_valuation_and_still_publishes() {
        let portfolio: SharedPortfolio = Arc::new(Mutex::new(PortfolioCalculator::new()));
        portfolio
            .lock()
            .update_position("AAPL", Decimal::from(100), Decimal::from(150), Decimal::from(120))
            .unwrap();
        let before = portfolio.lock().totals();

        let mut sink = sink().with_portfolio(Arc::clone(&portfolio));
        let mut prices = sink.hub().price_updates_rx();

        let raw = concat!(
            r#"{"type":"price_update","symbol":"AAPL","#,
            r#""price":"1000000000000000000000000000","change":"0","changePercent":"0"}"#,
        );
        let update = FeedCodec::new().decode(raw).unwrap();
        let Some(InboundMessage::PriceUpdate(update)) = update else {
            panic!("expected a price update");
        };
        sink.on_price_update(update);

        assert_eq!(portfolio.lock().totals(), before);
        assert_eq!(prices.recv().await.unwrap().symbol, "AAPL");
    }
}
