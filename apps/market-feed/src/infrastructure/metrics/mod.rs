//! Prometheus Metrics Module
//!
//! Exposes feed client metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Messages**: inbound messages by type, parse failures
//! - **Connection**: connection-up gauge, reconnect attempts, budget exhaustion
//! - **Subscriptions**: watchlist size
//! - **Alerts**: price alerts raised
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionStatus;
use crate::domain::streaming::PriceDirection;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling this again after a successful initialization returns the
/// existing handle.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed (for example, when
/// another global recorder is already set).
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
        "market_feed_messages_received_total",
        "Total messages decoded from the feed"
    );
    describe_counter!(
        "market_feed_parse_errors_total",
        "Total inbound payloads that failed to decode"
    );

    describe_gauge!(
        "market_feed_connected",
        "1 while the feed transport is open, 0 otherwise"
    );
    describe_counter!(
        "market_feed_status_changes_total",
        "Connection status notifications by status"
    );
    describe_counter!(
        "market_feed_reconnects_total",
        "Total automatic reconnect attempts scheduled"
    );
    describe_counter!(
        "market_feed_reconnect_exhausted_total",
        "Times the reconnect budget ran out"
    );
    describe_counter!(
        "market_feed_errors_total",
        "Feed errors by kind"
    );

    describe_gauge!(
        "market_feed_subscriptions",
        "Number of symbols in the watchlist"
    );

    describe_counter!(
        "market_feed_price_alerts_total",
        "Price alerts raised by direction"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a decoded inbound message. `msg_type` is the wire tag.
pub fn record_message_received(msg_type: &'static str) {
    counter!(
        "market_feed_messages_received_total",
        "message_type" => msg_type
    )
    .increment(1);
}

/// Record a payload that failed to decode.
pub fn record_parse_error() {
    counter!("market_feed_parse_errors_total").increment(1);
}

/// Record a connection status notification.
pub fn record_status(status: ConnectionStatus) {
    counter!(
        "market_feed_status_changes_total",
        "status" => status.as_str()
    )
    .increment(1);

    match status {
        ConnectionStatus::Connected => gauge!("market_feed_connected").set(1.0),
        ConnectionStatus::Disconnected | ConnectionStatus::Exhausted => {
            gauge!("market_feed_connected").set(0.0);
        }
        ConnectionStatus::Connecting | ConnectionStatus::Error => {}
    }
}

/// Record a scheduled reconnect attempt.
pub fn record_reconnect(attempt: u32) {
    counter!(
        "market_feed_reconnects_total",
        "attempt" => attempt.to_string()
    )
    .increment(1);
}

/// Record an exhausted reconnect budget.
pub fn record_reconnect_exhausted() {
    counter!("market_feed_reconnect_exhausted_total").increment(1);
}

/// Record a feed error by kind.
pub fn record_error(kind: &'static str) {
    counter!("market_feed_errors_total", "kind" => kind).increment(1);
}

/// Update the watchlist size.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(count: usize) {
    gauge!("market_feed_subscriptions").set(count as f64);
}

/// Record a price alert.
pub fn record_price_alert(direction: PriceDirection) {
    let direction = match direction {
        PriceDirection::Up => "up",
        PriceDirection::Down => "down",
    };
    counter!("market_feed_price_alerts_total", "direction" => direction).increment(1);
}

// =============================================================================
// Tests
// =============================================================================
