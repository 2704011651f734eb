//! Feed Client Configuration Settings
//!
//! Configuration types for the market feed client, loaded from environment
//! variables.

use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::connection::{DEFAULT_BASE_INTERVAL, DEFAULT_MAX_ATTEMPTS};
use crate::domain::streaming::display::DEFAULT_ALERT_THRESHOLD_PERCENT;
use crate::domain::subscription::Symbol;

/// Feed connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    /// WebSocket URL of the price feed.
    pub url: String,
    /// Symbols subscribed at startup.
    pub watchlist: Vec<Symbol>,
    /// Automatic reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Reconnect delay unit; attempt `k` waits `k` times this.
    pub reconnect_interval: Duration,
    /// Absolute percent move that raises a price alert.
    pub price_alert_percent: Decimal,
    /// Capacity of the driver's event channel.
    pub event_capacity: usize,
}

impl FeedSettings {
    /// Settings for `url` with every other value at its default.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            watchlist: Vec::new(),
            max_reconnect_attempts: DEFAULT_MAX_ATTEMPTS,
            reconnect_interval: DEFAULT_BASE_INTERVAL,
            price_alert_percent: DEFAULT_ALERT_THRESHOLD_PERCENT,
            event_capacity: 1_024,
        }
    }
}

/// Broadcast channel settings.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Capacity of the price update channel.
    pub price_updates_capacity: usize,
    /// Capacity of the trade channel.
    pub trades_capacity: usize,
    /// Capacity of the news channel.
    pub news_capacity: usize,
    /// Capacity of the connection status channel.
    pub status_capacity: usize,
    /// Capacity of the price alert channel.
    pub alerts_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            price_updates_capacity: 10_000,
            trades_capacity: 10_000,
            news_capacity: 1_000,
            status_capacity: 64,
            alerts_capacity: 256,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// A holding to value against live prices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionSeed {
    /// Ticker symbol.
    pub symbol: Symbol,
    /// Shares held.
    pub shares: Decimal,
    /// Average cost per share.
    pub avg_cost: Decimal,
}

/// Complete feed client configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Feed connection settings.
    pub feed: FeedSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Broadcast channel settings.
    pub broadcast: BroadcastSettings,
    /// Holdings revalued on every price update. Empty disables valuation.
    pub portfolio: Vec<PositionSeed>,
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `MARKET_FEED_URL` is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// Numeric values that fail to parse fall back to their defaults, as do
    /// zero channel capacities.
    ///
    /// # Errors
    ///
    /// Returns an error if `MARKET_FEED_URL` is missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("MARKET_FEED_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("MARKET_FEED_URL".to_string()))?;

        if url.trim().is_empty() {
            return Err(ConfigError::EmptyValue("MARKET_FEED_URL".to_string()));
        }

        let defaults = FeedSettings::new(url.trim());
        let feed = FeedSettings {
            watchlist: lookup("MARKET_FEED_WATCHLIST")
                .map(|v| parse_watchlist(&v))
                .unwrap_or_default(),
            max_reconnect_attempts: parse_or(
                &lookup,
                "MARKET_FEED_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            reconnect_interval: parse_duration_millis(
                &lookup,
                "MARKET_FEED_RECONNECT_INTERVAL_MS",
                defaults.reconnect_interval,
            ),
            price_alert_percent: parse_or(
                &lookup,
                "MARKET_FEED_PRICE_ALERT_PERCENT",
                defaults.price_alert_percent,
            ),
            event_capacity: parse_capacity(
                &lookup,
                "MARKET_FEED_EVENT_CAPACITY",
                defaults.event_capacity,
            ),
            ..defaults
        };

        let server = ServerSettings {
            health_port: parse_or(
                &lookup,
                "MARKET_FEED_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let broadcast_defaults = BroadcastSettings::default();
        let broadcast = BroadcastSettings {
            price_updates_capacity: parse_capacity(
                &lookup,
                "MARKET_FEED_PRICE_UPDATES_CAPACITY",
                broadcast_defaults.price_updates_capacity,
            ),
            trades_capacity: parse_capacity(
                &lookup,
                "MARKET_FEED_TRADES_CAPACITY",
                broadcast_defaults.trades_capacity,
            ),
            news_capacity: parse_capacity(
                &lookup,
                "MARKET_FEED_NEWS_CAPACITY",
                broadcast_defaults.news_capacity,
            ),
            status_capacity: parse_capacity(
                &lookup,
                "MARKET_FEED_STATUS_CAPACITY",
                broadcast_defaults.status_capacity,
            ),
            alerts_capacity: parse_capacity(
                &lookup,
                "MARKET_FEED_ALERTS_CAPACITY",
                broadcast_defaults.alerts_capacity,
            ),
        };

        Ok(Self {
            feed,
            server,
            broadcast,
            portfolio: lookup("MARKET_FEED_PORTFOLIO")
                .map(|v| parse_portfolio(&v))
                .unwrap_or_default(),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

/// Split a comma-separated watchlist, dropping blanks and duplicates.
fn parse_watchlist(raw: &str) -> Vec<Symbol> {
    let mut symbols: Vec<Symbol> = Vec::new();
    for symbol in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !symbols.iter().any(|s| s == symbol) {
            symbols.push(symbol.to_string());
        }
    }
    symbols
}

/// Parse `SYMBOL:SHARES@AVG_COST` entries separated by commas. Malformed
/// entries are skipped; a repeated symbol keeps its last entry.
fn parse_portfolio(raw: &str) -> Vec<PositionSeed> {
    let mut seeds: Vec<PositionSeed> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some(seed) = parse_position(entry) else {
            continue;
        };
        seeds.retain(|s| s.symbol != seed.symbol);
        seeds.push(seed);
    }
    seeds
}

fn parse_position(entry: &str) -> Option<PositionSeed> {
    let (symbol, holding) = entry.split_once(':')?;
    let (shares, avg_cost) = holding.split_once('@')?;
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return None;
    }

    Some(PositionSeed {
        symbol: symbol.to_string(),
        shares: shares.trim().parse().ok()?,
        avg_cost: avg_cost.trim().parse().ok()?,
    })
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_capacity<F>(lookup: &F, key: &str, default: usize) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|capacity| *capacity > 0)
        .unwrap_or(default)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
