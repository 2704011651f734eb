//! Market Feed Binary
//!
//! Connects to the configured feed, subscribes the watchlist and logs the
//! live board until interrupted.
//!
//! # Usage
//!
//! ```bash
//! MARKET_FEED_URL=wss://feed.example.com/ws cargo run --bin market-feed
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKET_FEED_URL`: WebSocket URL of the price feed
//!
//! ## Optional
//! - `MARKET_FEED_WATCHLIST`: Comma-separated symbols to subscribe at startup
//! - `MARKET_FEED_MAX_RECONNECT_ATTEMPTS`: Reconnect budget (default: 5)
//! - `MARKET_FEED_RECONNECT_INTERVAL_MS`: Reconnect delay unit (default: 3000)
//! - `MARKET_FEED_PRICE_ALERT_PERCENT`: Alert threshold in percent (default: 5)
//! - `MARKET_FEED_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `MARKET_FEED_PORTFOLIO`: Holdings to value, as `SYMBOL:SHARES@AVG_COST`
//!   entries separated by commas (default: none)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: market-feed)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use market_feed::domain::streaming::{format_change, format_price, format_volume};
use market_feed::infrastructure::health::{HealthServer, HealthServerState};
use market_feed::infrastructure::telemetry;
use market_feed::{
    BroadcastConfig, BroadcastHub, BroadcastSink, FeedClient, FeedConfig, PortfolioCalculator,
    PositionSeed, SharedBroadcastHub, SharedPortfolio, init_metrics,
};
use parking_lot::Mutex;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting market feed client");

    let _metrics_handle = init_metrics()?;

    let config = FeedConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let broadcast_hub = Arc::new(BroadcastHub::new(BroadcastConfig::from(
        config.broadcast.clone(),
    )));
    let portfolio = seed_portfolio(&config.portfolio);
    spawn_board_logger(
        Arc::clone(&broadcast_hub),
        portfolio.clone(),
        shutdown_token.clone(),
    );

    let mut sink = BroadcastSink::new(Arc::clone(&broadcast_hub), config.feed.price_alert_percent);
    if let Some(portfolio) = &portfolio {
        sink = sink.with_portfolio(Arc::clone(portfolio));
    }
    let (feed, feed_task) = FeedClient::spawn(&config.feed, sink, shutdown_token.clone());

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        feed.state(),
        Arc::clone(&broadcast_hub),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    for symbol in &config.feed.watchlist {
        feed.subscribe(symbol.as_str()).await?;
    }
    feed.connect().await?;

    tracing::info!("Market feed client ready");

    await_shutdown().await;

    if let Err(e) = feed.disconnect().await {
        tracing::warn!(error = %e, "Feed client stopped before disconnect");
    }
    shutdown_token.cancel();

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, feed_task).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Feed client did not stop in time"
        );
    }

    tracing::info!("Market feed client stopped");
    Ok(())
}

/// Build the portfolio from configured holdings, valued at cost until the
/// first price arrives. `None` when no holdings are configured.
fn seed_portfolio(seeds: &[PositionSeed]) -> Option<SharedPortfolio> {
    if seeds.is_empty() {
        return None;
    }

    let mut portfolio = PortfolioCalculator::new();
    for seed in seeds {
        if let Err(e) = portfolio.update_position(
            seed.symbol.as_str(),
            seed.shares,
            seed.avg_cost,
            seed.avg_cost,
        ) {
            tracing::warn!(symbol = %seed.symbol, error = %e, "Skipping portfolio holding");
        }
    }
    tracing::info!(positions = portfolio.positions().count(), "Portfolio loaded");

    Some(Arc::new(Mutex::new(portfolio)))
}

/// Log the board: prices, trades, alerts, connection status and, when a
/// portfolio is configured, its totals after each price.
fn spawn_board_logger(
    hub: SharedBroadcastHub,
    portfolio: Option<SharedPortfolio>,
    shutdown: CancellationToken,
) {
    let mut prices = hub.price_updates_rx();
    let mut trades = hub.trades_rx();
    let mut alerts = hub.alerts_rx();
    let mut status = hub.status_rx();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                update = prices.recv() => match update {
                    Ok(update) => {
                        tracing::info!(
                            symbol = %update.symbol,
                            price = %format_price(update.price),
                            change = %format_change(update.change, update.change_percent),
                            "Price"
                        );
                        if let Some(portfolio) = &portfolio {
                            let totals = portfolio.lock().totals();
                            tracing::info!(
                                value = %format_price(totals.total_value),
                                gain_loss = %format_change(
                                    totals.total_gain_loss,
                                    totals.total_gain_loss_percent,
                                ),
                                "Portfolio"
                            );
                        }
                    }
                    Err(e) => if !log_lag("price", &e) { break },
                },
                trade = trades.recv() => match trade {
                    Ok(trade) => tracing::info!(
                        symbol = %trade.symbol,
                        price = %format_price(trade.price),
                        volume = %format_volume(trade.volume),
                        "Trade"
                    ),
                    Err(e) => if !log_lag("trade", &e) { break },
                },
                alert = alerts.recv() => match alert {
                    Ok(alert) => tracing::warn!(title = %alert.title(), "{}", alert.message()),
                    Err(e) => if !log_lag("alert", &e) { break },
                },
                event = status.recv() => match event {
                    Ok(event) => tracing::info!(
                        status = event.status.label(),
                        at = %event.at,
                        "Connection status"
                    ),
                    Err(e) => if !log_lag("status", &e) { break },
                },
            }
        }
    });
}

/// Returns `false` once the channel is closed.
fn log_lag(channel: &str, error: &RecvError) -> bool {
    match error {
        RecvError::Lagged(skipped) => {
            tracing::warn!(channel, skipped, "Board logger lagging");
            true
        }
        RecvError::Closed => false,
    }
}

/// Log the parsed configuration.
fn log_config(config: &FeedConfig) {
    let reconnect_interval_ms =
        u64::try_from(config.feed.reconnect_interval.as_millis()).unwrap_or(u64::MAX);
    tracing::info!(
        url = %config.feed.url,
        watchlist = ?config.feed.watchlist,
        max_reconnect_attempts = config.feed.max_reconnect_attempts,
        reconnect_interval_ms,
        health_port = config.server.health_port,
        portfolio_positions = config.portfolio.len(),
        "Configuration loaded"
    );
}

/// Load .env file from the current directory or the nearest ancestor that
/// has one.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM.
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
