#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Market Feed - Real-time Market Data Client
//!
//! Keeps one WebSocket connection to a market data feed alive, tracks the
//! watchlist, re-subscribes it after every reconnect and fans decoded
//! price, trade and news events out to local consumers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and rules
//!   - `connection`: Lifecycle state, status, retry budget, errors
//!   - `subscription`: Watchlist set
//!   - `streaming`: Message types, JSON codec, display formatting
//!   - `portfolio`: Position valuation
//!
//! - **Application**: The connection manager and its ports
//!   - `ports`: Transport, scheduler and display sink traits
//!   - `services`: `FeedConnectionManager`
//!
//! - **Infrastructure**: Adapters and runtime plumbing
//!   - `websocket`: `tokio-tungstenite` transport
//!   - `timer`: Tokio and virtual-clock schedulers
//!   - `client`: Driver task and cloneable handle
//!   - `broadcast`: Fan-out channels and the broadcast display sink
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! Feed WS ──► WsTransport ──signals──┐
//!                                    ├──► FeedClient ──► BroadcastSink ──► consumers
//! TokioScheduler ──────────timers────┤   (FeedConnectionManager)
//!                                    │
//! FeedClientHandle ──────commands────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure feed types and lifecycle rules.
pub mod domain;

/// Application layer - Connection manager and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{
    ConnectError, ConnectionState, ConnectionStatus, FeedError, RetryBudget, RetryConfig,
};
pub use domain::portfolio::{PortfolioCalculator, PortfolioError, PortfolioTotals, Position};
pub use domain::streaming::{
    CodecError, FeedCodec, InboundMessage, News, PriceAlert, PriceDirection, PriceUpdate,
    SubscriptionAction, SubscriptionRequest, Trade,
};
pub use domain::subscription::{SubscriptionSet, Symbol};

// Application
pub use application::ports::{
    FeedHandler, ScheduledTask, Scheduler, Transport, TransportConnector, TransportError,
    TransportSignal,
};
pub use application::services::FeedConnectionManager;

// Infrastructure config
pub use infrastructure::config::{
    BroadcastSettings, ConfigError, FeedConfig, FeedSettings, PositionSeed, ServerSettings,
};

// Runtime adapters
pub use infrastructure::broadcast::{
    BroadcastConfig, BroadcastHub, BroadcastSink, BroadcastStats, SharedBroadcastHub,
    SharedPortfolio, StatusEvent,
};
pub use infrastructure::client::{
    FeedClient, FeedClientError, FeedClientHandle, FeedSnapshot, FeedState,
};
pub use infrastructure::timer::{TokioScheduler, VirtualScheduler};
pub use infrastructure::websocket::{TaggedSignal, WsConnector, WsTransport};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{
    TelemetryConfig, TelemetryError, TelemetryGuard, init as init_telemetry,
};
