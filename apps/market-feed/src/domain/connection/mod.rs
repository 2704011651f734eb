//! Connection Lifecycle Types
//!
//! State, retry budget and error taxonomy for a single logical feed
//! connection.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──connect──► Connecting ──open──► Connected
//!                      │                    │
//!                 open failure            close
//!                      ▼                    ▼
//!                 Disconnected ◄──────── Disconnected
//!                      │
//!              budget remaining?
//!                      ▼
//!                Reconnecting ──timer──► Connecting
//!
//! any state ──disconnect──► Closed (terminal)
//! ```

mod retry;

pub use retry::{DEFAULT_BASE_INTERVAL, DEFAULT_MAX_ATTEMPTS, RetryBudget, RetryConfig};

use serde::Serialize;
use thiserror::Error;

use crate::domain::streaming::CodecError;

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of a feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Constructed, no connect attempt yet.
    #[default]
    Idle,
    /// Transport opening, not yet confirmed.
    Connecting,
    /// Transport open; subscriptions may be sent.
    Connected,
    /// Transport closed unexpectedly or failed to open.
    Disconnected,
    /// A retry is scheduled.
    Reconnecting,
    /// Explicitly disconnected by the caller. Terminal.
    Closed,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    /// Whether a transport is currently opening or open.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// Whether the state is the terminal `Closed` state.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Connection Status (display notifications)
// =============================================================================

/// Connection status reported to the display sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Transport open.
    Connected,
    /// Transport closed.
    Disconnected,
    /// Transport reported an error.
    Error,
    /// A (re)connect is underway or scheduled.
    Connecting,
    /// Automatic reconnection gave up.
    Exhausted,
}

impl ConnectionStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Connecting => "connecting",
            Self::Exhausted => "exhausted",
        }
    }

    /// Short badge label for status displays.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Connected => "Live",
            Self::Disconnected => "Offline",
            Self::Error => "Error",
            Self::Connecting => "Connecting...",
            Self::Exhausted => "Exhausted",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors reported on the feed error channel.
///
/// None of these is fatal: the worst outcome is a connection that stays
/// `Disconnected` until the caller connects again.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The transport could not be opened.
    #[error("transport open failed: {0}")]
    TransportOpenFailure(String),

    /// The transport closed.
    #[error("transport closed")]
    TransportClosed,

    /// The transport reported an error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// An inbound payload could not be decoded.
    #[error("message parse error: {0}")]
    MessageParse(#[from] CodecError),

    /// The automatic reconnect budget is spent.
    #[error("reconnect budget exhausted after {attempts} attempts")]
    RetryBudgetExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

impl FeedError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TransportOpenFailure(_) => "open_failure",
            Self::TransportClosed => "closed",
            Self::TransportError(_) => "transport_error",
            Self::MessageParse(_) => "parse_error",
            Self::RetryBudgetExhausted { .. } => "retry_exhausted",
        }
    }
}

/// Errors returned by `connect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// A transport is already opening or open.
    #[error("already connecting or connected (state: {0})")]
    AlreadyConnecting(ConnectionState),
}
