//! Port Interfaces
//!
//! Contracts between the feed connection manager and the outside world,
//! following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`TransportConnector`] / [`Transport`]: a duplex text channel to the feed
//! - [`Scheduler`]: one-shot delayed tasks
//! - [`FeedHandler`]: the display sink receiving data and status notifications
//!
//! ## Driver Port (Inbound)
//!
//! - [`TransportSignal`]: lifecycle and data events raised by the transport,
//!   fed back into the manager through a single entry point

use std::time::Duration;

use thiserror::Error;

use crate::domain::connection::{ConnectionStatus, FeedError};
use crate::domain::streaming::{News, PriceUpdate, Trade};

// =============================================================================
// Transport
// =============================================================================

/// Events raised by an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    /// The transport finished opening.
    Open,
    /// A text frame arrived.
    Message(String),
    /// The transport closed, for any reason.
    Close,
    /// The transport reported an error. Usually followed by `Close`.
    Error(String),
}

/// Transport failures.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The transport could not be created.
    #[error("failed to open transport: {0}")]
    Open(String),

    /// A frame could not be handed to the transport.
    #[error("failed to send frame: {0}")]
    Send(String),
}

/// An open (or opening) duplex text channel.
///
/// Dropping a transport without calling [`Transport::close`] must not
/// raise further signals the manager cares about; adapters that cannot
/// guarantee that tag their signals so stale ones can be discarded.
pub trait Transport {
    /// Queue a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport can no longer accept frames.
    fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the transport.
    fn close(&mut self);
}

/// Factory for transports. Each call to `open` yields a fresh transport;
/// transports are never reused.
pub trait TransportConnector {
    /// Transport type produced by this connector.
    type Transport: Transport;

    /// Start opening a new transport.
    ///
    /// Success only means the attempt started; completion is reported with
    /// [`TransportSignal::Open`].
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt could not be started at all (for
    /// example, an invalid URL).
    fn open(&mut self) -> Result<Self::Transport, TransportError>;
}

// =============================================================================
// Scheduler
// =============================================================================

/// Work the manager asks a scheduler to run later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduledTask {
    /// Call `connect()` again.
    Reconnect,
}

/// One-shot timer facility.
///
/// Scheduled tasks are never cancelled or coalesced. When a task is due the
/// owner of the manager hands it back through `on_timer`.
pub trait Scheduler {
    /// Run `task` after `delay`.
    fn schedule(&mut self, delay: Duration, task: ScheduledTask);
}

// =============================================================================
// Display Sink
// =============================================================================

/// Receiver of decoded feed data and connection notifications.
pub trait FeedHandler {
    /// A price update arrived.
    fn on_price_update(&mut self, update: PriceUpdate);

    /// A trade arrived.
    fn on_trade(&mut self, trade: Trade);

    /// A news item arrived.
    fn on_news(&mut self, news: News);

    /// The connection status changed.
    fn on_connection_status(&mut self, status: ConnectionStatus);

    /// A non-fatal error occurred.
    fn on_error(&mut self, error: &FeedError);
}
