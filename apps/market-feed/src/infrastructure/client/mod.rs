//! Feed Client Driver
//!
//! Runs a [`FeedConnectionManager`] on the tokio runtime. One task owns the
//! manager and applies, strictly in arrival order, everything that reaches
//! it over a single channel:
//!
//! - caller commands from any number of [`FeedClientHandle`] clones
//! - transport signals from the WebSocket connection tasks
//! - reconnect timers from the [`TokioScheduler`]
//!
//! Signals carrying an older generation than the current transport are
//! dropped before they reach the manager.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::FeedSettings;
use crate::application::ports::{FeedHandler, ScheduledTask, TransportSignal};
use crate::application::services::FeedConnectionManager;
use crate::domain::connection::{ConnectError, ConnectionState, RetryConfig};
use crate::domain::subscription::Symbol;
use crate::infrastructure::metrics;
use crate::infrastructure::timer::TokioScheduler;
use crate::infrastructure::websocket::{TaggedSignal, WsConnector};

// =============================================================================
// Events
// =============================================================================

/// Everything the driver task reacts to.
#[derive(Debug)]
pub enum FeedEvent {
    /// A caller request.
    Command(FeedCommand),
    /// A transport signal.
    Signal(TaggedSignal),
    /// A reconnect timer fired.
    Timer(ScheduledTask),
}

impl From<TaggedSignal> for FeedEvent {
    fn from(signal: TaggedSignal) -> Self {
        Self::Signal(signal)
    }
}

impl From<ScheduledTask> for FeedEvent {
    fn from(task: ScheduledTask) -> Self {
        Self::Timer(task)
    }
}

/// Caller requests forwarded by [`FeedClientHandle`].
#[derive(Debug)]
pub enum FeedCommand {
    /// Open a new transport.
    Connect(oneshot::Sender<Result<(), ConnectError>>),
    /// Add a symbol to the watchlist.
    Subscribe(Symbol),
    /// Remove a symbol from the watchlist.
    Unsubscribe(Symbol),
    /// Close for good.
    Disconnect(oneshot::Sender<()>),
    /// Report the manager's current view.
    Snapshot(oneshot::Sender<FeedSnapshot>),
}

/// Point-in-time view of the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedSnapshot {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful open.
    pub reconnect_attempts: u32,
    /// Reconnect budget.
    pub max_reconnect_attempts: u32,
    /// Watchlist, in subscription order.
    pub subscriptions: Vec<Symbol>,
}

/// Feed client errors.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// The manager refused to connect.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// The driver task is no longer running.
    #[error("feed client has stopped")]
    Stopped,
}

// =============================================================================
// Shared State
// =============================================================================

/// Connection health shared with the health server.
///
/// Written only by the driver task; read from anywhere.
#[derive(Debug)]
pub struct FeedState {
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    reconnect_attempts: AtomicU32,
    subscription_count: AtomicUsize,
    messages_received: AtomicU64,
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedState {
    /// Create state for an idle connection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Idle),
            last_connected_at: RwLock::new(None),
            last_error: RwLock::new(None),
            reconnect_attempts: AtomicU32::new(0),
            subscription_count: AtomicUsize::new(0),
            messages_received: AtomicU64::new(0),
        }
    }

    /// Set the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if state == ConnectionState::Connected && previous != ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
            *self.last_error.write() = None;
        }
    }

    /// Remember the most recent transport error.
    pub fn set_error(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    /// Store the reconnect attempt count, returning the previous value.
    pub fn set_reconnect_attempts(&self, attempts: u32) -> u32 {
        self.reconnect_attempts.swap(attempts, Ordering::Relaxed)
    }

    /// Update the watchlist size.
    pub fn set_subscription_count(&self, count: usize) {
        self.subscription_count.store(count, Ordering::Relaxed);
    }

    /// Increment the inbound message counter.
    pub fn increment_messages(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Current connection state.
    #[must_use]
    pub fn get_state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the transport is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.get_state() == ConnectionState::Connected
    }

    /// When the transport last opened.
    #[must_use]
    pub fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        *self.last_connected_at.read()
    }

    /// Most recent transport error since the last open.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Reconnect attempts since the last open.
    #[must_use]
    pub fn get_reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Watchlist size.
    #[must_use]
    pub fn get_subscription_count(&self) -> usize {
        self.subscription_count.load(Ordering::Relaxed)
    }

    /// Inbound text frames received.
    #[must_use]
    pub fn get_messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable handle for talking to a running [`FeedClient`].
#[derive(Debug, Clone)]
pub struct FeedClientHandle {
    tx: mpsc::Sender<FeedEvent>,
    state: Arc<FeedState>,
}

impl FeedClientHandle {
    /// Ask the manager to connect.
    ///
    /// # Errors
    ///
    /// Returns [`FeedClientError::Connect`] if a transport is already
    /// opening or open, or [`FeedClientError::Stopped`] if the driver is
    /// gone.
    pub async fn connect(&self) -> Result<(), FeedClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(FeedCommand::Connect(reply)).await?;
        rx.await.map_err(|_| FeedClientError::Stopped)?.map_err(Into::into)
    }

    /// Add a symbol to the watchlist.
    ///
    /// # Errors
    ///
    /// Returns [`FeedClientError::Stopped`] if the driver is gone.
    pub async fn subscribe(&self, symbol: impl Into<Symbol>) -> Result<(), FeedClientError> {
        self.send(FeedCommand::Subscribe(symbol.into())).await
    }

    /// Remove a symbol from the watchlist.
    ///
    /// # Errors
    ///
    /// Returns [`FeedClientError::Stopped`] if the driver is gone.
    pub async fn unsubscribe(&self, symbol: impl Into<Symbol>) -> Result<(), FeedClientError> {
        self.send(FeedCommand::Unsubscribe(symbol.into())).await
    }

    /// Close the connection for good and wait until the manager has
    /// applied it.
    ///
    /// # Errors
    ///
    /// Returns [`FeedClientError::Stopped`] if the driver is gone.
    pub async fn disconnect(&self) -> Result<(), FeedClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(FeedCommand::Disconnect(reply)).await?;
        rx.await.map_err(|_| FeedClientError::Stopped)
    }

    /// Fetch the manager's current view.
    ///
    /// # Errors
    ///
    /// Returns [`FeedClientError::Stopped`] if the driver is gone.
    pub async fn snapshot(&self) -> Result<FeedSnapshot, FeedClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(FeedCommand::Snapshot(reply)).await?;
        rx.await.map_err(|_| FeedClientError::Stopped)
    }

    /// Shared health state.
    #[must_use]
    pub fn state(&self) -> Arc<FeedState> {
        Arc::clone(&self.state)
    }

    async fn send(&self, command: FeedCommand) -> Result<(), FeedClientError> {
        self.tx
            .send(FeedEvent::Command(command))
            .await
            .map_err(|_| FeedClientError::Stopped)
    }
}

// =============================================================================
// Driver
// =============================================================================

type LiveManager<H> = FeedConnectionManager<WsConnector<FeedEvent>, TokioScheduler<FeedEvent>, H>;

/// Driver task owning the connection manager.
pub struct FeedClient<H>
where
    H: FeedHandler,
{
    manager: LiveManager<H>,
    events: mpsc::Receiver<FeedEvent>,
    state: Arc<FeedState>,
    cancel: CancellationToken,
}

impl<H> FeedClient<H>
where
    H: FeedHandler + Send + 'static,
{
    /// Build a driver and its handle. Nothing connects until
    /// [`FeedClientHandle::connect`] is called.
    #[must_use]
    pub fn new(
        settings: &FeedSettings,
        handler: H,
        cancel: CancellationToken,
    ) -> (Self, FeedClientHandle) {
        let (tx, events) = mpsc::channel(settings.event_capacity.max(1));
        let state = Arc::new(FeedState::new());

        let connector = WsConnector::new(settings.url.clone(), tx.clone(), cancel.child_token());
        let scheduler = TokioScheduler::new(tx.clone(), cancel.child_token());
        let manager = FeedConnectionManager::new(
            connector,
            scheduler,
            handler,
            RetryConfig::from_feed_settings(settings),
        );

        let client = Self {
            manager,
            events,
            state: Arc::clone(&state),
            cancel,
        };
        (client, FeedClientHandle { tx, state })
    }

    /// Build a driver and run it on a new task.
    pub fn spawn(
        settings: &FeedSettings,
        handler: H,
        cancel: CancellationToken,
    ) -> (FeedClientHandle, JoinHandle<()>) {
        let (client, handle) = Self::new(settings, handler, cancel);
        (handle, tokio::spawn(client.run()))
    }

    /// Process events until cancelled. The manager is disconnected on the
    /// way out.
    pub async fn run(mut self) {
        info!(url = %self.manager.connector().url(), "Feed client started");

        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.apply(event);
            self.sync_state();
        }

        self.manager.disconnect();
        self.sync_state();
        info!("Feed client stopped");
    }

    fn apply(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Command(command) => self.apply_command(command),
            FeedEvent::Timer(task) => self.manager.on_timer(task),
            FeedEvent::Signal(TaggedSignal { generation, signal }) => {
                let current = self.manager.connector().generation();
                if generation != current {
                    debug!(generation, current, ?signal, "Dropping signal from stale transport");
                    return;
                }

                match &signal {
                    TransportSignal::Message(_) => self.state.increment_messages(),
                    TransportSignal::Error(message) => self.state.set_error(message.clone()),
                    TransportSignal::Open | TransportSignal::Close => {}
                }
                self.manager.handle_signal(signal);
            }
        }
    }

    fn apply_command(&mut self, command: FeedCommand) {
        match command {
            FeedCommand::Connect(reply) => {
                let _ = reply.send(self.manager.connect());
            }
            FeedCommand::Subscribe(symbol) => self.manager.subscribe(symbol),
            FeedCommand::Unsubscribe(symbol) => self.manager.unsubscribe(&symbol),
            FeedCommand::Disconnect(reply) => {
                self.manager.disconnect();
                let _ = reply.send(());
            }
            FeedCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            state: self.manager.state(),
            reconnect_attempts: self.manager.retry().attempts(),
            max_reconnect_attempts: self.manager.retry().max_attempts(),
            subscriptions: self.manager.subscriptions().to_vec(),
        }
    }

    fn sync_state(&self) {
        self.state.set_state(self.manager.state());

        let attempts = self.manager.retry().attempts();
        if self.state.set_reconnect_attempts(attempts) < attempts {
            metrics::record_reconnect(attempts);
        }

        let count = self.manager.subscriptions().len();
        self.state.set_subscription_count(count);
        metrics::set_subscriptions(count);
    }
}

impl<H> std::fmt::Debug for FeedClient<H>
where
    H: FeedHandler,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("manager", &self.manager)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
