//! Feed Connection Manager
//!
//! Owns one logical feed connection: opens transports, tracks the
//! watchlist, re-sends it after every successful open and schedules
//! bounded linear-backoff reconnects when the transport drops.
//!
//! The manager never blocks and never spawns. Transport events arrive
//! through [`FeedConnectionManager::handle_signal`], timer firings through
//! [`FeedConnectionManager::on_timer`], and everything is applied in
//! delivery order by whoever owns the manager.

use tracing::{debug, error, info, warn};

use crate::application::ports::{
    FeedHandler, ScheduledTask, Scheduler, Transport, TransportConnector, TransportSignal,
};
use crate::domain::connection::{
    ConnectError, ConnectionState, ConnectionStatus, FeedError, RetryBudget, RetryConfig,
};
use crate::domain::streaming::{FeedCodec, InboundMessage, SubscriptionRequest};
use crate::domain::subscription::{Symbol, SubscriptionSet};

/// Connection lifecycle state machine for a market data feed.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use market_feed::application::ports::{
///     FeedHandler, ScheduledTask, Scheduler, Transport, TransportConnector, TransportError,
///     TransportSignal,
/// };
/// use market_feed::application::services::FeedConnectionManager;
/// use market_feed::domain::connection::{
///     ConnectionState, ConnectionStatus, FeedError, RetryConfig,
/// };
/// use market_feed::domain::streaming::{News, PriceUpdate, Trade};
///
/// struct Sink;
/// impl Transport for Sink {
///     fn send(&mut self, _text: String) -> Result<(), TransportError> { Ok(()) }
///     fn close(&mut self) {}
/// }
///
/// struct Connector;
/// impl TransportConnector for Connector {
///     type Transport = Sink;
///     fn open(&mut self) -> Result<Sink, TransportError> { Ok(Sink) }
/// }
///
/// struct NoTimers;
/// impl Scheduler for NoTimers {
///     fn schedule(&mut self, _delay: Duration, _task: ScheduledTask) {}
/// }
///
/// struct Quiet;
/// impl FeedHandler for Quiet {
///     fn on_price_update(&mut self, _update: PriceUpdate) {}
///     fn on_trade(&mut self, _trade: Trade) {}
///     fn on_news(&mut self, _news: News) {}
///     fn on_connection_status(&mut self, _status: ConnectionStatus) {}
///     fn on_error(&mut self, _error: &FeedError) {}
/// }
///
/// let mut manager =
///     FeedConnectionManager::new(Connector, NoTimers, Quiet, RetryConfig::default());
/// manager.connect().unwrap();
/// manager.handle_signal(TransportSignal::Open);
/// assert_eq!(manager.state(), ConnectionState::Connected);
/// ```
pub struct FeedConnectionManager<C, S, H>
where
    C: TransportConnector,
{
    connector: C,
    scheduler: S,
    handler: H,
    codec: FeedCodec,
    state: ConnectionState,
    subscriptions: SubscriptionSet,
    retry: RetryBudget,
    transport: Option<C::Transport>,
}

impl<C, S, H> FeedConnectionManager<C, S, H>
where
    C: TransportConnector,
    S: Scheduler,
    H: FeedHandler,
{
    /// Create an idle manager. Nothing is opened until [`Self::connect`].
    pub fn new(connector: C, scheduler: S, handler: H, retry: RetryConfig) -> Self {
        Self {
            connector,
            scheduler,
            handler,
            codec: FeedCodec::new(),
            state: ConnectionState::Idle,
            subscriptions: SubscriptionSet::new(),
            retry: RetryBudget::new(retry),
            transport: None,
        }
    }

    // =========================================================================
    // Caller Operations
    // =========================================================================

    /// Open a new transport.
    ///
    /// A no-op once the manager is closed. An open that fails immediately
    /// moves to `Disconnected` and goes through the reconnect path.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::AlreadyConnecting`] while a transport is
    /// opening or open.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        match self.state {
            ConnectionState::Closed => {
                debug!("connect ignored, manager is closed");
                return Ok(());
            }
            state if state.is_active() => return Err(ConnectError::AlreadyConnecting(state)),
            _ => {}
        }

        // A scheduled retry already announced itself.
        if self.state != ConnectionState::Reconnecting {
            self.handler.on_connection_status(ConnectionStatus::Connecting);
        }

        if let Some(mut stale) = self.transport.take() {
            stale.close();
        }

        self.state = ConnectionState::Connecting;
        match self.connector.open() {
            Ok(transport) => {
                info!(attempt = self.retry.attempts(), "Opening feed transport");
                self.transport = Some(transport);
            }
            Err(e) => {
                error!(error = %e, "Failed to open feed transport");
                self.state = ConnectionState::Disconnected;
                self.handler.on_error(&FeedError::TransportOpenFailure(e.to_string()));
                self.schedule_reconnect();
            }
        }

        Ok(())
    }

    /// Add a symbol to the watchlist.
    ///
    /// While connected the symbol is subscribed right away; otherwise it is
    /// included in the full resend after the next successful open.
    pub fn subscribe(&mut self, symbol: impl Into<Symbol>) {
        if self.state.is_closed() {
            return;
        }

        let symbol = symbol.into();
        if !self.subscriptions.insert(symbol.clone()) {
            return;
        }

        debug!(symbol = %symbol, state = %self.state, "Symbol added to watchlist");
        if self.state == ConnectionState::Connected {
            self.send_request(&SubscriptionRequest::subscribe([symbol]));
        }
    }

    /// Remove a symbol from the watchlist.
    pub fn unsubscribe(&mut self, symbol: &str) {
        if self.state.is_closed() || !self.subscriptions.remove(symbol) {
            return;
        }

        debug!(symbol, state = %self.state, "Symbol removed from watchlist");
        if self.state == ConnectionState::Connected {
            self.send_request(&SubscriptionRequest::unsubscribe([symbol]));
        }
    }

    /// Close the connection for good.
    ///
    /// Every later call (including pending timers and late transport
    /// signals) is ignored.
    pub fn disconnect(&mut self) {
        if self.state.is_closed() {
            return;
        }

        info!(state = %self.state, "Disconnecting feed");
        self.state = ConnectionState::Closed;
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.handler.on_connection_status(ConnectionStatus::Disconnected);
    }

    // =========================================================================
    // Signal Entry Points
    // =========================================================================

    /// Apply a transport signal.
    pub fn handle_signal(&mut self, signal: TransportSignal) {
        if self.state.is_closed() {
            debug!(?signal, "Ignoring transport signal, manager is closed");
            return;
        }

        match signal {
            TransportSignal::Open => self.on_open(),
            TransportSignal::Message(text) => self.on_message(&text),
            TransportSignal::Close => self.on_close(),
            TransportSignal::Error(message) => self.on_transport_error(message),
        }
    }

    /// Run a task previously handed to the scheduler.
    pub fn on_timer(&mut self, task: ScheduledTask) {
        match task {
            ScheduledTask::Reconnect => {
                if self.state.is_closed() {
                    return;
                }
                info!(
                    attempt = self.retry.attempts(),
                    max_attempts = self.retry.max_attempts(),
                    "Attempting to reconnect"
                );
                if let Err(e) = self.connect() {
                    debug!(error = %e, "Reconnect timer fired while already connecting");
                }
            }
        }
    }

    fn on_open(&mut self) {
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "Ignoring open signal");
            return;
        }

        info!(symbols = self.subscriptions.len(), "Feed connection established");
        self.state = ConnectionState::Connected;
        self.retry.reset();
        self.handler.on_connection_status(ConnectionStatus::Connected);

        if !self.subscriptions.is_empty() {
            let request = SubscriptionRequest::subscribe(self.subscriptions.iter());
            self.send_request(&request);
        }
    }

    fn on_message(&mut self, text: &str) {
        match self.codec.decode(text) {
            Ok(Some(message)) => self.dispatch(message),
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "Failed to parse feed message");
                self.handler.on_error(&FeedError::MessageParse(e));
            }
        }
    }

    fn dispatch(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::PriceUpdate(update) => self.handler.on_price_update(update),
            InboundMessage::Trade(trade) => self.handler.on_trade(trade),
            InboundMessage::News(news) => self.handler.on_news(news),
        }
    }

    fn on_close(&mut self) {
        warn!(state = %self.state, "Feed connection closed");
        self.transport = None;
        self.state = ConnectionState::Disconnected;
        self.handler.on_connection_status(ConnectionStatus::Disconnected);
        self.handler.on_error(&FeedError::TransportClosed);
        self.schedule_reconnect();
    }

    fn on_transport_error(&mut self, message: String) {
        error!(error = %message, state = %self.state, "Feed transport error");
        self.handler.on_connection_status(ConnectionStatus::Error);
        self.handler.on_error(&FeedError::TransportError(message));
    }

    fn schedule_reconnect(&mut self) {
        if self.state.is_closed() {
            return;
        }

        let Some(delay) = self.retry.next_delay() else {
            let attempts = self.retry.attempts();
            warn!(attempts, "Reconnect budget exhausted, giving up");
            self.handler.on_connection_status(ConnectionStatus::Exhausted);
            self.handler.on_error(&FeedError::RetryBudgetExhausted { attempts });
            return;
        };

        info!(
            attempt = self.retry.attempts(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Scheduling reconnect"
        );
        self.state = ConnectionState::Reconnecting;
        self.handler.on_connection_status(ConnectionStatus::Connecting);
        self.scheduler.schedule(delay, ScheduledTask::Reconnect);
    }

    fn send_request(&mut self, request: &SubscriptionRequest) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };

        let frame = match self.codec.encode_request(request) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to encode subscription request");
                return;
            }
        };

        debug!(
            action = ?request.action,
            symbols = ?request.symbols,
            "Sending subscription request"
        );
        if let Err(e) = transport.send(frame) {
            warn!(error = %e, "Failed to send subscription request");
            self.handler.on_error(&FeedError::TransportError(e.to_string()));
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current lifecycle state.
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current watchlist.
    pub const fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    /// Retry budget.
    pub const fn retry(&self) -> &RetryBudget {
        &self.retry
    }

    /// Current transport, if one is opening or open.
    pub const fn transport(&self) -> Option<&C::Transport> {
        self.transport.as_ref()
    }

    /// Transport connector.
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Mutable transport connector.
    pub const fn connector_mut(&mut self) -> &mut C {
        &mut self.connector
    }

    /// Scheduler.
    pub const fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Mutable scheduler.
    pub const fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Display sink.
    pub const fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutable display sink.
    pub const fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }
}

impl<C, S, H> std::fmt::Debug for FeedConnectionManager<C, S, H>
where
    C: TransportConnector,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedConnectionManager")
            .field("state", &self.state)
            .field("subscriptions", &self.subscriptions)
            .field("retry", &self.retry)
            .field("has_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::application::ports::TransportError;
    use crate::domain::streaming::{News, PriceUpdate, Trade};

    type Frames = Rc<RefCell<Vec<String>>>;

    struct FakeTransport {
        frames: Frames,
        closed: bool,
    }

    impl Transport for FakeTransport {
        fn send(&mut self, text: String) -> Result<(), TransportError> {
            if self.closed {
                return Err(TransportError::Send("closed".to_string()));
            }
            self.frames.borrow_mut().push(text);
            Ok(())
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        frames: Frames,
        opened: usize,
        fail: bool,
    }

    impl TransportConnector for FakeConnector {
        type Transport = FakeTransport;

        fn open(&mut self) -> Result<FakeTransport, TransportError> {
            if self.fail {
                return Err(TransportError::Open("refused".to_string()));
            }
            self.opened += 1;
            Ok(FakeTransport {
                frames: Rc::clone(&self.frames),
                closed: false,
            })
        }
    }

    #[derive(Default)]
    struct RecordingScheduler {
        scheduled: Vec<Duration>,
    }

    impl Scheduler for RecordingScheduler {
        fn schedule(&mut self, delay: Duration, _task: ScheduledTask) {
            self.scheduled.push(delay);
        }
    }

    #[derive(Default)]
    struct RecordingHandler {
        prices: Vec<PriceUpdate>,
        trades: Vec<Trade>,
        news: Vec<News>,
        statuses: Vec<ConnectionStatus>,
        errors: Vec<String>,
    }

    impl FeedHandler for RecordingHandler {
        fn on_price_update(&mut self, update: PriceUpdate) {
            self.prices.push(update);
        }

        fn on_trade(&mut self, trade: Trade) {
            self.trades.push(trade);
        }

        fn on_news(&mut self, news: News) {
            self.news.push(news);
        }

        fn on_connection_status(&mut self, status: ConnectionStatus) {
            self.statuses.push(status);
        }

        fn on_error(&mut self, error: &FeedError) {
            self.errors.push(error.kind().to_string());
        }
    }

    type TestManager = FeedConnectionManager<FakeConnector, RecordingScheduler, RecordingHandler>;

    fn manager() -> TestManager {
        FeedConnectionManager::new(
            FakeConnector::default(),
            RecordingScheduler::default(),
            RecordingHandler::default(),
            RetryConfig::default(),
        )
    }

    fn frames(manager: &TestManager) -> Vec<String> {
        manager.connector().frames.borrow().clone()
    }

    #[test]
    fn starts_idle() {
        let m = manager();
        assert_eq!(m.state(), ConnectionState::Idle);
        assert!(m.transport().is_none());
        assert_eq!(m.retry().attempts(), 0);
    }

    #[test]
    fn connect_then_open() {
        let mut m = manager();
        m.connect().unwrap();
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert!(m.transport().is_some());

        m.handle_signal(TransportSignal::Open);
        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(
            m.handler().statuses,
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
    }

    #[test]
    fn second_connect_is_rejected() {
        let mut m = manager();
        m.connect().unwrap();
        assert!(matches!(
            m.connect(),
            Err(ConnectError::AlreadyConnecting(ConnectionState::Connecting))
        ));

        m.handle_signal(TransportSignal::Open);
        assert!(matches!(
            m.connect(),
            Err(ConnectError::AlreadyConnecting(ConnectionState::Connected))
        ));
        assert_eq!(m.connector().opened, 1);
    }

    #[test]
    fn empty_watchlist_sends_nothing_on_open() {
        let mut m = manager();
        m.connect().unwrap();
        m.handle_signal(TransportSignal::Open);
        assert!(frames(&m).is_empty());
    }

    #[test]
    fn staged_symbols_are_sent_on_open() {
        let mut m = manager();
        m.subscribe("AAPL");
        m.subscribe("MSFT");
        m.unsubscribe("AAPL");
        m.subscribe("TSLA");
        assert!(frames(&m).is_empty());

        m.connect().unwrap();
        m.handle_signal(TransportSignal::Open);
        assert_eq!(
            frames(&m),
            vec![r#"{"action":"subscribe","symbols":["MSFT","TSLA"]}"#]
        );
    }

    #[test]
    fn incremental_requests_while_connected() {
        let mut m = manager();
        m.connect().unwrap();
        m.handle_signal(TransportSignal::Open);

        m.subscribe("AAPL");
        m.subscribe("AAPL");
        m.unsubscribe("AAPL");
        m.unsubscribe("NVDA");

        assert_eq!(
            frames(&m),
            vec![
                r#"{"action":"subscribe","symbols":["AAPL"]}"#,
                r#"{"action":"unsubscribe","symbols":["AAPL"]}"#,
            ]
        );
    }

    #[test]
    fn close_schedules_linear_backoff() {
        let mut m = manager();
        m.connect().unwrap();
        m.handle_signal(TransportSignal::Open);
        m.handle_signal(TransportSignal::Close);

        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert!(m.transport().is_none());
        assert_eq!(m.retry().attempts(), 1);
        assert_eq!(m.scheduler().scheduled, vec![Duration::from_secs(3)]);
        assert_eq!(
            m.handler().statuses[2..],
            [ConnectionStatus::Disconnected, ConnectionStatus::Connecting]
        );
    }

    #[test]
    fn reconnect_timer_does_not_repeat_connecting_status() {
        let mut m = manager();
        m.connect().unwrap();
        m.handle_signal(TransportSignal::Open);
        m.handle_signal(TransportSignal::Close);
        let before = m.handler().statuses.len();

        m.on_timer(ScheduledTask::Reconnect);
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert_eq!(m.handler().statuses.len(), before);
        assert_eq!(m.connector().opened, 2);
    }

    #[test]
    fn open_resets_attempts() {
        let mut m = manager();
        m.connect().unwrap();
        m.handle_signal(TransportSignal::Close);
        m.on_timer(ScheduledTask::Reconnect);
        m.handle_signal(TransportSignal::Close);
        assert_eq!(m.retry().attempts(), 2);

        m.on_timer(ScheduledTask::Reconnect);
        m.handle_signal(TransportSignal::Open);
        assert_eq!(m.retry().attempts(), 0);
    }

    #[test]
    fn synchronous_open_failure_goes_straight_to_reconnect() {
        let mut m = manager();
        m.connector_mut().fail = true;

        m.connect().unwrap();
        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert!(m.transport().is_none());
        assert_eq!(m.scheduler().scheduled, vec![Duration::from_secs(3)]);
        assert_eq!(m.handler().errors, vec!["open_failure"]);
    }

    #[test]
    fn budget_exhaustion_stops_scheduling() {
        let mut m = manager();
        m.connector_mut().fail = true;
        m.connect().unwrap();
        for _ in 0..5 {
            m.on_timer(ScheduledTask::Reconnect);
        }

        assert_eq!(m.scheduler().scheduled.len(), 5);
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(
            m.handler().statuses.last(),
            Some(&ConnectionStatus::Exhausted)
        );
        assert_eq!(m.handler().errors.last().map(String::as_str), Some("retry_exhausted"));
    }

    #[test]
    fn malformed_message_is_reported_and_dropped() {
        let mut m = manager();
        m.connect().unwrap();
        m.handle_signal(TransportSignal::Open);

        m.handle_signal(TransportSignal::Message("{oops".to_string()));
        assert_eq!(m.state(), ConnectionState::Connected);
        assert!(m.transport().is_some());
        assert_eq!(m.handler().errors, vec!["parse_error"]);
        assert!(m.handler().prices.is_empty());
    }

    #[test]
    fn messages_are_dispatched_by_type() {
        let mut m = manager();
        m.connect().unwrap();
        m.handle_signal(TransportSignal::Open);

        for text in [
            r#"{"type":"price_update","symbol":"AAPL","price":1,"change":0,"changePercent":0}"#,
            r#"{"type":"trade","symbol":"AAPL","price":1,"volume":10}"#,
            r#"{"type":"news","headline":"h"}"#,
            r#"{"type":"heartbeat"}"#,
        ] {
            m.handle_signal(TransportSignal::Message(text.to_string()));
        }

        let h = m.handler();
        assert_eq!(h.prices.len(), 1);
        assert_eq!(h.trades.len(), 1);
        assert_eq!(h.news.len(), 1);
        assert!(h.errors.is_empty());
    }

    #[test]
    fn transport_error_only_reports() {
        let mut m = manager();
        m.connect().unwrap();
        m.handle_signal(TransportSignal::Open);
        m.handle_signal(TransportSignal::Error("boom".to_string()));

        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(m.handler().statuses.last(), Some(&ConnectionStatus::Error));
        assert_eq!(m.handler().errors, vec!["transport_error"]);
        assert!(m.scheduler().scheduled.is_empty());
    }

    #[test]
    fn disconnect_is_terminal() {
        let mut m = manager();
        m.connect().unwrap();
        m.handle_signal(TransportSignal::Open);
        m.disconnect();

        assert_eq!(m.state(), ConnectionState::Closed);
        assert!(m.transport().is_none());

        m.handle_signal(TransportSignal::Close);
        m.on_timer(ScheduledTask::Reconnect);
        m.connect().unwrap();
        m.subscribe("AAPL");
        m.disconnect();

        assert_eq!(m.state(), ConnectionState::Closed);
        assert_eq!(m.connector().opened, 1);
        assert!(m.subscriptions().is_empty());
        assert!(m.scheduler().scheduled.is_empty());
        assert_eq!(
            m.handler().statuses.last(),
            Some(&ConnectionStatus::Disconnected)
        );
    }

    #[test]
    fn open_signal_outside_connecting_is_ignored() {
        let mut m = manager();
        m.handle_signal(TransportSignal::Open);
        assert_eq!(m.state(), ConnectionState::Idle);
        assert!(m.handler().statuses.is_empty());
    }
}
