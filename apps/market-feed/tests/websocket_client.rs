//! WebSocket Client Integration Tests
//!
//! Runs the feed client against a local WebSocket server: subscribe on
//! open, resubscribe after the server drops the connection, dispatch of
//! live messages and budget exhaustion against a dead endpoint.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use market_feed::{
    BroadcastHub, BroadcastSink, ConnectError, ConnectionState, ConnectionStatus, FeedClient,
    FeedClientError, FeedSettings, StatusEvent,
};

const WAIT: Duration = Duration::from_secs(5);

const SUBSCRIBE_AAPL: &str = r#"{"action":"subscribe","symbols":["AAPL"]}"#;

const PRICE_AAPL: &str =
    r#"{"type":"price_update","symbol":"AAPL","price":190.25,"change":0.75,"changePercent":0.4}"#;

fn settings(url: String, max_attempts: u32) -> FeedSettings {
    let mut settings = FeedSettings::new(url);
    settings.reconnect_interval = Duration::from_millis(50);
    settings.max_reconnect_attempts = max_attempts;
    settings
}

/// Serve two sessions: the first is dropped right after the client
/// subscribes, the second pushes one price update.
async fn flaky_server(listener: TcpListener, frames: mpsc::UnboundedSender<(usize, String)>) {
    for session in 0..2usize {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let Some(Ok(Message::Text(text))) = ws.next().await else {
            return;
        };
        frames.send((session, text.as_str().to_string())).unwrap();

        if session == 0 {
            drop(ws);
            continue;
        }

        ws.send(Message::text(PRICE_AAPL)).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    }
}

fn drain_statuses(rx: &mut broadcast::Receiver<StatusEvent>) -> Vec<ConnectionStatus> {
    let mut statuses = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if event.status != ConnectionStatus::Error {
            statuses.push(event.status);
        }
    }
    statuses
}

#[tokio::test]
async fn reconnects_and_resubscribes_against_live_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    tokio::spawn(flaky_server(listener, frames_tx));

    let hub = Arc::new(BroadcastHub::with_defaults());
    let mut prices = hub.price_updates_rx();
    let mut status = hub.status_rx();

    let cancel = CancellationToken::new();
    let (feed, task) = FeedClient::spawn(
        &settings(format!("ws://{addr}"), 5),
        BroadcastSink::new(Arc::clone(&hub), Decimal::from(5)),
        cancel.clone(),
    );

    feed.subscribe("AAPL").await.unwrap();
    feed.connect().await.unwrap();
    assert!(matches!(
        feed.connect().await,
        Err(FeedClientError::Connect(ConnectError::AlreadyConnecting(_)))
    ));

    let (session, frame) = timeout(WAIT, frames_rx.recv()).await.unwrap().unwrap();
    assert_eq!(session, 0);
    assert_eq!(frame, SUBSCRIBE_AAPL);

    let (session, frame) = timeout(WAIT, frames_rx.recv()).await.unwrap().unwrap();
    assert_eq!(session, 1);
    assert_eq!(frame, SUBSCRIBE_AAPL);

    let update = timeout(WAIT, prices.recv()).await.unwrap().unwrap();
    assert_eq!(update.symbol, "AAPL");
    assert_eq!(update.price, Decimal::new(19025, 2));

    let snapshot = feed.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Connected);
    assert_eq!(snapshot.reconnect_attempts, 0);
    assert_eq!(snapshot.subscriptions, vec!["AAPL".to_string()]);
    assert!(feed.state().is_connected());
    assert!(feed.state().get_messages_received() >= 1);

    feed.disconnect().await.unwrap();
    assert_eq!(feed.snapshot().await.unwrap().state, ConnectionState::Closed);

    let statuses = drain_statuses(&mut status);
    assert!(statuses.starts_with(&[
        ConnectionStatus::Connecting,
        ConnectionStatus::Connected,
        ConnectionStatus::Disconnected,
        ConnectionStatus::Connecting,
        ConnectionStatus::Connected,
    ]));
    assert_eq!(statuses.last(), Some(&ConnectionStatus::Disconnected));

    cancel.cancel();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn dead_endpoint_exhausts_budget() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let hub = Arc::new(BroadcastHub::with_defaults());
    let mut status = hub.status_rx();

    let cancel = CancellationToken::new();
    let (feed, task) = FeedClient::spawn(
        &settings(format!("ws://{addr}"), 2),
        BroadcastSink::new(Arc::clone(&hub), Decimal::from(5)),
        cancel.clone(),
    );
    feed.connect().await.unwrap();

    let exhausted = timeout(WAIT, async {
        loop {
            let event = status.recv().await.unwrap();
            if event.status == ConnectionStatus::Exhausted {
                break;
            }
        }
    })
    .await;
    assert!(exhausted.is_ok());

    let snapshot = feed.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
    assert_eq!(snapshot.reconnect_attempts, 2);
    assert!(!feed.state().is_connected());
    assert!(feed.state().last_error().is_some());

    cancel.cancel();
    timeout(WAIT, task).await.unwrap().unwrap();
    assert!(matches!(
        feed.snapshot().await,
        Err(FeedClientError::Stopped)
    ));
}

#[tokio::test]
async fn invalid_url_reports_open_failure_and_retries() {
    let hub = Arc::new(BroadcastHub::with_defaults());
    let mut status = hub.status_rx();

    let cancel = CancellationToken::new();
    let (feed, task) = FeedClient::spawn(
        &settings("http://not-a-websocket".to_string(), 1),
        BroadcastSink::new(Arc::clone(&hub), Decimal::from(5)),
        cancel.clone(),
    );
    feed.connect().await.unwrap();

    let exhausted = timeout(WAIT, async {
        loop {
            if status.recv().await.unwrap().status == ConnectionStatus::Exhausted {
                break;
            }
        }
    })
    .await;
    assert!(exhausted.is_ok());
    assert_eq!(feed.snapshot().await.unwrap().reconnect_attempts, 1);

    cancel.cancel();
    timeout(WAIT, task).await.unwrap().unwrap();
}
