//! WebSocket Transport
//!
//! Transport port implementation on `tokio-tungstenite`.
//!
//! `WsConnector::open` validates the URL on the spot and spawns one task per
//! connection attempt. The task reports `Open`, `Message`, `Error` and
//! `Close` signals back to the driver, each tagged with the attempt's
//! generation number so signals from a replaced transport can be told
//! apart from the current one.
//!
//! A failed handshake is reported as `Error` followed by `Close`, the same
//! pair a browser WebSocket raises.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::ports::{Transport, TransportConnector, TransportError, TransportSignal};

/// A transport signal tagged with the connection attempt it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedSignal {
    /// Connection attempt number, starting at 1.
    pub generation: u64,
    /// The signal.
    pub signal: TransportSignal,
}

// =============================================================================
// Connector
// =============================================================================

/// Opens WebSocket transports to a fixed URL.
#[derive(Debug)]
pub struct WsConnector<E> {
    url: String,
    events: mpsc::Sender<E>,
    shutdown: CancellationToken,
    generation: u64,
}

impl<E> WsConnector<E> {
    /// Create a connector. Signals are sent on `events`; every connection
    /// task stops when `shutdown` is cancelled.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        events: mpsc::Sender<E>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            url: url.into(),
            events,
            shutdown,
            generation: 0,
        }
    }

    /// Generation of the most recent transport (0 before the first open).
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl<E> TransportConnector for WsConnector<E>
where
    E: From<TaggedSignal> + Send + 'static,
{
    type Transport = WsTransport;

    fn open(&mut self) -> Result<WsTransport, TransportError> {
        let request = build_request(&self.url)?;

        self.generation += 1;
        let generation = self.generation;
        let cancel = self.shutdown.child_token();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let emitter = SignalEmitter {
            events: self.events.clone(),
            generation,
        };
        tokio::spawn(run_connection(request, emitter, outbound_rx, cancel.clone()));

        Ok(WsTransport {
            generation,
            outbound: outbound_tx,
            cancel,
        })
    }
}

fn build_request(url: &str) -> Result<Request, TransportError> {
    let request = url
        .into_client_request()
        .map_err(|e| TransportError::Open(format!("invalid feed URL {url:?}: {e}")))?;

    match request.uri().scheme_str() {
        Some("ws" | "wss") => Ok(request),
        other => Err(TransportError::Open(format!(
            "unsupported URL scheme {other:?} in {url:?}"
        ))),
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Handle to one WebSocket connection task.
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct WsTransport {
    generation: u64,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl WsTransport {
    /// Connection attempt this transport belongs to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

impl Transport for WsTransport {
    fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(text)
            .map_err(|_| TransportError::Send("connection task has stopped".to_string()))
    }

    fn close(&mut self) {
        self.cancel.cancel();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Connection Task
// =============================================================================

struct SignalEmitter<E> {
    events: mpsc::Sender<E>,
    generation: u64,
}

impl<E: From<TaggedSignal>> SignalEmitter<E> {
    /// Returns `false` once the driver is gone.
    async fn emit(&self, signal: TransportSignal) -> bool {
        let tagged = TaggedSignal {
            generation: self.generation,
            signal,
        };
        self.events.send(E::from(tagged)).await.is_ok()
    }

    async fn fail(&self, error: String) {
        if self.emit(TransportSignal::Error(error)).await {
            self.emit(TransportSignal::Close).await;
        }
    }
}

async fn run_connection<E>(
    request: Request,
    emitter: SignalEmitter<E>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) where
    E: From<TaggedSignal> + Send + 'static,
{
    let generation = emitter.generation;
    debug!(generation, uri = %request.uri(), "Connecting to feed");

    let connected = tokio::select! {
        () = cancel.cancelled() => return,
        result = tokio_tungstenite::connect_async(request) => result,
    };

    let ws = match connected {
        Ok((ws, _response)) => ws,
        Err(e) => {
            warn!(generation, error = %e, "Feed handshake failed");
            emitter.fail(e.to_string()).await;
            return;
        }
    };

    info!(generation, "Feed WebSocket connected");
    if !emitter.emit(TransportSignal::Open).await {
        return;
    }

    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(generation, "Closing feed WebSocket");
                let _ = write.send(Message::Close(None)).await;
                return;
            }

            Some(text) = outbound.recv() => {
                if let Err(e) = write.send(Message::text(text)).await {
                    warn!(generation, error = %e, "Failed to write to feed");
                    emitter.fail(e.to_string()).await;
                    return;
                }
            }

            frame = read.next() => {
                let keep_going = match frame {
                    Some(Ok(Message::Text(text))) => {
                        emitter.emit(TransportSignal::Message(text.as_str().to_owned())).await
                    }
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => emitter.emit(TransportSignal::Message(text)).await,
                        Err(_) => {
                            debug!(generation, len = data.len(), "Dropping non-UTF-8 binary frame");
                            true
                        }
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = write.send(Message::Pong(payload)).await {
                            warn!(generation, error = %e, "Failed to answer ping");
                        }
                        true
                    }
                    Some(Ok(Message::Pong(_) | Message::Frame(_))) => true,
                    Some(Ok(Message::Close(frame))) => {
                        info!(generation, ?frame, "Feed closed the connection");
                        emitter.emit(TransportSignal::Close).await;
                        false
                    }
                    Some(Err(e)) => {
                        warn!(generation, error = %e, "Feed read error");
                        emitter.fail(e.to_string()).await;
                        false
                    }
                    None => {
                        info!(generation, "Feed stream ended");
                        emitter.emit(TransportSignal::Close).await;
                        false
                    }
                };

                if !keep_going {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ws_and_wss() {
        assert!(build_request("ws://127.0.0.1:9000/feed").is_ok());
        assert!(build_request("wss://feed.example.com/ws").is_ok());
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(matches!(
            build_request("not a url"),
            Err(TransportError::Open(_))
        ));
    }

    #[test]
    fn rejects_http_scheme() {
        assert!(matches!(
            build_request("http://feed.example.com"),
            Err(TransportError::Open(_))
        ));
    }

    #[tokio::test]
    async fn invalid_url_fails_synchronously() {
        let (tx, _rx) = mpsc::channel::<TaggedSignal>(8);
        let mut connector = WsConnector::new("ftp://nowhere", tx, CancellationToken::new());

        assert!(connector.open().is_err());
        assert_eq!(connector.generation(), 0);
    }

    #[tokio::test]
    async fn refused_connection_reports_error_then_close() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::channel::<TaggedSignal>(8);
        let mut connector = WsConnector::new(format!("ws://{addr}"), tx, CancellationToken::new());
        let _transport = connector.open().unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.generation, 1);
        assert!(matches!(first.signal, TransportSignal::Error(_)));
        assert_eq!(rx.recv().await.unwrap().signal, TransportSignal::Close);
    }
}
