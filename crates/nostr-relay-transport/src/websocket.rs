//! WebSocket relay transport.

use crate::{
    client_event_frame, RelayMessage, RelaySession, RelayTransport, SignedEvent, TransportError,
    TransportResult,
};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{future, SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default per-relay connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-relay send timeout.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes over plain websocket connections, one per relay.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl WebSocketTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn connect_one(&self, url: &str) -> TransportResult<RelayConnection> {
        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout)??;
        let (sink, read) = stream.split();

        let url_for_reader = url.to_string();
        let reader = tokio::spawn(async move { drain_replies(url_for_reader, read).await });

        debug!(relay = %url, "Relay connected");
        Ok(RelayConnection {
            url: url.to_string(),
            sink,
            reader,
        })
    }
}

#[async_trait]
impl RelayTransport for WebSocketTransport {
    async fn open(&self, relays: &[String]) -> TransportResult<Box<dyn RelaySession>> {
        if relays.is_empty() {
            return Err(TransportError::NoRelays);
        }

        let attempts = future::join_all(relays.iter().map(|url| self.connect_one(url))).await;

        let mut connections = Vec::with_capacity(relays.len());
        let mut failures = Vec::new();
        for (url, attempt) in relays.iter().zip(attempts) {
            match attempt {
                Ok(conn) => connections.push(conn),
                Err(e) => {
                    warn!(relay = %url, error = %e, "Could not connect to relay");
                    failures.push(format!("{}: {}", url, e));
                }
            }
        }

        if connections.is_empty() {
            return Err(TransportError::Connection(failures.join("; ")));
        }
        if !failures.is_empty() {
            warn!(
                connected = connections.len(),
                unreachable = failures.len(),
                "Publishing to a partial relay set"
            );
        }

        info!(relay_count = connections.len(), "Relay batch open");
        Ok(Box::new(WebSocketSession { connections }))
    }
}

struct RelayConnection {
    url: String,
    sink: SplitSink<WsStream, Message>,
    reader: JoinHandle<()>,
}

/// Connections opened by [`WebSocketTransport::open`].
pub struct WebSocketSession {
    connections: Vec<RelayConnection>,
}

#[async_trait]
impl RelaySession for WebSocketSession {
    fn relays(&self) -> Vec<String> {
        self.connections.iter().map(|c| c.url.clone()).collect()
    }

    async fn publish(&mut self, event: &SignedEvent) -> TransportResult<()> {
        if self.connections.is_empty() {
            return Err(TransportError::Publish("session is closed".to_string()));
        }

        let frame = client_event_frame(event)?;
        let mut delivered = 0usize;
        let mut failures = Vec::new();

        for conn in self.connections.iter_mut() {
            let message = Message::Text(frame.clone().into());
            let sent = tokio::time::timeout(SEND_TIMEOUT, conn.sink.send(message))
                .await
                .map_err(|_| TransportError::Timeout)
                .and_then(|r| r.map_err(TransportError::from));

            match sent {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(
                        relay = %conn.url,
                        event_id = %event.id,
                        error = %e,
                        "Relay write failed"
                    );
                    failures.push(format!("{}: {}", conn.url, e));
                }
            }
        }

        if delivered == 0 {
            return Err(TransportError::Publish(failures.join("; ")));
        }

        debug!(
            event_id = %event.id,
            delivered,
            failed = failures.len(),
            "Event written to relays"
        );
        Ok(())
    }

    async fn close(&mut self) {
        for mut conn in self.connections.drain(..) {
            if let Err(e) = conn.sink.close().await {
                debug!(relay = %conn.url, error = %e, "Relay close failed");
            }
            conn.reader.abort();
        }
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        for conn in &self.connections {
            conn.reader.abort();
        }
    }
}

/// Log what a relay says back until the connection ends.
async fn drain_replies(url: String, mut read: SplitStream<WsStream>) {
    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => match RelayMessage::parse(text.as_str()) {
                Some(RelayMessage::Ok {
                    event_id,
                    accepted: true,
                    ..
                }) => {
                    debug!(relay = %url, event_id = %event_id, "Relay accepted event");
                }
                Some(RelayMessage::Ok {
                    event_id,
                    accepted: false,
                    message,
                }) => {
                    warn!(
                        relay = %url,
                        event_id = %event_id,
                        reason = %message,
                        "Relay rejected event"
                    );
                }
                Some(RelayMessage::Notice(notice)) => {
                    debug!(relay = %url, notice = %notice, "Relay notice");
                }
                Some(RelayMessage::Other(label)) => {
                    debug!(relay = %url, label = %label, "Ignoring relay frame");
                }
                None => {
                    debug!(relay = %url, "Unparseable relay frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(relay = %url, error = %e, "Relay read ended");
                break;
            }
        }
    }
}
