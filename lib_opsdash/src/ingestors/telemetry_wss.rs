//! # Telemetry WSS Ingestor
//!
//! Persistent WebSocket client for the backend's realtime channel.
//!
//! The client owns one connection at a time and runs as an explicit state
//! machine on its own task:
//!
//! ```text
//! Connecting --ok--> Connected --unsolicited close--> Disconnected(wait backoff) --> Connecting
//!      \--err-----------------------------------------/                |
//!                                         attempt == ceiling --> Disconnected (terminal)
//! ```
//!
//! Decoded frames are fanned out through the [`Dispatcher`]. Frames that do
//! not decode are dropped with a debug log and never close the connection.
//! [`StreamClient::shutdown`] is a solicited close: the socket is closed, a
//! pending backoff timer is dropped and no reconnect is ever scheduled again.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::dispatcher::Dispatcher;
use crate::models::stream::StreamEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bounded exponential backoff for reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Reconnects scheduled in a row before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// `min(base * 2^attempt, cap)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay before the next reconnect, or `None` once the ceiling is reached.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then(|| self.delay(attempt))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Observable state of the realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Reconnects scheduled since the last successful connect.
    pub attempt: u32,
    /// No further automatic attempts will be made.
    pub terminal: bool,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            attempt: 0,
            terminal: false,
        }
    }
}

/// How a connected session ended.
enum SessionEnd {
    /// Local shutdown; never reconnect.
    Solicited,
    /// The server closed or the socket failed.
    Unsolicited,
}

/// # Stream Client
///
/// Owns the realtime connection and its reconnect loop.
pub struct StreamClient {
    url: Url,
    policy: ReconnectPolicy,
    dispatcher: Arc<Dispatcher>,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl StreamClient {
    pub fn new(url: Url, policy: ReconnectPolicy, dispatcher: Arc<Dispatcher>) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::default());
        Arc::new(Self {
            url,
            policy,
            dispatcher,
            state,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Registers a frame handler. Every decoded frame is delivered to every
    /// handler in arrival order.
    pub fn on_message(&self, id: &str) -> mpsc::UnboundedReceiver<Arc<StreamEvent>> {
        self.dispatcher.subscribe(id)
    }

    /// Spawns the connection loop.
    pub fn connect(self: &Arc<Self>) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move { client.run().await })
    }

    /// Solicited close. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn run(self: Arc<Self>) {
        let mut attempt: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.publish(ConnectionStatus::Connecting, attempt, false);
            log::info!("Connecting to realtime channel: {}", self.url);

            let connected = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                result = connect_async(self.url.as_str()) => result,
            };

            match connected {
                Ok((ws_stream, _)) => {
                    attempt = 0;
                    self.publish(ConnectionStatus::Connected, attempt, false);
                    log::info!("Realtime channel connected");

                    match self.session(ws_stream).await {
                        SessionEnd::Solicited => break,
                        SessionEnd::Unsolicited => log::warn!("Realtime channel closed by the server"),
                    }
                }
                Err(e) => log::warn!("Realtime channel connect failed: {}", e),
            }

            // --- Backoff ---
            let Some(delay) = self.policy.next_delay(attempt) else {
                log::error!(
                    "Realtime channel gave up after {} reconnect attempts",
                    attempt
                );
                self.publish(ConnectionStatus::Disconnected, attempt, true);
                return;
            };
            attempt += 1;
            self.publish(ConnectionStatus::Disconnected, attempt, false);
            log::info!(
                "Reconnecting in {} ms (attempt {}/{})",
                delay.as_millis(),
                attempt,
                self.policy.max_attempts
            );

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.publish(ConnectionStatus::Disconnected, attempt, true);
        log::info!("Realtime channel shut down");
    }

    async fn session(&self, ws_stream: WsStream) -> SessionEnd {
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    if let Err(e) = write.close().await {
                        log::debug!("Closing realtime channel: {}", e);
                    }
                    return SessionEnd::Solicited;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str()),
                    Some(Ok(Message::Binary(bin))) => match std::str::from_utf8(&bin) {
                        Ok(text) => self.handle_frame(text),
                        Err(_) => log::debug!("Dropping non UTF-8 binary frame ({} bytes)", bin.len()),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        log::debug!("Close frame received: {:?}", frame);
                        return SessionEnd::Unsolicited;
                    }
                    // Ping/Pong are answered by tungstenite.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("Realtime channel read error: {}", e);
                        return SessionEnd::Unsolicited;
                    }
                    None => return SessionEnd::Unsolicited,
                },
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        match StreamEvent::decode(text) {
            Ok(event) => {
                log::trace!("Realtime frame: {}", event.kind());
                self.dispatcher.broadcast(event);
            }
            Err(e) => log::debug!("{}", e),
        }
    }

    fn publish(&self, status: ConnectionStatus, attempt: u32, terminal: bool) {
        self.state.send_if_modified(|state| {
            let next = ConnectionState { status, attempt, terminal };
            let changed = *state != next;
            *state = next;
            changed
        });
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
