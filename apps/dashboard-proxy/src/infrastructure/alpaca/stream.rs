//! Stock Stream Client
//!
//! One persistent connection to Alpaca's stock data WebSocket
//! (`wss://stream.data.alpaca.markets/v2/{feed}`), used only for minute bars.
//!
//! The client owns its reconnect loop: after any session ends it backs off
//! and reconnects until [`shutdown`](StreamConnection::shutdown) is called,
//! restoring the bar subscriptions it had. State changes, errors and bars are
//! reported on the event channel given to [`AlpacaStreamConnector::open`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::auth::{AUTH_TIMEOUT, AuthError, AuthHandler, Credentials, HandshakeStep};
use super::codec::{CodecError, JsonCodec};
use super::heartbeat::{Heartbeat, HeartbeatAction, HeartbeatConfig};
use super::messages::{StreamMessage, SubscriptionRequest};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{StreamConnection, StreamConnector, StreamError, StreamEvent};
use crate::domain::stream_state::{ConnectionState, StreamFault};
use crate::infrastructure::metrics;

/// Default stock stream base URL; the feed name is appended.
pub const DEFAULT_STREAM_URL: &str = "wss://stream.data.alpaca.markets/v2";

/// Default limit for opening the socket (TCP, TLS and upgrade).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

// =============================================================================
// Error Type
// =============================================================================

/// Why a stream session ended.
#[derive(Debug, thiserror::Error)]
pub enum StreamClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Server rejected the handshake.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Socket did not open in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Handshake did not finish in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// No frames after a ping.
    #[error("heartbeat timeout after {0:?} of silence")]
    HeartbeatTimeout(Duration),

    /// Server closed the connection.
    #[error("connection closed")]
    ConnectionClosed,
}

impl StreamClientError {
    /// Fault reported to the stream manager.
    #[must_use]
    pub fn to_fault(&self) -> StreamFault {
        match self {
            Self::Auth(err) => err.to_fault(),
            other => StreamFault::transport(other.to_string()),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the stock stream client.
#[derive(Debug, Clone)]
pub struct AlpacaStreamConfig {
    /// Full WebSocket URL including the feed.
    pub url: String,
    /// API credentials.
    pub credentials: Credentials,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
    /// Limit for opening the socket.
    pub connect_timeout: Duration,
    /// Capacity of the subscribe/unsubscribe command queue.
    pub command_capacity: usize,
}

impl AlpacaStreamConfig {
    /// Create a configuration with default reconnect and heartbeat settings.
    #[must_use]
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            url: url.into(),
            credentials,
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_capacity: 64,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

struct Command {
    request: SubscriptionRequest,
    ack: oneshot::Sender<Result<(), StreamError>>,
}

#[derive(Debug, Clone, Copy)]
enum BarsAction {
    Subscribe,
    Unsubscribe,
}

struct Shared {
    config: AlpacaStreamConfig,
    codec: JsonCodec,
    events: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
    bars: RwLock<BTreeSet<String>>,
    commands: Mutex<Option<mpsc::Sender<Command>>>,
    started: AtomicBool,
}

/// Stock stream connection with internal reconnect.
pub struct AlpacaStreamClient {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for AlpacaStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlpacaStreamClient")
            .field("url", &self.shared.config.url)
            .field("bars", &self.shared.bars.read().len())
            .field("running", &self.shared.commands.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl AlpacaStreamClient {
    /// Create a client reporting on `events`. Nothing connects until
    /// [`connect`](StreamConnection::connect).
    #[must_use]
    pub fn new(config: AlpacaStreamConfig, events: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                codec: JsonCodec::new(),
                events,
                cancel: CancellationToken::new(),
                bars: RwLock::new(BTreeSet::new()),
                commands: Mutex::new(None),
                started: AtomicBool::new(false),
            }),
        }
    }

    async fn change_bars(&self, action: BarsAction, symbols: &[String]) -> Result<(), StreamError> {
        if symbols.is_empty() {
            return Ok(());
        }

        let sender = self
            .shared
            .commands
            .lock()
            .clone()
            .ok_or(StreamError::NotRunning)?;

        let request = match action {
            BarsAction::Subscribe => SubscriptionRequest::subscribe_bars(symbols.to_vec()),
            BarsAction::Unsubscribe => SubscriptionRequest::unsubscribe_bars(symbols.to_vec()),
        };
        let (ack, done) = oneshot::channel();
        sender
            .send(Command { request, ack })
            .await
            .map_err(|_| StreamError::NotRunning)?;
        done.await.map_err(|_| {
            StreamError::CommandFailed("session closed before the command was sent".to_string())
        })??;

        let mut bars = self.shared.bars.write();
        match action {
            BarsAction::Subscribe => bars.extend(symbols.iter().cloned()),
            BarsAction::Unsubscribe => {
                for symbol in symbols {
                    bars.remove(symbol);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StreamConnection for AlpacaStreamClient {
    async fn connect(&self) -> Result<(), StreamError> {
        if self.shared.cancel.is_cancelled() {
            return Err(StreamError::NotRunning);
        }
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(Arc::clone(&self.shared).run(ready_tx));

        match ready_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(StreamError::ConnectionFailed(message)),
            Err(_) => Err(StreamError::ConnectionFailed(
                "stream task ended before connecting".to_string(),
            )),
        }
    }

    async fn subscribe_for_bars(&self, symbols: &[String]) -> Result<(), StreamError> {
        self.change_bars(BarsAction::Subscribe, symbols).await
    }

    async fn unsubscribe_from_bars(&self, symbols: &[String]) -> Result<(), StreamError> {
        self.change_bars(BarsAction::Unsubscribe, symbols).await
    }

    fn shutdown(&self) {
        tracing::info!("Stock stream shutdown requested");
        self.shared.cancel.cancel();
    }
}

impl Shared {
    async fn emit(&self, event: StreamEvent) {
        let _ = self.events.send(event).await;
    }

    /// Reconnect loop. `ready` resolves with the outcome of the first session.
    async fn run(self: Arc<Self>, ready: oneshot::Sender<Result<(), String>>) {
        let mut ready = Some(ready);
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.emit(StreamEvent::StateChanged(ConnectionState::Connecting))
                .await;

            match self.session(&mut policy, &mut ready).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Stock stream session ended");
                    self.emit(StreamEvent::Error(e.to_fault())).await;
                    if let Some(ready) = ready.take() {
                        let _ = ready.send(Err(e.to_string()));
                    }
                }
            }

            let Some(delay) = policy.next_delay() else {
                tracing::error!(
                    attempts = policy.attempt_count(),
                    "Stock stream reconnect attempts exhausted"
                );
                break;
            };

            metrics::record_reconnect();
            tracing::info!(
                attempt = policy.attempt_count(),
                delay_ms = delay.as_millis(),
                "Reconnecting to stock stream"
            );

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        if let Some(ready) = ready.take() {
            let _ = ready.send(Err("stream shut down".to_string()));
        }
        tracing::info!("Stock stream client stopped");
    }

    /// One connection from open to close. `Ok` means cancelled.
    async fn session(
        &self,
        policy: &mut ReconnectPolicy,
        ready: &mut Option<oneshot::Sender<Result<(), String>>>,
    ) -> Result<(), StreamClientError> {
        tracing::info!(url = %self.config.url, "Connecting to stock stream");

        let connect_timeout = self.config.connect_timeout;
        let (ws, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio::time::timeout(
                connect_timeout,
                tokio_tungstenite::connect_async(self.config.url.as_str()),
            ) => result.map_err(|_| StreamClientError::ConnectTimeout(connect_timeout))??,
        };
        self.emit(StreamEvent::StateChanged(ConnectionState::Connected))
            .await;

        let (mut write, mut read) = ws.split();
        let outcome = self.drive(&mut write, &mut read, policy, ready).await;

        *self.commands.lock() = None;
        if outcome.is_ok() {
            let _ = write.send(Message::Close(None)).await;
        }
        self.emit(StreamEvent::StateChanged(ConnectionState::Disconnected))
            .await;

        outcome
    }

    async fn drive(
        &self,
        write: &mut WsWrite,
        read: &mut WsRead,
        policy: &mut ReconnectPolicy,
        ready: &mut Option<oneshot::Sender<Result<(), String>>>,
    ) -> Result<(), StreamClientError> {
        tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio::time::timeout(AUTH_TIMEOUT, self.handshake(write, read)) => {
                result.map_err(|_| StreamClientError::HandshakeTimeout(AUTH_TIMEOUT))??;
            }
        }

        tracing::info!("Stock stream authenticated");
        policy.reset();

        let (command_tx, mut command_rx) = mpsc::channel(self.config.command_capacity.max(1));
        *self.commands.lock() = Some(command_tx);

        let restore: Vec<String> = self.bars.read().iter().cloned().collect();
        if !restore.is_empty() {
            tracing::info!(symbols = ?restore, "Restoring bar subscriptions");
            let json = self
                .codec
                .encode(&SubscriptionRequest::subscribe_bars(restore))?;
            write.send(Message::Text(json.into())).await?;
        }

        self.emit(StreamEvent::StateChanged(ConnectionState::Authenticated))
            .await;
        if let Some(ready) = ready.take() {
            let _ = ready.send(Ok(()));
        }

        let mut heartbeat = Heartbeat::new(self.config.heartbeat.clone());

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Ok(()),
                action = heartbeat.tick() => match action {
                    HeartbeatAction::SendPing => {
                        write.send(Message::Ping(Vec::new().into())).await?;
                    }
                    HeartbeatAction::TimedOut(silent) => {
                        return Err(StreamClientError::HeartbeatTimeout(silent));
                    }
                },
                Some(command) = command_rx.recv() => {
                    let result = match self.codec.encode(&command.request) {
                        Ok(json) => write
                            .send(Message::Text(json.into()))
                            .await
                            .map_err(|e| StreamError::CommandFailed(e.to_string())),
                        Err(e) => Err(StreamError::CommandFailed(e.to_string())),
                    };
                    tracing::debug!(
                        action = command.request.action,
                        symbols = ?command.request.bars,
                        ok = result.is_ok(),
                        "Sent bar subscription change"
                    );
                    let _ = command.ack.send(result);
                }
                frame = read.next() => {
                    heartbeat.record_activity();
                    match frame {
                        Some(Ok(Message::Text(text))) => self.dispatch(&text).await,
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(frame = ?frame, "Server sent close frame");
                            return Err(StreamClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(StreamClientError::ConnectionClosed),
                    }
                }
            }
        }
    }

    /// Run the auth handshake on a fresh socket.
    async fn handshake(&self, write: &mut WsWrite, read: &mut WsRead) -> Result<(), StreamClientError> {
        let mut auth = AuthHandler::new(self.config.credentials.clone());

        while let Some(frame) = read.next().await {
            match frame? {
                Message::Text(text) => {
                    for message in self.codec.decode(&text)? {
                        match message {
                            StreamMessage::Success(success) => match auth.on_success(&success) {
                                HandshakeStep::SendAuth(request) => {
                                    let json = self.codec.encode(&request)?;
                                    write.send(Message::Text(json.into())).await?;
                                }
                                HandshakeStep::Authenticated => return Ok(()),
                                HandshakeStep::Ignored => {}
                            },
                            StreamMessage::Error(error) => {
                                tracing::error!(code = error.code, msg = %error.msg, "Stock stream handshake rejected");
                                return Err(auth.on_error(&error).into());
                            }
                            StreamMessage::Subscription(_) | StreamMessage::Bar(_) => {}
                        }
                    }
                }
                Message::Ping(data) => write.send(Message::Pong(data)).await?,
                Message::Close(_) => return Err(StreamClientError::ConnectionClosed),
                _ => {}
            }
        }

        Err(StreamClientError::ConnectionClosed)
    }

    /// Forward decoded data frames as events.
    async fn dispatch(&self, text: &str) {
        let messages = match self.codec.decode(text) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode stock stream frame");
                return;
            }
        };

        for message in messages {
            match message {
                StreamMessage::Bar(bar) => self.emit(StreamEvent::Bar(bar.into())).await,
                StreamMessage::Error(error) => {
                    tracing::error!(code = error.code, msg = %error.msg, "Stock stream error");
                    self.emit(StreamEvent::Error(StreamFault::with_code(error.code, error.msg)))
                        .await;
                }
                StreamMessage::Subscription(sub) => {
                    tracing::debug!(bars = ?sub.bars, "Bar subscriptions confirmed");
                }
                StreamMessage::Success(success) => {
                    tracing::trace!(msg = ?success.msg, "Unexpected success frame");
                }
            }
        }
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Creates [`AlpacaStreamClient`]s for the stream manager.
#[derive(Debug, Clone)]
pub struct AlpacaStreamConnector {
    config: AlpacaStreamConfig,
}

impl AlpacaStreamConnector {
    /// Create a connector.
    #[must_use]
    pub const fn new(config: AlpacaStreamConfig) -> Self {
        Self { config }
    }
}

impl StreamConnector for AlpacaStreamConnector {
    fn open(&self, events: mpsc::Sender<StreamEvent>) -> Arc<dyn StreamConnection> {
        Arc::new(AlpacaStreamClient::new(self.config.clone(), events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> (AlpacaStreamClient, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let config = AlpacaStreamConfig::new("ws://127.0.0.1:9", Credentials::new("k", "s"));
        (AlpacaStreamClient::new(config, tx), rx)
    }

    #[tokio::test]
    async fn commands_fail_before_connect() {
        let (client, _rx) = client();
        assert_eq!(
            client.subscribe_for_bars(&["AAPL".to_string()]).await,
            Err(StreamError::NotRunning)
        );
        assert_eq!(
            client.unsubscribe_from_bars(&["AAPL".to_string()]).await,
            Err(StreamError::NotRunning)
        );
    }

    #[tokio::test]
    async fn empty_symbol_list_is_noop() {
        let (client, _rx) = client();
        assert_eq!(client.subscribe_for_bars(&[]).await, Ok(()));
    }

    #[tokio::test]
    async fn connect_after_shutdown_is_rejected() {
        let (client, _rx) = client();
        client.shutdown();
        assert_eq!(client.connect().await, Err(StreamError::NotRunning));
    }

    #[test]
    fn auth_errors_keep_their_code() {
        let fault = StreamClientError::Auth(AuthError::InvalidCredentials).to_fault();
        assert_eq!(fault.code, Some(402));
        assert!(fault.is_auth_failure());

        let fault = StreamClientError::HeartbeatTimeout(Duration::from_secs(20)).to_fault();
        assert_eq!(fault.code, None);
        assert!(!fault.is_auth_failure());
    }

    #[test]
    fn connector_creates_independent_clients() {
        let connector = AlpacaStreamConnector::new(AlpacaStreamConfig::new(
            DEFAULT_STREAM_URL,
            Credentials::new("k", "s"),
        ));
        let (tx, _rx) = mpsc::channel(1);
        let a = connector.open(tx.clone());
        let b = connector.open(tx);
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
