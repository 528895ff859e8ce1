//! Stream Manager
//!
//! Owns the single upstream stock stream shared by every browser client,
//! tracks whether it is usable, and routes bar ticks to the clients that
//! asked for them. Options snapshots are fetched over REST on every
//! subscribe so clients get useful data even when streaming is down.
//!
//! # Locking
//!
//! All state lives behind short `parking_lot` critical sections. No lock is
//! held across an `.await`, so upstream calls from different clients may
//! interleave; the same symbol can be subscribed and unsubscribed out of
//! order under concurrent activity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::application::ports::{
    MarketDataPort, OptionsQuery, StreamConnection, StreamConnector, StreamEvent,
};
use crate::domain::protocol::ServerMessage;
use crate::domain::stream_state::{
    ConnectionState, StreamFault, StreamPhase, StreamState, StreamStatus, Transition,
};
use crate::domain::streaming::{Bar, OptionsWindow};
use crate::domain::subscription::{BarRouter, ClientId};
use crate::infrastructure::metrics;

/// Default capacity of the upstream event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Client Handle
// =============================================================================

/// Outbound handle to one browser client.
///
/// Cloning shares the same queue. The queue is bounded; a full or closed
/// queue drops the message.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    tx: mpsc::Sender<ServerMessage>,
}

impl ClientHandle {
    /// Create a handle and the receiving end of its queue.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, tx }, rx)
    }

    /// Client identifier.
    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }

    /// Whether the client's writer is still draining the queue.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a message without waiting.
    ///
    /// Returns `false` if the message was dropped.
    pub fn send(&self, message: ServerMessage) -> bool {
        let kind = message.kind();
        match self.tx.try_send(message) {
            Ok(()) => {
                metrics::record_message_sent(kind);
                true
            }
            Err(e) => {
                metrics::record_message_dropped(kind);
                tracing::debug!(client_id = self.id, kind, error = %e, "Dropped client message");
                false
            }
        }
    }
}

// =============================================================================
// Stream Manager
// =============================================================================

struct ManagerInner {
    state: StreamState,
    connection: Option<Arc<dyn StreamConnection>>,
}

/// Shared upstream stream with per-symbol fan-out to browser clients.
pub struct StreamManager {
    connector: Arc<dyn StreamConnector>,
    market_data: Arc<dyn MarketDataPort>,
    event_capacity: usize,
    inner: Mutex<ManagerInner>,
    router: BarRouter,
    clients: RwLock<HashMap<ClientId, ClientHandle>>,
}

impl StreamManager {
    /// Create a manager. Nothing connects until [`initialize`](Self::initialize).
    #[must_use]
    pub fn new(connector: Arc<dyn StreamConnector>, market_data: Arc<dyn MarketDataPort>) -> Self {
        Self::with_event_capacity(connector, market_data, DEFAULT_EVENT_CAPACITY)
    }

    /// Create a manager with a custom upstream event channel capacity.
    #[must_use]
    pub fn with_event_capacity(
        connector: Arc<dyn StreamConnector>,
        market_data: Arc<dyn MarketDataPort>,
        event_capacity: usize,
    ) -> Self {
        Self {
            connector,
            market_data,
            event_capacity: event_capacity.max(1),
            inner: Mutex::new(ManagerInner {
                state: StreamState::new(),
                connection: None,
            }),
            router: BarRouter::new(),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// REST market data source shared with the HTTP routes.
    #[must_use]
    pub fn market_data(&self) -> Arc<dyn MarketDataPort> {
        Arc::clone(&self.market_data)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create the upstream connection and attempt to connect.
    ///
    /// Idempotent: returns immediately if a connection already exists or
    /// streaming has been disabled. A failed connect only clears
    /// `connected`; it is never returned to the caller.
    pub async fn initialize(self: &Arc<Self>) {
        let (connection, events) = {
            let mut inner = self.inner.lock();
            if inner.connection.is_some() || !inner.state.begin_connecting() {
                return;
            }

            let (tx, rx) = mpsc::channel(self.event_capacity);
            let connection = self.connector.open(tx);
            inner.connection = Some(Arc::clone(&connection));
            (connection, rx)
        };

        self.publish_status();
        tokio::spawn(Self::pump_events(Arc::downgrade(self), events));

        tracing::info!("Connecting to upstream stock stream");
        if let Err(e) = connection.connect().await {
            tracing::warn!(error = %e, "Upstream stream connect failed, serving REST only");
            self.apply(StreamState::on_connect_failed);
        }
    }

    /// Close the upstream connection, if any.
    pub fn shutdown(&self) {
        let connection = self.inner.lock().connection.clone();
        if let Some(connection) = connection {
            connection.shutdown();
        }
    }

    /// Current `{connected, enabled}` pair.
    #[must_use]
    pub fn status(&self) -> StreamStatus {
        self.inner.lock().state.status()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> StreamPhase {
        self.inner.lock().state.phase()
    }

    // =========================================================================
    // Upstream Events
    // =========================================================================

    async fn pump_events(manager: Weak<Self>, mut events: mpsc::Receiver<StreamEvent>) {
        while let Some(event) = events.recv().await {
            let Some(manager) = manager.upgrade() else {
                break;
            };
            manager.handle_event(event);
        }
        tracing::debug!("Upstream event channel closed");
    }

    /// Apply one upstream event.
    pub fn handle_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::StateChanged(state) => self.on_state_change(state),
            StreamEvent::Error(fault) => self.on_error(&fault),
            StreamEvent::Bar(bar) => self.route_bar(bar),
        }
    }

    fn on_state_change(&self, state: ConnectionState) {
        tracing::debug!(state = %state, "Upstream stream state changed");
        self.apply(|s| s.on_state_change(state));
    }

    fn on_error(&self, fault: &StreamFault) {
        let auth = fault.is_auth_failure();
        metrics::record_stream_error(if auth { "auth" } else { "stream" });
        tracing::warn!(error = %fault, auth, "Upstream stream error");
        self.apply(|s| s.on_error(fault));
    }

    fn route_bar(&self, bar: Bar) {
        metrics::record_bar_received();

        let targets: Vec<ClientHandle> = {
            let clients = self.clients.read();
            self.router
                .clients_for(&bar.symbol)
                .into_iter()
                .filter_map(|id| clients.get(&id).cloned())
                .collect()
        };

        let Some((last, rest)) = targets.split_last() else {
            return;
        };
        for client in rest {
            client.send(ServerMessage::StockBar { data: bar.clone() });
        }
        last.send(ServerMessage::StockBar { data: bar });
    }

    fn apply(&self, update: impl FnOnce(&mut StreamState) -> Transition) -> Transition {
        let (transition, connection) = {
            let mut inner = self.inner.lock();
            let transition = update(&mut inner.state);
            (transition, inner.connection.clone())
        };

        self.publish_status();

        match transition {
            Transition::Connected => tracing::info!("Upstream stream authenticated"),
            Transition::Degraded => tracing::warn!("Upstream stream unavailable"),
            Transition::Disabled => {
                tracing::error!("Streaming disabled after repeated authentication failures");
                if let Some(connection) = connection {
                    connection.shutdown();
                }
            }
            Transition::Unchanged => {}
        }

        transition
    }

    fn publish_status(&self) {
        let (status, phase) = {
            let inner = self.inner.lock();
            (inner.state.status(), inner.state.phase())
        };
        metrics::set_stream_status(status, phase);
    }

    // =========================================================================
    // Clients
    // =========================================================================

    /// Register a browser client so bar ticks can reach it.
    pub fn register_client(&self, client: ClientHandle) {
        let count = {
            let mut clients = self.clients.write();
            clients.insert(client.id(), client);
            clients.len()
        };
        metrics::set_ws_clients(count);
    }

    /// Forget a browser client and its routes.
    pub fn release_client(&self, client: ClientId) {
        self.router.unroute(client);
        let count = {
            let mut clients = self.clients.write();
            clients.remove(&client);
            clients.len()
        };
        metrics::set_ws_clients(count);
        metrics::set_watched_symbols(self.router.stats().symbol_count);
    }

    /// Stop routing bar ticks to a client without forgetting it.
    pub fn detach(&self, client: ClientId) {
        self.router.unroute(client);
        metrics::set_watched_symbols(self.router.stats().symbol_count);
    }

    /// Number of registered clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Clients currently receiving bars for `symbol`.
    #[must_use]
    pub fn watchers(&self, symbol: &str) -> Vec<ClientId> {
        self.router.clients_for(symbol)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Point a client at `symbol`.
    ///
    /// When the stream is usable, `previous` is unsubscribed upstream first
    /// (best effort) and the client is routed bars for `symbol` only. When it
    /// is not, the client gets one error and no upstream call is made. In
    /// both cases an options snapshot is fetched and a `subscribed`
    /// confirmation is sent last.
    pub async fn subscribe(&self, client: &ClientHandle, symbol: &str, previous: Option<&str>) {
        let connection = {
            let inner = self.inner.lock();
            inner
                .connection
                .clone()
                .filter(|_| inner.state.is_connected())
        };

        match connection {
            Some(connection) => {
                if let Some(previous) = previous {
                    if let Err(e) = connection
                        .unsubscribe_from_bars(&[previous.to_string()])
                        .await
                    {
                        tracing::warn!(symbol = previous, error = %e, "Failed to unsubscribe previous symbol");
                    }
                }

                self.router.route(client.id(), symbol);
                metrics::set_watched_symbols(self.router.stats().symbol_count);

                match connection.subscribe_for_bars(&[symbol.to_string()]).await {
                    Ok(()) => tracing::info!(client_id = client.id(), symbol, "Subscribed to bars"),
                    Err(e) => {
                        tracing::warn!(symbol, error = %e, "Failed to subscribe to bars");
                        client.send(ServerMessage::error(format!(
                            "Failed to subscribe to {symbol}: {e}"
                        )));
                    }
                }
            }
            None => {
                self.detach(client.id());
                client.send(ServerMessage::stream_unavailable());
            }
        }

        self.send_options_snapshot(client, symbol).await;

        client.send(ServerMessage::Subscribed {
            symbol: symbol.to_string(),
        });
    }

    /// Drop the upstream bar subscription for `symbol`.
    ///
    /// No-op unless a symbol is given and the stream is usable. Failures are
    /// logged and swallowed.
    pub async fn unsubscribe(&self, symbol: Option<&str>) {
        let Some(symbol) = symbol else {
            return;
        };

        let connection = {
            let inner = self.inner.lock();
            inner
                .connection
                .clone()
                .filter(|_| inner.state.is_connected())
        };
        let Some(connection) = connection else {
            return;
        };

        match connection.unsubscribe_from_bars(&[symbol.to_string()]).await {
            Ok(()) => tracing::info!(symbol, "Unsubscribed from bars"),
            Err(e) => tracing::warn!(symbol, error = %e, "Failed to unsubscribe from bars"),
        }
    }

    async fn send_options_snapshot(&self, client: &ClientHandle, symbol: &str) {
        let query = OptionsQuery::new(symbol)
            .with_window(OptionsWindow::current())
            .minimal(true);

        match self.market_data.get_options_snapshots(&query).await {
            Ok(chain) if client.is_open() => {
                tracing::debug!(symbol, contracts = chain.len(), "Sending options snapshot");
                client.send(ServerMessage::OptionsSnapshot { data: chain });
            }
            Ok(_) => tracing::debug!(symbol, "Client closed before options snapshot arrived"),
            Err(e) => tracing::warn!(symbol, error = %e, "Options snapshot fetch failed"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
