//! Bar Routing Table
//!
//! Tracks which browser client watches which symbol so that a single upstream
//! bar tick can be delivered to every interested client.
//!
//! # Design
//!
//! Each client watches at most one symbol at a time. The table keeps two
//! indexes in sync:
//! - symbol → set of clients (used on every bar tick)
//! - client → symbol (used when a client switches symbol or disconnects)
//!
//! Routing a client to a new symbol implicitly removes its previous route.
//! The table never decides upstream subscription changes; those are driven by
//! the client's own tracked symbol.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a browser WebSocket client.
pub type ClientId = u64;

/// A symbol string (stock ticker).
pub type Symbol = String;

// =============================================================================
// Routing State
// =============================================================================

#[derive(Debug, Default)]
struct RouteState {
    /// Map from symbol to the clients watching it.
    symbol_clients: HashMap<Symbol, HashSet<ClientId>>,
    /// Map from client to its single watched symbol.
    client_symbol: HashMap<ClientId, Symbol>,
}

impl RouteState {
    fn route(&mut self, client: ClientId, symbol: &str) -> Option<Symbol> {
        let previous = self.unroute(client);

        self.symbol_clients
            .entry(symbol.to_string())
            .or_default()
            .insert(client);
        self.client_symbol.insert(client, symbol.to_string());

        previous.filter(|prev| prev != symbol)
    }

    fn unroute(&mut self, client: ClientId) -> Option<Symbol> {
        let symbol = self.client_symbol.remove(&client)?;

        if let Some(clients) = self.symbol_clients.get_mut(&symbol) {
            clients.remove(&client);

            // Drop empty entries so the table only holds watched symbols
            if clients.is_empty() {
                self.symbol_clients.remove(&symbol);
            }
        }

        Some(symbol)
    }
}

// =============================================================================
// Bar Router
// =============================================================================

/// Thread-safe routing table from symbols to watching clients.
///
/// # Example
///
/// ```rust
/// use dashboard_proxy::domain::subscription::BarRouter;
///
/// let router = BarRouter::new();
///
/// router.route(1, "AAPL");
/// router.route(2, "AAPL");
/// assert_eq!(router.clients_for("AAPL").len(), 2);
///
/// // Client 1 switches symbol; its AAPL route is dropped
/// let previous = router.route(1, "TSLA");
/// assert_eq!(previous.as_deref(), Some("AAPL"));
/// assert_eq!(router.clients_for("AAPL"), vec![2]);
/// ```
#[derive(Debug, Default)]
pub struct BarRouter {
    state: RwLock<RouteState>,
}

impl BarRouter {
    /// Create an empty routing table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route bar ticks for `symbol` to `client`.
    ///
    /// Returns the client's previous symbol when it differs from `symbol`.
    pub fn route(&self, client: ClientId, symbol: &str) -> Option<Symbol> {
        self.state.write().route(client, symbol)
    }

    /// Stop routing anything to `client`.
    ///
    /// Returns the symbol the client was watching, if any.
    pub fn unroute(&self, client: ClientId) -> Option<Symbol> {
        self.state.write().unroute(client)
    }

    /// Clients currently watching `symbol`.
    #[must_use]
    pub fn clients_for(&self, symbol: &str) -> Vec<ClientId> {
        self.state
            .read()
            .symbol_clients
            .get(symbol)
            .map(|clients| clients.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Current table statistics.
    #[must_use]
    pub fn stats(&self) -> RouteStats {
        let state = self.state.read();
        RouteStats {
            symbol_count: state.symbol_clients.len(),
            client_count: state.client_symbol.len(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Routing table statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteStats {
    /// Number of symbols with at least one watching client.
    pub symbol_count: usize,
    /// Number of clients watching a symbol.
    pub client_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
