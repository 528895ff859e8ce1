//! Client Session
//!
//! Per-socket state for one browser client: its outbound handle and the one
//! symbol it currently watches. Inbound control messages are handled one at a
//! time, in arrival order, by whoever owns the session.

use std::sync::Arc;

use crate::domain::protocol::{ClientMessage, ServerMessage};

use super::stream_manager::{ClientHandle, StreamManager};

/// One browser client's view of the stream manager.
pub struct ClientSession {
    manager: Arc<StreamManager>,
    handle: ClientHandle,
    current_symbol: Option<String>,
}

impl ClientSession {
    /// Register a client with the manager and start a session for it.
    #[must_use]
    pub fn open(manager: Arc<StreamManager>, handle: ClientHandle) -> Self {
        manager.register_client(handle.clone());
        tracing::info!(client_id = handle.id(), "Client connected");
        Self {
            manager,
            handle,
            current_symbol: None,
        }
    }

    /// Outbound handle.
    #[must_use]
    pub const fn handle(&self) -> &ClientHandle {
        &self.handle
    }

    /// Symbol currently watched.
    #[must_use]
    pub fn current_symbol(&self) -> Option<&str> {
        self.current_symbol.as_deref()
    }

    /// Handle one text frame.
    ///
    /// Malformed frames produce a single error message if the client is
    /// still connected; the session stays usable.
    pub async fn handle_text(&mut self, text: &str) {
        match ClientMessage::parse(text) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                tracing::debug!(client_id = self.handle.id(), error = %e, "Rejected client message");
                if self.handle.is_open() {
                    self.handle.send(ServerMessage::error(e.to_string()));
                }
            }
        }
    }

    /// Handle one parsed control message.
    pub async fn handle_message(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Subscribe { symbol } => {
                let previous = self.current_symbol.take();
                self.manager
                    .subscribe(&self.handle, &symbol, previous.as_deref())
                    .await;
                self.current_symbol = Some(symbol);
            }
            ClientMessage::Unsubscribe => {
                let previous = self.current_symbol.take();
                self.manager.unsubscribe(previous.as_deref()).await;
                self.manager.detach(self.handle.id());
            }
        }
    }

    /// Tear the session down after the socket closed.
    ///
    /// The tracked symbol is unsubscribed upstream even if other clients
    /// still watch it.
    pub async fn close(mut self) {
        let symbol = self.current_symbol.take();
        self.manager.unsubscribe(symbol.as_deref()).await;
        self.manager.release_client(self.handle.id());
        tracing::info!(client_id = self.handle.id(), "Client disconnected");
    }
}
