//! Browser WebSocket endpoint.
//!
//! Each socket is split: a writer task drains the client's bounded outbound
//! queue, while the upgrade task reads control frames and feeds them to the
//! client's session one at a time.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};

use crate::application::services::{ClientHandle, ClientSession};

use super::AppState;

/// `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut inbound) = socket.split();
    let (handle, mut outbound) = ClientHandle::channel(state.client_queue_capacity);
    let client_id = handle.id();
    let mut session = ClientSession::open(Arc::clone(&state.manager), handle);

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let json = match message.to_json() {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(client_id, kind = message.kind(), error = %e, "Failed to encode client message");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Message::Text(text)) => session.handle_text(text.as_str()).await,
            // Browsers may send JSON as a binary frame.
            Ok(Message::Binary(bytes)) => {
                session.handle_text(&String::from_utf8_lossy(&bytes)).await;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!(client_id, error = %e, "Client socket error");
                break;
            }
        }
    }

    // Dropping the session's handle closes the queue and ends the writer.
    session.close().await;
    if let Err(e) = writer.await {
        tracing::debug!(client_id, error = %e, "Client writer task failed");
    }
}
