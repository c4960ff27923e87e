//! WebSocket connection loop.
//!
//! Handles the read/write loop for a single chat connection, storing
//! incoming messages and forwarding the chat's events.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::ServerFrame;
use crate::domain::{ChatEvent, ChatId, Principal};
use crate::service::{ChatService, IncomingMessage};

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads messages from the client and hands them to the [`ChatService`].
///   Refused messages are answered with an error frame on this socket only.
/// - Forwards events of `chat_id` from the [`broadcast::Receiver`] to the
///   client, including the echo of the client's own messages.
pub async fn run_connection(
    socket: WebSocket,
    chat_id: ChatId,
    principal: Principal,
    mut event_rx: broadcast::Receiver<ChatEvent>,
    chat_service: Arc<ChatService>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(text.as_str(), chat_id, principal, &chat_service).await;
                        if let Some(frame) = reply
                            && ws_tx.send(Message::text(frame.to_json())).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(%chat_id, error = %e, "ws read failed");
                        break;
                    }
                    _ => {}
                }
            }
            // Event from EventBus
            event = event_rx.recv() => {
                match event {
                    Ok(ChatEvent::MessagePosted { chat_id: event_chat, message, .. }) => {
                        if event_chat != chat_id {
                            continue;
                        }
                        let frame = ServerFrame::Message(message);
                        if ws_tx.send(Message::text(frame.to_json())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(%chat_id, lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::info!(%chat_id, "chat connection closed");
}

/// Handles a text frame from the client, returning an error frame when the
/// message is refused. Accepted messages reach the client through the bus.
async fn handle_text_message(
    text: &str,
    chat_id: ChatId,
    principal: Principal,
    chat_service: &ChatService,
) -> Option<ServerFrame> {
    let incoming = match serde_json::from_str::<IncomingMessage>(text) {
        Ok(incoming) => incoming,
        Err(e) => return Some(ServerFrame::malformed(&e.to_string())),
    };

    match chat_service.receive(chat_id, principal, incoming).await {
        Ok(_) => None,
        Err(e) => Some(ServerFrame::from_error(e)),
    }
}
