//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::domain::{ChatId, Principal};
use crate::error::ChatError;

/// `GET /ws/chat/{chat_id}/` — Upgrade HTTP connection to a chat WebSocket.
///
/// The caller must be support staff or the owner of the chat; otherwise the
/// upgrade is refused with the matching HTTP error.
///
/// # Errors
///
/// Returns [`ChatError::Unauthorized`], [`ChatError::Forbidden`] or
/// [`ChatError::ChatNotFound`] before the upgrade.
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    principal: Principal,
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
) -> Result<impl IntoResponse, ChatError> {
    let chat_id = ChatId::new(chat_id);
    state.chat_service.authorize(chat_id, principal).await?;
    tracing::info!(%chat_id, ?principal, "new chat connection");

    let event_rx = state.event_bus.subscribe();
    let chat_service = Arc::clone(&state.chat_service);

    Ok(ws.on_upgrade(move |socket| {
        run_connection(socket, chat_id, principal, event_rx, chat_service)
    }))
}
