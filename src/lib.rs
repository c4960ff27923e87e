//! # support-chat-gateway
//!
//! REST API and WebSocket gateway for admin-mediated technical support
//! chats. Every end user owns one support chat; support staff answer from an
//! admin page that loads the history over HTTP and then follows the chat
//! live over a WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! Clients (admin widget, mobile app)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── ChatService (service/)
//!     ├── EventBus (domain/)
//!     │
//!     ├── Background jobs (jobs/)
//!     │
//!     └── ChatStore: PostgreSQL | in-memory (persistence/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod persistence;
pub mod service;
pub mod ws;

use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::ws::handler::chat_ws_handler;

/// Builds the complete application: REST API, chat WebSocket and the
/// attachment file server.
///
/// Attachments are served from the same [`domain::MediaStorage`] that
/// writes them, so stored URLs always resolve. The media URL must come from
/// [`config::normalize_media_url`].
#[must_use]
pub fn build_app(state: AppState) -> Router {
    let media = state.chat_service.media();
    let uploads = ServeDir::new(media.upload_dir());
    let uploads_path = media.public_dir();
    let timeout = Duration::from_secs(state.config.request_timeout_secs.max(1));

    Router::new()
        .merge(api::build_router())
        .route("/ws/chat/{chat_id}/", get(chat_ws_handler))
        .nest_service(&uploads_path, uploads)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
