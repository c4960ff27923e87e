//! REST endpoint handlers organized by audience.

pub mod admin_chat;
pub mod system;
pub mod user_chat;

use axum::Router;

use crate::app_state::AppState;

/// Composes all support routes under `/api/support`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(admin_chat::routes())
        .merge(user_chat::routes())
}
