//! REST API layer: route handlers, DTOs, authentication and router
//! composition.
//!
//! Support endpoints are mounted under `/api/support`.

pub mod auth;
pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of the REST endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "support-chat-gateway",
        description = "Admin-mediated technical support chat: history, answers and settings. Live messages use the WebSocket at /ws/chat/{chat_id}/."
    ),
    paths(
        handlers::admin_chat::chat_in_admin,
        handlers::admin_chat::post_admin_reply,
        handlers::admin_chat::list_chats,
        handlers::admin_chat::get_admin_email,
        handlers::admin_chat::set_admin_email,
        handlers::user_chat::list_own_chats,
        handlers::user_chat::get_own_chat,
        handlers::user_chat::register_push_token,
        handlers::system::health_handler,
    ),
    tags(
        (name = "Admin", description = "Support staff endpoints"),
        (name = "User", description = "End-user endpoints"),
        (name = "System", description = "Operational endpoints"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/support", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
