//! Admin endpoints: chat page, history, answers, overview and settings.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::api::auth::AdminPrincipal;
use crate::api::dto::{
    AdminEmailDto, AdminReplyRequest, AdminReplyResponse, ChatListResponse, ChatPageParams,
    ChatSummaryDto, PaginationParams, SetAdminEmailRequest,
};
use crate::app_state::AppState;
use crate::domain::{Chat, ChatId, ChatMessage};
use crate::error::{ChatError, ErrorResponse};

const CHAT_PAGE: &str = include_str!("../../../templates/admin_chat.html");

/// `GET /api/support/chat_in_admin/{chat_id}/` — Admin chat page or history.
///
/// With `?messages=true` the chat's messages are returned as a JSON array
/// in creation order; otherwise the HTML chat widget is rendered.
///
/// # Errors
///
/// Returns [`ChatError::ChatNotFound`] if the chat does not exist.
#[utoipa::path(
    get,
    path = "/api/support/chat_in_admin/{chat_id}/",
    tag = "Admin",
    summary = "Admin chat page or message history",
    description = "Returns the chat messages ordered by creation time when `messages=true`, the embedded chat widget page otherwise.",
    params(
        ("chat_id" = i64, Path, description = "Chat ID"),
        ChatPageParams,
    ),
    responses(
        (status = 200, description = "Message history", body = Vec<ChatMessage>),
        (status = 401, description = "Missing or invalid credentials", body = ErrorResponse),
        (status = 403, description = "Caller is not support staff", body = ErrorResponse),
        (status = 404, description = "Chat not found", body = ErrorResponse),
    )
)]
pub async fn chat_in_admin(
    _admin: AdminPrincipal,
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Query(params): Query<ChatPageParams>,
) -> Result<Response, ChatError> {
    let (chat, messages) = state.chat_service.history(ChatId::new(chat_id)).await?;

    if params.wants_messages() {
        return Ok(Json(messages).into_response());
    }
    Ok(Html(render_chat_page(&chat, &state.config.server_domain)).into_response())
}

/// `POST /api/support/chat_in_admin/{chat_id}/` — Post a support answer.
///
/// # Errors
///
/// Returns [`ChatError::InvalidRequest`] without `message_text` and
/// [`ChatError::ChatNotFound`] for an unknown chat.
#[utoipa::path(
    post,
    path = "/api/support/chat_in_admin/{chat_id}/",
    tag = "Admin",
    summary = "Send a support answer",
    description = "Stores a message from support and pushes it to every connection of the chat.",
    params(
        ("chat_id" = i64, Path, description = "Chat ID"),
    ),
    request_body = AdminReplyRequest,
    responses(
        (status = 200, description = "Message sent", body = AdminReplyResponse),
        (status = 400, description = "Message text is required", body = ErrorResponse),
        (status = 404, description = "Chat not found", body = ErrorResponse),
    )
)]
pub async fn post_admin_reply(
    _admin: AdminPrincipal,
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Json(req): Json<AdminReplyRequest>,
) -> Result<impl IntoResponse, ChatError> {
    let message = state
        .chat_service
        .post_admin_reply(ChatId::new(chat_id), req.message_text.as_deref())
        .await?;

    Ok(Json(AdminReplyResponse {
        status: "Message sent".to_string(),
        message_id: message.id,
    }))
}

/// `GET /api/support/chats/` — Support chat overview.
///
/// # Errors
///
/// Returns [`ChatError`] on storage failures.
#[utoipa::path(
    get,
    path = "/api/support/chats/",
    tag = "Admin",
    summary = "List support chats",
    description = "Returns a paginated list of chats, most recently active first, with links to their admin pages.",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated chat list", body = ChatListResponse),
        (status = 403, description = "Caller is not support staff", body = ErrorResponse),
    )
)]
pub async fn list_chats(
    _admin: AdminPrincipal,
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ChatError> {
    let chats = state.chat_service.list_chats().await?;
    let (data, pagination) = params.paginate(chats);

    Ok(Json(ChatListResponse {
        data: data.into_iter().map(ChatSummaryDto::from).collect(),
        pagination,
    }))
}

/// `GET /api/support/admin_email/` — Current support address.
///
/// # Errors
///
/// Returns [`ChatError`] on storage failures.
#[utoipa::path(
    get,
    path = "/api/support/admin_email/",
    tag = "Admin",
    summary = "Get the support address",
    responses(
        (status = 200, description = "Stored support address, if any", body = AdminEmailDto),
    )
)]
pub async fn get_admin_email(
    _admin: AdminPrincipal,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ChatError> {
    let admin_email = state.chat_service.admin_email().await?;
    Ok(Json(AdminEmailDto { admin_email }))
}

/// `PUT /api/support/admin_email/` — Replace the support address.
///
/// # Errors
///
/// Returns [`ChatError::Validation`] for a malformed address.
#[utoipa::path(
    put,
    path = "/api/support/admin_email/",
    tag = "Admin",
    summary = "Set the support address",
    request_body = SetAdminEmailRequest,
    responses(
        (status = 200, description = "Address stored", body = AdminEmailDto),
        (status = 400, description = "Invalid address", body = ErrorResponse),
    )
)]
pub async fn set_admin_email(
    _admin: AdminPrincipal,
    State(state): State<AppState>,
    Json(req): Json<SetAdminEmailRequest>,
) -> Result<impl IntoResponse, ChatError> {
    let admin_email = state.chat_service.set_admin_email(&req.admin_email).await?;
    Ok((
        StatusCode::OK,
        Json(AdminEmailDto {
            admin_email: Some(admin_email),
        }),
    ))
}

/// Admin routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/chat_in_admin/{chat_id}/",
            get(chat_in_admin).post(post_admin_reply),
        )
        .route("/chats/", get(list_chats))
        .route("/admin_email/", get(get_admin_email).put(set_admin_email))
}

/// Fills the chat widget template for `chat`.
#[must_use]
pub fn render_chat_page(chat: &Chat, server_domain: &str) -> String {
    let theme = chat.title.as_deref().unwrap_or("Technical support");
    CHAT_PAGE
        .replace("{{ chat_id }}", &chat.id.to_string())
        .replace("{{ theme }}", &escape_html(theme))
        .replace("{{ server_url }}", &escape_html(server_domain))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
