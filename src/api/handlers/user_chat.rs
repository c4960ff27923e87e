//! End-user endpoints: own chat and device registration.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::auth::UserPrincipal;
use crate::api::dto::{ChatDetailDto, PushTokenDto, RegisterPushTokenRequest};
use crate::app_state::AppState;
use crate::domain::ChatId;
use crate::error::{ChatError, ErrorResponse};

/// `GET /api/support/chat/` — The caller's support chat.
///
/// Creates the chat on first use, so the list always holds exactly one
/// entry.
///
/// # Errors
///
/// Returns [`ChatError`] on storage failures.
#[utoipa::path(
    get,
    path = "/api/support/chat/",
    tag = "User",
    summary = "Get own support chat",
    description = "Returns the caller's chat with all messages, creating the chat if the caller has none yet.",
    responses(
        (status = 200, description = "The caller's chat", body = Vec<ChatDetailDto>),
        (status = 401, description = "Missing or invalid credentials", body = ErrorResponse),
    )
)]
pub async fn list_own_chats(
    UserPrincipal(user_id): UserPrincipal,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ChatError> {
    let (chat, messages) = state.chat_service.chat_for_user(user_id).await?;
    Ok(Json(vec![ChatDetailDto::new(chat, messages)]))
}

/// `GET /api/support/chat/{chat_id}/` — One of the caller's chats.
///
/// # Errors
///
/// Returns [`ChatError::ChatNotFound`] if the chat does not exist or is
/// not the caller's.
#[utoipa::path(
    get,
    path = "/api/support/chat/{chat_id}/",
    tag = "User",
    summary = "Get a support chat",
    params(
        ("chat_id" = i64, Path, description = "Chat ID"),
    ),
    responses(
        (status = 200, description = "Chat with messages", body = ChatDetailDto),
        (status = 404, description = "Chat not found", body = ErrorResponse),
    )
)]
pub async fn get_own_chat(
    UserPrincipal(user_id): UserPrincipal,
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
) -> Result<impl IntoResponse, ChatError> {
    let (chat, messages) = state
        .chat_service
        .user_chat(user_id, ChatId::new(chat_id))
        .await?;
    Ok(Json(ChatDetailDto::new(chat, messages)))
}

/// `POST /api/support/push_tokens/` — Register a device for notifications.
///
/// # Errors
///
/// Returns [`ChatError::Validation`] for a blank token or unsupported
/// language.
#[utoipa::path(
    post,
    path = "/api/support/push_tokens/",
    tag = "User",
    summary = "Register a push token",
    request_body = RegisterPushTokenRequest,
    responses(
        (status = 201, description = "Token registered", body = PushTokenDto),
        (status = 400, description = "Invalid token or language", body = ErrorResponse),
    )
)]
pub async fn register_push_token(
    UserPrincipal(user_id): UserPrincipal,
    State(state): State<AppState>,
    Json(req): Json<RegisterPushTokenRequest>,
) -> Result<impl IntoResponse, ChatError> {
    let token = state
        .chat_service
        .register_push_token(user_id, &req.token, req.language.as_deref())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(PushTokenDto {
            token: token.token,
            language: token.language,
        }),
    ))
}

/// User routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/chat/", get(list_own_chats))
        .route("/chat/{chat_id}/", get(get_own_chat))
        .route("/push_tokens/", post(register_push_token))
}
