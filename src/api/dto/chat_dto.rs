//! Chat DTOs for the admin and user endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::common_dto::PaginationMeta;
use crate::domain::{Chat, ChatId, ChatMessage};

/// Query of `GET /api/support/chat_in_admin/{chat_id}/`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ChatPageParams {
    /// `true` returns the message history as JSON instead of the page.
    #[serde(default)]
    pub messages: Option<String>,
}

impl ChatPageParams {
    /// Whether the caller asked for the JSON history.
    #[must_use]
    pub fn wants_messages(&self) -> bool {
        self.messages.as_deref() == Some("true")
    }
}

/// Request body for `POST /api/support/chat_in_admin/{chat_id}/`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AdminReplyRequest {
    /// Answer text.
    #[serde(default)]
    pub message_text: Option<String>,
}

/// Response body for a posted admin answer.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdminReplyResponse {
    /// Always `"Message sent"`.
    pub status: String,
    /// ID of the stored message.
    pub message_id: i64,
}

/// A chat with its full message history.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChatDetailDto {
    /// Chat identifier.
    pub id: ChatId,
    /// Current conversation title.
    pub title: Option<String>,
    /// Owner of the chat.
    pub user_id: i64,
    /// Whether a conversation is ongoing.
    pub is_active: bool,
    /// Messages in creation order.
    pub messages: Vec<ChatMessage>,
}

impl ChatDetailDto {
    /// Combines a chat with its messages.
    #[must_use]
    pub fn new(chat: Chat, messages: Vec<ChatMessage>) -> Self {
        Self {
            id: chat.id,
            title: chat.title,
            user_id: chat.user_id,
            is_active: chat.is_active,
            messages,
        }
    }
}

/// One row of the support chat overview.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChatSummaryDto {
    /// Chat identifier.
    pub id: ChatId,
    /// Owner of the chat.
    pub user_id: i64,
    /// Current conversation title.
    pub title: Option<String>,
    /// Time of the last message.
    pub last_action_time: DateTime<Utc>,
    /// Whether a conversation is ongoing.
    pub is_active: bool,
    /// Relative URL of the admin chat page.
    pub chat_link: String,
}

impl From<Chat> for ChatSummaryDto {
    fn from(chat: Chat) -> Self {
        Self {
            chat_link: format!("/api/support/chat_in_admin/{}/", chat.id),
            id: chat.id,
            user_id: chat.user_id,
            title: chat.title,
            last_action_time: chat.last_action_time,
            is_active: chat.is_active,
        }
    }
}

/// Paginated response of the chat overview.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChatListResponse {
    /// Chats on this page.
    pub data: Vec<ChatSummaryDto>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

/// Support address setting.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdminEmailDto {
    /// Address support mail is sent to.
    pub admin_email: Option<String>,
}

/// Request body for `PUT /api/support/admin_email/`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetAdminEmailRequest {
    /// New support address.
    pub admin_email: String,
}

/// Request body for `POST /api/support/push_tokens/`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterPushTokenRequest {
    /// Expo push token of the device.
    pub token: String,
    /// Notification language, `uk` (default) or `en`.
    #[serde(default)]
    pub language: Option<String>,
}

/// A registered device.
#[derive(Debug, Serialize, ToSchema)]
pub struct PushTokenDto {
    /// Expo push token.
    pub token: String,
    /// Notification language.
    pub language: String,
}
