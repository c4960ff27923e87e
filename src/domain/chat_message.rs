//! Chat message entity and its wire shape.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::ChatId;

/// A single entry in a support chat.
///
/// Serializes to the shape shared by the history endpoint and the
/// WebSocket push: `{id, message_text, created_at, from_user, file}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ChatMessage {
    /// Message identifier.
    pub id: i64,
    /// Owning chat. Not part of the wire shape.
    #[serde(skip)]
    pub chat_id: ChatId,
    /// Message body.
    pub message_text: String,
    /// Server-side creation timestamp.
    pub created_at: DateTime<Utc>,
    /// `true` if written by the end user, `false` if written by support.
    pub from_user: bool,
    /// Public URL of the attachment, if any.
    pub file: Option<String>,
}

/// A message about to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Target chat.
    pub chat_id: ChatId,
    /// Message body.
    pub message_text: String,
    /// Direction flag.
    pub from_user: bool,
    /// Public URL of an already stored attachment.
    pub file: Option<String>,
}

impl NewMessage {
    /// A text-only message written by support.
    #[must_use]
    pub fn from_support(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            message_text: text.into(),
            from_user: false,
            file: None,
        }
    }
}
