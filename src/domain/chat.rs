//! Support chat aggregate.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ChatId;

/// Maximum length of a chat title, in characters.
pub const TITLE_MAX_CHARS: usize = 300;

/// A support conversation between one end user and the support team.
///
/// Each user owns at most one chat. The chat is *active* while a
/// conversation is ongoing; the deactivation job flips it back to inactive
/// after a period without messages, and the next user message then starts a
/// new conversation (new title, automatic reply).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chat {
    /// Chat identifier.
    pub id: ChatId,
    /// Owner of the chat.
    pub user_id: i64,
    /// Subject of the current conversation (first user message).
    pub title: Option<String>,
    /// Timestamp of the last message exchanged.
    pub last_action_time: DateTime<Utc>,
    /// Whether a conversation is currently ongoing.
    pub is_active: bool,
}

impl Chat {
    /// Creates a fresh, inactive chat for `user_id`.
    #[must_use]
    pub fn new(id: ChatId, user_id: i64) -> Self {
        Self {
            id,
            user_id,
            title: None,
            last_action_time: Utc::now(),
            is_active: false,
        }
    }

    /// Returns `true` if the chat was last touched before `cutoff` while active.
    #[must_use]
    pub fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_active && self.last_action_time < cutoff
    }
}

/// Truncates a message text to a valid chat title.
#[must_use]
pub fn title_from_message(text: &str) -> String {
    text.trim().chars().take(TITLE_MAX_CHARS).collect()
}
