//! Domain events reflecting chat state mutations.
//!
//! Every stored message emits a [`ChatEvent`] through the
//! [`super::EventBus`]. Events are delivered to the WebSocket connections of
//! the chat and to the notification dispatcher. When several gateway
//! processes share a Redis relay, events stored elsewhere arrive marked
//! [`EventOrigin::Relayed`].

use serde::Serialize;

use super::{ChatId, ChatMessage};

/// Where an event was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    /// Stored by this process.
    Local,
    /// Stored by another process and received through the relay.
    Relayed,
}

/// Domain event emitted after a state mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A message was stored in a chat.
    MessagePosted {
        /// Chat the message belongs to.
        chat_id: ChatId,
        /// Owner of the chat, recipient of support answers.
        user_id: i64,
        /// Chat title at the time of posting.
        chat_title: Option<String>,
        /// The stored message.
        message: ChatMessage,
        /// Producing process.
        origin: EventOrigin,
    },
}

impl ChatEvent {
    /// Returns the chat ID associated with this event.
    #[must_use]
    pub fn chat_id(&self) -> ChatId {
        match self {
            Self::MessagePosted { chat_id, .. } => *chat_id,
        }
    }

    /// Returns where the event was produced.
    #[must_use]
    pub fn origin(&self) -> EventOrigin {
        match self {
            Self::MessagePosted { origin, .. } => *origin,
        }
    }

    /// Returns `true` for events stored by this process. Only those are
    /// notified and forwarded to the relay.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.origin() == EventOrigin::Local
    }

    /// Returns `true` if the event belongs to the `chat_{id}` group of `chat_id`.
    #[must_use]
    pub fn is_for_chat(&self, chat_id: ChatId) -> bool {
        self.chat_id() == chat_id
    }
}
