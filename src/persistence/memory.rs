//! In-memory implementation of the persistence layer.
//!
//! Mirrors the PostgreSQL schema closely enough for tests and for running
//! the gateway without a database (`PERSISTENCE_ENABLED=false`).

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::models::PushToken;
use crate::domain::{Chat, ChatId, ChatMessage, NewMessage};
use crate::error::ChatError;

#[derive(Debug, Default)]
struct MemoryState {
    chats: BTreeMap<ChatId, Chat>,
    messages: Vec<ChatMessage>,
    next_chat_id: i64,
    next_message_id: i64,
    admin_email: Option<String>,
    user_tokens: HashMap<String, i64>,
    push_tokens: BTreeMap<String, PushToken>,
}

/// Process-local store guarded by a single `RwLock`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a chat by ID.
    pub async fn get_chat(&self, chat_id: ChatId) -> Option<Chat> {
        self.state.read().await.chats.get(&chat_id).cloned()
    }

    /// Returns the chat of `user_id`, creating it on first use.
    pub async fn get_or_create_chat(&self, user_id: i64) -> Chat {
        let mut state = self.state.write().await;
        if let Some(chat) = state.chats.values().find(|c| c.user_id == user_id) {
            return chat.clone();
        }
        state.next_chat_id += 1;
        let chat = Chat::new(ChatId::new(state.next_chat_id), user_id);
        state.chats.insert(chat.id, chat.clone());
        chat
    }

    /// Lists all chats, most recently active first.
    pub async fn list_chats(&self) -> Vec<Chat> {
        let state = self.state.read().await;
        let mut chats: Vec<Chat> = state.chats.values().cloned().collect();
        chats.sort_by(|a, b| {
            b.last_action_time
                .cmp(&a.last_action_time)
                .then(b.id.cmp(&a.id))
        });
        chats
    }

    /// Lists the messages of a chat in creation order.
    pub async fn list_messages(&self, chat_id: ChatId) -> Vec<ChatMessage> {
        let state = self.state.read().await;
        let mut messages: Vec<ChatMessage> = state
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        messages
    }

    /// Appends a message to a chat.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ChatNotFound`] for an unknown chat, matching the
    /// foreign key of the relational schema.
    pub async fn insert_message(&self, message: NewMessage) -> Result<ChatMessage, ChatError> {
        let mut state = self.state.write().await;
        if !state.chats.contains_key(&message.chat_id) {
            return Err(ChatError::ChatNotFound(message.chat_id.get()));
        }
        state.next_message_id += 1;
        let stored = ChatMessage {
            id: state.next_message_id,
            chat_id: message.chat_id,
            message_text: message.message_text,
            created_at: Utc::now(),
            from_user: message.from_user,
            file: message.file,
        };
        state.messages.push(stored.clone());
        Ok(stored)
    }

    /// Replaces the chat title.
    pub async fn set_title(&self, chat_id: ChatId, title: &str) {
        if let Some(chat) = self.state.write().await.chats.get_mut(&chat_id) {
            chat.title = Some(title.to_string());
        }
    }

    /// Marks the chat active and records the time of the last action.
    pub async fn mark_active(&self, chat_id: ChatId, at: DateTime<Utc>) {
        if let Some(chat) = self.state.write().await.chats.get_mut(&chat_id) {
            chat.is_active = true;
            chat.last_action_time = at;
        }
    }

    /// Overrides the last action time to simulate idle chats.
    #[cfg(test)]
    pub(crate) async fn touch(&self, chat_id: ChatId, at: DateTime<Utc>) {
        if let Some(chat) = self.state.write().await.chats.get_mut(&chat_id) {
            chat.last_action_time = at;
        }
    }

    /// Deactivates active chats whose last action is older than `cutoff`.
    pub async fn deactivate_idle(&self, cutoff: DateTime<Utc>) -> u64 {
        let mut state = self.state.write().await;
        let mut count = 0;
        for chat in state.chats.values_mut() {
            if chat.is_idle_since(cutoff) {
                chat.is_active = false;
                count += 1;
            }
        }
        count
    }

    /// Returns the stored support address, if any.
    pub async fn admin_email(&self) -> Option<String> {
        self.state.read().await.admin_email.clone()
    }

    /// Replaces the stored support address.
    pub async fn set_admin_email(&self, email: &str) {
        self.state.write().await.admin_email = Some(email.to_string());
    }

    /// Maps an API token to the user it was issued to.
    pub async fn resolve_user_token(&self, token: &str) -> Option<i64> {
        self.state.read().await.user_tokens.get(token).copied()
    }

    /// Issues an API token to a user.
    pub async fn insert_user_token(&self, token: &str, user_id: i64) {
        self.state
            .write()
            .await
            .user_tokens
            .insert(token.to_string(), user_id);
    }

    /// Registers (or re-assigns) a push token.
    pub async fn upsert_push_token(&self, token: &PushToken) {
        self.state
            .write()
            .await
            .push_tokens
            .insert(token.token.clone(), token.clone());
    }

    /// Lists the push tokens of a user.
    pub async fn push_tokens_for_user(&self, user_id: i64) -> Vec<PushToken> {
        self.state
            .read()
            .await
            .push_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Deletes a push token.
    pub async fn delete_push_token(&self, token: &str) -> bool {
        self.state.write().await.push_tokens.remove(token).is_some()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn get_or_create_is_idempotent_per_user() {
        let store = MemoryStore::new();
        let a = store.get_or_create_chat(1).await;
        let b = store.get_or_create_chat(1).await;
        let c = store.get_or_create_chat(2).await;
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(store.list_chats().await.len(), 2);
    }

    #[tokio::test]
    async fn messages_are_listed_in_creation_order() {
        let store = MemoryStore::new();
        let chat = store.get_or_create_chat(1).await;
        let other = store.get_or_create_chat(2).await;
        for text in ["first", "second", "third"] {
            let _ = store
                .insert_message(NewMessage::from_support(chat.id, text))
                .await;
        }
        let _ = store
            .insert_message(NewMessage::from_support(other.id, "elsewhere"))
            .await;

        let texts: Vec<String> = store
            .list_messages(chat.id)
            .await
            .into_iter()
            .map(|m| m.message_text)
            .collect();
        assert_eq!(texts, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn insert_into_unknown_chat_fails() {
        let store = MemoryStore::new();
        let result = store
            .insert_message(NewMessage::from_support(ChatId::new(99), "lost"))
            .await;
        let Err(ChatError::ChatNotFound(99)) = result else {
            panic!("expected ChatNotFound");
        };
    }

    #[tokio::test]
    async fn deactivate_only_touches_idle_active_chats() {
        let store = MemoryStore::new();
        let idle = store.get_or_create_chat(1).await;
        let fresh = store.get_or_create_chat(2).await;
        let inactive = store.get_or_create_chat(3).await;

        let long_ago = Utc::now() - Duration::hours(3);
        store.mark_active(idle.id, long_ago).await;
        store.mark_active(fresh.id, Utc::now()).await;
        store.touch(inactive.id, long_ago).await;

        let cutoff = Utc::now() - Duration::minutes(30);
        assert_eq!(store.deactivate_idle(cutoff).await, 1);

        let idle = store.get_chat(idle.id).await;
        let fresh = store.get_chat(fresh.id).await;
        assert_eq!(idle.map(|c| c.is_active), Some(false));
        assert_eq!(fresh.map(|c| c.is_active), Some(true));
        assert_eq!(store.deactivate_idle(cutoff).await, 0);
    }

    #[tokio::test]
    async fn push_tokens_can_be_reassigned_and_deleted() {
        let store = MemoryStore::new();
        let token = PushToken {
            token: "ExponentPushToken[abc]".to_string(),
            user_id: 1,
            language: "en".to_string(),
        };
        store.upsert_push_token(&token).await;
        store
            .upsert_push_token(&PushToken {
                user_id: 2,
                ..token.clone()
            })
            .await;

        assert!(store.push_tokens_for_user(1).await.is_empty());
        assert_eq!(store.push_tokens_for_user(2).await.len(), 1);
        assert!(store.delete_push_token(&token.token).await);
        assert!(!store.delete_push_token(&token.token).await);
    }
}
