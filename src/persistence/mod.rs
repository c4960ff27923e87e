//! Persistence layer: chats, messages, support settings and tokens.
//!
//! [`ChatStore`] dispatches to a concrete backend: PostgreSQL via
//! `sqlx::PgPool` in production, or a process-local [`MemoryStore`] when
//! persistence is disabled and in tests.

pub mod memory;
pub mod models;
pub mod postgres;

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use models::PushToken;
pub use postgres::PostgresStore;

use crate::config::ChatConfig;
use crate::domain::{Chat, ChatId, ChatMessage, NewMessage};
use crate::error::ChatError;

/// Storage backend selected at startup.
#[derive(Debug, Clone)]
pub enum ChatStore {
    /// PostgreSQL-backed storage.
    Postgres(PostgresStore),
    /// In-memory storage.
    Memory(Arc<MemoryStore>),
}

impl ChatStore {
    /// Builds the backend selected by `persistence_enabled`.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] if the database cannot be
    /// reached or migrated.
    pub async fn from_config(config: &ChatConfig) -> Result<Self, ChatError> {
        if config.persistence_enabled {
            Ok(Self::Postgres(PostgresStore::connect(config).await?))
        } else {
            tracing::warn!("persistence disabled; chats are kept in memory");
            Ok(Self::memory())
        }
    }

    /// A fresh, empty in-memory store.
    #[must_use]
    pub fn memory() -> Self {
        Self::Memory(Arc::new(MemoryStore::new()))
    }

    /// Short name of the active backend, reported by the health check.
    #[must_use]
    pub const fn backend_name(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }

    /// Loads a chat by ID.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn get_chat(&self, chat_id: ChatId) -> Result<Option<Chat>, ChatError> {
        match self {
            Self::Postgres(s) => s.get_chat(chat_id).await,
            Self::Memory(s) => Ok(s.get_chat(chat_id).await),
        }
    }

    /// Loads a chat by ID, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ChatNotFound`] for an unknown chat, or a
    /// [`ChatError::PersistenceError`] on database failure.
    pub async fn require_chat(&self, chat_id: ChatId) -> Result<Chat, ChatError> {
        self.get_chat(chat_id)
            .await?
            .ok_or(ChatError::ChatNotFound(chat_id.get()))
    }

    /// Returns the chat of `user_id`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn get_or_create_chat(&self, user_id: i64) -> Result<Chat, ChatError> {
        match self {
            Self::Postgres(s) => s.get_or_create_chat(user_id).await,
            Self::Memory(s) => Ok(s.get_or_create_chat(user_id).await),
        }
    }

    /// Lists all chats, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn list_chats(&self) -> Result<Vec<Chat>, ChatError> {
        match self {
            Self::Postgres(s) => s.list_chats().await,
            Self::Memory(s) => Ok(s.list_chats().await),
        }
    }

    /// Lists the messages of a chat ordered by creation time.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn list_messages(&self, chat_id: ChatId) -> Result<Vec<ChatMessage>, ChatError> {
        match self {
            Self::Postgres(s) => s.list_messages(chat_id).await,
            Self::Memory(s) => Ok(s.list_messages(chat_id).await),
        }
    }

    /// Appends a message to a chat.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError`] if the chat does not exist or the write fails.
    pub async fn insert_message(&self, message: NewMessage) -> Result<ChatMessage, ChatError> {
        match self {
            Self::Postgres(s) => s.insert_message(message).await,
            Self::Memory(s) => s.insert_message(message).await,
        }
    }

    /// Replaces the chat title.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn set_title(&self, chat_id: ChatId, title: &str) -> Result<(), ChatError> {
        match self {
            Self::Postgres(s) => s.set_title(chat_id, title).await,
            Self::Memory(s) => {
                s.set_title(chat_id, title).await;
                Ok(())
            }
        }
    }

    /// Marks the chat active as of `at`.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn mark_active(&self, chat_id: ChatId, at: DateTime<Utc>) -> Result<(), ChatError> {
        match self {
            Self::Postgres(s) => s.mark_active(chat_id, at).await,
            Self::Memory(s) => {
                s.mark_active(chat_id, at).await;
                Ok(())
            }
        }
    }

    /// Deactivates active chats idle since before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn deactivate_idle(&self, cutoff: DateTime<Utc>) -> Result<u64, ChatError> {
        match self {
            Self::Postgres(s) => s.deactivate_idle(cutoff).await,
            Self::Memory(s) => Ok(s.deactivate_idle(cutoff).await),
        }
    }

    /// Returns the stored support address.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn admin_email(&self) -> Result<Option<String>, ChatError> {
        match self {
            Self::Postgres(s) => s.admin_email().await,
            Self::Memory(s) => Ok(s.admin_email().await),
        }
    }

    /// Replaces the stored support address.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn set_admin_email(&self, email: &str) -> Result<(), ChatError> {
        match self {
            Self::Postgres(s) => s.set_admin_email(email).await,
            Self::Memory(s) => {
                s.set_admin_email(email).await;
                Ok(())
            }
        }
    }

    /// Maps an API token to its user.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn resolve_user_token(&self, token: &str) -> Result<Option<i64>, ChatError> {
        match self {
            Self::Postgres(s) => s.resolve_user_token(token).await,
            Self::Memory(s) => Ok(s.resolve_user_token(token).await),
        }
    }

    /// Issues an API token to a user.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn insert_user_token(&self, token: &str, user_id: i64) -> Result<(), ChatError> {
        match self {
            Self::Postgres(s) => s.insert_user_token(token, user_id).await,
            Self::Memory(s) => {
                s.insert_user_token(token, user_id).await;
                Ok(())
            }
        }
    }

    /// Registers (or re-assigns) a push token.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn upsert_push_token(&self, token: &PushToken) -> Result<(), ChatError> {
        match self {
            Self::Postgres(s) => s.upsert_push_token(token).await,
            Self::Memory(s) => {
                s.upsert_push_token(token).await;
                Ok(())
            }
        }
    }

    /// Lists the push tokens of a user.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn push_tokens_for_user(&self, user_id: i64) -> Result<Vec<PushToken>, ChatError> {
        match self {
            Self::Postgres(s) => s.push_tokens_for_user(user_id).await,
            Self::Memory(s) => Ok(s.push_tokens_for_user(user_id).await),
        }
    }

    /// Deletes a push token, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn delete_push_token(&self, token: &str) -> Result<bool, ChatError> {
        match self {
            Self::Postgres(s) => s.delete_push_token(token).await,
            Self::Memory(s) => Ok(s.delete_push_token(token).await),
        }
    }
}
