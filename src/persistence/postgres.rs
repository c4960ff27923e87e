//! PostgreSQL implementation of the persistence layer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::models::PushToken;
use crate::config::ChatConfig;
use crate::domain::{Chat, ChatId, ChatMessage, NewMessage};
use crate::error::ChatError;

type ChatRow = (i64, i64, Option<String>, DateTime<Utc>, bool);
type MessageRow = (i64, i64, String, DateTime<Utc>, bool, Option<String>);

const CHAT_COLUMNS: &str = "id, user_id, title, last_action_time, is_active";

fn chat_from_row((id, user_id, title, last_action_time, is_active): ChatRow) -> Chat {
    Chat {
        id: ChatId::new(id),
        user_id,
        title,
        last_action_time,
        is_active,
    }
}

fn message_from_row(
    (id, chat_id, message_text, created_at, from_user, file): MessageRow,
) -> ChatMessage {
    ChatMessage {
        id,
        chat_id: ChatId::new(chat_id),
        message_text,
        created_at,
        from_user,
        file,
    }
}

/// PostgreSQL-backed persistence layer using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new persistence layer with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool from the configured URL and applies the
    /// embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] if the database is
    /// unreachable or a migration fails.
    pub async fn connect(config: &ChatConfig) -> Result<Self, ChatError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| ChatError::PersistenceError(e.to_string()))?;
        tracing::info!("database migrations applied");

        Ok(Self::new(pool))
    }

    /// Loads a chat by ID.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn get_chat(&self, chat_id: ChatId) -> Result<Option<Chat>, ChatError> {
        let row = sqlx::query_as::<_, ChatRow>(&format!(
            "SELECT {CHAT_COLUMNS} FROM support_chats WHERE id = $1"
        ))
        .bind(chat_id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(chat_from_row))
    }

    /// Returns the chat of `user_id`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn get_or_create_chat(&self, user_id: i64) -> Result<Chat, ChatError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query_as::<_, ChatRow>(&format!(
            "INSERT INTO support_chats (user_id) VALUES ($1) \
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id \
             RETURNING {CHAT_COLUMNS}"
        ))
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(chat_from_row(row))
    }

    /// Lists all chats, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn list_chats(&self) -> Result<Vec<Chat>, ChatError> {
        let rows = sqlx::query_as::<_, ChatRow>(&format!(
            "SELECT {CHAT_COLUMNS} FROM support_chats ORDER BY last_action_time DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(chat_from_row).collect())
    }

    /// Lists the messages of a chat in creation order.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn list_messages(&self, chat_id: ChatId) -> Result<Vec<ChatMessage>, ChatError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT id, chat_id, message_text, created_at, from_user, file \
             FROM support_chat_messages WHERE chat_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(chat_id.get())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(message_from_row).collect())
    }

    /// Appends a message to a chat.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure,
    /// including a foreign-key violation for an unknown chat.
    pub async fn insert_message(&self, message: NewMessage) -> Result<ChatMessage, ChatError> {
        let (id, created_at) = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "INSERT INTO support_chat_messages (chat_id, message_text, from_user, file) \
             VALUES ($1, $2, $3, $4) RETURNING id, created_at",
        )
        .bind(message.chat_id.get())
        .bind(&message.message_text)
        .bind(message.from_user)
        .bind(&message.file)
        .fetch_one(&self.pool)
        .await?;

        Ok(ChatMessage {
            id,
            chat_id: message.chat_id,
            message_text: message.message_text,
            created_at,
            from_user: message.from_user,
            file: message.file,
        })
    }

    /// Replaces the chat title.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn set_title(&self, chat_id: ChatId, title: &str) -> Result<(), ChatError> {
        sqlx::query("UPDATE support_chats SET title = $2 WHERE id = $1")
            .bind(chat_id.get())
            .bind(title)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Marks the chat active and records the time of the last action.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn mark_active(&self, chat_id: ChatId, at: DateTime<Utc>) -> Result<(), ChatError> {
        sqlx::query("UPDATE support_chats SET is_active = TRUE, last_action_time = $2 WHERE id = $1")
            .bind(chat_id.get())
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deactivates active chats whose last action is older than `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn deactivate_idle(&self, cutoff: DateTime<Utc>) -> Result<u64, ChatError> {
        let result = sqlx::query(
            "UPDATE support_chats SET is_active = FALSE \
             WHERE is_active = TRUE AND last_action_time < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Returns the stored support address, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn admin_email(&self) -> Result<Option<String>, ChatError> {
        let email = sqlx::query_scalar::<_, String>(
            "SELECT admin_email FROM support_admin_emails ORDER BY id ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(email)
    }

    /// Replaces the stored support address.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn set_admin_email(&self, email: &str) -> Result<(), ChatError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM support_admin_emails")
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO support_admin_emails (admin_email) VALUES ($1)")
            .bind(email)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Maps an API token to the user it was issued to.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn resolve_user_token(&self, token: &str) -> Result<Option<i64>, ChatError> {
        let user_id =
            sqlx::query_scalar::<_, i64>("SELECT user_id FROM user_api_tokens WHERE token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user_id)
    }

    /// Issues an API token to a user.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn insert_user_token(&self, token: &str, user_id: i64) -> Result<(), ChatError> {
        sqlx::query(
            "INSERT INTO user_api_tokens (token, user_id) VALUES ($1, $2) \
             ON CONFLICT (token) DO UPDATE SET user_id = EXCLUDED.user_id",
        )
        .bind(token)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Registers (or re-assigns) a push token.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn upsert_push_token(&self, token: &PushToken) -> Result<(), ChatError> {
        sqlx::query(
            "INSERT INTO user_push_tokens (token, user_id, language) VALUES ($1, $2, $3) \
             ON CONFLICT (token) DO UPDATE SET user_id = EXCLUDED.user_id, language = EXCLUDED.language",
        )
        .bind(&token.token)
        .bind(token.user_id)
        .bind(&token.language)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Lists the push tokens of a user.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn push_tokens_for_user(&self, user_id: i64) -> Result<Vec<PushToken>, ChatError> {
        let rows = sqlx::query_as::<_, (String, i64, String)>(
            "SELECT token, user_id, language FROM user_push_tokens WHERE user_id = $1 ORDER BY token",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(token, user_id, language)| PushToken {
                token,
                user_id,
                language,
            })
            .collect())
    }

    /// Deletes a push token.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on database failure.
    pub async fn delete_push_token(&self, token: &str) -> Result<bool, ChatError> {
        let result = sqlx::query("DELETE FROM user_push_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
