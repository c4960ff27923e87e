//! Chat service: message intake, history, and chat lifecycle.

use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::domain::attachment::DecodedFile;
use crate::domain::chat::title_from_message;
use crate::domain::{
    Chat, ChatEvent, ChatId, ChatMessage, EventBus, EventOrigin, FileUpload, MediaStorage,
    NewMessage, Principal,
};
use crate::error::{ChatError, ValidationErrors};
use crate::persistence::{ChatStore, PushToken};

/// A message as submitted by a WebSocket client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingMessage {
    /// Message body.
    #[serde(default)]
    pub message_text: Option<String>,
    /// Optional inline attachment.
    #[serde(default)]
    pub file: Option<FileUpload>,
}

/// Orchestration layer for all chat operations.
///
/// Owns the [`ChatStore`] for state and the [`EventBus`] for fan-out.
/// Every mutation follows the pattern: load chat → check access →
/// validate → store → emit events → return result.
#[derive(Debug, Clone)]
pub struct ChatService {
    store: ChatStore,
    event_bus: EventBus,
    media: MediaStorage,
    auto_reply: String,
    attachment_max_bytes: usize,
}

impl ChatService {
    /// Creates a new `ChatService`.
    #[must_use]
    pub fn new(
        store: ChatStore,
        event_bus: EventBus,
        media: MediaStorage,
        auto_reply: impl Into<String>,
        attachment_max_bytes: usize,
    ) -> Self {
        Self {
            store,
            event_bus,
            media,
            auto_reply: auto_reply.into(),
            attachment_max_bytes,
        }
    }

    /// Returns the attachment storage.
    #[must_use]
    pub fn media(&self) -> &MediaStorage {
        &self.media
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns a reference to the inner [`ChatStore`].
    #[must_use]
    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    /// Loads a chat and checks that `principal` may open it.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ChatNotFound`] for an unknown chat and
    /// [`ChatError::Forbidden`] when the principal has no access.
    pub async fn authorize(&self, chat_id: ChatId, principal: Principal) -> Result<Chat, ChatError> {
        let chat = self.store.require_chat(chat_id).await?;
        if !principal.can_access(&chat) {
            tracing::warn!(%chat_id, ?principal, "chat access denied");
            return Err(ChatError::Forbidden);
        }
        Ok(chat)
    }

    /// Returns a chat and its messages in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ChatNotFound`] if the chat does not exist.
    pub async fn history(&self, chat_id: ChatId) -> Result<(Chat, Vec<ChatMessage>), ChatError> {
        let chat = self.store.require_chat(chat_id).await?;
        let messages = self.store.list_messages(chat_id).await?;
        Ok((chat, messages))
    }

    /// Returns the chat of `user_id` with its messages, creating the chat
    /// on first use.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on storage failure.
    pub async fn chat_for_user(&self, user_id: i64) -> Result<(Chat, Vec<ChatMessage>), ChatError> {
        let chat = self.store.get_or_create_chat(user_id).await?;
        let messages = self.store.list_messages(chat.id).await?;
        Ok((chat, messages))
    }

    /// Returns a chat of `user_id`. Other users' chats are reported as
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ChatNotFound`] if the chat does not exist or
    /// belongs to someone else.
    pub async fn user_chat(
        &self,
        user_id: i64,
        chat_id: ChatId,
    ) -> Result<(Chat, Vec<ChatMessage>), ChatError> {
        let (chat, messages) = self.history(chat_id).await?;
        if chat.user_id != user_id {
            return Err(ChatError::ChatNotFound(chat_id.get()));
        }
        Ok((chat, messages))
    }

    /// Lists every chat for the support overview.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on storage failure.
    pub async fn list_chats(&self) -> Result<Vec<Chat>, ChatError> {
        self.store.list_chats().await
    }

    /// Posts a support answer from the admin page.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ChatNotFound`] for an unknown chat and
    /// [`ChatError::InvalidRequest`] when the text is missing or blank.
    pub async fn post_admin_reply(
        &self,
        chat_id: ChatId,
        message_text: Option<&str>,
    ) -> Result<ChatMessage, ChatError> {
        let chat = self.store.require_chat(chat_id).await?;
        let text = message_text.map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return Err(ChatError::InvalidRequest(
                "Message text is required".to_string(),
            ));
        }

        let message = self
            .store
            .insert_message(NewMessage::from_support(chat_id, text))
            .await?;
        self.publish(&chat, chat.title.clone(), &message);

        tracing::info!(%chat_id, message_id = message.id, "admin reply posted");
        Ok(message)
    }

    /// Handles a message received on a chat WebSocket.
    ///
    /// When the chat is inactive and the user writes, a new conversation
    /// starts: the message becomes the chat title and the automatic support
    /// answer follows the user's message. The chat is then marked active.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Validation`] with per-field messages for a
    /// missing or blank text or an invalid attachment, and
    /// [`ChatError::ChatNotFound`] / [`ChatError::Forbidden`] when the chat
    /// cannot be accessed.
    pub async fn receive(
        &self,
        chat_id: ChatId,
        principal: Principal,
        incoming: IncomingMessage,
    ) -> Result<ChatMessage, ChatError> {
        let chat = self.authorize(chat_id, principal).await?;
        let (text, file) = self.validate(incoming)?;

        let from_user = principal.writes_from_user();
        let starts_conversation = !chat.is_active && from_user;

        let file = match file {
            Some(file) => Some(self.media.save(&file).await?),
            None => None,
        };

        let mut title = chat.title.clone();
        if starts_conversation {
            let new_title = title_from_message(&text);
            self.store.set_title(chat_id, &new_title).await?;
            title = Some(new_title);
        }

        let message = self
            .store
            .insert_message(NewMessage {
                chat_id,
                message_text: text,
                from_user,
                file,
            })
            .await?;
        self.publish(&chat, title.clone(), &message);
        tracing::info!(%chat_id, message_id = message.id, from_user, "message stored");

        if starts_conversation {
            let reply = self
                .store
                .insert_message(NewMessage::from_support(chat_id, self.auto_reply.as_str()))
                .await?;
            self.publish(&chat, title, &reply);
            tracing::info!(%chat_id, message_id = reply.id, "automatic reply posted");
        }

        self.store.mark_active(chat_id, Utc::now()).await?;
        Ok(message)
    }

    /// Deactivates every active chat idle for longer than `max_idle`.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on storage failure.
    pub async fn deactivate_inactive(&self, max_idle: Duration) -> Result<u64, ChatError> {
        let cutoff = Utc::now() - max_idle;
        let count = self.store.deactivate_idle(cutoff).await?;
        if count > 0 {
            tracing::info!(count, %cutoff, "inactive chats deactivated");
        }
        Ok(count)
    }

    /// Returns the stored support address.
    ///
    /// # Errors
    ///
    /// Returns a [`ChatError::PersistenceError`] on storage failure.
    pub async fn admin_email(&self) -> Result<Option<String>, ChatError> {
        self.store.admin_email().await
    }

    /// Replaces the support address.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Validation`] for an address without a local
    /// part and a domain.
    pub async fn set_admin_email(&self, email: &str) -> Result<String, ChatError> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(ChatError::Validation(ValidationErrors::single(
                "admin_email",
                "Enter a valid email address.",
            )));
        }
        self.store.set_admin_email(email).await?;
        Ok(email.to_string())
    }

    /// Registers a device push token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Validation`] for an empty token or an
    /// unsupported language.
    pub async fn register_push_token(
        &self,
        user_id: i64,
        token: &str,
        language: Option<&str>,
    ) -> Result<PushToken, ChatError> {
        let mut errors = ValidationErrors::new();
        let token = token.trim();
        if token.is_empty() {
            errors.add("token", "This field may not be blank.");
        }
        let language = language.unwrap_or("uk").trim().to_ascii_lowercase();
        if !matches!(language.as_str(), "en" | "uk") {
            errors.add("language", format!("\"{language}\" is not a valid choice."));
        }
        if !errors.is_empty() {
            return Err(ChatError::Validation(errors));
        }

        let push_token = PushToken {
            token: token.to_string(),
            user_id,
            language,
        };
        self.store.upsert_push_token(&push_token).await?;
        Ok(push_token)
    }

    fn validate(
        &self,
        incoming: IncomingMessage,
    ) -> Result<(String, Option<DecodedFile>), ChatError> {
        let mut errors = ValidationErrors::new();

        let text = match incoming.message_text {
            None => {
                errors.add("message_text", "This field is required.");
                String::new()
            }
            Some(text) if text.trim().is_empty() => {
                errors.add("message_text", "This field may not be blank.");
                String::new()
            }
            Some(text) => text,
        };

        let file = match incoming.file.filter(|f| !f.content.is_empty()) {
            Some(upload) => match upload.decode(self.attachment_max_bytes) {
                Ok(file) => Some(file),
                Err(e) => {
                    errors.add("file", e.to_string());
                    None
                }
            },
            None => None,
        };

        if errors.is_empty() {
            Ok((text, file))
        } else {
            Err(ChatError::Validation(errors))
        }
    }

    fn publish(&self, chat: &Chat, chat_title: Option<String>, message: &ChatMessage) {
        let receivers = self.event_bus.publish(ChatEvent::MessagePosted {
            chat_id: chat.id,
            user_id: chat.user_id,
            chat_title,
            message: message.clone(),
            origin: EventOrigin::Local,
        });
        tracing::debug!(group = %chat.id.group_name(), receivers, "message broadcast");
    }
}

/// Accepts `local@label.label[...]` with no empty domain label.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !email.contains(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty() && !label.contains('@'))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use base64::Engine;

    const REPLY: &str = "We got your message";

    fn make_service() -> ChatService {
        let media_root =
            std::env::temp_dir().join(format!("support-chat-svc-{}", uuid::Uuid::new_v4()));
        ChatService::new(
            ChatStore::memory(),
            EventBus::new(100),
            MediaStorage::new(media_root, "/media"),
            REPLY,
            1024,
        )
    }

    fn text(body: &str) -> IncomingMessage {
        IncomingMessage {
            message_text: Some(body.to_string()),
            file: None,
        }
    }

    async fn user_chat(service: &ChatService, user_id: i64) -> Chat {
        let Ok((chat, _)) = service.chat_for_user(user_id).await else {
            panic!("chat creation failed");
        };
        chat
    }

    #[tokio::test]
    async fn first_user_message_sets_title_and_auto_replies() {
        let service = make_service();
        let mut rx = service.event_bus().subscribe();
        let chat = user_chat(&service, 7).await;

        let result = service
            .receive(chat.id, Principal::User(7), text("My order is missing"))
            .await;
        let Ok(message) = result else {
            panic!("receive failed");
        };
        assert!(message.from_user);

        let Ok((chat, messages)) = service.history(chat.id).await else {
            panic!("history failed");
        };
        assert!(chat.is_active);
        assert_eq!(chat.title.as_deref(), Some("My order is missing"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages.get(1).map(|m| m.message_text.as_str()), Some(REPLY));
        assert_eq!(messages.get(1).map(|m| m.from_user), Some(false));

        let Ok(ChatEvent::MessagePosted { message: first, .. }) = rx.recv().await else {
            panic!("expected user message event");
        };
        let Ok(ChatEvent::MessagePosted { message: second, chat_title, .. }) = rx.recv().await
        else {
            panic!("expected reply event");
        };
        assert!(first.from_user);
        assert!(!second.from_user);
        assert_eq!(chat_title.as_deref(), Some("My order is missing"));
    }

    #[tokio::test]
    async fn active_chat_keeps_title_and_skips_auto_reply() {
        let service = make_service();
        let chat = user_chat(&service, 7).await;

        let _ = service.receive(chat.id, Principal::User(7), text("first")).await;
        let _ = service.receive(chat.id, Principal::User(7), text("second")).await;

        let Ok((chat, messages)) = service.history(chat.id).await else {
            panic!("history failed");
        };
        assert_eq!(chat.title.as_deref(), Some("first"));
        let texts: Vec<&str> = messages.iter().map(|m| m.message_text.as_str()).collect();
        assert_eq!(texts, ["first", REPLY, "second"]);
    }

    #[tokio::test]
    async fn admin_message_on_inactive_chat_does_not_auto_reply() {
        let service = make_service();
        let chat = user_chat(&service, 7).await;

        let result = service.receive(chat.id, Principal::Admin, text("Hello!")).await;
        let Ok(message) = result else {
            panic!("receive failed");
        };
        assert!(!message.from_user);

        let Ok((chat, messages)) = service.history(chat.id).await else {
            panic!("history failed");
        };
        assert_eq!(messages.len(), 1);
        assert!(chat.title.is_none());
        assert!(chat.is_active);
    }

    #[tokio::test]
    async fn blank_and_missing_text_are_rejected() {
        let service = make_service();
        let chat = user_chat(&service, 7).await;

        let Err(ChatError::Validation(errors)) =
            service.receive(chat.id, Principal::User(7), text("   ")).await
        else {
            panic!("expected validation error");
        };
        assert_eq!(
            errors.field("message_text"),
            Some(["This field may not be blank.".to_string()].as_slice())
        );

        let Err(ChatError::Validation(errors)) = service
            .receive(chat.id, Principal::User(7), IncomingMessage::default())
            .await
        else {
            panic!("expected validation error");
        };
        assert!(errors.field("message_text").is_some());

        let Ok((_, messages)) = service.history(chat.id).await else {
            panic!("history failed");
        };
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn disallowed_attachment_is_a_file_error() {
        let service = make_service();
        let chat = user_chat(&service, 7).await;
        let incoming = IncomingMessage {
            message_text: Some("see attached".to_string()),
            file: Some(FileUpload {
                content: base64::engine::general_purpose::STANDARD.encode(b"MZ"),
                name: Some("setup.exe".to_string()),
            }),
        };

        let Err(ChatError::Validation(errors)) =
            service.receive(chat.id, Principal::User(7), incoming).await
        else {
            panic!("expected validation error");
        };
        assert!(errors.field("file").is_some());
        assert!(errors.field("message_text").is_none());
    }

    #[tokio::test]
    async fn valid_attachment_is_stored_with_url() {
        let service = make_service();
        let chat = user_chat(&service, 7).await;
        let incoming = IncomingMessage {
            message_text: Some("screenshot".to_string()),
            file: Some(FileUpload {
                content: format!(
                    "data:image/png;base64,{}",
                    base64::engine::general_purpose::STANDARD.encode(b"png")
                ),
                name: Some("shot.png".to_string()),
            }),
        };

        let Ok(message) = service.receive(chat.id, Principal::User(7), incoming).await else {
            panic!("receive failed");
        };
        let url = message.file.unwrap_or_default();
        assert!(url.starts_with("/media/technical_support_files/"));
        assert!(url.ends_with("_shot.png"));
    }

    #[tokio::test]
    async fn other_users_are_denied() {
        let service = make_service();
        let chat = user_chat(&service, 7).await;

        let result = service.receive(chat.id, Principal::User(8), text("hi")).await;
        assert!(matches!(result, Err(ChatError::Forbidden)));

        let result = service.user_chat(8, chat.id).await;
        assert!(matches!(result, Err(ChatError::ChatNotFound(_))));
    }

    #[tokio::test]
    async fn admin_reply_requires_text() {
        let service = make_service();
        let chat = user_chat(&service, 7).await;

        let result = service.post_admin_reply(chat.id, None).await;
        assert!(matches!(result, Err(ChatError::InvalidRequest(_))));

        let Ok(message) = service.post_admin_reply(chat.id, Some("On it")).await else {
            panic!("reply failed");
        };
        assert!(!message.from_user);

        let result = service.post_admin_reply(ChatId::new(404), Some("x")).await;
        assert!(matches!(result, Err(ChatError::ChatNotFound(404))));
    }

    #[tokio::test]
    async fn deactivation_resets_conversation() {
        let service = make_service();
        let chat = user_chat(&service, 7).await;
        let _ = service.receive(chat.id, Principal::User(7), text("first")).await;

        let Ok(count) = service.deactivate_inactive(Duration::minutes(-1)).await else {
            panic!("deactivation failed");
        };
        assert_eq!(count, 1);

        let _ = service.receive(chat.id, Principal::User(7), text("again")).await;
        let Ok((chat, messages)) = service.history(chat.id).await else {
            panic!("history failed");
        };
        assert_eq!(chat.title.as_deref(), Some("again"));
        assert_eq!(messages.len(), 4);
    }

    #[tokio::test]
    async fn admin_email_and_push_tokens_are_validated() {
        let service = make_service();
        assert!(service.set_admin_email("nope").await.is_err());
        let Ok(email) = service.set_admin_email(" help@example.com ").await else {
            panic!("valid email rejected");
        };
        assert_eq!(email, "help@example.com");
        assert_eq!(
            service.admin_email().await.ok().flatten().as_deref(),
            Some("help@example.com")
        );

        assert!(service.register_push_token(1, "tok", Some("de")).await.is_err());
        let Ok(token) = service.register_push_token(1, "tok", None).await else {
            panic!("token rejected");
        };
        assert_eq!(token.language, "uk");
    }

    #[tokio::test]
    async fn failed_attachment_write_leaves_chat_untouched() {
        // A regular file as media root makes the upload directory uncreatable.
        let blocker =
            std::env::temp_dir().join(format!("support-chat-blocker-{}", uuid::Uuid::new_v4()));
        let _ = std::fs::write(&blocker, b"not a directory");
        let service = ChatService::new(
            ChatStore::memory(),
            EventBus::new(16),
            MediaStorage::new(blocker.clone(), "/media"),
            REPLY,
            1024,
        );
        let chat = user_chat(&service, 7).await;
        let incoming = IncomingMessage {
            message_text: Some("with picture".to_string()),
            file: Some(FileUpload {
                content: base64::engine::general_purpose::STANDARD.encode(b"png"),
                name: Some("pic.png".to_string()),
            }),
        };

        let result = service.receive(chat.id, Principal::User(7), incoming).await;
        assert!(matches!(result, Err(ChatError::Storage(_))));

        let Ok((chat, messages)) = service.history(chat.id).await else {
            panic!("history failed");
        };
        assert!(chat.title.is_none());
        assert!(!chat.is_active);
        assert!(messages.is_empty());
        let _ = std::fs::remove_file(blocker);
    }

    #[test]
    fn email_domain_needs_non_empty_labels() {
        for bad in ["a@.", "a@b.", "a@.com", "@example.com", "a@example", "a b@example.com", "a@b..c"] {
            assert!(!is_valid_email(bad), "{bad} accepted");
        }
        for good in ["help@example.com", "first.last@support.example.co.uk"] {
            assert!(is_valid_email(good), "{good} rejected");
        }
    }

    #[tokio::test]
    async fn admin_email_without_domain_label_is_rejected() {
        let service = make_service();
        let result = service.set_admin_email("a@.").await;
        let Err(ChatError::Validation(errors)) = result else {
            panic!("expected validation error");
        };
        assert!(errors.field("admin_email").is_some());
        assert_eq!(service.admin_email().await.ok().flatten(), None);
    }
}
