//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::ChatConfig;
use crate::domain::{EventBus, MediaStorage, Principal};
use crate::error::ChatError;
use crate::persistence::ChatStore;
use crate::service::ChatService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Chat service for all business logic.
    pub chat_service: Arc<ChatService>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
    /// Runtime configuration.
    pub config: Arc<ChatConfig>,
}

impl AppState {
    /// Wires the service layer on top of `store`.
    #[must_use]
    pub fn new(config: ChatConfig, store: ChatStore) -> Self {
        let event_bus = EventBus::new(config.event_bus_capacity);
        let media = MediaStorage::new(config.media_root.clone(), config.media_url.clone());
        let chat_service = Arc::new(ChatService::new(
            store,
            event_bus.clone(),
            media,
            config.auto_reply_text.clone(),
            config.attachment_max_bytes,
        ));
        Self {
            chat_service,
            event_bus,
            config: Arc::new(config),
        }
    }

    /// Resolves a bearer token to a [`Principal`].
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Unauthorized`] for an unknown token.
    pub async fn authenticate(&self, token: &str) -> Result<Principal, ChatError> {
        if self
            .config
            .admin_api_token
            .as_deref()
            .is_some_and(|admin| admin == token)
        {
            return Ok(Principal::Admin);
        }
        match self.chat_service.store().resolve_user_token(token).await? {
            Some(user_id) => Ok(Principal::User(user_id)),
            None => Err(ChatError::Unauthorized),
        }
    }
}
