//! Service layer: business logic orchestration.
//!
//! [`ChatService`] coordinates chat operations against the
//! [`crate::persistence::ChatStore`] and emits events through the
//! [`super::domain::EventBus`].

pub mod chat_service;

pub use chat_service::{ChatService, IncomingMessage};
