//! Domain layer: core types, access rules, attachments and the event system.
//!
//! This module contains the server-side domain model including chat
//! identity, chats and their messages, caller identity, attachment
//! handling, and the event bus broadcasting stored messages.

pub mod attachment;
pub mod chat;
pub mod chat_event;
pub mod chat_id;
pub mod chat_message;
pub mod event_bus;
pub mod principal;

pub use attachment::{FileUpload, MediaStorage};
pub use chat::Chat;
pub use chat_event::{ChatEvent, EventOrigin};
pub use chat_id::ChatId;
pub use chat_message::{ChatMessage, NewMessage};
pub use event_bus::EventBus;
pub use principal::Principal;
