//! WebSocket layer: chat connections and frame types.
//!
//! The endpoint at `/ws/chat/{chat_id}/` streams every message stored in
//! one chat and accepts new messages from the connected participant.

pub mod connection;
pub mod handler;
pub mod messages;
