//! WebSocket frame types.
//!
//! Client → server frames are [`crate::service::IncomingMessage`]
//! objects. Server → client frames are either a stored message or an
//! `{"errors": {...}}` validation report.

use serde::Serialize;

use crate::domain::ChatMessage;
use crate::error::{ChatError, ValidationErrors};

/// Field used for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Frame sent from the server to a chat participant.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerFrame {
    /// A message stored in the chat.
    Message(ChatMessage),
    /// The last client frame was refused.
    Errors {
        /// Per-field messages.
        errors: ValidationErrors,
    },
}

impl ServerFrame {
    /// Builds the error frame reported for a failed client frame.
    #[must_use]
    pub fn from_error(err: ChatError) -> Self {
        let errors = match err {
            ChatError::Validation(errors) => errors,
            ChatError::ChatNotFound(_) | ChatError::Forbidden | ChatError::Unauthorized => {
                ValidationErrors::single(NON_FIELD_ERRORS, err.to_string())
            }
            other => {
                tracing::error!(error = %other, "ws message handling failed");
                ValidationErrors::single(NON_FIELD_ERRORS, "Message could not be saved.")
            }
        };
        Self::Errors { errors }
    }

    /// Error frame for a frame that is not a JSON object of the expected shape.
    #[must_use]
    pub fn malformed(reason: &str) -> Self {
        Self::Errors {
            errors: ValidationErrors::single(NON_FIELD_ERRORS, format!("Invalid data. {reason}")),
        }
    }

    /// Serializes the frame to JSON text.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatId;
    use chrono::Utc;

    #[test]
    fn message_frame_is_the_bare_message() {
        let frame = ServerFrame::Message(ChatMessage {
            id: 1,
            chat_id: ChatId::new(2),
            message_text: "hi".to_string(),
            created_at: Utc::now(),
            from_user: false,
            file: None,
        });
        let json: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap_or_default();
        assert_eq!(json.get("message_text"), Some(&serde_json::json!("hi")));
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn validation_error_keeps_fields() {
        let frame = ServerFrame::from_error(ChatError::Validation(ValidationErrors::single(
            "message_text",
            "This field is required.",
        )));
        assert_eq!(
            frame.to_json(),
            r#"{"errors":{"message_text":["This field is required."]}}"#
        );
    }

    #[test]
    fn server_failures_are_not_leaked() {
        let frame = ServerFrame::from_error(ChatError::PersistenceError("pool timed out".into()));
        assert!(!frame.to_json().contains("pool timed out"));
    }
}
