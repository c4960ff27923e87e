//! Type-safe chat identifier.
//!
//! [`ChatId`] is a newtype wrapper around the database `BIGSERIAL` key so
//! that chat identifiers cannot be confused with user or message IDs.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Unique identifier for a support chat.
///
/// Assigned by the store when the chat is created and immutable
/// thereafter. Used as the WebSocket group discriminator: every connection
/// opened on `/ws/chat/<id>/` receives the events of exactly one `ChatId`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct ChatId(i64);

impl ChatId {
    /// Wraps a raw database key.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw database key.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Name of the broadcast group this chat's messages are delivered to.
    #[must_use]
    pub fn group_name(self) -> String {
        format!("chat_{}", self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn group_name_uses_chat_prefix() {
        assert_eq!(ChatId::new(17).group_name(), "chat_17");
    }

    #[test]
    fn serializes_as_bare_number() {
        let json = serde_json::to_string(&ChatId::new(5)).ok();
        let Some(json) = json else {
            panic!("serialization failed");
        };
        assert_eq!(json, "5");
    }

    #[test]
    fn hash_works_in_hashmap() {
        use std::collections::HashMap;
        let id = ChatId::new(3);
        let mut map = HashMap::new();
        map.insert(id, "test");
        assert_eq!(map.get(&ChatId::new(3)), Some(&"test"));
    }
}
