//! Authenticated caller identity.

use super::Chat;

/// Who is calling: the support team or an end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    /// Support staff holding the admin token.
    Admin,
    /// An end user, identified by their account ID.
    User(i64),
}

impl Principal {
    /// Direction flag of messages written by this principal.
    #[must_use]
    pub const fn writes_from_user(self) -> bool {
        matches!(self, Self::User(_))
    }

    /// Admins may open any chat; users only their own.
    #[must_use]
    pub fn can_access(self, chat: &Chat) -> bool {
        match self {
            Self::Admin => true,
            Self::User(user_id) => chat.user_id == user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatId;

    #[test]
    fn admin_accesses_every_chat() {
        let chat = Chat::new(ChatId::new(1), 42);
        assert!(Principal::Admin.can_access(&chat));
        assert!(!Principal::Admin.writes_from_user());
    }

    #[test]
    fn user_accesses_only_own_chat() {
        let chat = Chat::new(ChatId::new(1), 42);
        assert!(Principal::User(42).can_access(&chat));
        assert!(!Principal::User(43).can_access(&chat));
        assert!(Principal::User(42).writes_from_user());
    }
}
