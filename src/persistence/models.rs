//! Database rows that are not domain aggregates.

use serde::{Deserialize, Serialize};

/// A registered Expo push token of an end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushToken {
    /// Expo token string (`ExponentPushToken[...]`).
    pub token: String,
    /// Owner of the device.
    pub user_id: i64,
    /// Preferred notification language (`en`, `uk`).
    pub language: String,
}
