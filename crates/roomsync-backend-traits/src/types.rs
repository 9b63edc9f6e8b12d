//! Row types exchanged across the backend boundary

use std::fmt;

use serde::{Deserialize, Serialize};

/// The signed-in user as seen by the backend.
///
/// The engine never inspects `credential`; it only forwards it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id
    pub user_id: String,
    /// Name shown to other participants
    pub display_name: String,
    /// Opaque access credential
    pub credential: String,
}

impl Identity {
    /// Create a new identity
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            credential: credential.into(),
        }
    }
}

// Keep credentials out of logs.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// A confirmed message row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Server-assigned id
    pub id: String,
    /// Room the message belongs to
    pub room_id: String,
    /// Author user id
    pub author_id: String,
    /// Denormalized author display name, when the backend has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    /// Message body
    pub text: String,
    /// Creation time, unix milliseconds
    pub created_at: i64,
}

/// A room row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Server-assigned id
    pub id: String,
    /// Room name
    pub name: String,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Creation time, unix milliseconds
    pub created_at: i64,
    /// Creator user id
    pub created_by: String,
}

/// Ephemeral typing broadcast payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingSignal {
    /// Room the participant is typing in
    pub room_id: String,
    /// User id of the typist
    pub participant_id: String,
    /// Display name of the typist
    pub name: String,
    /// `true` on typing start or renewal, `false` on stop
    pub typing: bool,
}

/// Opaque handle for a live subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionHandle(pub u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_debug_redacts_credential() {
        let identity = Identity::new("u1", "Ada", "secret-token");
        let debug_str = format!("{:?}", identity);
        assert!(debug_str.contains("u1"));
        assert!(debug_str.contains("Ada"));
        assert!(!debug_str.contains("secret-token"));
    }

    #[test]
    fn test_stored_message_omits_missing_author_name() {
        let msg = StoredMessage {
            id: "m1".into(),
            room_id: "r1".into(),
            author_id: "u1".into(),
            author_name: None,
            text: "hi".into(),
            created_at: 10,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("author_name").is_none());

        let parsed: StoredMessage = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, msg);
    }
}
