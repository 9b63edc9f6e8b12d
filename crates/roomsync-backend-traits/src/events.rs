//! Change-feed topics and event envelopes

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Room, StoredMessage, TypingSignal};

/// A change-feed topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Room roster: room inserts, updates and deletes
    Roster,
    /// One room: message changes and typing broadcasts
    Room(String),
}

impl Topic {
    /// Per-room topic for `room_id`
    pub fn room(room_id: impl Into<String>) -> Self {
        Self::Room(room_id.into())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Roster => write!(f, "rooms"),
            Self::Room(id) => write!(f, "room:{id}"),
        }
    }
}

/// Row carried by an insert or update event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum Record {
    /// A message row (per-room topics)
    Message(StoredMessage),
    /// A room row (roster topic)
    Room(Room),
}

/// One event delivered by the transport.
///
/// On a room topic `Delete` names a message id; on the roster topic it names a
/// room id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A row was inserted
    Insert(Record),
    /// A row was updated
    Update(Record),
    /// A row was deleted
    Delete {
        /// Id of the deleted row
        id: String,
    },
    /// Ephemeral typing signal
    Broadcast(TypingSignal),
}

impl ChangeEvent {
    /// Log-safe discriminator
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete { .. } => "delete",
            Self::Broadcast(_) => "broadcast",
        }
    }
}
