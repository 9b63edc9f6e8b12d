use roomsync_backend_traits::{Room, StoredMessage};

#[derive(Clone, Debug, PartialEq)]
pub struct AppState {
    pub rev: u64,
    pub auth: AuthState,
    pub rooms: Vec<RoomSummary>,
    pub current_room: Option<RoomViewState>,
    pub live: LiveStatus,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            auth: AuthState::SignedOut,
            rooms: vec![],
            current_room: None,
            live: LiveStatus::Offline,
            toast: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    SignedIn {
        user_id: String,
        display_name: String,
    },
    /// The backend rejected the credential. Writes and subscriptions stay
    /// stopped until the host starts a new session.
    Expired,
}

/// Real-time health as the UI should render it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LiveStatus {
    Offline,
    Connecting,
    Live,
    /// History, sending and paging still work; updates are paused.
    Degraded { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub created_by: String,
    /// Created locally, not yet confirmed by the backend.
    pub is_pending: bool,
}

impl RoomSummary {
    pub fn from_room(room: Room) -> Self {
        Self {
            id: room.id,
            name: room.name,
            description: room.description,
            created_at: room.created_at,
            created_by: room.created_by,
            is_pending: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RoomViewState {
    pub room_id: String,
    pub room_name: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub typing_names: Vec<String>,
    pub has_more_messages: bool,
    pub loading_older: bool,
    pub subscription: SubscriptionStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Idle,
    Subscribing,
    Active,
    Error { reason: String },
    Closed,
}

impl SubscriptionStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Identity of a message in the active room.
///
/// Reconciliation is the transition `Optimistic -> Confirmed`; nothing else
/// inspects id strings to tell the two apart.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageIdentity {
    Optimistic { temp_id: String },
    Confirmed { id: String },
}

impl MessageIdentity {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Optimistic { temp_id } => temp_id,
            Self::Confirmed { id } => id,
        }
    }

    pub fn is_optimistic(&self) -> bool {
        matches!(self, Self::Optimistic { .. })
    }

    pub fn is_confirmed_as(&self, id: &str) -> bool {
        matches!(self, Self::Confirmed { id: confirmed } if confirmed == id)
    }
}

/// Client-local delivery progress. Never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryState {
    Sending,
    Sent,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub identity: MessageIdentity,
    pub room_id: String,
    pub author_id: String,
    pub display_author: String,
    pub text: String,
    /// Unix milliseconds.
    pub created_at: i64,
    pub is_mine: bool,
    pub delivery: DeliveryState,
}

impl ChatMessage {
    pub fn id(&self) -> &str {
        self.identity.as_str()
    }

    pub fn confirmed(stored: StoredMessage, display_author: String, is_mine: bool) -> Self {
        Self {
            identity: MessageIdentity::Confirmed { id: stored.id },
            room_id: stored.room_id,
            author_id: stored.author_id,
            display_author,
            text: stored.text,
            created_at: stored.created_at,
            is_mine,
            delivery: DeliveryState::Sent,
        }
    }
}

pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
