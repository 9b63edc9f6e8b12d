use roomsync_backend_traits::{BackendError, ChangeEvent, Room, StoredMessage, SubscriptionHandle};

use crate::state::AppState;
use crate::AppAction;

#[derive(Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
    /// Side-effect update: the host must re-authenticate before starting a new session.
    ReauthRequired {
        rev: u64,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::ReauthRequired { rev } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
    Shutdown,
}

/// Results of asynchronous boundary calls and timers, re-entering the actor.
///
/// `epoch` identifies the session that issued the call; `token` identifies the
/// subscription or fetch. Results carrying a stale value are discarded.
#[derive(Debug)]
pub enum InternalEvent {
    // Transport receive path
    RoomEvent {
        token: u64,
        event: ChangeEvent,
    },
    RosterEvent {
        token: u64,
        event: ChangeEvent,
    },
    SubscriptionLost {
        token: u64,
    },
    DrainEventQueue {
        room_id: String,
    },

    // Subscription lifecycle
    RoomSubscriptionOpened {
        token: u64,
        result: Result<SubscriptionHandle, BackendError>,
    },
    RosterSubscriptionOpened {
        token: u64,
        result: Result<SubscriptionHandle, BackendError>,
    },

    // Persistence results
    MessageSent {
        epoch: u64,
        room_id: String,
        temp_id: String,
        result: Result<StoredMessage, BackendError>,
    },
    PageFetched {
        epoch: u64,
        room_id: String,
        token: u64,
        offset: usize,
        result: Result<Vec<StoredMessage>, BackendError>,
    },
    MessageDeleted {
        epoch: u64,
        room_id: String,
        message_id: String,
        result: Result<(), BackendError>,
    },
    RoomsLoaded {
        epoch: u64,
        result: Result<Vec<Room>, BackendError>,
    },
    RoomCreated {
        epoch: u64,
        temp_id: String,
        result: Result<Room, BackendError>,
    },
    RoomDeleted {
        epoch: u64,
        room_id: String,
        result: Result<(), BackendError>,
    },

    // Timers
    TypingExpired {
        token: u64,
        name: String,
        generation: u64,
    },
    TypingIdle {
        generation: u64,
    },
}
