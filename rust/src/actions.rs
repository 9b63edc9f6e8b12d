use roomsync_backend_traits::Identity;

#[derive(Debug, Clone)]
pub enum AppAction {
    // Session
    StartSession {
        identity: Identity,
    },
    EndSession,
    /// The host's identity layer reports the credential as invalid.
    CredentialExpired,

    // Rooms
    SelectRoom {
        room_id: String,
    },
    LeaveRoom,
    CreateRoom {
        name: String,
        description: Option<String>,
    },
    DeleteRoom {
        room_id: String,
    },

    // Messages
    SendMessage {
        text: String,
    },
    LoadOlderMessages,
    DeleteMessage {
        message_id: String,
    },

    // Composer
    ComposerChanged {
        text: String,
    },

    // UI
    ClearToast,

    // Lifecycle
    ViewRemounted,
}

impl AppAction {
    /// Log-safe action tag (never includes message text or credentials).
    pub fn tag(&self) -> &'static str {
        match self {
            // Session
            AppAction::StartSession { .. } => "StartSession",
            AppAction::EndSession => "EndSession",
            AppAction::CredentialExpired => "CredentialExpired",

            // Rooms
            AppAction::SelectRoom { .. } => "SelectRoom",
            AppAction::LeaveRoom => "LeaveRoom",
            AppAction::CreateRoom { .. } => "CreateRoom",
            AppAction::DeleteRoom { .. } => "DeleteRoom",

            // Messages
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::LoadOlderMessages => "LoadOlderMessages",
            AppAction::DeleteMessage { .. } => "DeleteMessage",

            // Composer
            AppAction::ComposerChanged { .. } => "ComposerChanged",

            // UI
            AppAction::ClearToast => "ClearToast",

            // Lifecycle
            AppAction::ViewRemounted => "ViewRemounted",
        }
    }

    /// Actions that only make sense while signed in; dropped otherwise.
    pub(crate) fn requires_session(&self) -> bool {
        !matches!(
            self,
            AppAction::StartSession { .. }
                | AppAction::EndSession
                | AppAction::CredentialExpired
                | AppAction::ClearToast
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_never_carries_payload() {
        let action = AppAction::StartSession {
            identity: Identity::new("u1", "Alice", "secret-token"),
        };
        assert_eq!(action.tag(), "StartSession");
        assert!(!action.requires_session());

        let send = AppAction::SendMessage {
            text: "private words".into(),
        };
        assert_eq!(send.tag(), "SendMessage");
        assert!(send.requires_session());
    }
}
