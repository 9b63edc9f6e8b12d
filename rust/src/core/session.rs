// Session lifecycle.
//
// Every result a boundary call sends back carries the epoch it was issued
// under. Starting or stopping a session bumps the epoch, which orphans all
// in-flight work belonging to the previous one.

use std::collections::HashMap;
use std::sync::Arc;

use roomsync_backend_traits::{Identity, Persistence, StoredMessage, Topic, Transport};

use super::*;

pub(super) struct SessionContext {
    pub(super) identity: Identity,
    pub(super) persistence: Arc<dyn Persistence>,
    pub(super) transport: Arc<dyn Transport>,
    // author_id -> display name, resolved once per session
    author_names: HashMap<String, String>,
}

impl SessionContext {
    fn new(identity: Identity, backend: &Backend) -> Self {
        Self {
            identity,
            persistence: backend.persistence.clone(),
            transport: backend.transport.clone(),
            author_names: HashMap::new(),
        }
    }

    pub(super) fn is_me(&self, author_id: &str) -> bool {
        self.identity.user_id == author_id
    }

    /// Cache the row's author name, upgrading an id-only fallback.
    pub(super) fn remember_author(&mut self, stored: &StoredMessage) -> String {
        if self.is_me(&stored.author_id) {
            return self.identity.display_name.clone();
        }
        let name = self
            .author_names
            .entry(stored.author_id.clone())
            .or_insert_with(|| stored.author_id.clone());
        if let Some(fresh) = stored.author_name.as_deref() {
            if *name == stored.author_id && !fresh.is_empty() {
                *name = fresh.to_string();
            }
        }
        name.clone()
    }

    pub(super) fn to_chat_message(&mut self, stored: StoredMessage) -> ChatMessage {
        let display_author = self.remember_author(&stored);
        let is_mine = self.is_me(&stored.author_id);
        ChatMessage::confirmed(stored, display_author, is_mine)
    }
}

impl AppCore {
    pub(super) fn start_session(&mut self, identity: Identity) -> anyhow::Result<()> {
        // Tear down any existing session first.
        self.stop_session();

        anyhow::ensure!(
            !identity.user_id.trim().is_empty(),
            "identity has no user id"
        );
        anyhow::ensure!(
            !identity.credential.is_empty(),
            "identity has no credential"
        );

        tracing::info!(user_id = %identity.user_id, epoch = self.epoch, "start_session");
        self.state.auth = AuthState::SignedIn {
            user_id: identity.user_id.clone(),
            display_name: identity.display_name.clone(),
        };
        self.session = Some(SessionContext::new(identity, &self.backend));

        self.open_feed(Feed::Roster, Topic::Roster);
        self.load_rooms();
        self.emit_state();
        Ok(())
    }

    /// Drop all session-scoped state. Leaves `auth` to the caller.
    pub(super) fn stop_session(&mut self) {
        self.epoch += 1;
        self.stop_local_typing();
        let handles = self.subscriptions.close_all();
        self.release_handles(handles);

        self.active = None;
        self.sends.clear();
        self.pending_rooms.clear();
        self.state.rooms.clear();
        self.state.toast = None;
        if let Some(session) = self.session.take() {
            tracing::info!(user_id = %session.identity.user_id, "stop_session");
        }
    }

    pub(super) fn end_session(&mut self) {
        self.stop_session();
        self.state.auth = AuthState::SignedOut;
        self.emit_state();
    }

    /// The credential was rejected. Everything stops until the host signs in again.
    pub(super) fn expire_session(&mut self) {
        if self.session.is_none() {
            return;
        }
        tracing::warn!("session_expired");
        self.stop_session();
        self.state.auth = AuthState::Expired;
        self.state.toast = Some(ChatError::SessionExpired.to_string());
        self.emit_reauth_required();
        self.emit_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomsync_memory_backend::MemoryBackend;

    fn context(user_id: &str, display_name: &str) -> SessionContext {
        let backend = Arc::new(MemoryBackend::new());
        SessionContext::new(
            Identity::new(user_id, display_name, "token"),
            &Backend::new(backend.clone(), backend),
        )
    }

    fn stored(author_id: &str, author_name: Option<&str>) -> StoredMessage {
        StoredMessage {
            id: "m1".into(),
            room_id: "r1".into(),
            author_id: author_id.into(),
            author_name: author_name.map(str::to_string),
            text: "hi".into(),
            created_at: 1,
        }
    }

    #[test]
    fn own_messages_use_identity_name() {
        let mut ctx = context("u1", "Alice");
        let msg = ctx.to_chat_message(stored("u1", Some("stale name")));
        assert!(msg.is_mine);
        assert_eq!(msg.display_author, "Alice");
    }

    #[test]
    fn author_name_is_resolved_once() {
        let mut ctx = context("u1", "Alice");
        assert_eq!(ctx.remember_author(&stored("u2", Some("Bob"))), "Bob");
        // A later rename in a row does not change the cached name.
        assert_eq!(ctx.remember_author(&stored("u2", Some("Robert"))), "Bob");
    }

    #[test]
    fn missing_name_falls_back_to_id_until_known() {
        let mut ctx = context("u1", "Alice");
        assert_eq!(ctx.remember_author(&stored("u3", None)), "u3");
        assert_eq!(ctx.remember_author(&stored("u3", Some("Carol"))), "Carol");
        let msg = ctx.to_chat_message(stored("u3", None));
        assert!(!msg.is_mine);
        assert_eq!(msg.display_author, "Carol");
    }
}
