mod config;
mod event_queue;
mod message_store;
mod pagination;
mod rooms;
mod send;
mod session;
mod subscription;
mod typing;

use std::sync::{Arc, RwLock};

use flume::Sender;

use crate::actions::AppAction;
use crate::error::ChatError;
use crate::state::{
    now_millis, AppState, AuthState, ChatMessage, DeliveryState, LiveStatus, MessageIdentity,
    RoomSummary, RoomViewState, SubscriptionStatus,
};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};
use crate::Backend;

use event_queue::EventQueue;
use message_store::MessageStore;
use pagination::PaginationCursor;
use rooms::PendingRoom;
use send::SendCoordinator;
use session::SessionContext;
use subscription::{Feed, RoomSubscriptionManager};
use typing::{ComposerTyping, TypingTracker};

/// Everything scoped to the selected room. Replaced wholesale on room switch.
struct ActiveRoom {
    store: MessageStore,
    cursor: PaginationCursor,
    typing: TypingTracker,
    queue: EventQueue,
}

impl ActiveRoom {
    fn new(room_id: &str, page_size: usize) -> Self {
        Self {
            store: MessageStore::new(room_id),
            cursor: PaginationCursor::new(page_size),
            typing: TypingTracker::default(),
            queue: EventQueue::default(),
        }
    }
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,
    backend: Backend,

    session: Option<SessionContext>,
    // Bumped on every session start/stop; results from older epochs are dropped.
    epoch: u64,

    subscriptions: RoomSubscriptionManager,
    active: Option<ActiveRoom>,
    sends: SendCoordinator,
    composer: ComposerTyping,
    pending_rooms: Vec<PendingRoom>,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        backend: Backend,
    ) -> Self {
        let config = config::load_app_config(&data_dir);
        tracing::debug!(?config, "config loaded");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
            .expect("tokio runtime");

        let this = Self {
            state: AppState::empty(),
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            backend,
            session: None,
            epoch: 0,
            subscriptions: RoomSubscriptionManager::default(),
            active: None,
            sends: SendCoordinator::default(),
            composer: ComposerTyping::default(),
            pending_rooms: Vec::new(),
        };

        // Ensure ChatApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.project_views();
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn emit_reauth_required(&mut self) {
        self.project_views();
        let rev = self.next_rev();
        // Keep snapshot rev in sync with the update stream even though this is a side-effect update.
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::ReauthRequired { rev });
    }

    /// Refresh the derived parts of `state` from actor-owned components.
    fn project_views(&mut self) {
        let room_status = self.subscriptions.status(Feed::Room);
        self.state.current_room = self.active.as_ref().map(|active| {
            let room_id = active.store.room_id();
            RoomViewState {
                room_id: room_id.to_string(),
                room_name: self
                    .state
                    .rooms
                    .iter()
                    .find(|r| r.id == room_id)
                    .map(|r| r.name.clone()),
                messages: active.store.messages().to_vec(),
                typing_names: active.typing.names(),
                has_more_messages: active.cursor.has_more(),
                loading_older: active.cursor.loading_older(),
                subscription: room_status.clone(),
            }
        });

        let feed_status = if self.session.is_none() {
            SubscriptionStatus::Idle
        } else if self.active.is_some() {
            room_status
        } else {
            self.subscriptions.status(Feed::Roster)
        };
        self.state.live = match feed_status {
            SubscriptionStatus::Active => LiveStatus::Live,
            SubscriptionStatus::Subscribing => LiveStatus::Connecting,
            SubscriptionStatus::Error { reason } => LiveStatus::Degraded { reason },
            SubscriptionStatus::Idle | SubscriptionStatus::Closed => LiveStatus::Offline,
        };
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Keep toast in state until the UI explicitly clears it. This makes the UX
        // robust to rev-gap resyncs (state() snapshot still contains the toast).
        self.state.toast = Some(msg.into());
        self.emit_state();
    }

    /// Surface a boundary failure. Credential rejection ends the session.
    fn report_error(&mut self, err: ChatError) {
        if err.is_session_fatal() {
            self.expire_session();
            return;
        }
        tracing::warn!(%err, "chat_error");
        self.toast(err.to_string());
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                // Never log `?action` directly: it carries credentials and message text.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
            CoreMsg::Shutdown => {}
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        if action.requires_session() && self.session.is_none() {
            tracing::debug!(action = action.tag(), "ignored without a session");
            return;
        }
        match action {
            // Session
            AppAction::StartSession { identity } => {
                if let Err(e) = self.start_session(identity) {
                    tracing::error!(err = %format!("{e:#}"), "start_session failed");
                    self.toast(format!("Sign-in failed: {e:#}"));
                }
            }
            AppAction::EndSession => self.end_session(),
            AppAction::CredentialExpired => self.expire_session(),

            // Rooms
            AppAction::SelectRoom { room_id } => self.select_room(&room_id),
            AppAction::LeaveRoom => self.leave_room(),
            AppAction::CreateRoom { name, description } => self.create_room(name, description),
            AppAction::DeleteRoom { room_id } => self.delete_room(&room_id),

            // Messages
            AppAction::SendMessage { text } => self.send_message(text),
            AppAction::LoadOlderMessages => self.load_older_messages(),
            AppAction::DeleteMessage { message_id } => self.delete_message(&message_id),
            AppAction::ComposerChanged { text } => self.composer_changed(&text),

            // UI
            AppAction::ClearToast => {
                if self.state.toast.take().is_some() {
                    self.emit_state();
                }
            }

            // Lifecycle
            AppAction::ViewRemounted => self.view_remounted(),
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::RoomEvent { token, event } => self.handle_room_event(token, event),
            InternalEvent::RosterEvent { token, event } => self.handle_roster_event(token, event),
            InternalEvent::SubscriptionLost { token } => self.handle_subscription_lost(token),
            InternalEvent::DrainEventQueue { room_id } => self.drain_event_queue(&room_id),
            InternalEvent::RoomSubscriptionOpened { token, result }
            | InternalEvent::RosterSubscriptionOpened { token, result } => {
                self.handle_subscription_opened(token, result)
            }
            InternalEvent::MessageSent {
                epoch,
                room_id,
                temp_id,
                result,
            } => self.handle_message_sent(epoch, &room_id, &temp_id, result),
            InternalEvent::PageFetched {
                epoch,
                room_id,
                token,
                offset,
                result,
            } => self.handle_page_fetched(epoch, &room_id, token, offset, result),
            InternalEvent::MessageDeleted {
                epoch,
                room_id,
                message_id,
                result,
            } => self.handle_message_deleted(epoch, &room_id, &message_id, result),
            InternalEvent::RoomsLoaded { epoch, result } => self.handle_rooms_loaded(epoch, result),
            InternalEvent::RoomCreated {
                epoch,
                temp_id,
                result,
            } => self.handle_room_created(epoch, &temp_id, result),
            InternalEvent::RoomDeleted {
                epoch,
                room_id,
                result,
            } => self.handle_room_deleted(epoch, &room_id, result),
            InternalEvent::TypingExpired {
                token,
                name,
                generation,
            } => self.handle_typing_expired(token, &name, generation),
            InternalEvent::TypingIdle { generation } => self.handle_typing_idle(generation),
        }
    }
}
