#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use roomsync_core::backend::Identity;
use roomsync_core::{
    AppAction, AppReconciler, AppState, AppUpdate, AuthState, Backend, ChatApp, ChatMessage,
    LiveStatus, SubscriptionStatus,
};
use roomsync_memory_backend::MemoryBackend;
use tempfile::TempDir;

pub fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub fn write_config(data_dir: &str, v: serde_json::Value) {
    let path = std::path::Path::new(data_dir).join("roomsync_config.json");
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

pub struct TestReconciler {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl TestReconciler {
    pub fn new() -> (Self, Arc<Mutex<Vec<AppUpdate>>>) {
        let updates = Arc::new(Mutex::new(vec![]));
        (
            Self {
                updates: updates.clone(),
            },
            updates,
        )
    }
}

impl AppReconciler for TestReconciler {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

/// One signed-in participant backed by a shared `MemoryBackend`.
pub struct Client {
    pub app: Arc<ChatApp>,
    pub updates: Arc<Mutex<Vec<AppUpdate>>>,
    pub user_id: String,
    _dir: TempDir,
}

pub fn backend() -> Arc<MemoryBackend> {
    Arc::new(MemoryBackend::new())
}

pub fn sign_in(backend: &Arc<MemoryBackend>, user_id: &str, display_name: &str) -> Client {
    sign_in_with_config(backend, user_id, display_name, None)
}

pub fn sign_in_with_config(
    backend: &Arc<MemoryBackend>,
    user_id: &str,
    display_name: &str,
    config: Option<serde_json::Value>,
) -> Client {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().to_string_lossy().to_string();
    if let Some(config) = config {
        write_config(&data_dir, config);
    }

    let app = ChatApp::new(data_dir, Backend::new(backend.clone(), backend.clone()));
    let (reconciler, updates) = TestReconciler::new();
    app.listen_for_updates(Box::new(reconciler));

    app.dispatch(AppAction::StartSession {
        identity: Identity::new(user_id, display_name, format!("token-{user_id}")),
    });
    wait_until("signed in and live", Duration::from_secs(2), || {
        let s = app.state();
        matches!(s.auth, AuthState::SignedIn { .. }) && s.live == LiveStatus::Live
    });

    Client {
        app,
        updates,
        user_id: user_id.to_string(),
        _dir: dir,
    }
}

impl Client {
    pub fn state(&self) -> AppState {
        self.app.state()
    }

    pub fn wait_for_rooms(&self, count: usize) {
        wait_until("rooms loaded", Duration::from_secs(2), || {
            self.state().rooms.len() == count
        });
    }

    /// Select a room and wait until its feed is live and `loaded` holds.
    pub fn open_room(&self, room_id: &str, loaded: impl Fn(&[ChatMessage]) -> bool) {
        wait_until("room listed", Duration::from_secs(2), || {
            self.state().rooms.iter().any(|r| r.id == room_id)
        });
        self.app.dispatch(AppAction::SelectRoom {
            room_id: room_id.to_string(),
        });
        wait_until("room opened", Duration::from_secs(3), || {
            self.state().current_room.is_some_and(|room| {
                room.room_id == room_id
                    && room.subscription == SubscriptionStatus::Active
                    && loaded(&room.messages)
            })
        });
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state()
            .current_room
            .map(|room| room.messages)
            .unwrap_or_default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.text).collect()
    }

    pub fn count_text(&self, text: &str) -> usize {
        self.messages().iter().filter(|m| m.text == text).count()
    }

    pub fn typing_names(&self) -> Vec<String> {
        self.state()
            .current_room
            .map(|room| room.typing_names)
            .unwrap_or_default()
    }

    pub fn saw_reauth_required(&self) -> bool {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .any(|u| matches!(u, AppUpdate::ReauthRequired { .. }))
    }
}
