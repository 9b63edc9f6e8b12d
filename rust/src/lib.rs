//! Real-time room chat engine.
//!
//! A single actor thread owns all chat state. Hosts dispatch [`AppAction`]s,
//! receive full [`AppState`] snapshots through an [`AppReconciler`] and read the
//! latest snapshot synchronously with [`ChatApp::state`]. Storage and the live
//! pub/sub feed are supplied by the host as a [`Backend`].

mod actions;
mod core;
mod error;
mod logging;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};
use roomsync_backend_traits::{Persistence, Transport};

pub use actions::AppAction;
pub use error::ChatError;
pub use roomsync_backend_traits as backend;
pub use state::*;
pub use updates::AppUpdate;

use updates::CoreMsg;

/// Storage and transport the engine talks to.
#[derive(Clone)]
pub struct Backend {
    pub persistence: Arc<dyn Persistence>,
    pub transport: Arc<dyn Transport>,
}

impl Backend {
    pub fn new(persistence: Arc<dyn Persistence>, transport: Arc<dyn Transport>) -> Self {
        Self {
            persistence,
            transport,
        }
    }
}

pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

pub struct ChatApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

impl ChatApp {
    pub fn new(data_dir: String, backend: Backend) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "ChatApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                backend,
            );
            while let Ok(msg) = core_rx.recv() {
                if matches!(msg, CoreMsg::Shutdown) {
                    break;
                }
                core.handle_message(msg);
            }
            tracing::debug!("actor stopped");
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }
}

impl Drop for ChatApp {
    fn drop(&mut self) {
        // The actor holds its own sender, so the channel never closes on its own.
        let _ = self.core_tx.send(CoreMsg::Shutdown);
    }
}
