use std::collections::BTreeMap;

use roomsync_backend_traits::{Topic, TypingSignal};

use super::*;

/// Remote participants currently typing in the active room.
///
/// Every `typing: true` signal bumps the participant's generation and the
/// caller arms an expiry timer for that generation; a timer that fires for an
/// older generation was superseded and does nothing.
#[derive(Debug, Default)]
pub(crate) struct TypingTracker {
    typing: BTreeMap<String, u64>,
    next_generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TypingChange {
    pub(crate) changed: bool,
    pub(crate) arm_expiry: Option<u64>,
}

impl TypingTracker {
    pub(crate) fn on_signal(&mut self, name: &str, typing: bool) -> TypingChange {
        if !typing {
            return TypingChange {
                changed: self.typing.remove(name).is_some(),
                arm_expiry: None,
            };
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        let previous = self.typing.insert(name.to_string(), generation);
        TypingChange {
            changed: previous.is_none(),
            arm_expiry: Some(generation),
        }
    }

    /// Drop `name` if its entry was not refreshed since `generation` was armed.
    pub(crate) fn expire(&mut self, name: &str, generation: u64) -> bool {
        if self.typing.get(name) != Some(&generation) {
            return false;
        }
        self.typing.remove(name);
        true
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.typing.keys().cloned().collect()
    }

    pub(crate) fn clear(&mut self) -> bool {
        let had_any = !self.typing.is_empty();
        self.typing.clear();
        had_any
    }
}

/// Our own composer state, driving outgoing typing broadcasts.
#[derive(Debug, Default)]
pub(crate) struct ComposerTyping {
    composing: bool,
    idle_generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ComposerEffect {
    pub(crate) broadcast: Option<bool>,
    pub(crate) arm_idle: Option<u64>,
}

impl ComposerTyping {
    pub(crate) fn on_text(&mut self, is_empty: bool) -> ComposerEffect {
        self.idle_generation += 1;
        if is_empty {
            let was_composing = std::mem::take(&mut self.composing);
            return ComposerEffect {
                broadcast: was_composing.then_some(false),
                arm_idle: None,
            };
        }
        let started = !self.composing;
        self.composing = true;
        ComposerEffect {
            broadcast: started.then_some(true),
            arm_idle: Some(self.idle_generation),
        }
    }

    /// The idle timer fired. Returns `true` when a stop broadcast is due.
    pub(crate) fn on_idle(&mut self, generation: u64) -> bool {
        if !self.composing || generation != self.idle_generation {
            return false;
        }
        self.composing = false;
        true
    }

    /// Forget composer state. Returns `true` if we had announced typing.
    pub(crate) fn reset(&mut self) -> bool {
        self.idle_generation += 1;
        std::mem::take(&mut self.composing)
    }
}

impl AppCore {
    pub(super) fn apply_typing_signal(&mut self, signal: TypingSignal) {
        let (Some(session), Some(active)) = (self.session.as_ref(), self.active.as_mut()) else {
            return;
        };
        if signal.participant_id == session.identity.user_id
            || signal.room_id != active.store.room_id()
        {
            return;
        }

        let Some(token) = self.subscriptions.room_token() else {
            return;
        };
        let change = active.typing.on_signal(&signal.name, signal.typing);
        if let Some(generation) = change.arm_expiry {
            // Keyed to the feed so timers from an earlier visit never fire here.
            let tx = self.core_sender.clone();
            let expiry = self.config.typing_expiry();
            let name = signal.name.clone();
            self.runtime.spawn(async move {
                tokio::time::sleep(expiry).await;
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::TypingExpired {
                    token,
                    name,
                    generation,
                })));
            });
        }
        if change.changed {
            self.emit_state();
        }
    }

    pub(super) fn handle_typing_expired(&mut self, token: u64, name: &str, generation: u64) {
        if !self.subscriptions.is_room_token(token) {
            return;
        }
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.typing.expire(name, generation) {
            tracing::debug!(room_id = active.store.room_id(), %name, "typing_expired");
            self.emit_state();
        }
    }

    /// Presence is ephemeral and does not survive a subscription change.
    pub(super) fn reset_remote_typing(&mut self) -> bool {
        self.active
            .as_mut()
            .map(|active| active.typing.clear())
            .unwrap_or(false)
    }

    pub(super) fn composer_changed(&mut self, text: &str) {
        if self.active.is_none() {
            return;
        }
        let effect = self.composer.on_text(text.is_empty());
        if let Some(typing) = effect.broadcast {
            self.broadcast_typing(typing);
        }
        if let Some(generation) = effect.arm_idle {
            let tx = self.core_sender.clone();
            let idle = self.config.typing_idle();
            self.runtime.spawn(async move {
                tokio::time::sleep(idle).await;
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::TypingIdle {
                    generation,
                })));
            });
        }
    }

    pub(super) fn handle_typing_idle(&mut self, generation: u64) {
        if self.composer.on_idle(generation) {
            self.broadcast_typing(false);
        }
    }

    pub(super) fn stop_local_typing(&mut self) {
        if self.composer.reset() {
            self.broadcast_typing(false);
        }
    }

    fn broadcast_typing(&self, typing: bool) {
        let (Some(session), Some(active)) = (self.session.as_ref(), self.active.as_ref()) else {
            return;
        };
        let room_id = active.store.room_id().to_string();
        let signal = TypingSignal {
            room_id: room_id.clone(),
            participant_id: session.identity.user_id.clone(),
            name: session.identity.display_name.clone(),
            typing,
        };
        let transport = session.transport.clone();
        let identity = session.identity.clone();
        self.runtime.spawn(async move {
            // Presence is best effort; a lost signal only delays the indicator.
            if let Err(e) = transport
                .broadcast(&identity, Topic::room(room_id.clone()), signal)
                .await
            {
                tracing::debug!(%room_id, %e, "typing broadcast failed");
            }
        });
    }
}
