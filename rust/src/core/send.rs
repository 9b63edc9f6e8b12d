// Optimistic writes.
//
// A send is shown at once under a temporary id and resolved by whichever of
// two signals lands first: the persistence ack or our own insert echoed back
// over the subscription. Both paths converge on exactly one row per stored
// message.

use rand::Rng;
use roomsync_backend_traits::{BackendError, StoredMessage};

use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingSend {
    pub(crate) temp_id: String,
    pub(crate) room_id: String,
    pub(crate) text: String,
    pub(crate) created_at: i64,
    /// Confirmed id adopted from an echo that arrived before the ack.
    pub(crate) echo_id: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct SendCoordinator {
    pending: Vec<PendingSend>,
}

impl SendCoordinator {
    pub(crate) fn begin(&mut self, room_id: &str, text: &str, now: i64) -> PendingSend {
        let send = PendingSend {
            temp_id: temp_id(now),
            room_id: room_id.to_string(),
            text: text.to_string(),
            created_at: now,
            echo_id: None,
        };
        self.pending.push(send.clone());
        send
    }

    /// Pair an own insert echo with the oldest unmatched send of the same text.
    pub(crate) fn match_echo(&mut self, stored: &StoredMessage, window_ms: i64) -> Option<String> {
        let send = self.pending.iter_mut().find(|send| {
            send.echo_id.is_none()
                && send.room_id == stored.room_id
                && send.text == stored.text
                && (stored.created_at - send.created_at).abs() <= window_ms
        })?;
        send.echo_id = Some(stored.id.clone());
        Some(send.temp_id.clone())
    }

    pub(crate) fn finish(&mut self, temp_id: &str) -> Option<PendingSend> {
        let idx = self.pending.iter().position(|s| s.temp_id == temp_id)?;
        Some(self.pending.remove(idx))
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

fn temp_id(now: i64) -> String {
    let salt: u32 = rand::thread_rng().gen();
    format!("local-{now}-{salt:08x}")
}

impl AppCore {
    pub(super) fn send_message(&mut self, text: String) {
        if text.trim().is_empty() {
            tracing::debug!("empty message not sent");
            return;
        }
        let (Some(session), Some(active)) = (self.session.as_ref(), self.active.as_mut()) else {
            return;
        };

        let now = now_millis();
        let room_id = active.store.room_id().to_string();
        let send = self.sends.begin(&room_id, &text, now);
        active.store.append_optimistic(ChatMessage {
            identity: MessageIdentity::Optimistic {
                temp_id: send.temp_id.clone(),
            },
            room_id: room_id.clone(),
            author_id: session.identity.user_id.clone(),
            display_author: session.identity.display_name.clone(),
            text: text.clone(),
            created_at: now,
            is_mine: true,
            delivery: DeliveryState::Sending,
        });
        tracing::info!(%room_id, temp_id = %send.temp_id, "send_message");

        let persistence = session.persistence.clone();
        let identity = session.identity.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = persistence.insert_message(&identity, &room_id, &text).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::MessageSent {
                epoch,
                room_id,
                temp_id: send.temp_id,
                result,
            })));
        });

        self.stop_local_typing();
        self.emit_state();
    }

    pub(super) fn handle_message_sent(
        &mut self,
        epoch: u64,
        room_id: &str,
        temp_id: &str,
        result: Result<StoredMessage, BackendError>,
    ) {
        if epoch != self.epoch {
            return;
        }
        let Some(send) = self.sends.finish(temp_id) else {
            return;
        };

        let confirmed = match result {
            Ok(confirmed) => confirmed,
            Err(e) => {
                tracing::warn!(%room_id, %temp_id, %e, "send failed");
                if let Some(store) = self.store_for(room_id) {
                    match send.echo_id.as_deref() {
                        Some(echo_id) => {
                            store.remove_by_id(echo_id);
                        }
                        None => {
                            store.drop_optimistic(temp_id);
                        }
                    }
                }
                self.report_error(ChatError::from_backend("Send", e));
                return;
            }
        };

        tracing::info!(%room_id, message_id = %confirmed.id, "message_confirmed");
        let display_author = match self.session.as_ref() {
            Some(session) => session.identity.display_name.clone(),
            None => return,
        };
        let Some(store) = self.store_for(room_id) else {
            return;
        };
        let already_present = store.contains(&confirmed.id);
        match (send.echo_id.as_deref(), already_present) {
            (Some(echo_id), _) if echo_id == confirmed.id => {
                store.set_delivery(echo_id, DeliveryState::Sent);
            }
            // Two identical texts whose echoes were paired the other way
            // round. Our row is whichever echo carries the acked id.
            (Some(_), true) => {
                store.set_delivery(&confirmed.id, DeliveryState::Sent);
            }
            (Some(_), false) => {
                store.insert_sorted(ChatMessage::confirmed(confirmed, display_author, true));
            }
            // A paired echo of another send already rendered this row.
            (None, true) => {
                store.drop_optimistic(temp_id);
                store.set_delivery(&confirmed.id, DeliveryState::Sent);
            }
            (None, false) => {
                store.reconcile(temp_id, &confirmed);
            }
        }
        self.emit_state();
    }

    /// Merge an insert from the room feed. Returns `true` if the store changed.
    pub(super) fn merge_remote_message(&mut self, stored: StoredMessage) -> bool {
        let window_ms = self.config.echo_match_window_ms();
        let (Some(session), Some(active)) = (self.session.as_mut(), self.active.as_mut()) else {
            return false;
        };
        if stored.room_id != active.store.room_id() || active.store.contains(&stored.id) {
            return false;
        }

        if stored.author_id == session.identity.user_id {
            if let Some(temp_id) = self.sends.match_echo(&stored, window_ms) {
                tracing::debug!(%temp_id, message_id = %stored.id, "echo matched pending send");
                // The optimistic row is gone if the room was reopened since.
                if active.store.adopt_identity(&temp_id, &stored) {
                    return true;
                }
            }
        }
        let message = session.to_chat_message(stored);
        active.store.merge_remote(message)
    }

    pub(super) fn delete_message(&mut self, message_id: &str) {
        let (Some(session), Some(active)) = (self.session.as_ref(), self.active.as_mut()) else {
            return;
        };
        let Some(message) = active.store.get(message_id) else {
            return;
        };
        if message.identity.is_optimistic() {
            tracing::debug!(%message_id, "cannot delete unsent message");
            return;
        }
        let room_id = active.store.room_id().to_string();
        active.store.remove_by_id(message_id);
        tracing::info!(%room_id, %message_id, "delete_message");

        let persistence = session.persistence.clone();
        let identity = session.identity.clone();
        let message_id = message_id.to_string();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = persistence.delete_message(&identity, &message_id).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::MessageDeleted {
                epoch,
                room_id,
                message_id,
                result,
            })));
        });
        self.emit_state();
    }

    pub(super) fn handle_message_deleted(
        &mut self,
        epoch: u64,
        room_id: &str,
        message_id: &str,
        result: Result<(), BackendError>,
    ) {
        if epoch != self.epoch {
            return;
        }
        let Err(e) = result else {
            return;
        };
        tracing::warn!(%room_id, %message_id, %e, "delete failed");
        // The row was removed optimistically; resync the newest page.
        if self.store_for(room_id).is_some() {
            self.reload_first_page();
        }
        self.report_error(ChatError::from_backend("Delete message", e));
    }

    fn store_for(&mut self, room_id: &str) -> Option<&mut MessageStore> {
        self.active
            .as_mut()
            .map(|active| &mut active.store)
            .filter(|store| store.room_id() == room_id)
    }
}
