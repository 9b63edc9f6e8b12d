// Inbound change events for the active room.
//
// Events are buffered and applied in one batch per actor tick: the first push
// schedules a drain message on the actor's own channel, so everything that
// arrives before that message is processed lands in the same batch and the UI
// never sees a half-merged state. FIFO, no reordering, no coalescing.

use std::collections::VecDeque;

use roomsync_backend_traits::{ChangeEvent, Record, StoredMessage};

use super::*;

#[derive(Debug, Default)]
pub(crate) struct EventQueue {
    pending: VecDeque<ChangeEvent>,
    drain_scheduled: bool,
}

impl EventQueue {
    /// Buffer an event. Returns `true` when the caller must schedule a drain.
    pub(crate) fn push(&mut self, event: ChangeEvent) -> bool {
        self.pending.push_back(event);
        if self.drain_scheduled {
            return false;
        }
        self.drain_scheduled = true;
        true
    }

    pub(crate) fn take_batch(&mut self) -> Vec<ChangeEvent> {
        self.drain_scheduled = false;
        self.pending.drain(..).collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

impl AppCore {
    pub(super) fn handle_room_event(&mut self, token: u64, event: ChangeEvent) {
        if !self.subscriptions.is_room_token(token) {
            tracing::debug!(token, kind = event.kind(), "dropping event from stale subscription");
            return;
        }
        let queue_empty = match self.active.as_ref() {
            Some(active) => active.queue.is_empty(),
            None => return,
        };

        match event {
            ChangeEvent::Broadcast(signal) => self.apply_typing_signal(signal),
            ChangeEvent::Insert(_) => self.enqueue_room_event(event),
            // Updates and deletes address an already-resolved identity and are
            // applied at once, unless inserts are still buffered ahead of them.
            _ if queue_empty => {
                if self.apply_room_event(event) {
                    self.emit_state();
                }
            }
            _ => self.enqueue_room_event(event),
        }
    }

    fn enqueue_room_event(&mut self, event: ChangeEvent) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.queue.push(event) {
            let _ = self
                .core_sender
                .send(CoreMsg::Internal(Box::new(InternalEvent::DrainEventQueue {
                    room_id: active.store.room_id().to_string(),
                })));
        }
    }

    pub(super) fn drain_event_queue(&mut self, room_id: &str) {
        let batch = match self.active.as_mut() {
            Some(active) if active.store.room_id() == room_id => active.queue.take_batch(),
            _ => return,
        };
        if batch.is_empty() {
            return;
        }

        let batch_len = batch.len();
        let mut changed = false;
        for event in batch {
            changed |= self.apply_room_event(event);
        }
        tracing::debug!(%room_id, batch_len, changed, "event_queue_drained");
        if changed {
            self.emit_state();
        }
    }

    fn apply_room_event(&mut self, event: ChangeEvent) -> bool {
        match event {
            ChangeEvent::Insert(Record::Message(stored)) => self.merge_remote_message(stored),
            ChangeEvent::Update(Record::Message(stored)) => self.patch_message(&stored),
            ChangeEvent::Delete { id } => {
                let Some(active) = self.active.as_mut() else {
                    return false;
                };
                active.store.remove_by_id(&id).is_some()
            }
            ChangeEvent::Broadcast(signal) => {
                self.apply_typing_signal(signal);
                false
            }
            other => {
                tracing::warn!(kind = other.kind(), "unexpected row on room topic");
                false
            }
        }
    }

    fn patch_message(&mut self, stored: &StoredMessage) -> bool {
        let (Some(session), Some(active)) = (self.session.as_mut(), self.active.as_mut()) else {
            return false;
        };
        if stored.room_id != active.store.room_id() {
            return false;
        }
        session.remember_author(stored);
        active.store.patch(stored)
    }
}
