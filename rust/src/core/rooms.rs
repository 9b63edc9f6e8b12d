use roomsync_backend_traits::{BackendError, ChangeEvent, Record, Room};

use super::*;

/// A room shown before the backend confirmed it.
#[derive(Debug, Clone)]
pub(super) struct PendingRoom {
    pub(super) temp_id: String,
    pub(super) name: String,
}

fn sort_rooms(rooms: &mut [RoomSummary]) {
    rooms.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

impl AppCore {
    pub(super) fn load_rooms(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let persistence = session.persistence.clone();
        let identity = session.identity.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = persistence.list_rooms(&identity).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::RoomsLoaded {
                epoch,
                result,
            })));
        });
    }

    pub(super) fn handle_rooms_loaded(&mut self, epoch: u64, result: Result<Vec<Room>, BackendError>) {
        if epoch != self.epoch {
            return;
        }
        let rooms = match result {
            Ok(rooms) => rooms,
            Err(e) => {
                self.report_error(ChatError::from_backend("Load rooms", e));
                return;
            }
        };
        tracing::info!(count = rooms.len(), "rooms_loaded");

        let mut summaries: Vec<RoomSummary> = rooms.into_iter().map(RoomSummary::from_room).collect();
        // Rooms still being created stay visible until their result arrives.
        summaries.extend(self.state.rooms.iter().filter(|r| r.is_pending).cloned());
        sort_rooms(&mut summaries);
        self.state.rooms = summaries;

        let active_gone = self
            .active
            .as_ref()
            .is_some_and(|a| !self.state.rooms.iter().any(|r| r.id == a.store.room_id()));
        if active_gone {
            self.leave_room();
        }
        self.emit_state();
    }

    pub(super) fn handle_roster_event(&mut self, token: u64, event: ChangeEvent) {
        if !self.subscriptions.is_roster_token(token) {
            tracing::debug!(token, kind = event.kind(), "dropping roster event from stale subscription");
            return;
        }
        let changed = match event {
            ChangeEvent::Insert(Record::Room(room)) | ChangeEvent::Update(Record::Room(room)) => {
                self.upsert_room(room)
            }
            ChangeEvent::Delete { id } => self.remove_room_locally(&id),
            other => {
                tracing::debug!(kind = other.kind(), "ignoring non-room roster event");
                false
            }
        };
        if changed {
            self.emit_state();
        }
    }

    fn upsert_room(&mut self, room: Room) -> bool {
        if let Some(existing) = self.state.rooms.iter_mut().find(|r| r.id == room.id) {
            let summary = RoomSummary::from_room(room);
            if *existing == summary {
                return false;
            }
            *existing = summary;
            return true;
        }

        // Our own optimistic create, echoed back before its result.
        let is_mine = self
            .session
            .as_ref()
            .is_some_and(|s| s.is_me(&room.created_by));
        if is_mine {
            if let Some(idx) = self.pending_rooms.iter().position(|p| p.name == room.name) {
                let pending = self.pending_rooms.remove(idx);
                self.state.rooms.retain(|r| r.id != pending.temp_id);
                tracing::debug!(temp_id = %pending.temp_id, room_id = %room.id, "room echo matched");
            }
        }
        self.state.rooms.push(RoomSummary::from_room(room));
        sort_rooms(&mut self.state.rooms);
        true
    }

    fn remove_room_locally(&mut self, room_id: &str) -> bool {
        let before = self.state.rooms.len();
        self.state.rooms.retain(|r| r.id != room_id);
        let removed = self.state.rooms.len() != before;
        if self.active.as_ref().is_some_and(|a| a.store.room_id() == room_id) {
            self.leave_room();
        }
        removed
    }

    pub(super) fn create_room(&mut self, name: String, description: Option<String>) {
        let name = name.trim().to_string();
        if name.is_empty() {
            tracing::debug!("empty room name");
            return;
        }
        if self.state.rooms.iter().any(|r| r.name == name) {
            self.toast(format!("A room named {name} already exists"));
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };

        let now = now_millis();
        let temp_id = format!("local-room-{now}-{:08x}", rand::random::<u32>());
        let description = description.filter(|d| !d.trim().is_empty());
        tracing::info!(%temp_id, "create_room");

        let persistence = session.persistence.clone();
        let identity = session.identity.clone();
        self.state.rooms.push(RoomSummary {
            id: temp_id.clone(),
            name: name.clone(),
            description: description.clone(),
            created_at: now,
            created_by: identity.user_id.clone(),
            is_pending: true,
        });
        sort_rooms(&mut self.state.rooms);
        self.pending_rooms.push(PendingRoom {
            temp_id: temp_id.clone(),
            name: name.clone(),
        });

        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = persistence
                .create_room(&identity, &name, description.as_deref())
                .await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::RoomCreated {
                epoch,
                temp_id,
                result,
            })));
        });
        self.emit_state();
    }

    pub(super) fn handle_room_created(
        &mut self,
        epoch: u64,
        temp_id: &str,
        result: Result<Room, BackendError>,
    ) {
        if epoch != self.epoch {
            return;
        }
        self.pending_rooms.retain(|p| p.temp_id != temp_id);
        match result {
            Ok(room) => {
                tracing::info!(%temp_id, room_id = %room.id, "room_created");
                let already_listed = self.state.rooms.iter().any(|r| r.id == room.id);
                match self.state.rooms.iter().position(|r| r.id == temp_id) {
                    Some(idx) if already_listed => {
                        self.state.rooms.remove(idx);
                    }
                    Some(idx) => self.state.rooms[idx] = RoomSummary::from_room(room),
                    // Removed meanwhile; the roster feed is authoritative.
                    None => {}
                }
                sort_rooms(&mut self.state.rooms);
                self.emit_state();
            }
            Err(e) => {
                tracing::warn!(%temp_id, %e, "create room failed");
                self.state.rooms.retain(|r| r.id != temp_id);
                self.report_error(ChatError::from_backend("Create room", e));
            }
        }
    }

    pub(super) fn delete_room(&mut self, room_id: &str) {
        let Some(summary) = self.state.rooms.iter().find(|r| r.id == room_id) else {
            return;
        };
        if summary.is_pending {
            tracing::debug!(%room_id, "room not created yet");
            return;
        }
        let Some(session) = self.session.as_ref() else {
            return;
        };
        tracing::info!(%room_id, "delete_room");

        let persistence = session.persistence.clone();
        let identity = session.identity.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        let target = room_id.to_string();
        self.runtime.spawn(async move {
            let result = persistence.delete_room(&identity, &target).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::RoomDeleted {
                epoch,
                room_id: target,
                result,
            })));
        });

        self.remove_room_locally(room_id);
        self.emit_state();
    }

    pub(super) fn handle_room_deleted(
        &mut self,
        epoch: u64,
        room_id: &str,
        result: Result<(), BackendError>,
    ) {
        if epoch != self.epoch {
            return;
        }
        if let Err(e) = result {
            tracing::warn!(%room_id, %e, "delete room failed");
            // Restore the roster from the backend.
            self.load_rooms();
            self.report_error(ChatError::from_backend("Delete room", e));
        }
    }
}
