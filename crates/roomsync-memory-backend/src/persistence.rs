use async_trait::async_trait;
use roomsync_backend_traits::{
    BackendError, ChangeEvent, Identity, Persistence, Record, Room, StoredMessage, Topic,
};

use crate::MemoryBackend;

#[async_trait]
impl Persistence for MemoryBackend {
    async fn insert_message(
        &self,
        identity: &Identity,
        room_id: &str,
        text: &str,
    ) -> Result<StoredMessage, BackendError> {
        self.check_identity()?;
        let (fault, ack_delay, echo_delay) = {
            let mut faults = self.faults.write();
            (
                faults.fail_next_insert.take(),
                faults.insert_ack_delay,
                faults.echo_delay,
            )
        };
        if let Some(err) = fault {
            if !ack_delay.is_zero() {
                tokio::time::sleep(ack_delay).await;
            }
            return Err(err);
        }

        let stored = {
            let mut inner = self.inner.write();
            if !inner.rooms.contains_key(room_id) {
                return Err(BackendError::NotFound(format!("room {room_id}")));
            }
            let stored = StoredMessage {
                id: inner.next_id("msg"),
                room_id: room_id.to_string(),
                author_id: identity.user_id.clone(),
                author_name: Some(identity.display_name.clone()),
                text: text.to_string(),
                created_at: inner.next_timestamp(),
            };
            inner
                .messages
                .entry(room_id.to_string())
                .or_default()
                .push(stored.clone());
            stored
        };

        self.publish_after(
            Topic::room(room_id),
            ChangeEvent::Insert(Record::Message(stored.clone())),
            echo_delay,
        );
        if !ack_delay.is_zero() {
            tokio::time::sleep(ack_delay).await;
        }
        Ok(stored)
    }

    async fn fetch_messages(
        &self,
        _identity: &Identity,
        room_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, BackendError> {
        self.check_identity()?;
        let (fault, delay, reply_delay) = {
            let mut faults = self.faults.write();
            (
                faults.fail_next_fetch.take(),
                faults.fetch_delays.get(room_id).copied(),
                faults.fetch_reply_delays.get(room_id).copied(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = fault {
            return Err(err);
        }

        let page: Vec<StoredMessage> = {
            let inner = self.inner.read();
            let Some(messages) = inner.messages.get(room_id) else {
                return Err(BackendError::NotFound(format!("room {room_id}")));
            };
            messages
                .iter()
                .rev()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect()
        };
        if let Some(delay) = reply_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(page)
    }

    async fn delete_message(
        &self,
        _identity: &Identity,
        message_id: &str,
    ) -> Result<(), BackendError> {
        self.check_identity()?;
        if let Some(err) = self.faults.write().fail_next_delete.take() {
            return Err(err);
        }

        let room_id = {
            let mut inner = self.inner.write();
            let mut found = None;
            for (room_id, messages) in inner.messages.iter_mut() {
                if let Some(pos) = messages.iter().position(|m| m.id == message_id) {
                    messages.remove(pos);
                    found = Some(room_id.clone());
                    break;
                }
            }
            found.ok_or_else(|| BackendError::NotFound(format!("message {message_id}")))?
        };

        self.publish(
            &Topic::room(room_id),
            ChangeEvent::Delete {
                id: message_id.to_string(),
            },
        );
        Ok(())
    }

    async fn list_rooms(&self, _identity: &Identity) -> Result<Vec<Room>, BackendError> {
        self.check_identity()?;
        let inner = self.inner.read();
        let mut rooms: Vec<Room> = inner.rooms.values().cloned().collect();
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rooms)
    }

    async fn create_room(
        &self,
        identity: &Identity,
        name: &str,
        description: Option<&str>,
    ) -> Result<Room, BackendError> {
        self.check_identity()?;
        if let Some(err) = self.faults.write().fail_next_create_room.take() {
            return Err(err);
        }

        let room = {
            let mut inner = self.inner.write();
            if inner.rooms.values().any(|r| r.name == name) {
                return Err(BackendError::Rejected(format!("room name {name} taken")));
            }
            let room = Room {
                id: inner.next_id("room"),
                name: name.to_string(),
                description: description.map(ToString::to_string),
                created_at: inner.next_timestamp(),
                created_by: identity.user_id.clone(),
            };
            inner.rooms.insert(room.id.clone(), room.clone());
            inner.messages.insert(room.id.clone(), Vec::new());
            room
        };

        self.publish(&Topic::Roster, ChangeEvent::Insert(Record::Room(room.clone())));
        Ok(room)
    }

    async fn delete_room(&self, _identity: &Identity, room_id: &str) -> Result<(), BackendError> {
        self.check_identity()?;
        if let Some(err) = self.faults.write().fail_next_delete_room.take() {
            return Err(err);
        }

        {
            let mut inner = self.inner.write();
            if inner.rooms.remove(room_id).is_none() {
                return Err(BackendError::NotFound(format!("room {room_id}")));
            }
            inner.messages.remove(room_id);
        }

        self.publish(
            &Topic::Roster,
            ChangeEvent::Delete {
                id: room_id.to_string(),
            },
        );
        Ok(())
    }
}
