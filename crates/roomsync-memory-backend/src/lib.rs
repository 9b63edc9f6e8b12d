//! In-process implementation of the roomsync backend boundaries.
//!
//! [`MemoryBackend`] implements both [`Persistence`] and [`Transport`] over a
//! single lock-protected store. Every write is echoed to the subscribers of the
//! affected topic in write order, which is the delivery guarantee the engine
//! relies on. Fault and latency knobs let tests reproduce the races a real
//! managed backend produces (echo before acknowledgement, slow pages, dropped
//! subscriptions, revoked credentials).

#![deny(unsafe_code)]

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use roomsync_backend_traits::{
    BackendError, ChangeEvent, EventSink, Record, Room, StoredMessage, SubscriptionHandle, Topic,
};

mod faults;
mod persistence;
mod transport;

pub use faults::Faults;

#[derive(Debug)]
struct Subscriber {
    topic: Topic,
    sink: EventSink,
}

#[derive(Debug, Default)]
struct MemoryBackendInner {
    rooms: BTreeMap<String, Room>,
    // room_id -> messages in creation order (oldest first)
    messages: HashMap<String, Vec<StoredMessage>>,
    subscribers: HashMap<SubscriptionHandle, Subscriber>,
    next_id: u64,
    last_timestamp: i64,
}

impl MemoryBackendInner {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:06}", self.next_id)
    }

    // Strictly increasing so history order is total even within one millisecond.
    fn next_timestamp(&mut self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }

    fn sinks_for(&self, topic: &Topic) -> Vec<EventSink> {
        self.subscribers
            .values()
            .filter(|s| &s.topic == topic)
            .map(|s| s.sink.clone())
            .collect()
    }
}

/// In-memory chat backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: RwLock<MemoryBackendInner>,
    faults: RwLock<Faults>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room without going through an identity (test seeding).
    ///
    /// The roster insert is published like any other write.
    pub fn seed_room(&self, name: &str, created_by: &str) -> Room {
        let room = {
            let mut inner = self.inner.write();
            let room = Room {
                id: inner.next_id("room"),
                name: name.to_string(),
                description: None,
                created_at: inner.next_timestamp(),
                created_by: created_by.to_string(),
            };
            inner.rooms.insert(room.id.clone(), room.clone());
            inner.messages.insert(room.id.clone(), Vec::new());
            room
        };
        self.publish(&Topic::Roster, ChangeEvent::Insert(Record::Room(room.clone())));
        room
    }

    /// Append `count` history messages to a room without publishing them.
    pub fn seed_messages(
        &self,
        room_id: &str,
        author_id: &str,
        author_name: &str,
        count: usize,
    ) -> Vec<StoredMessage> {
        let mut inner = self.inner.write();
        let mut seeded = Vec::with_capacity(count);
        for i in 0..count {
            let msg = StoredMessage {
                id: inner.next_id("msg"),
                room_id: room_id.to_string(),
                author_id: author_id.to_string(),
                author_name: Some(author_name.to_string()),
                text: format!("history #{i}"),
                created_at: inner.next_timestamp(),
            };
            seeded.push(msg);
        }
        inner
            .messages
            .entry(room_id.to_string())
            .or_default()
            .extend(seeded.iter().cloned());
        seeded
    }

    /// Store and publish a message as if another participant had sent it.
    pub fn inject_message(
        &self,
        room_id: &str,
        author_id: &str,
        author_name: &str,
        text: &str,
    ) -> StoredMessage {
        let msg = {
            let mut inner = self.inner.write();
            let msg = StoredMessage {
                id: inner.next_id("msg"),
                room_id: room_id.to_string(),
                author_id: author_id.to_string(),
                author_name: Some(author_name.to_string()),
                text: text.to_string(),
                created_at: inner.next_timestamp(),
            };
            inner
                .messages
                .entry(room_id.to_string())
                .or_default()
                .push(msg.clone());
            msg
        };
        self.publish(
            &Topic::room(room_id),
            ChangeEvent::Insert(Record::Message(msg.clone())),
        );
        msg
    }

    /// Deliver a raw event to every subscriber of `topic` without touching storage.
    ///
    /// Used to reproduce redelivery by the transport.
    pub fn publish(&self, topic: &Topic, event: ChangeEvent) {
        let sinks = self.inner.read().sinks_for(topic);
        deliver(topic, &sinks, &event);
    }

    /// Drop every subscription on `topic`, as a transport disconnect would.
    pub fn disconnect_topic(&self, topic: &Topic) {
        let mut inner = self.inner.write();
        inner.subscribers.retain(|_, s| &s.topic != topic);
    }

    /// Number of live subscriptions on `topic`
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.inner
            .read()
            .subscribers
            .values()
            .filter(|s| &s.topic == topic)
            .count()
    }

    /// Number of stored messages in a room
    pub fn message_count(&self, room_id: &str) -> usize {
        self.inner
            .read()
            .messages
            .get(room_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Whether a room row exists
    pub fn has_room(&self, room_id: &str) -> bool {
        self.inner.read().rooms.contains_key(room_id)
    }

    /// Mutate the fault configuration
    pub fn with_faults(&self, f: impl FnOnce(&mut Faults)) {
        f(&mut self.faults.write());
    }

    /// Make every subsequent call fail with [`BackendError::Unauthorized`]
    pub fn revoke_credentials(&self) {
        self.faults.write().unauthorized = true;
    }

    fn publish_after(&self, topic: Topic, event: ChangeEvent, delay: Duration) {
        let sinks = self.inner.read().sinks_for(&topic);
        if delay.is_zero() {
            deliver(&topic, &sinks, &event);
            return;
        }
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            deliver(&topic, &sinks, &event);
        });
    }

    fn check_identity(&self) -> Result<(), BackendError> {
        if self.faults.read().unauthorized {
            return Err(BackendError::Unauthorized);
        }
        Ok(())
    }
}

fn deliver(topic: &Topic, sinks: &[EventSink], event: &ChangeEvent) {
    for sink in sinks {
        if let Err(e) = sink.try_send(event.clone()) {
            tracing::warn!(%topic, kind = event.kind(), %e, "event dropped by subscriber sink");
        }
    }
}
