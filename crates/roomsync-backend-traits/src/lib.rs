//! Roomsync backend - the contracts a managed chat backend must satisfy so the
//! synchronization engine can sit on top of it.
//!
//! Two boundaries are modelled here:
//! - [`Persistence`]: row storage for rooms and messages
//! - [`Transport`]: the publish/subscribe change feed plus ephemeral broadcasts
//!
//! Both traits are object safe and are consumed as `Arc<dyn ...>` by the engine.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use async_trait::async_trait;

pub mod error;
pub mod events;
pub mod types;

pub use error::BackendError;
pub use events::{ChangeEvent, Record, Topic};
pub use types::{Identity, Room, StoredMessage, SubscriptionHandle, TypingSignal};

/// Sink the transport pushes change events into.
///
/// Implementations must deliver events for one topic in order and must drop
/// the sink when the subscription is released.
pub type EventSink = flume::Sender<ChangeEvent>;

/// Row storage for rooms and messages.
///
/// Every call carries the caller's [`Identity`] so the backend can reject an
/// invalid or expired credential with [`BackendError::Unauthorized`].
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Persist a new message authored by `identity` and return the confirmed row.
    async fn insert_message(
        &self,
        identity: &Identity,
        room_id: &str,
        text: &str,
    ) -> Result<StoredMessage, BackendError>;

    /// Fetch one page of a room's history.
    ///
    /// Rows are returned newest first; `offset` counts rows skipped from the
    /// newest end.
    async fn fetch_messages(
        &self,
        identity: &Identity,
        room_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, BackendError>;

    /// Delete a message by its confirmed id.
    async fn delete_message(&self, identity: &Identity, message_id: &str)
        -> Result<(), BackendError>;

    /// List every room visible to `identity`.
    async fn list_rooms(&self, identity: &Identity) -> Result<Vec<Room>, BackendError>;

    /// Create a room owned by `identity`.
    async fn create_room(
        &self,
        identity: &Identity,
        name: &str,
        description: Option<&str>,
    ) -> Result<Room, BackendError>;

    /// Delete a room by id.
    async fn delete_room(&self, identity: &Identity, room_id: &str) -> Result<(), BackendError>;
}

/// Publish/subscribe change feed.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a subscription on `topic`. The returned future resolving `Ok` is the
    /// transport's acknowledgement that the subscription is live.
    async fn subscribe(
        &self,
        identity: &Identity,
        topic: Topic,
        sink: EventSink,
    ) -> Result<SubscriptionHandle, BackendError>;

    /// Release a subscription. Releasing an unknown handle is a no-op.
    async fn unsubscribe(&self, handle: SubscriptionHandle);

    /// Broadcast an ephemeral typing signal to every subscriber of `topic`.
    ///
    /// Fire-and-forget: there is no acknowledgement and no retry. The result
    /// only reports whether the signal left this process.
    async fn broadcast(
        &self,
        identity: &Identity,
        topic: Topic,
        signal: TypingSignal,
    ) -> Result<(), BackendError>;
}
