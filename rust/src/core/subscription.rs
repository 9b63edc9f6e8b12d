// Live feeds: one per active room plus the room roster.
//
// Each opened feed gets a fresh token. Events, acks and disconnects carry that
// token back into the actor and anything tagged with a superseded token is
// dropped, so a slow subscribe for a room we already left can neither deliver
// into the new room nor leak a server-side subscription.

use roomsync_backend_traits::{BackendError, ChangeEvent, SubscriptionHandle, Topic};

use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Feed {
    Room,
    Roster,
}

#[derive(Debug)]
struct Slot {
    token: u64,
    status: SubscriptionStatus,
    handle: Option<SubscriptionHandle>,
}

impl Slot {
    fn opening(token: u64) -> Self {
        Self {
            token,
            status: SubscriptionStatus::Subscribing,
            handle: None,
        }
    }

    fn is_live_token(&self, token: u64) -> bool {
        self.token == token && self.status != SubscriptionStatus::Closed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OpenRequest {
    pub(crate) token: u64,
    /// Handle of the feed being replaced; must be unsubscribed first.
    pub(crate) teardown: Option<SubscriptionHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ack {
    Current(Feed),
    Stale,
}

#[derive(Debug, Default)]
pub(crate) struct RoomSubscriptionManager {
    next_token: u64,
    room: Option<Slot>,
    roster: Option<Slot>,
}

impl RoomSubscriptionManager {
    /// Tokens are shared with page fetches and never reused, even across sessions.
    pub(crate) fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    pub(crate) fn open(&mut self, feed: Feed) -> OpenRequest {
        let token = self.next_token();
        let slot = self.slot_mut(feed);
        let teardown = slot.take().and_then(|old| old.handle);
        *slot = Some(Slot::opening(token));
        OpenRequest { token, teardown }
    }

    pub(crate) fn close(&mut self, feed: Feed) -> Option<SubscriptionHandle> {
        let slot = self.slot_mut(feed).as_mut()?;
        slot.status = SubscriptionStatus::Closed;
        slot.handle.take()
    }

    pub(crate) fn close_all(&mut self) -> Vec<SubscriptionHandle> {
        let handles = [Feed::Room, Feed::Roster]
            .into_iter()
            .filter_map(|feed| self.close(feed))
            .collect();
        self.room = None;
        self.roster = None;
        handles
    }

    pub(crate) fn acknowledge(&mut self, token: u64, handle: SubscriptionHandle) -> Ack {
        let Some(feed) = self.feed_for(token) else {
            return Ack::Stale;
        };
        if let Some(slot) = self.slot_mut(feed).as_mut() {
            slot.status = SubscriptionStatus::Active;
            slot.handle = Some(handle);
        }
        Ack::Current(feed)
    }

    pub(crate) fn fail(&mut self, token: u64, reason: String) -> Option<Feed> {
        let feed = self.feed_for(token)?;
        let slot = self.slot_mut(feed).as_mut()?;
        slot.status = SubscriptionStatus::Error { reason };
        slot.handle = None;
        Some(feed)
    }

    /// The feed's channel closed. Only an active feed can be lost; a feed that
    /// is still subscribing resolves through its ack instead.
    pub(crate) fn lost(&mut self, token: u64) -> Option<Feed> {
        let feed = self.feed_for(token)?;
        if self.status(feed) != SubscriptionStatus::Active {
            return None;
        }
        self.fail(token, "disconnected".to_string())
    }

    pub(crate) fn room_token(&self) -> Option<u64> {
        self.room
            .as_ref()
            .filter(|s| s.status != SubscriptionStatus::Closed)
            .map(|s| s.token)
    }

    pub(crate) fn is_room_token(&self, token: u64) -> bool {
        self.room.as_ref().is_some_and(|s| s.is_live_token(token))
    }

    pub(crate) fn is_roster_token(&self, token: u64) -> bool {
        self.roster.as_ref().is_some_and(|s| s.is_live_token(token))
    }

    pub(crate) fn status(&self, feed: Feed) -> SubscriptionStatus {
        let slot = match feed {
            Feed::Room => &self.room,
            Feed::Roster => &self.roster,
        };
        slot.as_ref()
            .map(|s| s.status.clone())
            .unwrap_or(SubscriptionStatus::Idle)
    }

    fn feed_for(&self, token: u64) -> Option<Feed> {
        if self.is_room_token(token) {
            Some(Feed::Room)
        } else if self.is_roster_token(token) {
            Some(Feed::Roster)
        } else {
            None
        }
    }

    fn slot_mut(&mut self, feed: Feed) -> &mut Option<Slot> {
        match feed {
            Feed::Room => &mut self.room,
            Feed::Roster => &mut self.roster,
        }
    }
}

impl AppCore {
    /// Open (or reopen) a live feed, tearing down the one it replaces.
    pub(super) fn open_feed(&mut self, feed: Feed, topic: Topic) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let request = self.subscriptions.open(feed);
        let token = request.token;
        tracing::info!(%topic, token, "subscribe");

        let (event_tx, event_rx) = flume::bounded(self.config.event_queue_capacity());
        self.spawn_forwarder(feed, token, event_rx);

        let transport = session.transport.clone();
        let identity = session.identity.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            // Unsubscribe strictly before subscribing the replacement.
            if let Some(old) = request.teardown {
                transport.unsubscribe(old).await;
            }
            let result = transport.subscribe(&identity, topic, event_tx).await;
            let event = match feed {
                Feed::Room => InternalEvent::RoomSubscriptionOpened { token, result },
                Feed::Roster => InternalEvent::RosterSubscriptionOpened { token, result },
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
    }

    fn spawn_forwarder(&self, feed: Feed, token: u64, events: flume::Receiver<ChangeEvent>) {
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            while let Ok(event) = events.recv_async().await {
                let msg = match feed {
                    Feed::Room => InternalEvent::RoomEvent { token, event },
                    Feed::Roster => InternalEvent::RosterEvent { token, event },
                };
                if tx.send(CoreMsg::Internal(Box::new(msg))).is_err() {
                    return;
                }
            }
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SubscriptionLost {
                token,
            })));
        });
    }

    pub(super) fn close_feed(&mut self, feed: Feed) {
        let Some(handle) = self.subscriptions.close(feed) else {
            return;
        };
        self.release_handles(vec![handle]);
    }

    /// Unsubscribe in the background. Works without a session so late acks
    /// arriving after sign-out are still released.
    pub(super) fn release_handles(&self, handles: Vec<SubscriptionHandle>) {
        if handles.is_empty() {
            return;
        }
        let transport = self.backend.transport.clone();
        self.runtime.spawn(async move {
            for handle in handles {
                tracing::debug!(%handle, "unsubscribe");
                transport.unsubscribe(handle).await;
            }
        });
    }

    pub(super) fn handle_subscription_opened(
        &mut self,
        token: u64,
        result: Result<SubscriptionHandle, BackendError>,
    ) {
        let handle = match result {
            Ok(handle) => handle,
            Err(e) if e.is_session_fatal() => {
                if self.subscriptions.fail(token, e.to_string()).is_some() {
                    self.expire_session();
                }
                return;
            }
            Err(e) => {
                tracing::warn!(token, %e, "subscribe failed");
                if let Some(feed) = self.subscriptions.fail(token, e.to_string()) {
                    self.feed_degraded(feed, &e);
                }
                return;
            }
        };

        match self.subscriptions.acknowledge(token, handle) {
            Ack::Current(feed) => {
                tracing::info!(token, %handle, ?feed, "subscribed");
                self.emit_state();
            }
            Ack::Stale => {
                tracing::debug!(token, %handle, "releasing superseded subscription");
                self.release_handles(vec![handle]);
            }
        }
    }

    pub(super) fn handle_subscription_lost(&mut self, token: u64) {
        if let Some(feed) = self.subscriptions.lost(token) {
            tracing::warn!(token, ?feed, "subscription lost");
            self.feed_degraded(feed, &BackendError::Closed);
        }
    }

    fn feed_degraded(&mut self, feed: Feed, err: &BackendError) {
        match feed {
            Feed::Room => {
                self.reset_remote_typing();
                let room_id = self
                    .active
                    .as_ref()
                    .map(|a| a.store.room_id().to_string())
                    .unwrap_or_default();
                self.report_error(ChatError::degraded(room_id, err));
            }
            Feed::Roster => self.report_error(ChatError::degraded("rooms", err)),
        }
    }

    /// One reconnect attempt for a room feed left in `Error`. Reloading the
    /// newest page covers whatever was missed while the feed was down.
    pub(super) fn reconnect_room(&mut self) -> bool {
        if !self.subscriptions.status(Feed::Room).is_error() {
            return false;
        }
        let Some(room_id) = self.active.as_ref().map(|a| a.store.room_id().to_string()) else {
            return false;
        };
        tracing::info!(%room_id, "reconnect_room");
        self.reset_remote_typing();
        self.open_feed(Feed::Room, Topic::room(room_id));
        self.reload_first_page();
        true
    }

    pub(super) fn view_remounted(&mut self) {
        let mut changed = self.reconnect_room();
        if self.subscriptions.status(Feed::Roster).is_error() {
            self.open_feed(Feed::Roster, Topic::Roster);
            self.load_rooms();
            changed = true;
        }
        if changed {
            self.emit_state();
        }
    }

    pub(super) fn select_room(&mut self, room_id: &str) {
        let Some(summary) = self.state.rooms.iter().find(|r| r.id == room_id) else {
            self.toast("Room not found");
            return;
        };
        if summary.is_pending {
            tracing::debug!(%room_id, "room not created yet");
            return;
        }
        if self.active.as_ref().is_some_and(|a| a.store.room_id() == room_id) {
            if self.reconnect_room() {
                self.emit_state();
            }
            return;
        }

        tracing::info!(%room_id, "select_room");
        self.stop_local_typing();
        self.active = Some(ActiveRoom::new(room_id, self.config.page_size()));
        self.open_feed(Feed::Room, Topic::room(room_id));
        self.reload_first_page();
        self.emit_state();
    }

    pub(super) fn leave_room(&mut self) {
        if self.active.is_none() {
            return;
        }
        self.stop_local_typing();
        self.close_feed(Feed::Room);
        if let Some(active) = self.active.take() {
            tracing::info!(room_id = active.store.room_id(), "leave_room");
        }
        self.emit_state();
    }
}
