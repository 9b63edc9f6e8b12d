// Ordered message sequence for the active room.
//
// Invariants:
// - at most one entry per identity
// - `replace_all`/`prepend_older` produce ascending (created_at, id) order
// - entries only move on removal; reconcile and patch edit in place

use std::collections::HashSet;

use roomsync_backend_traits::StoredMessage;

use crate::state::{ChatMessage, DeliveryState, MessageIdentity};

#[derive(Debug)]
pub(crate) struct MessageStore {
    room_id: String,
    messages: Vec<ChatMessage>,
}

fn sort_ascending(messages: &mut [ChatMessage]) {
    messages.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id().cmp(b.id()))
    });
}

impl MessageStore {
    pub(crate) fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            messages: Vec::new(),
        }
    }

    pub(crate) fn room_id(&self) -> &str {
        &self.room_id
    }

    pub(crate) fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.messages.len()
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub(crate) fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.position(id).map(|i| &self.messages[i])
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id() == id)
    }

    fn optimistic_position(&self, temp_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| {
            matches!(&m.identity, MessageIdentity::Optimistic { temp_id: t } if t == temp_id)
        })
    }

    /// Replace the whole sequence with a fresh first page.
    ///
    /// Unresolved sends survive at the tail. So do confirmed rows newer than
    /// the page's newest entry: they were merged live after the backend read
    /// the page.
    pub(crate) fn replace_all(&mut self, mut page: Vec<ChatMessage>) {
        let mut seen = HashSet::new();
        page.retain(|m| seen.insert(m.id().to_string()));
        sort_ascending(&mut page);

        let newest = page.last().map(|m| (m.created_at, m.id().to_string()));
        let carried: Vec<ChatMessage> = self
            .messages
            .drain(..)
            .filter(|m| !seen.contains(m.id()))
            .filter(|m| {
                m.identity.is_optimistic()
                    || m.delivery == DeliveryState::Sending
                    || newest
                        .as_ref()
                        .map_or(true, |(at, id)| (m.created_at, m.id()) > (*at, id.as_str()))
            })
            .collect();
        self.messages = page;
        self.messages.extend(carried);
    }

    /// Splice an older page (wire order, newest first) onto the front.
    ///
    /// Rows already present are skipped; new arrivals shift offsets, so a
    /// backward page can overlap what is loaded. Returns the number spliced.
    pub(crate) fn prepend_older(&mut self, newest_first: Vec<ChatMessage>) -> usize {
        let mut older: Vec<ChatMessage> = Vec::with_capacity(newest_first.len());
        for msg in newest_first.into_iter().rev() {
            if self.contains(msg.id()) || older.iter().any(|m| m.id() == msg.id()) {
                continue;
            }
            older.push(msg);
        }
        let added = older.len();
        older.append(&mut self.messages);
        self.messages = older;
        added
    }

    pub(crate) fn append_optimistic(&mut self, mut message: ChatMessage) {
        debug_assert!(message.identity.is_optimistic());
        message.delivery = DeliveryState::Sending;
        self.messages.push(message);
    }

    /// Swap an optimistic entry for its confirmed row, keeping its position.
    pub(crate) fn reconcile(&mut self, temp_id: &str, confirmed: &StoredMessage) -> bool {
        let Some(pos) = self.optimistic_position(temp_id) else {
            return false;
        };
        let entry = &mut self.messages[pos];
        entry.identity = MessageIdentity::Confirmed {
            id: confirmed.id.clone(),
        };
        entry.created_at = confirmed.created_at;
        entry.delivery = DeliveryState::Sent;
        true
    }

    /// Give an optimistic entry its confirmed identity without changing its
    /// delivery state. Used when the echo of a send arrives before its
    /// acknowledgement.
    pub(crate) fn adopt_identity(&mut self, temp_id: &str, confirmed: &StoredMessage) -> bool {
        let Some(pos) = self.optimistic_position(temp_id) else {
            return false;
        };
        let entry = &mut self.messages[pos];
        entry.identity = MessageIdentity::Confirmed {
            id: confirmed.id.clone(),
        };
        entry.created_at = confirmed.created_at;
        true
    }

    pub(crate) fn drop_optimistic(&mut self, temp_id: &str) -> bool {
        let Some(pos) = self.optimistic_position(temp_id) else {
            return false;
        };
        self.messages.remove(pos);
        true
    }

    /// Tail-insert a remote row unless its identity is already present.
    pub(crate) fn merge_remote(&mut self, message: ChatMessage) -> bool {
        if self.contains(message.id()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Insert a confirmed row at its (created_at, id) position.
    pub(crate) fn insert_sorted(&mut self, message: ChatMessage) -> bool {
        if self.contains(message.id()) {
            return false;
        }
        let pos = self
            .messages
            .iter()
            .position(|m| {
                !m.identity.is_optimistic()
                    && (m.created_at, m.id()) > (message.created_at, message.id())
            })
            .unwrap_or_else(|| {
                self.messages
                    .iter()
                    .position(|m| m.identity.is_optimistic())
                    .unwrap_or(self.messages.len())
            });
        self.messages.insert(pos, message);
        true
    }

    pub(crate) fn remove_by_id(&mut self, id: &str) -> Option<ChatMessage> {
        let pos = self.position(id)?;
        Some(self.messages.remove(pos))
    }

    /// Apply a remote edit to a confirmed row. Only the text is mutable;
    /// author names stay as first resolved.
    pub(crate) fn patch(&mut self, update: &StoredMessage) -> bool {
        let Some(entry) = self
            .messages
            .iter_mut()
            .find(|m| m.identity.is_confirmed_as(&update.id))
        else {
            return false;
        };
        if entry.text == update.text {
            return false;
        }
        entry.text = update.text.clone();
        true
    }

    pub(crate) fn set_delivery(&mut self, id: &str, delivery: DeliveryState) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        self.messages[pos].delivery = delivery;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(id: &str, created_at: i64, text: &str) -> StoredMessage {
        StoredMessage {
            id: id.into(),
            room_id: "r1".into(),
            author_id: "u2".into(),
            author_name: Some("Bob".into()),
            text: text.into(),
            created_at,
        }
    }

    fn remote(id: &str, created_at: i64) -> ChatMessage {
        ChatMessage::confirmed(stored(id, created_at, id), "Bob".into(), false)
    }

    fn optimistic(temp_id: &str, created_at: i64, text: &str) -> ChatMessage {
        ChatMessage {
            identity: MessageIdentity::Optimistic {
                temp_id: temp_id.into(),
            },
            room_id: "r1".into(),
            author_id: "u1".into(),
            display_author: "Ada".into(),
            text: text.into(),
            created_at,
            is_mine: true,
            delivery: DeliveryState::Sent,
        }
    }

    fn ids(store: &MessageStore) -> Vec<&str> {
        store.messages().iter().map(|m| m.id()).collect()
    }

    #[test]
    fn replace_all_orders_ascending_with_id_tiebreak() {
        let mut store = MessageStore::new("r1");
        store.replace_all(vec![remote("c", 3), remote("b", 1), remote("a", 1)]);
        assert_eq!(ids(&store), vec!["a", "b", "c"]);
    }

    #[test]
    fn replace_all_keeps_pending_sends_at_tail() {
        let mut store = MessageStore::new("r1");
        store.replace_all(vec![remote("a", 1)]);
        store.append_optimistic(optimistic("local-1", 5, "hi"));

        store.replace_all(vec![remote("b", 2), remote("a", 1)]);
        assert_eq!(ids(&store), vec!["a", "b", "local-1"]);
    }

    #[test]
    fn replace_all_keeps_rows_merged_after_the_page_was_read() {
        let mut store = MessageStore::new("r1");
        // Arrived live while the first page was in flight.
        assert!(store.merge_remote(remote("live", 9)));

        store.replace_all(vec![remote("b", 2), remote("a", 1)]);
        assert_eq!(ids(&store), vec!["a", "b", "live"]);
    }

    #[test]
    fn replace_all_drops_rows_the_page_supersedes() {
        let mut store = MessageStore::new("r1");
        store.replace_all(vec![remote("a", 1), remote("gone", 2), remote("c", 3)]);

        // "gone" was deleted while we were away; the page covers its position.
        store.replace_all(vec![remote("c", 3), remote("a", 1)]);
        assert_eq!(ids(&store), vec!["a", "c"]);
    }

    #[test]
    fn prepend_older_reverses_and_skips_overlap() {
        let mut store = MessageStore::new("r1");
        store.replace_all(vec![remote("c", 3), remote("d", 4)]);

        // Wire order is newest first; "c" overlaps because a new row shifted the offset.
        let added = store.prepend_older(vec![remote("c", 3), remote("b", 2), remote("a", 1)]);
        assert_eq!(added, 2);
        assert_eq!(ids(&store), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn merge_remote_is_idempotent() {
        let mut store = MessageStore::new("r1");
        assert!(store.merge_remote(remote("m1", 1)));
        assert!(!store.merge_remote(remote("m1", 1)));
        assert!(!store.merge_remote(remote("m1", 1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn append_optimistic_forces_sending() {
        let mut store = MessageStore::new("r1");
        store.append_optimistic(optimistic("local-1", 1, "hi"));
        assert_eq!(store.messages()[0].delivery, DeliveryState::Sending);
    }

    #[test]
    fn reconcile_preserves_position_and_marks_sent() {
        let mut store = MessageStore::new("r1");
        store.replace_all(vec![remote("a", 1)]);
        store.append_optimistic(optimistic("local-1", 10, "hi"));
        store.merge_remote(remote("b", 11));

        assert!(store.reconcile("local-1", &stored("m9", 12, "hi")));
        assert_eq!(ids(&store), vec!["a", "m9", "b"]);
        let entry = store.get("m9").unwrap();
        assert_eq!(entry.delivery, DeliveryState::Sent);
        assert_eq!(entry.created_at, 12);
        assert!(!entry.identity.is_optimistic());

        // Second reconcile of the same temp id finds nothing.
        assert!(!store.reconcile("local-1", &stored("m9", 12, "hi")));
    }

    #[test]
    fn adopt_identity_keeps_sending() {
        let mut store = MessageStore::new("r1");
        store.append_optimistic(optimistic("local-1", 10, "hi"));
        assert!(store.adopt_identity("local-1", &stored("m9", 11, "hi")));
        let entry = store.get("m9").unwrap();
        assert_eq!(entry.delivery, DeliveryState::Sending);
        assert!(store.set_delivery("m9", DeliveryState::Sent));
        assert_eq!(store.get("m9").unwrap().delivery, DeliveryState::Sent);
    }

    #[test]
    fn drop_optimistic_only_touches_optimistic_entries() {
        let mut store = MessageStore::new("r1");
        store.merge_remote(remote("local-1", 1));
        store.append_optimistic(optimistic("local-1", 2, "x"));

        assert!(store.drop_optimistic("local-1"));
        assert_eq!(store.len(), 1);
        assert!(!store.messages()[0].identity.is_optimistic());
        assert!(!store.drop_optimistic("local-1"));
    }

    #[test]
    fn remove_by_id_handles_any_identity() {
        let mut store = MessageStore::new("r1");
        store.merge_remote(remote("m1", 1));
        store.append_optimistic(optimistic("local-1", 2, "x"));

        assert_eq!(store.remove_by_id("m1").map(|m| m.text), Some("m1".into()));
        assert!(store.remove_by_id("local-1").is_some());
        assert!(store.remove_by_id("missing").is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn patch_updates_confirmed_rows_only() {
        let mut store = MessageStore::new("r1");
        store.merge_remote(remote("m1", 1));
        store.append_optimistic(optimistic("local-1", 2, "x"));

        let mut edited = stored("m1", 1, "edited");
        edited.author_name = Some("Robert".into());
        assert!(store.patch(&edited));
        let entry = store.get("m1").unwrap();
        assert_eq!(entry.text, "edited");
        assert_ne!(entry.display_author, "Robert");
        // Redelivered edit is a no-op.
        assert!(!store.patch(&edited));

        assert!(!store.patch(&stored("local-1", 2, "nope")));
    }

    #[test]
    fn insert_sorted_lands_before_pending_tail() {
        let mut store = MessageStore::new("r1");
        store.replace_all(vec![remote("a", 1), remote("c", 3)]);
        store.append_optimistic(optimistic("local-1", 9, "x"));

        assert!(store.insert_sorted(remote("b", 2)));
        assert!(store.insert_sorted(remote("d", 4)));
        assert!(!store.insert_sorted(remote("d", 4)));
        assert_eq!(ids(&store), vec!["a", "b", "c", "d", "local-1"]);
    }
}
