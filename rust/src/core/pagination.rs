use roomsync_backend_traits::{BackendError, StoredMessage};

use super::*;

/// Offset cursor over a room's history, newest first.
///
/// At most one fetch is in flight; it is identified by a token so a result
/// that arrives after a reload or room switch can be recognized and dropped.
#[derive(Debug)]
pub(crate) struct PaginationCursor {
    offset: usize,
    page_size: usize,
    has_more: bool,
    in_flight: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageRequest {
    pub(crate) offset: usize,
    pub(crate) limit: usize,
}

impl PaginationCursor {
    pub(crate) fn new(page_size: usize) -> Self {
        Self {
            offset: 0,
            page_size,
            has_more: true,
            in_flight: None,
        }
    }

    pub(crate) fn begin(&mut self, token: u64) -> Option<PageRequest> {
        if self.in_flight.is_some() || !self.has_more {
            return None;
        }
        self.in_flight = Some(token);
        Some(PageRequest {
            offset: self.offset,
            limit: self.page_size,
        })
    }

    /// A short page means the start of history was reached.
    pub(crate) fn complete(&mut self, token: u64, fetched: usize) -> bool {
        if self.in_flight != Some(token) {
            return false;
        }
        self.in_flight = None;
        self.offset += fetched;
        self.has_more = fetched == self.page_size;
        true
    }

    pub(crate) fn fail(&mut self, token: u64) -> bool {
        if self.in_flight != Some(token) {
            return false;
        }
        self.in_flight = None;
        true
    }

    pub(crate) fn reset(&mut self) {
        self.offset = 0;
        self.has_more = true;
        self.in_flight = None;
    }

    pub(crate) fn has_more(&self) -> bool {
        self.has_more
    }

    pub(crate) fn loading_older(&self) -> bool {
        self.in_flight.is_some() && self.offset > 0
    }
}

impl AppCore {
    /// Drop whatever is loaded and fetch the newest page again.
    pub(super) fn reload_first_page(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.cursor.reset();
        }
        self.request_page();
    }

    pub(super) fn load_older_messages(&mut self) {
        if self.request_page() {
            self.emit_state();
        }
    }

    fn request_page(&mut self) -> bool {
        let (Some(session), Some(active)) = (self.session.as_ref(), self.active.as_mut()) else {
            return false;
        };
        let token = self.subscriptions.next_token();
        let Some(request) = active.cursor.begin(token) else {
            tracing::debug!(room_id = active.store.room_id(), "page request ignored");
            return false;
        };

        let room_id = active.store.room_id().to_string();
        tracing::debug!(%room_id, offset = request.offset, limit = request.limit, "fetch_page");
        let persistence = session.persistence.clone();
        let identity = session.identity.clone();
        let tx = self.core_sender.clone();
        let epoch = self.epoch;
        self.runtime.spawn(async move {
            let result = persistence
                .fetch_messages(&identity, &room_id, request.offset, request.limit)
                .await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::PageFetched {
                epoch,
                room_id,
                token,
                offset: request.offset,
                result,
            })));
        });
        true
    }

    pub(super) fn handle_page_fetched(
        &mut self,
        epoch: u64,
        room_id: &str,
        token: u64,
        offset: usize,
        result: Result<Vec<StoredMessage>, BackendError>,
    ) {
        if epoch != self.epoch {
            return;
        }
        let (Some(session), Some(active)) = (self.session.as_mut(), self.active.as_mut()) else {
            return;
        };
        if active.store.room_id() != room_id {
            tracing::debug!(%room_id, "discarding page for inactive room");
            return;
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                if active.cursor.fail(token) {
                    self.report_error(ChatError::from_backend("Load messages", e));
                }
                return;
            }
        };
        if !active.cursor.complete(token, page.len()) {
            tracing::debug!(%room_id, token, "discarding superseded page");
            return;
        }

        let fetched = page.len();
        let messages: Vec<ChatMessage> = page
            .into_iter()
            .map(|stored| session.to_chat_message(stored))
            .collect();
        if offset == 0 {
            active.store.replace_all(messages);
        } else {
            let added = active.store.prepend_older(messages);
            tracing::debug!(%room_id, fetched, added, "older page merged");
        }
        self.emit_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_through_a_short_history() {
        let mut cursor = PaginationCursor::new(50);
        assert_eq!(
            cursor.begin(1),
            Some(PageRequest {
                offset: 0,
                limit: 50
            })
        );
        assert!(cursor.complete(1, 50));
        assert!(cursor.has_more());

        assert_eq!(cursor.begin(2).map(|r| r.offset), Some(50));
        assert!(cursor.loading_older());
        assert!(cursor.complete(2, 50));

        assert_eq!(cursor.begin(3).map(|r| r.offset), Some(100));
        assert!(cursor.complete(3, 20));
        assert!(!cursor.has_more());

        assert_eq!(cursor.begin(4), None, "history exhausted");
    }

    #[test]
    fn second_trigger_while_in_flight_is_ignored() {
        let mut cursor = PaginationCursor::new(10);
        assert!(cursor.begin(1).is_some());
        assert_eq!(cursor.begin(2), None);
        // A completion for the ignored request means nothing.
        assert!(!cursor.complete(2, 10));
        assert!(cursor.complete(1, 10));
    }

    #[test]
    fn reset_orphans_in_flight_fetch() {
        let mut cursor = PaginationCursor::new(10);
        cursor.begin(1);
        cursor.complete(1, 10);
        cursor.begin(2);

        cursor.reset();
        assert!(!cursor.loading_older());
        assert_eq!(cursor.begin(3).map(|r| r.offset), Some(0));
        assert!(!cursor.complete(2, 10));
        assert!(!cursor.fail(2));
    }

    #[test]
    fn failure_allows_retry_at_same_offset() {
        let mut cursor = PaginationCursor::new(10);
        cursor.begin(1);
        cursor.complete(1, 10);
        cursor.begin(2);
        assert!(cursor.fail(2));
        assert_eq!(cursor.begin(3).map(|r| r.offset), Some(10));
    }
}
