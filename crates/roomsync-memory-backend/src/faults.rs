use std::collections::HashMap;
use std::time::Duration;

use roomsync_backend_traits::BackendError;

/// Fault and latency injection for [`crate::MemoryBackend`].
///
/// `fail_next_*` slots fire once and are then cleared. Delays apply to every
/// call until reset.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub fail_next_insert: Option<BackendError>,
    pub fail_next_fetch: Option<BackendError>,
    pub fail_next_delete: Option<BackendError>,
    pub fail_next_create_room: Option<BackendError>,
    pub fail_next_delete_room: Option<BackendError>,
    pub fail_next_subscribe: Option<BackendError>,
    /// Delay between storing an insert and returning its acknowledgement.
    pub insert_ack_delay: Duration,
    /// Delay between storing an insert and publishing its echo.
    pub echo_delay: Duration,
    /// Delay before a subscription is acknowledged.
    pub subscribe_delay: Duration,
    /// Per-room delay before a page fetch resolves.
    pub fetch_delays: HashMap<String, Duration>,
    /// Per-room delay between reading a page and returning it.
    pub fetch_reply_delays: HashMap<String, Duration>,
    pub unauthorized: bool,
}
