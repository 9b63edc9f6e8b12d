//! User-facing error taxonomy.
//!
//! Boundary failures are converted here, at the component that issued the
//! call, so no raw `BackendError` reaches the presentation layer. Local
//! rejections (empty input, duplicate fetch) never become a `ChatError`.

use roomsync_backend_traits::BackendError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// A write, fetch or subscribe failed; the user may retry the action.
    #[error("{action} failed: {reason}")]
    RecoverableRemote { action: &'static str, reason: String },

    /// The credential is no longer valid.
    #[error("Session expired. Please sign in again.")]
    SessionExpired,

    /// The per-room subscription failed; updates are paused.
    #[error("Live updates paused: {reason}")]
    TransportDegraded { room_id: String, reason: String },
}

impl ChatError {
    pub fn from_backend(action: &'static str, err: BackendError) -> Self {
        if err.is_session_fatal() {
            return Self::SessionExpired;
        }
        Self::RecoverableRemote {
            action,
            reason: err.to_string(),
        }
    }

    pub fn degraded(room_id: impl Into<String>, err: &BackendError) -> Self {
        Self::TransportDegraded {
            room_id: room_id.into(),
            reason: err.to_string(),
        }
    }

    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}
