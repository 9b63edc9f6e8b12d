//! Error types for backend operations

use thiserror::Error;

/// Error type shared by [`crate::Persistence`] and [`crate::Transport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The credential attached to the call is invalid or expired
    #[error("unauthorized")]
    Unauthorized,

    /// Requested row or topic was not found
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend refused the operation (policy, validation)
    #[error("rejected: {0}")]
    Rejected(String),

    /// Connectivity or server failure
    #[error("network error: {0}")]
    Network(String),

    /// The backend has been shut down
    #[error("backend closed")]
    Closed,
}

impl BackendError {
    /// Whether this error invalidates the whole session rather than one call.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}
