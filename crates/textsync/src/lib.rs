/// Collaborative plain-text editing engine
/// Concurrent edits from many participants converge through operational transformation
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod config;
pub use config::*;

mod operations;
pub use operations::*;

mod transform;
pub use transform::*;

mod document;
pub use document::*;

mod presence;
pub use presence::*;

mod conflict;
pub use conflict::*;

mod sync;
pub use sync::*;

mod undo;
pub use undo::*;

mod diff;
pub use diff::*;

mod protocol;
pub use protocol::*;

mod session;
pub use session::*;

mod relay;
pub use relay::*;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid operation: {0}")]
    Validation(String),

    #[error("stale base version {base_version}: history before version {floor} is no longer available")]
    StaleBaseVersion { base_version: u64, floor: u64 },

    #[error("pending limit exceeded: {limit} local operations await acknowledgment")]
    PendingLimitExceeded { limit: usize },

    #[error("unknown acknowledgment for operation {0}")]
    UnknownAck(OperationId),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session closed")]
    SessionClosed,
}

impl SyncError {
    /// Whether the caller can simply retry once the session has caught up.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::PendingLimitExceeded { .. } | SyncError::Validation(_)
        )
    }

    /// Whether the transport must fetch a fresh snapshot before this replica can continue.
    pub fn requires_resync(&self) -> bool {
        matches!(self, SyncError::StaleBaseVersion { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Stable participant identifier.
///
/// Ordering is lexicographic on the underlying string; concurrent inserts at the
/// same offset are ordered by it on every replica.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollaboratorId(pub String);

impl CollaboratorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Random identifier for participants that have none of their own
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CollaboratorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollaboratorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Session identifier for one shared document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
