//! Error types for the lock protocol
//!
//! Node-level failures (`NodeUnavailable`, `ReleaseFailed`) are logged and
//! folded into the quorum vote; they never reach callers of the execution
//! service, which only see contention, cancellation and argument errors.

/// Lock protocol error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("node '{endpoint}' unavailable: {reason}")]
    NodeUnavailable { endpoint: String, reason: String },

    #[error("resource '{key}' is locked right now, try again later")]
    LockContended { key: String },

    #[error("lock attempt on '{key}' was cancelled")]
    Cancelled { key: String },

    #[error("release on node '{endpoint}' failed: {reason}")]
    ReleaseFailed { endpoint: String, reason: String },

    #[error("lock key must not be empty")]
    InvalidKey,

    #[error("caused: {0}")]
    IllegalArgument(String),

    #[error("codec error: {0}")]
    Codec(String),
}

pub type Result<T> = std::result::Result<T, LockError>;
