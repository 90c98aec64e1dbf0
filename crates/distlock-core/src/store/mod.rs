//! Storage node capability
//!
//! A storage node only has to offer three atomic primitives, each with
//! node-side expiry that does not depend on the client staying alive.

mod memory;

pub use memory::MemoryLockStore;

use std::time::Duration;

use async_trait::async_trait;

/// Error reported by a storage node
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("node unavailable: {0}")]
    Unavailable(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// One independent lock-storage node
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Address used in logs and metrics
    fn endpoint(&self) -> &str;

    /// Store `key -> value` with `ttl` only if `key` is absent
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete `key` only if it currently holds `expected`
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Reset the ttl of `key` only if it currently holds `expected`
    async fn compare_and_set_ttl(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool, StoreError>;
}
