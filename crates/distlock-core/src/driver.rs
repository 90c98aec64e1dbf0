//! Single-node lock driver
//!
//! Wraps one storage node with the per-node timeout and turns every node
//! failure into a non-success vote.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::LockError;
use crate::record::{LockRecord, RecordCodec};
use crate::store::{LockStore, StoreError};

/// Atomic acquire/release/extend against one storage node
#[derive(Clone)]
pub struct NodeDriver {
    store: Arc<dyn LockStore>,
    codec: RecordCodec,
    timeout: Duration,
}

impl NodeDriver {
    pub fn new(store: Arc<dyn LockStore>, codec: RecordCodec, timeout: Duration) -> Self {
        Self {
            store,
            codec,
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        self.store.endpoint()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create `record` on this node with `ttl` if the key is free.
    pub async fn acquire(&self, record: &LockRecord, ttl: Duration) -> bool {
        let (key, value) = self.codec.encode(record);
        match self
            .bounded(self.store.set_if_absent(&key, &value, ttl))
            .await
        {
            Ok(acquired) => {
                debug!(node = %self.endpoint(), key = %record.key, acquired, "Node acquire");
                acquired
            }
            Err(e) => {
                self.node_unavailable(&e, "acquire");
                false
            }
        }
    }

    /// Delete `record` if this node still holds its token.
    pub async fn release(&self, record: &LockRecord) -> bool {
        self.try_release(record).await.unwrap_or(false)
    }

    /// Like [`release`](Self::release), but reports node failures as
    /// `LockError::ReleaseFailed` (already logged) instead of `false`.
    pub async fn try_release(&self, record: &LockRecord) -> Result<bool, LockError> {
        let (key, value) = self.codec.encode(record);
        match self
            .bounded(self.store.compare_and_delete(&key, &value))
            .await
        {
            Ok(released) => {
                debug!(node = %self.endpoint(), key = %record.key, released, "Node release");
                Ok(released)
            }
            Err(e) => {
                let err = LockError::ReleaseFailed {
                    endpoint: self.endpoint().to_string(),
                    reason: e.to_string(),
                };
                warn!(key = %record.key, error = %err, "Lock record left to expire");
                metrics::counter!("distlock_release_failures_total", "node" => self.endpoint().to_string())
                    .increment(1);
                Err(err)
            }
        }
    }

    /// Reset the ttl of `record` if this node still holds its token.
    pub async fn extend(&self, record: &LockRecord, ttl: Duration) -> bool {
        let (key, value) = self.codec.encode(record);
        match self
            .bounded(self.store.compare_and_set_ttl(&key, &value, ttl))
            .await
        {
            Ok(extended) => {
                debug!(node = %self.endpoint(), key = %record.key, extended, "Node extend");
                extended
            }
            Err(e) => {
                self.node_unavailable(&e, "extend");
                false
            }
        }
    }

    async fn bounded<F>(&self, call: F) -> Result<bool, StoreError>
    where
        F: Future<Output = Result<bool, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "no response within {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    fn node_unavailable(&self, error: &StoreError, op: &'static str) {
        let err = LockError::NodeUnavailable {
            endpoint: self.endpoint().to_string(),
            reason: error.to_string(),
        };
        warn!(op, error = %err, "Counting node as a failed vote");
        metrics::counter!("distlock_node_errors_total", "node" => self.endpoint().to_string())
            .increment(1);
    }
}

impl std::fmt::Debug for NodeDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDriver")
            .field("endpoint", &self.endpoint())
            .field("timeout", &self.timeout)
            .finish()
    }
}
