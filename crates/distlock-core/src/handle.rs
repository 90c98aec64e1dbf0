//! Lock handle
//!
//! A handle is the outcome of one `acquire` call. When it holds the lock it
//! owns the obligation to release it: `release().await` does so explicitly,
//! and dropping a still-held handle spawns the release on the current Tokio
//! runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::model::{LockKey, LockToken, MAX_TTL, QuorumResult};
use crate::quorum::{Attempt, QuorumCoordinator};
use crate::record::LockRecord;

pub struct LockHandle {
    record: LockRecord,
    quorum: QuorumResult,
    acquired: bool,
    attempts: u32,
    valid_until: Instant,
    released: AtomicBool,
    coordinator: Arc<QuorumCoordinator>,
}

impl LockHandle {
    pub(crate) fn new(coordinator: Arc<QuorumCoordinator>, attempt: Attempt, attempts: u32) -> Self {
        let acquired = attempt.acquired();
        Self {
            valid_until: deadline(attempt.result.validity),
            record: attempt.record,
            quorum: attempt.result,
            acquired,
            attempts,
            released: AtomicBool::new(false),
            coordinator,
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    pub fn key(&self) -> &LockKey {
        &self.record.key
    }

    pub fn token(&self) -> LockToken {
        self.record.token
    }

    /// Result of the last quorum round (acquisition or extension)
    pub fn quorum(&self) -> &QuorumResult {
        &self.quorum
    }

    /// Validity granted by the last quorum round
    pub fn validity(&self) -> Duration {
        self.quorum.validity
    }

    /// Validity left right now; zero once expired or released
    pub fn remaining(&self) -> Duration {
        if !self.acquired || self.is_released() {
            return Duration::ZERO;
        }
        self.valid_until.saturating_duration_since(Instant::now())
    }

    /// Number of quorum attempts made before this handle was produced
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Release the lock on every node.
    ///
    /// Only the first call on an acquired handle contacts the nodes; it
    /// returns whether at least one node deleted the record. Every other
    /// call is a no-op returning `false`.
    ///
    /// The node round-trip runs on its own task, so dropping the returned
    /// future does not abort a release already in flight.
    pub async fn release(&self) -> bool {
        if !self.acquired || self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        let coordinator = self.coordinator.clone();
        let record = self.record.clone();
        let task = tokio::spawn(async move { coordinator.release(&record).await });
        match task.await {
            Ok(summary) => summary.released > 0,
            Err(e) => {
                warn!(key = %self.record.key, error = %e, "Lock release task failed, record left to expire");
                false
            }
        }
    }

    /// Reset the lock ttl on the nodes still holding this handle's token.
    ///
    /// Returns `true` only if a quorum accepted the new ttl with validity
    /// left; the handle's validity is refreshed in that case.
    pub async fn extend(&mut self, ttl: Duration) -> bool {
        if !self.acquired || self.is_released() {
            return false;
        }
        if ttl.is_zero() || ttl > MAX_TTL {
            warn!(key = %self.record.key, ttl = ?ttl, "Lock extension ttl out of range");
            return false;
        }
        let result = self.coordinator.extend(&self.record, ttl).await;
        if !result.acquired() {
            warn!(key = %self.record.key, successes = result.successes, "Lock extension lost quorum");
            return false;
        }
        self.valid_until = deadline(result.validity);
        self.quorum = result;
        true
    }
}

fn deadline(validity: Duration) -> Instant {
    Instant::now() + validity.min(MAX_TTL)
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if !self.acquired || self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(key = %self.record.key, "Releasing dropped lock handle in background");
                let coordinator = self.coordinator.clone();
                let record = self.record.clone();
                runtime.spawn(async move {
                    coordinator.release(&record).await;
                });
            }
            Err(_) => {
                warn!(
                    key = %self.record.key,
                    "No runtime to release dropped lock handle, record left to expire"
                );
            }
        }
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("key", &self.record.key)
            .field("token", &self.record.token)
            .field("acquired", &self.acquired)
            .field("attempts", &self.attempts)
            .field("released", &self.is_released())
            .field("quorum", &self.quorum)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClockDrift;
    use crate::driver::NodeDriver;
    use crate::record::RecordCodec;
    use crate::store::MemoryLockStore;
    use tokio_util::sync::CancellationToken;

    const TTL: Duration = Duration::from_secs(10);

    fn coordinator(store: Arc<MemoryLockStore>) -> Arc<QuorumCoordinator> {
        let driver = NodeDriver::new(store, RecordCodec::default(), Duration::from_millis(100));
        Arc::new(QuorumCoordinator::new(vec![driver], ClockDrift::none()).unwrap())
    }

    async fn acquire(coordinator: &Arc<QuorumCoordinator>) -> LockHandle {
        let key = LockKey::new("jobs").unwrap();
        let attempt = coordinator
            .try_acquire(&key, TTL, &CancellationToken::new())
            .await
            .unwrap();
        LockHandle::new(coordinator.clone(), attempt, 1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_is_idempotent() {
        let store = Arc::new(MemoryLockStore::new("mem-1"));
        let coordinator = coordinator(store.clone());
        let handle = acquire(&coordinator).await;

        assert!(handle.is_acquired());
        assert_eq!(handle.remaining(), TTL);
        assert!(handle.release().await);
        assert!(!handle.release().await);
        assert!(store.is_empty());
        assert_eq!(handle.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_in_background() {
        let store = Arc::new(MemoryLockStore::new("mem-1"));
        let coordinator = coordinator(store.clone());

        let handle = acquire(&coordinator).await;
        assert_eq!(store.len(), 1);
        drop(handle);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_handle_does_nothing() {
        let store = Arc::new(MemoryLockStore::new("mem-1"));
        let coordinator = coordinator(store.clone());
        let holder = acquire(&coordinator).await;

        let loser = acquire(&coordinator).await;
        assert!(!loser.is_acquired());
        assert!(!loser.release().await);
        drop(loser);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(store.get("redlock:jobs"), Some(holder.token().to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_refreshes_validity() {
        let store = Arc::new(MemoryLockStore::new("mem-1"));
        let coordinator = coordinator(store.clone());
        let mut handle = acquire(&coordinator).await;

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(handle.remaining(), Duration::from_secs(4));

        assert!(handle.extend(TTL).await);
        assert_eq!(handle.remaining(), TTL);

        handle.release().await;
        assert!(!handle.extend(TTL).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_rejects_out_of_range_ttl() {
        let store = Arc::new(MemoryLockStore::new("mem-1"));
        let coordinator = coordinator(store.clone());
        let mut handle = acquire(&coordinator).await;

        assert!(!handle.extend(Duration::ZERO).await);
        assert!(!handle.extend(Duration::MAX).await);
        assert_eq!(store.ttl("redlock:jobs"), Some(TTL));
        assert!(handle.release().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_release_still_completes() {
        let store = Arc::new(MemoryLockStore::new("mem-1"));
        let coordinator = coordinator(store.clone());
        let handle = acquire(&coordinator).await;

        // Slow node; the caller gives up before the release round-trip ends
        store.set_latency(Duration::from_millis(50));
        let release = tokio::time::timeout(Duration::from_millis(10), handle.release()).await;
        assert!(release.is_err());
        assert!(handle.is_released());
        drop(handle);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_after_takeover_fails() {
        let store = Arc::new(MemoryLockStore::new("mem-1"));
        let coordinator = coordinator(store.clone());
        let mut stale = acquire(&coordinator).await;

        // The record expires on the node and a new holder takes the key
        tokio::time::advance(TTL).await;
        let current = acquire(&coordinator).await;
        assert!(current.is_acquired());

        assert!(!stale.extend(TTL).await);
        assert!(!stale.release().await);
        assert_eq!(store.get("redlock:jobs"), Some(current.token().to_string()));
    }
}
