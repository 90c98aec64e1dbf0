//! Retry/wait scheduler
//!
//! Repeats quorum attempts until one is granted, the wait budget runs out or
//! the caller cancels. The pause between attempts is the only place the loop
//! suspends on its own, and it never sleeps past the budget.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::LockError;
use crate::handle::LockHandle;
use crate::model::{LockKey, LockOptions};
use crate::quorum::QuorumCoordinator;

#[derive(Debug, Clone)]
pub struct RetryScheduler {
    coordinator: Arc<QuorumCoordinator>,
}

impl RetryScheduler {
    pub fn new(coordinator: Arc<QuorumCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<QuorumCoordinator> {
        &self.coordinator
    }

    /// Acquire `key`, retrying every `options.retry` for up to `options.wait`.
    ///
    /// Returns a handle that is either acquired or, once the budget is spent,
    /// not acquired. Total time is bounded by the wait budget plus one node
    /// timeout. Cancellation is reported as `LockError::Cancelled`.
    pub async fn acquire_with_retry(
        &self,
        key: &LockKey,
        options: &LockOptions,
        cancel: &CancellationToken,
    ) -> Result<LockHandle, LockError> {
        options.validate()?;

        let stats = self.coordinator.stats_collector();
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let attempt = match self.coordinator.try_acquire(key, options.ttl, cancel).await {
                Ok(attempt) => attempt,
                Err(e) => {
                    if matches!(e, LockError::Cancelled { .. }) {
                        stats.record_cancelled();
                    }
                    return Err(e);
                }
            };

            if attempt.acquired() {
                return Ok(LockHandle::new(self.coordinator.clone(), attempt, attempts));
            }

            let elapsed = started.elapsed();
            if elapsed < options.wait {
                let pause = options.retry.min(options.wait - elapsed);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(key = %key, attempts, "Lock wait cancelled");
                        stats.record_cancelled();
                        return Err(LockError::Cancelled { key: key.to_string() });
                    }
                    _ = tokio::time::sleep(pause) => {}
                }
            }

            if started.elapsed() >= options.wait {
                debug!(
                    key = %key,
                    attempts,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Gave up waiting for lock"
                );
                stats.record_contended();
                return Ok(LockHandle::new(self.coordinator.clone(), attempt, attempts));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClockDrift;
    use crate::driver::NodeDriver;
    use crate::record::RecordCodec;
    use crate::store::MemoryLockStore;
    use std::time::Duration;

    fn scheduler(store: Arc<MemoryLockStore>) -> RetryScheduler {
        let driver = NodeDriver::new(store, RecordCodec::default(), Duration::from_millis(100));
        RetryScheduler::new(Arc::new(
            QuorumCoordinator::new(vec![driver], ClockDrift::default()).unwrap(),
        ))
    }

    fn key() -> LockKey {
        LockKey::new("jobs").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_key_needs_one_attempt() {
        let scheduler = scheduler(Arc::new(MemoryLockStore::new("mem-1")));
        let handle = scheduler
            .acquire_with_retry(&key(), &LockOptions::from_secs(5, 2, 1), &CancellationToken::new())
            .await
            .unwrap();

        assert!(handle.is_acquired());
        assert_eq!(handle.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_not_shorter_than_wait_makes_one_attempt() {
        let scheduler = scheduler(Arc::new(MemoryLockStore::new("mem-1")));
        let cancel = CancellationToken::new();
        let options = LockOptions::from_secs(30, 2, 5);
        let _holder = scheduler.acquire_with_retry(&key(), &options, &cancel).await.unwrap();

        let started = Instant::now();
        let handle = scheduler.acquire_with_retry(&key(), &options, &cancel).await.unwrap();
        assert!(!handle.is_acquired());
        assert_eq!(handle.attempts(), 1);
        // Never blocks past the wait budget
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_wait_makes_one_attempt() {
        let scheduler = scheduler(Arc::new(MemoryLockStore::new("mem-1")));
        let cancel = CancellationToken::new();
        let options = LockOptions::from_secs(30, 0, 1);
        let _holder = scheduler.acquire_with_retry(&key(), &options, &cancel).await.unwrap();

        let handle = scheduler.acquire_with_retry(&key(), &options, &cancel).await.unwrap();
        assert!(!handle.is_acquired());
        assert_eq!(handle.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquires_once_holder_expires() {
        let store = Arc::new(MemoryLockStore::new("mem-1"));
        let scheduler = scheduler(store);
        let cancel = CancellationToken::new();

        let holder = scheduler
            .acquire_with_retry(&key(), &LockOptions::from_secs(3, 0, 1), &cancel)
            .await
            .unwrap();
        assert!(holder.is_acquired());
        // Holder vanishes without releasing
        std::mem::forget(holder);

        let started = Instant::now();
        let handle = scheduler
            .acquire_with_retry(&key(), &LockOptions::from_secs(30, 10, 1), &cancel)
            .await
            .unwrap();
        assert!(handle.is_acquired());
        assert_eq!(handle.attempts(), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_options() {
        let scheduler = scheduler(Arc::new(MemoryLockStore::new("mem-1")));
        let options = LockOptions::default().with_retry(Duration::ZERO);
        let err = scheduler
            .acquire_with_retry(&key(), &options, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::IllegalArgument(_)));
    }
}
