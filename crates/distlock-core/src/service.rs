//! Distributed lock service
//!
//! Runs caller-supplied work under a lock:
//! - fire-and-forget (`run_with_lock`): skipped silently when the lock stays contended
//! - result-returning (`call_with_lock`): fails with `LockError::LockContended`
//!
//! Work runs at most once and only while the lock is held. The lock is
//! released before control returns, whether the work completes or panics;
//! if the returned future is dropped mid-work the handle releases on drop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::LockConfig;
use crate::driver::NodeDriver;
use crate::error::LockError;
use crate::handle::LockHandle;
use crate::model::{LockKey, LockOptions, LockStats};
use crate::quorum::QuorumCoordinator;
use crate::scheduler::RetryScheduler;
use crate::store::LockStore;

/// Lock service over a fixed set of storage nodes. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DistributedLockService {
    scheduler: RetryScheduler,
}

impl DistributedLockService {
    pub fn new(coordinator: QuorumCoordinator) -> Self {
        Self {
            scheduler: RetryScheduler::new(Arc::new(coordinator)),
        }
    }

    /// Build a service over `stores`, in order, using the node timeout,
    /// clock drift and key format from `config`.
    pub fn from_config(config: &LockConfig, stores: Vec<Arc<dyn LockStore>>) -> Result<Self, LockError> {
        config.validate()?;
        let codec = config.codec()?;
        let drivers = stores
            .into_iter()
            .map(|store| NodeDriver::new(store, codec.clone(), config.node_timeout()))
            .collect();
        let coordinator = QuorumCoordinator::new(drivers, config.clock_drift()?)?;
        Ok(Self::new(coordinator))
    }

    pub fn coordinator(&self) -> &Arc<QuorumCoordinator> {
        self.scheduler.coordinator()
    }

    pub fn stats(&self) -> LockStats {
        self.coordinator().stats()
    }

    /// Acquire `key` and hand the scope to the caller.
    ///
    /// The returned handle may be not-acquired; check
    /// [`LockHandle::is_acquired`] and release it when done.
    pub async fn acquire(
        &self,
        key: &str,
        options: LockOptions,
        cancel: &CancellationToken,
    ) -> Result<LockHandle, LockError> {
        let key = LockKey::new(key)?;
        self.scheduler
            .acquire_with_retry(&key, &options, cancel)
            .await
    }

    /// Run `work` if `key` can be locked within the wait budget.
    ///
    /// Not getting the lock is not an error: `work` is skipped and `Ok(())`
    /// returned. Cancellation is still reported.
    pub async fn run_with_lock<F, Fut>(
        &self,
        key: &str,
        work: F,
        options: LockOptions,
        cancel: &CancellationToken,
    ) -> Result<(), LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        self.run_future_with_lock(key, async move { work().await }, options, cancel)
            .await
    }

    /// Same as [`run_with_lock`](Self::run_with_lock) for an already built future.
    pub async fn run_future_with_lock<Fut>(
        &self,
        key: &str,
        work: Fut,
        options: LockOptions,
        cancel: &CancellationToken,
    ) -> Result<(), LockError>
    where
        Fut: Future<Output = ()>,
    {
        match self.execute(key, work, options, cancel).await {
            Err(LockError::LockContended { key }) => {
                debug!(key = %key, "Lock not acquired, skipping work");
                Ok(())
            }
            other => other,
        }
    }

    /// Run `work` under `key` and return its output.
    ///
    /// Fails with `LockError::LockContended` when the lock cannot be taken
    /// within the wait budget.
    pub async fn call_with_lock<T, F, Fut>(
        &self,
        key: &str,
        work: F,
        options: LockOptions,
        cancel: &CancellationToken,
    ) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.execute(key, async move { work().await }, options, cancel)
            .await
    }

    /// Same as [`call_with_lock`](Self::call_with_lock) for an already built future.
    pub async fn call_future_with_lock<T, Fut>(
        &self,
        key: &str,
        work: Fut,
        options: LockOptions,
        cancel: &CancellationToken,
    ) -> Result<T, LockError>
    where
        Fut: Future<Output = T>,
    {
        self.execute(key, work, options, cancel).await
    }

    async fn execute<T, Fut>(
        &self,
        key: &str,
        work: Fut,
        options: LockOptions,
        cancel: &CancellationToken,
    ) -> Result<T, LockError>
    where
        Fut: Future<Output = T>,
    {
        let handle = self.acquire(key, options, cancel).await?;
        if !handle.is_acquired() {
            return Err(LockError::LockContended {
                key: key.to_string(),
            });
        }

        let outcome = AssertUnwindSafe(work).catch_unwind().await;
        handle.release().await;

        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
