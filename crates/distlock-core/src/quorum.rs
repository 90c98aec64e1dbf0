//! Quorum coordinator
//!
//! Runs one Redlock-style attempt across every configured node:
//! - fan out `set_if_absent` with a fresh token, each call under its node timeout
//! - count votes and deduct the fan-out time and clock drift from the ttl
//! - grant only with a majority of votes and positive remaining validity
//! - on failure or cancellation, release the token everywhere in the background
//!
//! Any two majorities share at least one node, and a node holds a single
//! token per key while the record lives, so two attempts can never both
//! reach quorum on overlapping validity windows.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ClockDrift;
use crate::driver::NodeDriver;
use crate::error::LockError;
use crate::model::{LockKey, LockStats, LockToken, QuorumResult, quorum_size};
use crate::record::LockRecord;
use crate::stats::LockStatsCollector;

/// Result of a single acquisition attempt
#[derive(Debug, Clone)]
pub struct Attempt {
    /// Record written (or attempted) with this attempt's token
    pub record: LockRecord,
    pub result: QuorumResult,
}

impl Attempt {
    pub fn acquired(&self) -> bool {
        self.result.acquired()
    }
}

/// Per-node outcome of a release fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseSummary {
    /// Nodes that deleted the record
    pub released: usize,
    /// Nodes that could not be reached
    pub failed: usize,
}

/// Drives acquisition, release and extension across an ordered set of nodes
pub struct QuorumCoordinator {
    drivers: Arc<[NodeDriver]>,
    drift: ClockDrift,
    stats: LockStatsCollector,
}

impl QuorumCoordinator {
    pub fn new(drivers: Vec<NodeDriver>, drift: ClockDrift) -> Result<Self, LockError> {
        if drivers.is_empty() {
            return Err(LockError::IllegalArgument(
                "at least one storage node is required".to_string(),
            ));
        }
        Ok(Self {
            drivers: drivers.into(),
            drift,
            stats: LockStatsCollector::default(),
        })
    }

    pub fn nodes(&self) -> usize {
        self.drivers.len()
    }

    /// Votes needed for a grant
    pub fn quorum(&self) -> usize {
        quorum_size(self.drivers.len())
    }

    pub fn drivers(&self) -> &[NodeDriver] {
        &self.drivers
    }

    pub fn stats(&self) -> LockStats {
        self.stats.snapshot()
    }

    pub(crate) fn stats_collector(&self) -> &LockStatsCollector {
        &self.stats
    }

    /// Make one acquisition attempt on `key`.
    ///
    /// Returns `LockError::Cancelled` if `cancel` fires before the fan-out
    /// completes; outstanding node calls are dropped and whatever was
    /// written is released in the background.
    pub async fn try_acquire(
        &self,
        key: &LockKey,
        ttl: Duration,
        cancel: &CancellationToken,
    ) -> Result<Attempt, LockError> {
        if cancel.is_cancelled() {
            return Err(LockError::Cancelled {
                key: key.to_string(),
            });
        }

        let record = LockRecord::new(key.clone(), LockToken::generate());
        let started = Instant::now();

        let fan_out = join_all(self.drivers.iter().map(|d| d.acquire(&record, ttl)));
        let votes = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(key = %key, token = %record.token, "Acquire cancelled during fan-out");
                self.spawn_cleanup(record.clone());
                return Err(LockError::Cancelled { key: key.to_string() });
            }
            votes = fan_out => votes,
        };

        let successes = votes.iter().filter(|acquired| **acquired).count();
        let result = QuorumResult::new(
            self.drivers.len(),
            successes,
            ttl,
            started.elapsed(),
            self.drift.margin(ttl),
        );
        self.stats.record_attempt(result.acquired());

        if result.acquired() {
            info!(
                key = %key,
                token = %record.token,
                successes,
                nodes = result.nodes,
                validity_ms = result.validity.as_millis() as u64,
                "Lock acquired"
            );
        } else {
            debug!(
                key = %key,
                successes,
                quorum = result.quorum,
                elapsed_ms = result.elapsed.as_millis() as u64,
                "Quorum not reached"
            );
            self.spawn_cleanup(record.clone());
        }

        Ok(Attempt { record, result })
    }

    /// Release `record` on every node.
    ///
    /// Deletion is token-guarded, so nodes that never held the token (or
    /// already handed the key to someone else) are left untouched.
    pub async fn release(&self, record: &LockRecord) -> ReleaseSummary {
        let summary = release_all(&self.drivers, record).await;
        self.stats.record_release(summary.failed);
        debug!(
            key = %record.key,
            released = summary.released,
            failed = summary.failed,
            "Lock released"
        );
        summary
    }

    /// Reset the ttl of `record` on every node still holding its token.
    ///
    /// The returned result is computed exactly like an acquisition; the lock
    /// is only still safely held when it reports `acquired()`.
    pub async fn extend(&self, record: &LockRecord, ttl: Duration) -> QuorumResult {
        let started = Instant::now();
        let votes = join_all(self.drivers.iter().map(|d| d.extend(record, ttl))).await;
        let successes = votes.iter().filter(|extended| **extended).count();

        let result = QuorumResult::new(
            self.drivers.len(),
            successes,
            ttl,
            started.elapsed(),
            self.drift.margin(ttl),
        );
        debug!(key = %record.key, successes, extended = result.acquired(), "Lock extend");
        result
    }

    fn spawn_cleanup(&self, record: LockRecord) {
        let drivers = self.drivers.clone();
        tokio::spawn(async move {
            let summary = release_all(&drivers, &record).await;
            if summary.failed > 0 {
                debug!(
                    key = %record.key,
                    failed = summary.failed,
                    "Partial lock records left to expire"
                );
            }
        });
    }
}

async fn release_all(drivers: &[NodeDriver], record: &LockRecord) -> ReleaseSummary {
    let outcomes = join_all(drivers.iter().map(|d| d.try_release(record))).await;
    outcomes
        .into_iter()
        .fold(ReleaseSummary::default(), |mut summary, outcome| {
            match outcome {
                Ok(true) => summary.released += 1,
                Ok(false) => {}
                Err(_) => summary.failed += 1,
            }
            summary
        })
}

impl std::fmt::Debug for QuorumCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuorumCoordinator")
            .field("drivers", &self.drivers)
            .field("drift", &self.drift)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordCodec;
    use crate::store::MemoryLockStore;

    const TTL: Duration = Duration::from_secs(10);

    fn cluster(n: usize) -> (Vec<Arc<MemoryLockStore>>, QuorumCoordinator) {
        let stores: Vec<Arc<MemoryLockStore>> = (0..n)
            .map(|i| Arc::new(MemoryLockStore::new(format!("mem-{}", i))))
            .collect();
        let drivers = stores
            .iter()
            .map(|s| NodeDriver::new(s.clone(), RecordCodec::default(), Duration::from_millis(200)))
            .collect();
        let coordinator = QuorumCoordinator::new(drivers, ClockDrift::default()).unwrap();
        (stores, coordinator)
    }

    fn key(k: &str) -> LockKey {
        LockKey::new(k).unwrap()
    }

    #[test]
    fn test_requires_nodes() {
        assert!(QuorumCoordinator::new(Vec::new(), ClockDrift::default()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_on_all_nodes() {
        let (stores, coordinator) = cluster(3);
        let attempt = coordinator
            .try_acquire(&key("jobs"), TTL, &CancellationToken::new())
            .await
            .unwrap();

        assert!(attempt.acquired());
        assert_eq!(attempt.result.successes, 3);
        assert_eq!(attempt.result.quorum, 2);
        assert_eq!(attempt.result.validity, TTL - Duration::from_millis(102));
        for store in &stores {
            assert_eq!(store.get("redlock:jobs"), Some(attempt.record.token.to_string()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_attempt_is_refused() {
        let (_stores, coordinator) = cluster(3);
        let cancel = CancellationToken::new();
        let first = coordinator.try_acquire(&key("jobs"), TTL, &cancel).await.unwrap();
        let second = coordinator.try_acquire(&key("jobs"), TTL, &cancel).await.unwrap();

        assert!(first.acquired());
        assert!(!second.acquired());
        assert_ne!(first.record.token, second.record.token);
    }

    #[tokio::test(start_paused = true)]
    async fn test_minority_is_cleaned_up() {
        let (stores, coordinator) = cluster(3);
        stores[1].set_available(false);
        stores[2].set_available(false);

        let attempt = coordinator
            .try_acquire(&key("jobs"), TTL, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!attempt.acquired());
        assert_eq!(attempt.result.successes, 1);

        // Let the background cleanup run
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(stores[0].is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fan_out_exhausts_validity() {
        let (stores, coordinator) = cluster(1);
        stores[0].set_latency(Duration::from_millis(150));

        let attempt = coordinator
            .try_acquire(&key("jobs"), Duration::from_millis(100), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(attempt.result.successes, 1);
        assert_eq!(attempt.result.validity, Duration::ZERO);
        assert!(!attempt.acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_fan_out() {
        let (stores, coordinator) = cluster(3);
        for store in &stores {
            store.set_latency(Duration::from_millis(150));
        }
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = coordinator
            .try_acquire(&key("jobs"), TTL, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, LockError::Cancelled { key: "jobs".to_string() });
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_and_extend() {
        let (stores, coordinator) = cluster(3);
        let attempt = coordinator
            .try_acquire(&key("jobs"), TTL, &CancellationToken::new())
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        let extended = coordinator.extend(&attempt.record, TTL).await;
        assert!(extended.acquired());
        assert_eq!(stores[0].ttl("redlock:jobs"), Some(TTL));

        let summary = coordinator.release(&attempt.record).await;
        assert_eq!(summary, ReleaseSummary { released: 3, failed: 0 });
        assert_eq!(coordinator.release(&attempt.record).await.released, 0);

        // Extending a released lock reaches no node
        assert!(!coordinator.extend(&attempt.record, TTL).await.acquired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats() {
        let (_stores, coordinator) = cluster(1);
        let cancel = CancellationToken::new();
        coordinator.try_acquire(&key("a"), TTL, &cancel).await.unwrap();
        coordinator.try_acquire(&key("a"), TTL, &cancel).await.unwrap();

        let stats = coordinator.stats();
        assert_eq!(stats.total_attempts, 2);
        assert_eq!(stats.total_acquisitions, 1);
    }
}
