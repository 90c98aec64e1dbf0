use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::LockStats;

#[derive(Default)]
pub(crate) struct LockStatsCollector {
    total_attempts: AtomicU64,
    total_acquisitions: AtomicU64,
    contended: AtomicU64,
    cancelled: AtomicU64,
    total_releases: AtomicU64,
    release_failures: AtomicU64,
}

impl LockStatsCollector {
    pub(crate) fn record_attempt(&self, acquired: bool) {
        self.total_attempts.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("distlock_attempts_total").increment(1);
        if acquired {
            self.total_acquisitions.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("distlock_acquired_total").increment(1);
        }
    }

    pub(crate) fn record_contended(&self) {
        self.contended.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("distlock_contended_total").increment(1);
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("distlock_cancelled_total").increment(1);
    }

    pub(crate) fn record_release(&self, failures: usize) {
        self.total_releases.fetch_add(1, Ordering::Relaxed);
        self.release_failures
            .fetch_add(failures as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LockStats {
        LockStats {
            total_attempts: self.total_attempts.load(Ordering::Relaxed),
            total_acquisitions: self.total_acquisitions.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            total_releases: self.total_releases.load(Ordering::Relaxed),
            release_failures: self.release_failures.load(Ordering::Relaxed),
        }
    }
}
