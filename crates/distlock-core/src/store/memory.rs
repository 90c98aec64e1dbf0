// In-memory lock storage node
// Records expire lazily on access and, optionally, through a background sweeper

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::debug;

use super::{LockStore, StoreError};
use crate::model::MAX_TTL;

struct StoredRecord {
    value: String,
    expires_at: Instant,
}

impl StoredRecord {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: expiry(Instant::now(), ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

// Ttls past MAX_TTL are clamped
fn expiry(now: Instant, ttl: Duration) -> Instant {
    now + ttl.min(MAX_TTL)
}

/// Lock storage node backed by a `DashMap`.
///
/// Used as a single-process node and as the test double for remote nodes:
/// `set_available(false)` makes every call fail, `set_latency` delays every
/// call before it touches the map.
pub struct MemoryLockStore {
    endpoint: String,
    records: Arc<DashMap<String, StoredRecord>>,
    available: AtomicBool,
    latency_ms: AtomicU64,
    cleanup_handle: Option<tokio::task::JoinHandle<()>>,
}

impl MemoryLockStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            records: Arc::new(DashMap::new()),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            cleanup_handle: None,
        }
    }

    /// Start a background task purging expired records every `interval`.
    pub fn with_cleanup(mut self, interval: Duration) -> Self {
        let records = self.records.clone();
        let endpoint = self.endpoint.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            loop {
                interval.tick().await;
                let purged = purge(&records);
                if purged > 0 {
                    debug!(node = %endpoint, count = purged, "Cleaned up expired lock records");
                }
            }
        });

        self.cleanup_handle = Some(handle);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Current value of `key`, if present and not expired
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.records
            .get(key)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.value.clone())
    }

    /// Remaining ttl of `key`, if present and not expired
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.records
            .get(key)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.expires_at - now)
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.records.iter().filter(|r| !r.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired records, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        purge(&self.records)
    }

    async fn enter(&self) -> Result<(), StoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "{} is not accepting requests",
                self.endpoint
            )));
        }
        Ok(())
    }
}

impl Drop for MemoryLockStore {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }
}

fn purge(records: &DashMap<String, StoredRecord>) -> usize {
    let now = Instant::now();
    let before = records.len();
    records.retain(|_, record| !record.is_expired(now));
    before.saturating_sub(records.len())
}

#[async_trait]
impl LockStore for MemoryLockStore {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.enter().await?;

        let now = Instant::now();
        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(StoredRecord::new(value, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(StoredRecord::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.enter().await?;

        let now = Instant::now();
        let removed = self
            .records
            .remove_if(key, |_, record| {
                record.value == expected && !record.is_expired(now)
            })
            .is_some();
        Ok(removed)
    }

    async fn compare_and_set_ttl(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.enter().await?;

        let now = Instant::now();
        match self.records.get_mut(key) {
            Some(mut record) if record.value == expected && !record.is_expired(now) => {
                record.expires_at = expiry(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
