//! Shared fixtures for distlock-core integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use distlock_core::{DistributedLockService, LockConfig, LockStore, MemoryLockStore, StoreError};

/// Memory node that counts `set_if_absent` calls
pub struct CountingStore {
    pub inner: MemoryLockStore,
    acquires: AtomicUsize,
}

impl CountingStore {
    pub fn new(endpoint: &str) -> Self {
        Self {
            inner: MemoryLockStore::new(endpoint),
            acquires: AtomicUsize::new(0),
        }
    }

    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LockStore for CountingStore {
    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn compare_and_set_ttl(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.compare_and_set_ttl(key, expected, ttl).await
    }
}

/// `n` in-memory nodes behind one service
pub fn cluster(n: usize) -> (Vec<Arc<MemoryLockStore>>, DistributedLockService) {
    cluster_with_config(n, LockConfig::default())
}

pub fn cluster_with_config(
    n: usize,
    config: LockConfig,
) -> (Vec<Arc<MemoryLockStore>>, DistributedLockService) {
    let stores: Vec<Arc<MemoryLockStore>> = (0..n)
        .map(|i| Arc::new(MemoryLockStore::new(format!("mem-{}", i))))
        .collect();
    let nodes: Vec<Arc<dyn LockStore>> = stores
        .iter()
        .map(|store| store.clone() as Arc<dyn LockStore>)
        .collect();
    let service = DistributedLockService::from_config(&config, nodes).unwrap();
    (stores, service)
}
