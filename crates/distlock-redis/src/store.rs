//! Redis lock storage node
//!
//! Acquire is a plain `SET key token NX PX ttl`; delete and ttl reset go
//! through Lua so the token check and the write are one atomic step on the
//! server.
//!
//! The connection is opened on first use and kept in a `ConnectionManager`,
//! which reconnects on its own afterwards. A node that is down when the
//! service starts therefore only fails its own calls until it comes back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use distlock_core::{LockConfig, LockStore, MAX_TTL, StoreError};
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{RedisStoreError, Result, store_error};
use crate::scripts;

/// One Redis server acting as an independent lock node
pub struct RedisLockStore {
    endpoint: String,
    client: Client,
    conn: OnceCell<ConnectionManager>,
    compare_and_delete: Script,
    compare_and_pexpire: Script,
}

impl RedisLockStore {
    /// Create a node for `address` without connecting yet.
    ///
    /// Fails only if the address cannot be parsed.
    pub fn open(address: &str) -> Result<Self> {
        let client = Client::open(address).map_err(|source| RedisStoreError::InvalidAddress {
            address: address.to_string(),
            source,
        })?;
        Ok(Self::with_client(client, OnceCell::new()))
    }

    /// Create a node for `address` and connect right away.
    pub async fn connect(address: &str) -> Result<Self> {
        let store = Self::open(address)?;
        store
            .connection()
            .await
            .map_err(|source| RedisStoreError::Connect {
                endpoint: store.endpoint.clone(),
                source,
            })?;
        Ok(store)
    }

    /// Wrap an existing connection manager
    pub fn from_manager(client: Client, manager: ConnectionManager) -> Self {
        Self::with_client(client, OnceCell::new_with(Some(manager)))
    }

    fn with_client(client: Client, conn: OnceCell<ConnectionManager>) -> Self {
        // Address only, so credentials in the URL never reach logs or metrics
        let endpoint = client.get_connection_info().addr.to_string();
        Self {
            endpoint,
            client,
            conn,
            compare_and_delete: Script::new(scripts::COMPARE_AND_DELETE),
            compare_and_pexpire: Script::new(scripts::COMPARE_AND_PEXPIRE),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.initialized()
    }

    async fn connection(&self) -> redis::RedisResult<ConnectionManager> {
        let manager = self
            .conn
            .get_or_try_init(|| async {
                debug!(node = %self.endpoint, "Connecting to lock node");
                ConnectionManager::new(self.client.clone()).await
            })
            .await?;
        Ok(manager.clone())
    }
}

impl std::fmt::Debug for RedisLockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLockStore")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by the server
    let millis = ttl.min(MAX_TTL).as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl LockStore for RedisLockStore {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> std::result::Result<bool, StoreError> {
        let mut conn = self.connection().await.map_err(store_error)?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> std::result::Result<bool, StoreError> {
        let mut conn = self.connection().await.map_err(store_error)?;
        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(deleted == 1)
    }

    async fn compare_and_set_ttl(&self, key: &str, expected: &str, ttl: Duration) -> std::result::Result<bool, StoreError> {
        let mut conn = self.connection().await.map_err(store_error)?;
        let updated: i64 = self
            .compare_and_pexpire
            .key(key)
            .arg(expected)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(updated == 1)
    }
}

/// Open one Redis node per address in `config.nodes`, in order.
///
/// Connections are lazy: unreachable servers surface as node failures on
/// first use, where the quorum absorbs them.
pub fn connect_all(config: &LockConfig) -> Result<Vec<Arc<dyn LockStore>>> {
    if config.nodes.is_empty() {
        return Err(RedisStoreError::NoNodes);
    }

    let stores = config
        .nodes
        .iter()
        .map(|address| RedisLockStore::open(address).map(|store| Arc::new(store) as Arc<dyn LockStore>))
        .collect::<Result<Vec<_>>>()?;

    info!(
        nodes = stores.len(),
        endpoints = ?stores.iter().map(|s| s.endpoint()).collect::<Vec<_>>(),
        "Configured Redis lock nodes"
    );
    Ok(stores)
}
