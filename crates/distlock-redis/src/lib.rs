//! distlock Redis node
//!
//! This crate provides:
//! - `RedisLockStore`, a `LockStore` backed by one Redis server
//! - Lua scripts for token-guarded delete and ttl reset
//! - `connect_all` to open every node listed in a `LockConfig`
//!
//! Each configured server is an independent node: no replication between
//! them is assumed or used.

pub mod error;
mod scripts;
pub mod store;

pub use error::{RedisStoreError, Result};
pub use store::{RedisLockStore, connect_all};
