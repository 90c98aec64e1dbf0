//! distlock core - quorum-lease distributed locking
//!
//! This crate provides:
//! - Lock data model and storage record codec
//! - Storage node capability (`LockStore`) with an in-memory node
//! - Single-node driver with per-node timeouts
//! - Redlock-style quorum coordinator
//! - Retry/wait scheduler with cancellation
//! - Lock handle with guaranteed release
//! - Execution service running work under a lock

pub mod config;
pub mod driver;
pub mod error;
pub mod handle;
pub mod model;
pub mod quorum;
pub mod record;
pub mod scheduler;
pub mod service;
pub mod store;

mod stats;

// Re-export commonly used types
pub use config::{ClockDrift, LockConfig};
pub use driver::NodeDriver;
pub use error::{LockError, Result};
pub use handle::LockHandle;
pub use model::{LockKey, LockOptions, LockStats, LockToken, MAX_TTL, QuorumResult, quorum_size};
pub use quorum::{Attempt, QuorumCoordinator, ReleaseSummary};
pub use record::{LockRecord, RecordCodec};
pub use scheduler::RetryScheduler;
pub use service::DistributedLockService;
pub use store::{LockStore, MemoryLockStore, StoreError};

pub use tokio_util::sync::CancellationToken;
