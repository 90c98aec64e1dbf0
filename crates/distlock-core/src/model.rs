//! Lock data model
//!
//! Keys, tokens, per-call options and the derived quorum result of one
//! acquisition attempt.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LockError;

/// Default lock time-to-live (30 seconds)
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);
/// Default total wait budget (10 seconds)
pub const DEFAULT_WAIT: Duration = Duration::from_secs(10);
/// Default pause between attempts (1 second)
pub const DEFAULT_RETRY: Duration = Duration::from_secs(1);
/// Longest accepted lock ttl (30 days)
pub const MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Identifier of the mutually-exclusive resource.
///
/// Never empty. Comparison is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LockKey(String);

impl LockKey {
    pub fn new(key: impl Into<String>) -> Result<Self, LockError> {
        let key = key.into();
        if key.is_empty() {
            return Err(LockError::InvalidKey);
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LockKey {
    type Error = LockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for LockKey {
    type Error = LockError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LockKey> for String {
    fn from(value: LockKey) -> Self {
        value.0
    }
}

/// Per-attempt ownership proof.
///
/// A new token is generated for every acquisition attempt and is the only
/// thing a node compares against on release or extend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(Uuid);

impl LockToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Result<Self, LockError> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|e| LockError::Codec(format!("invalid lock token '{}': {}", value, e)))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Timing parameters supplied with every lock call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// How long a granted lock stays valid on the nodes
    pub ttl: Duration,
    /// Upper bound on the total time spent trying to acquire
    pub wait: Duration,
    /// Pause between two attempts
    pub retry: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            wait: DEFAULT_WAIT,
            retry: DEFAULT_RETRY,
        }
    }
}

impl LockOptions {
    pub fn new(ttl: Duration, wait: Duration, retry: Duration) -> Self {
        Self { ttl, wait, retry }
    }

    /// Build options from whole seconds.
    pub fn from_secs(ttl: u64, wait: u64, retry: u64) -> Self {
        Self::new(
            Duration::from_secs(ttl),
            Duration::from_secs(wait),
            Duration::from_secs(retry),
        )
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_retry(mut self, retry: Duration) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), LockError> {
        if self.ttl.is_zero() {
            return Err(LockError::IllegalArgument(
                "lock ttl must be greater than zero".to_string(),
            ));
        }
        if self.ttl > MAX_TTL {
            return Err(LockError::IllegalArgument(format!(
                "lock ttl must not exceed {}s",
                MAX_TTL.as_secs()
            )));
        }
        if self.retry.is_zero() {
            return Err(LockError::IllegalArgument(
                "retry interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one fan-out across the configured nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumResult {
    /// Number of configured nodes
    pub nodes: usize,
    /// Votes required (`nodes / 2 + 1`)
    pub quorum: usize,
    /// Nodes that recorded the token
    pub successes: usize,
    /// Wall-clock time spent on the fan-out
    pub elapsed: Duration,
    /// Clock-drift allowance deducted from the ttl
    pub drift: Duration,
    /// Remaining validity (`ttl - elapsed - drift`, zero when exhausted)
    pub validity: Duration,
}

impl QuorumResult {
    pub fn new(nodes: usize, successes: usize, ttl: Duration, elapsed: Duration, drift: Duration) -> Self {
        Self {
            nodes,
            quorum: quorum_size(nodes),
            successes,
            elapsed,
            drift,
            validity: ttl.saturating_sub(elapsed).saturating_sub(drift),
        }
    }

    /// Majority reached and some validity left.
    pub fn acquired(&self) -> bool {
        self.successes >= self.quorum && !self.validity.is_zero()
    }
}

/// Majority of `nodes`.
pub fn quorum_size(nodes: usize) -> usize {
    nodes / 2 + 1
}

/// Lock statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    /// Quorum attempts made
    pub total_attempts: u64,
    /// Successful acquisitions
    pub total_acquisitions: u64,
    /// Calls that gave up after the wait budget
    pub contended: u64,
    /// Calls cancelled by the caller
    pub cancelled: u64,
    /// Handles released
    pub total_releases: u64,
    /// Node-level release failures (reclaimed by ttl)
    pub release_failures: u64,
}
