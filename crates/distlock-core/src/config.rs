// Lock configuration
// Node addresses, per-node timeout, clock-drift margin and default call options

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LockError;
use crate::model::LockOptions;
use crate::record::{DEFAULT_KEY_FORMAT, RecordCodec};

/// Clock-drift allowance: `ttl * factor + min`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockDrift {
    factor: f64,
    min: Duration,
}

impl Default for ClockDrift {
    fn default() -> Self {
        Self {
            factor: 0.01,
            min: Duration::from_millis(2),
        }
    }
}

impl ClockDrift {
    pub fn new(factor: f64, min: Duration) -> Result<Self, LockError> {
        if !factor.is_finite() || !(0.0..1.0).contains(&factor) {
            return Err(LockError::IllegalArgument(format!(
                "clock drift factor must be in [0, 1), got {}",
                factor
            )));
        }
        Ok(Self { factor, min })
    }

    /// No allowance at all
    pub fn none() -> Self {
        Self {
            factor: 0.0,
            min: Duration::ZERO,
        }
    }

    pub fn margin(&self, ttl: Duration) -> Duration {
        ttl.mul_f64(self.factor) + self.min
    }
}

/// Configuration for the lock service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Storage node addresses (e.g. `redis://10.0.0.1:6379`)
    pub nodes: Vec<String>,

    /// Per-node call timeout in milliseconds (default: 500ms)
    /// Must stay well below the wait budget so one slow node cannot stall an attempt
    pub node_timeout_ms: u64,

    /// Fraction of the ttl deducted for clock drift between nodes (default: 0.01)
    pub clock_drift_factor: f64,

    /// Fixed clock-drift deduction in milliseconds (default: 2ms)
    pub clock_drift_min_ms: u64,

    /// Storage key format with one `{}` placeholder (default: `redlock:{}`)
    pub key_format: String,

    /// Default lock ttl in milliseconds (default: 30000ms)
    pub ttl_ms: u64,

    /// Default wait budget in milliseconds (default: 10000ms)
    pub wait_ms: u64,

    /// Default retry interval in milliseconds (default: 1000ms)
    pub retry_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            node_timeout_ms: 500,
            clock_drift_factor: 0.01,
            clock_drift_min_ms: 2,
            key_format: DEFAULT_KEY_FORMAT.to_string(),
            ttl_ms: 30000,
            wait_ms: 10000,
            retry_ms: 1000,
        }
    }
}

impl LockConfig {
    /// Create a config for the given node addresses with default settings
    pub fn with_nodes<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: nodes.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    pub fn clock_drift(&self) -> Result<ClockDrift, LockError> {
        ClockDrift::new(
            self.clock_drift_factor,
            Duration::from_millis(self.clock_drift_min_ms),
        )
    }

    pub fn codec(&self) -> Result<RecordCodec, LockError> {
        RecordCodec::new(&self.key_format)
    }

    /// Call options built from the configured defaults
    pub fn default_options(&self) -> LockOptions {
        LockOptions::new(
            Duration::from_millis(self.ttl_ms),
            Duration::from_millis(self.wait_ms),
            Duration::from_millis(self.retry_ms),
        )
    }

    pub fn validate(&self) -> Result<(), LockError> {
        if self.node_timeout_ms == 0 {
            return Err(LockError::IllegalArgument(
                "node timeout must be greater than zero".to_string(),
            ));
        }
        if self.nodes.iter().any(|node| node.trim().is_empty()) {
            return Err(LockError::IllegalArgument(
                "node address must not be empty".to_string(),
            ));
        }
        self.clock_drift()?;
        self.codec()?;
        self.default_options().validate()
    }
}
