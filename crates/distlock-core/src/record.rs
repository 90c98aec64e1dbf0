//! Storage representation of a lock record
//!
//! A record is stored on each node as `storage_key -> token`, the node owning
//! the expiry. The storage key is derived from a format string with a single
//! `{}` placeholder for the lock key (default `redlock:{}`).

use crate::error::LockError;
use crate::model::{LockKey, LockToken};

/// Default storage key format
pub const DEFAULT_KEY_FORMAT: &str = "redlock:{}";

const PLACEHOLDER: &str = "{}";

/// A lock identity as written to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub key: LockKey,
    pub token: LockToken,
}

impl LockRecord {
    pub fn new(key: LockKey, token: LockToken) -> Self {
        Self { key, token }
    }
}

/// Encodes and decodes lock records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCodec {
    prefix: String,
    suffix: String,
}

impl Default for RecordCodec {
    fn default() -> Self {
        Self {
            prefix: "redlock:".to_string(),
            suffix: String::new(),
        }
    }
}

impl RecordCodec {
    pub fn new(key_format: &str) -> Result<Self, LockError> {
        if key_format.matches(PLACEHOLDER).count() != 1 {
            return Err(LockError::IllegalArgument(format!(
                "key format '{}' must contain exactly one '{{}}' placeholder",
                key_format
            )));
        }
        let (prefix, suffix) = key_format
            .split_once(PLACEHOLDER)
            .unwrap_or((key_format, ""));
        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    pub fn storage_key(&self, key: &LockKey) -> String {
        format!("{}{}{}", self.prefix, key, self.suffix)
    }

    pub fn encode(&self, record: &LockRecord) -> (String, String) {
        (self.storage_key(&record.key), record.token.to_string())
    }

    pub fn decode(&self, storage_key: &str, value: &str) -> Result<LockRecord, LockError> {
        let key = storage_key
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_suffix(self.suffix.as_str()))
            .ok_or_else(|| {
                LockError::Codec(format!(
                    "storage key '{}' does not match format '{}{}{}'",
                    storage_key, self.prefix, PLACEHOLDER, self.suffix
                ))
            })?;
        let key = LockKey::new(key)
            .map_err(|_| LockError::Codec(format!("storage key '{}' has an empty lock key", storage_key)))?;
        Ok(LockRecord::new(key, LockToken::parse(value)?))
    }
}
