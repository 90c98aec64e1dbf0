//! Error types for the Redis node

use distlock_core::StoreError;

/// Error raised while setting up Redis nodes
#[derive(Debug, thiserror::Error)]
pub enum RedisStoreError {
    #[error("invalid node address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: redis::RedisError,
    },

    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: redis::RedisError,
    },

    #[error("no nodes configured")]
    NoNodes,
}

pub type Result<T> = std::result::Result<T, RedisStoreError>;

/// Map a Redis client error to the node error seen by the lock core.
///
/// Connection-level failures mean the node could not be reached; anything
/// else is a server-side or protocol failure.
pub(crate) fn store_error(err: redis::RedisError) -> StoreError {
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        StoreError::Unavailable(err.to_string())
    } else {
        StoreError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::ErrorKind;

    #[test]
    fn test_error_display() {
        assert_eq!(RedisStoreError::NoNodes.to_string(), "no nodes configured");

        let err = RedisStoreError::Connect {
            endpoint: "127.0.0.1:6379".to_string(),
            source: redis::RedisError::from((ErrorKind::IoError, "connection refused")),
        };
        assert!(err.to_string().starts_with("failed to connect to 127.0.0.1:6379"));
    }

    #[test]
    fn test_store_error_mapping() {
        let io = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(store_error(io), StoreError::Unavailable(_)));

        let script = redis::RedisError::from((ErrorKind::ResponseError, "ERR script failed"));
        assert!(matches!(store_error(script), StoreError::Backend(_)));
    }
}
