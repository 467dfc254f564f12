//! Cache-layer error types and conversions.

use tessera_core::error::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache entry codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Session is already expired")]
    AlreadyExpired,

    #[error("Cache connection is closed")]
    Closed,
}

impl From<CacheError> for SessionError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::AlreadyExpired => SessionError::AlreadyExpired,
            CacheError::Codec(e) => SessionError::Serialization(e.to_string()),
            other => SessionError::Cache(other.to_string()),
        }
    }
}
