//! Key/value backends the cache tier can sit on.

mod memory;
mod redis_cache;

use std::time::Duration;

use crate::error::CacheError;

pub use self::memory::MemoryCache;
pub use self::redis_cache::RedisCache;

/// A shared low-latency key/value service with per-key expiry.
///
/// Handles are long-lived and reentrant: every method takes `&self` and
/// may be called concurrently.
pub trait KeyValueCache: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, CacheError>> + Send;
    fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), CacheError>> + Send;
    /// Every key starting with `prefix`, gathered incrementally.
    fn scan_prefix(&self, prefix: &str)
    -> impl Future<Output = Result<Vec<String>, CacheError>> + Send;
    /// Drop lapsed entries. Backends that expire keys natively return 0.
    fn purge_expired(&self) -> impl Future<Output = Result<u64, CacheError>> + Send;
    /// Release the connection. Later calls fail with [`CacheError::Closed`].
    fn close(&self) -> impl Future<Output = Result<(), CacheError>> + Send;
}
