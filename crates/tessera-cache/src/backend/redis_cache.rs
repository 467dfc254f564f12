//! Redis cache backend.

use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;
use tracing::info;

use super::KeyValueCache;
use crate::config::CacheConfig;
use crate::error::CacheError;

/// Redis backend over a multiplexed, auto-reconnecting connection.
///
/// Entries expire natively through `PX`, so [`KeyValueCache::purge_expired`]
/// has nothing to do.
pub struct RedisCache {
    connection: RwLock<Option<ConnectionManager>>,
    scan_batch: usize,
}

impl RedisCache {
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        info!("Connecting to Redis session cache");
        let client = redis::Client::open(config.url.as_str())?;
        let mut connection = client.get_connection_manager().await?;
        redis::cmd("PING").query_async::<String>(&mut connection).await?;
        info!("Redis session cache ready");

        Ok(Self {
            connection: RwLock::new(Some(connection)),
            scan_batch: config.scan_batch.max(1),
        })
    }

    /// A handle to the shared connection. Cloning is cheap; clones
    /// multiplex over the same socket.
    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or(CacheError::Closed)
    }
}

/// Escape glob metacharacters so `prefix` matches literally in `SCAN MATCH`.
fn match_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

impl KeyValueCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: u64 = conn.del(key).await?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.connection().await?;
        let pattern = match_pattern(prefix);
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(self.scan_batch)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        Ok(0)
    }

    async fn close(&self) -> Result<(), CacheError> {
        if self.connection.write().await.take().is_some() {
            info!("Redis session cache connection released");
        }
        Ok(())
    }
}
