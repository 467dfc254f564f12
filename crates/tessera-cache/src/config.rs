//! Cache tier configuration.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis connection URL.
    pub url: String,
    /// Prepended to every session token to form the cache key.
    pub key_prefix: String,
    /// Ceiling on any entry's time-to-live, in seconds.
    pub max_ttl_secs: u64,
    /// `COUNT` hint for each incremental scan step.
    pub scan_batch: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".into(),
            key_prefix: "tessera:session:".into(),
            max_ttl_secs: 604_800,
            scan_batch: 100,
        }
    }
}
