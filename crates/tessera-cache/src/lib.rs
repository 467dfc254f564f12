//! Tessera Cache — the shared-cache session tier.
//!
//! [`CacheSessionStore`] keeps `(session, user snapshot)` pairs in any
//! [`KeyValueCache`], with a TTL bounded by the session's own expiry.
//! [`RedisCache`] is the production backend; [`MemoryCache`] serves
//! single-process deployments and tests.

pub mod backend;
mod config;
mod error;
mod store;

pub use backend::{KeyValueCache, MemoryCache, RedisCache};
pub use config::CacheConfig;
pub use error::CacheError;
pub use store::CacheSessionStore;
