//! Cache session tier.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tessera_core::clock::Clock;
use tessera_core::error::SessionResult;
use tessera_core::models::session::{ResolvedSession, Session};
use tessera_core::models::user::User;
use tessera_core::repository::SessionStore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::KeyValueCache;
use crate::config::CacheConfig;
use crate::error::CacheError;

/// Value stored under each session key.
#[derive(Debug, Serialize, Deserialize)]
struct CachedSession {
    session: Session,
    user: Option<User>,
}

/// The low-latency tier.
///
/// Keys are `key_prefix + token`. There is no index by user, so revoking
/// or listing a user's sessions scans every key under the prefix and
/// decodes each candidate: O(n) in the number of cached sessions.
pub struct CacheSessionStore<K: KeyValueCache> {
    cache: K,
    key_prefix: String,
    max_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K: KeyValueCache> CacheSessionStore<K> {
    pub fn new(cache: K, config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            key_prefix: config.key_prefix.clone(),
            max_ttl: Duration::from_secs(config.max_ttl_secs),
            clock,
        }
    }

    pub fn backend(&self) -> &K {
        &self.cache
    }

    pub fn key(&self, token: &str) -> String {
        format!("{}{token}", self.key_prefix)
    }

    /// Lesser of the configured ceiling and the time left on `session`.
    fn ttl_for(&self, session: &Session) -> Result<Duration, CacheError> {
        let left = session
            .remaining(self.clock.now())
            .and_then(|left| left.to_std().ok())
            .ok_or(CacheError::AlreadyExpired)?;
        Ok(left.min(self.max_ttl))
    }

    async fn read(&self, key: &str) -> Result<Option<CachedSession>, CacheError> {
        let Some(raw) = self.cache.get(key).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn write(&self, entry: &CachedSession) -> Result<(), CacheError> {
        let ttl = self.ttl_for(&entry.session)?;
        let raw = serde_json::to_string(entry)?;
        self.cache
            .set(&self.key(&entry.session.token), raw, ttl)
            .await
    }

    /// Live entries under the prefix owned by `user_id`, with their keys.
    async fn entries_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(String, CachedSession)>, CacheError> {
        let now = self.clock.now();
        let mut owned = Vec::new();
        for key in self.cache.scan_prefix(&self.key_prefix).await? {
            let entry = match self.read(&key).await {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(CacheError::Codec(e)) => {
                    warn!(error = %e, "Skipping undecodable session cache entry");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if entry.session.user_id == user_id && !entry.session.is_expired_at(now) {
                owned.push((key, entry));
            }
        }
        Ok(owned)
    }
}

impl<K: KeyValueCache> SessionStore for CacheSessionStore<K> {
    /// Without a `user`, an already-cached snapshot for the token is kept,
    /// so refreshing expiry does not strip it.
    async fn set(&self, session: &Session, user: Option<&User>) -> SessionResult<()> {
        let user = match user {
            Some(user) => Some(user.clone()),
            None => match self.read(&self.key(&session.token)).await {
                Ok(existing) => existing.and_then(|existing| existing.user),
                Err(e) => {
                    warn!(error = %e, session_id = %session.id, "Dropping unreadable user snapshot");
                    None
                }
            },
        };
        let entry = CachedSession {
            session: session.clone(),
            user,
        };
        self.write(&entry).await?;
        Ok(())
    }

    /// Rewrites only a live entry, keeping its user snapshot.
    async fn refresh(&self, session: &Session) -> SessionResult<bool> {
        let Some(existing) = self.read(&self.key(&session.token)).await? else {
            return Ok(false);
        };
        let entry = CachedSession {
            session: session.clone(),
            user: existing.user,
        };
        self.write(&entry).await?;
        Ok(true)
    }

    async fn get(&self, token: &str) -> SessionResult<Option<ResolvedSession>> {
        let key = self.key(token);
        let Some(entry) = self.read(&key).await? else {
            return Ok(None);
        };
        if entry.session.is_expired_at(self.clock.now()) {
            // The TTL outlived the session (clock skew or a stale write).
            debug!(session_id = %entry.session.id, "Evicting stale cached session");
            self.cache.delete(&key).await?;
            return Ok(None);
        }
        Ok(Some(ResolvedSession {
            session: entry.session,
            user: entry.user,
        }))
    }

    async fn delete(&self, token: &str) -> SessionResult<()> {
        self.cache.delete(&self.key(token)).await?;
        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: Uuid) -> SessionResult<u64> {
        let owned = self.entries_for_user(user_id).await?;
        let mut revoked = 0;
        for (key, _) in owned {
            self.cache.delete(&key).await?;
            revoked += 1;
        }
        debug!(%user_id, revoked, "Revoked cached sessions");
        Ok(revoked)
    }

    async fn list_by_user_id(&self, user_id: Uuid) -> SessionResult<Vec<Session>> {
        Ok(self
            .entries_for_user(user_id)
            .await?
            .into_iter()
            .map(|(_, entry)| entry.session)
            .collect())
    }

    async fn cleanup(&self) -> SessionResult<u64> {
        let purged = self.cache.purge_expired().await?;
        if purged > 0 {
            info!(purged, "Purged lapsed cache entries");
        }
        Ok(purged)
    }

    async fn close(&self) -> SessionResult<()> {
        self.cache.close().await?;
        Ok(())
    }
}
