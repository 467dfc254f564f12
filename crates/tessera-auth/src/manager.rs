//! Session manager: composes the tiers behind one lifecycle contract.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tessera_core::clock::Clock;
use tessera_core::error::{SessionError, SessionResult};
use tessera_core::models::session::{ResolvedSession, Session, SessionOptions};
use tessera_core::models::user::User;
use tessera_core::repository::{SessionStore, UserRepository};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{CookieConfig, SessionConfig};
use crate::strategy::Strategy;
use crate::token::{StatelessTokenStore, generate_session_token};

/// Already-constructed tier stores handed to [`SessionManager::new`].
///
/// Each store must be present exactly when its toggle in
/// [`SessionConfig::tiers`] is on.
pub struct SessionTiers<D, C> {
    pub durable: Option<D>,
    pub cache: Option<C>,
    pub stateless: Option<StatelessTokenStore>,
}

impl<D, C> Default for SessionTiers<D, C> {
    fn default() -> Self {
        Self {
            durable: None,
            cache: None,
            stateless: None,
        }
    }
}

/// Result of [`SessionManager::create`].
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: Session,
    pub user: User,
    /// Bearer token to hand to the client. Under the stateless strategy
    /// this is the signed envelope, not `session.token`.
    pub token: String,
}

#[derive(Debug, Clone, Copy)]
enum Tier {
    Cache,
    Durable,
}

impl Tier {
    fn timed_out(self, limit: StdDuration) -> SessionError {
        match self {
            Self::Cache => SessionError::Cache(format!("cache call timed out after {limit:?}")),
            Self::Durable => {
                SessionError::Database(format!("durable call timed out after {limit:?}"))
            }
        }
    }
}

/// Session manager.
///
/// Generic over the tier implementations so that it has no dependency on
/// the database or cache crates. The strategy is fixed at construction.
pub struct SessionManager<D, C, U>
where
    D: SessionStore,
    C: SessionStore,
    U: UserRepository,
{
    config: SessionConfig,
    strategy: Strategy,
    durable: Option<D>,
    cache: Option<C>,
    stateless: Option<StatelessTokenStore>,
    users: U,
    clock: Arc<dyn Clock>,
    closed: AtomicBool,
}

impl<D, C, U> SessionManager<D, C, U>
where
    D: SessionStore,
    C: SessionStore,
    U: UserRepository,
{
    pub fn new(
        config: SessionConfig,
        tiers: SessionTiers<D, C>,
        users: U,
        clock: Arc<dyn Clock>,
    ) -> SessionResult<Self> {
        config.validate()?;
        let strategy = Strategy::select(config.tiers, config.prefer_durable)?;

        let supplied = [
            ("durable", strategy.uses_durable(), tiers.durable.is_some()),
            ("cache", strategy.uses_cache(), tiers.cache.is_some()),
            (
                "stateless",
                strategy == Strategy::StatelessOnly,
                tiers.stateless.is_some(),
            ),
        ];
        for (name, enabled, present) in supplied {
            if enabled != present {
                return Err(SessionError::Configuration(format!(
                    "{strategy} strategy {} {name} store, but one was {}",
                    if enabled { "needs a" } else { "takes no" },
                    if present { "supplied" } else { "not supplied" },
                )));
            }
        }

        info!(
            %strategy,
            absolute_expiry = config.absolute_expiry,
            "Session manager ready"
        );

        Ok(Self {
            config,
            strategy,
            durable: tiers.durable,
            cache: tiers.cache,
            stateless: tiers.stateless,
            users,
            clock,
            closed: AtomicBool::new(false),
        })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Cookie transport attributes for the HTTP layer.
    pub fn cookie_config(&self) -> &CookieConfig {
        &self.config.cookie
    }

    /// Seconds until `session` expires, for the cookie `Max-Age`.
    pub fn cookie_max_age(&self, session: &Session) -> i64 {
        self.config.cookie.max_age(session, self.clock.now())
    }

    /// Issue a new session for `user_id`.
    pub async fn create(
        &self,
        user_id: Uuid,
        options: SessionOptions,
    ) -> SessionResult<IssuedSession> {
        self.ensure_open()?;

        let user = self
            .bounded(Tier::Durable, self.users.find_by_id(user_id))
            .await?
            .ok_or(SessionError::UserNotFound { user_id })?;

        let lifetime = match (options.expires_in, options.remember_me) {
            (Some(requested), _) if requested <= Duration::zero() => {
                return Err(SessionError::AlreadyExpired);
            }
            (Some(requested), _) => requested,
            (None, Some(false)) => self.config.short_duration(),
            (None, _) => self.config.default_duration(),
        };

        let now = self.clock.now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            token: generate_session_token(),
            expires_at: expiry_after(now, lifetime)?,
            created_at: now,
            updated_at: now,
            ip_address: options.ip_address,
            user_agent: options.user_agent,
            impersonated_by: options.impersonated_by,
            metadata: options.metadata,
        };

        if let Some(durable) = &self.durable {
            self.bounded(Tier::Durable, durable.set(&session, Some(&user)))
                .await?;
        }
        if let Some(cache) = &self.cache {
            let written = self
                .bounded(Tier::Cache, cache.set(&session, Some(&user)))
                .await;
            match written {
                Ok(()) => {}
                Err(e) if self.strategy == Strategy::CacheOnly => return Err(e),
                // The durable tier holds the session; reads backfill the cache.
                Err(e) => warn!(error = %e, session_id = %session.id, "Cache write failed on create"),
            }
        }

        let token = match &self.stateless {
            Some(stateless) => stateless.create_token(&session, Some(&user))?,
            None => session.token.clone(),
        };

        debug!(%user_id, session_id = %session.id, strategy = %self.strategy, "Session created");

        Ok(IssuedSession {
            session,
            user,
            token,
        })
    }

    /// Resolve a bearer token. Unknown, expired and revoked tokens are
    /// `Ok(None)`.
    pub async fn get(&self, token: &str) -> SessionResult<Option<ResolvedSession>> {
        self.ensure_open()?;
        if token.is_empty() {
            return Ok(None);
        }

        match self.strategy {
            Strategy::StatelessOnly => Ok(self.stateless_tier()?.verify(token)?),
            Strategy::CacheOnly => {
                let cache = self.cache_tier()?;
                match self.bounded(Tier::Cache, cache.get(token)).await? {
                    Some(found) => self.with_user(found).await,
                    None => Ok(None),
                }
            }
            Strategy::DurableOnly => self.durable_lookup(token).await,
            Strategy::CacheFirst => {
                if let Some(hit) = self.lenient_cache_lookup(token).await {
                    debug!(session_id = %hit.session.id, "Session resolved from cache");
                    return self.with_user(hit).await;
                }
                let Some(found) = self.durable_lookup(token).await? else {
                    return Ok(None);
                };
                self.backfill(&found).await;
                Ok(Some(found))
            }
            Strategy::DurableFirst => {
                let Some(found) = self.durable_lookup(token).await? else {
                    return Ok(None);
                };
                self.backfill(&found).await;
                Ok(Some(found))
            }
        }
    }

    /// Lazily extend a session's expiry.
    ///
    /// Writes only when at least `update_age` has passed since
    /// `session.updated_at`; returns the rewritten session in that case and
    /// `None` otherwise. Stateless tokens are immutable and never refreshed.
    pub async fn update(&self, session: &Session) -> SessionResult<Option<Session>> {
        self.ensure_open()?;
        if self.strategy == Strategy::StatelessOnly {
            return Ok(None);
        }

        let now = self.clock.now();
        if session.is_expired_at(now) {
            debug!(session_id = %session.id, "Not refreshing an expired session");
            return Ok(None);
        }
        if now - session.updated_at < self.config.update_age() {
            return Ok(None);
        }

        let mut refreshed = session.clone();
        refreshed.updated_at = now;
        if !self.config.absolute_expiry {
            refreshed.expires_at = expiry_after(now, self.config.default_duration())?;
        }

        // Refresh never inserts, so a session revoked since it was read
        // stays revoked.
        if let Some(durable) = &self.durable {
            let found = self
                .bounded(Tier::Durable, durable.refresh(&refreshed))
                .await?;
            if !found {
                debug!(session_id = %refreshed.id, "Session revoked before refresh");
                return Ok(None);
            }
        }
        if let Some(cache) = &self.cache {
            let written = self.bounded(Tier::Cache, cache.refresh(&refreshed)).await;
            match written {
                Ok(true) => {}
                Ok(false) if self.strategy == Strategy::CacheOnly => {
                    debug!(session_id = %refreshed.id, "Session revoked before refresh");
                    return Ok(None);
                }
                // Not cached; the next read backfills.
                Ok(false) => {}
                Err(e) if self.strategy == Strategy::CacheOnly => return Err(e),
                Err(e) => {
                    warn!(error = %e, session_id = %refreshed.id, "Cache write failed on refresh")
                }
            }
        }

        debug!(
            session_id = %refreshed.id,
            expires_at = %refreshed.expires_at,
            "Session refreshed"
        );
        Ok(Some(refreshed))
    }

    /// Revoke one token on every stateful tier.
    ///
    /// Every tier is attempted; the last failure, if any, is returned, so
    /// revocation may be partial.
    pub async fn delete(&self, token: &str) -> SessionResult<()> {
        self.ensure_open()?;
        if self.strategy == Strategy::StatelessOnly {
            debug!("Stateless tokens cannot be revoked before expiry");
            return Ok(());
        }

        let mut last_error = None;
        if let Some(durable) = &self.durable {
            if let Err(e) = self.bounded(Tier::Durable, durable.delete(token)).await {
                warn!(error = %e, "Durable tier delete failed");
                last_error = Some(e);
            }
        }
        if let Some(cache) = &self.cache {
            if let Err(e) = self.bounded(Tier::Cache, cache.delete(token)).await {
                warn!(error = %e, "Cache tier delete failed");
                last_error = Some(e);
            }
        }
        last_error.map_or(Ok(()), Err)
    }

    /// Revoke every session owned by `user_id` ("log out everywhere").
    pub async fn delete_by_user_id(&self, user_id: Uuid) -> SessionResult<()> {
        self.ensure_open()?;
        if self.strategy == Strategy::StatelessOnly {
            debug!(%user_id, "Stateless tokens cannot be revoked before expiry");
            return Ok(());
        }

        let mut last_error = None;
        if let Some(durable) = &self.durable {
            match self
                .bounded(Tier::Durable, durable.delete_by_user_id(user_id))
                .await
            {
                Ok(revoked) => debug!(%user_id, revoked, "Revoked durable sessions"),
                Err(e) => {
                    warn!(%user_id, error = %e, "Durable tier bulk revoke failed");
                    last_error = Some(e);
                }
            }
        }
        if let Some(cache) = &self.cache {
            match self
                .bounded(Tier::Cache, cache.delete_by_user_id(user_id))
                .await
            {
                Ok(revoked) => debug!(%user_id, revoked, "Revoked cached sessions"),
                Err(e) => {
                    warn!(%user_id, error = %e, "Cache tier bulk revoke failed");
                    last_error = Some(e);
                }
            }
        }
        if last_error.is_none() {
            info!(%user_id, "Revoked all sessions for user");
        }
        last_error.map_or(Ok(()), Err)
    }

    /// Live sessions owned by `user_id`, from the durable tier when there
    /// is one. Always empty under the stateless strategy.
    pub async fn list_by_user_id(&self, user_id: Uuid) -> SessionResult<Vec<Session>> {
        self.ensure_open()?;
        match self.strategy {
            Strategy::StatelessOnly => Ok(Vec::new()),
            Strategy::CacheOnly => {
                let cache = self.cache_tier()?;
                self.bounded(Tier::Cache, cache.list_by_user_id(user_id))
                    .await
            }
            Strategy::DurableOnly | Strategy::CacheFirst | Strategy::DurableFirst => {
                let durable = self.durable_tier()?;
                self.bounded(Tier::Durable, durable.list_by_user_id(user_id))
                    .await
            }
        }
    }

    /// Purge lapsed sessions; returns how many entries were removed.
    pub async fn cleanup(&self) -> SessionResult<u64> {
        self.ensure_open()?;

        let mut purged = 0;
        let mut last_error = None;
        if let Some(durable) = &self.durable {
            match self.bounded(Tier::Durable, durable.cleanup()).await {
                Ok(n) => purged += n,
                Err(e) => {
                    warn!(error = %e, "Durable tier cleanup failed");
                    last_error = Some(e);
                }
            }
        }
        if let Some(cache) = &self.cache {
            match self.bounded(Tier::Cache, cache.cleanup()).await {
                Ok(n) => purged += n,
                Err(e) => {
                    warn!(error = %e, "Cache tier cleanup failed");
                    last_error = Some(e);
                }
            }
        }
        debug!(purged, "Session cleanup finished");
        last_error.map_or(Ok(purged), Err)
    }

    /// Release tier connections. Later calls are no-ops.
    pub async fn close(&self) -> SessionResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut last_error = None;
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.close().await {
                warn!(error = %e, "Closing durable tier failed");
                last_error = Some(e);
            }
        }
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.close().await {
                warn!(error = %e, "Closing cache tier failed");
                last_error = Some(e);
            }
        }
        if let Some(stateless) = &self.stateless {
            stateless.close().await?;
        }
        info!("Session manager closed");
        last_error.map_or(Ok(()), Err)
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::Internal("session manager is closed".into()));
        }
        Ok(())
    }

    fn durable_tier(&self) -> SessionResult<&D> {
        self.durable
            .as_ref()
            .ok_or_else(|| SessionError::Internal("durable tier not configured".into()))
    }

    fn cache_tier(&self) -> SessionResult<&C> {
        self.cache
            .as_ref()
            .ok_or_else(|| SessionError::Internal("cache tier not configured".into()))
    }

    fn stateless_tier(&self) -> SessionResult<&StatelessTokenStore> {
        self.stateless
            .as_ref()
            .ok_or_else(|| SessionError::Internal("stateless tier not configured".into()))
    }

    /// Apply the configured per-call timeout to a tier call.
    async fn bounded<T>(
        &self,
        tier: Tier,
        call: impl Future<Output = SessionResult<T>>,
    ) -> SessionResult<T> {
        match self.config.store_timeout() {
            None => call.await,
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(tier.timed_out(limit))),
        }
    }

    /// Cache lookup where any failure counts as a miss.
    async fn lenient_cache_lookup(&self, token: &str) -> Option<ResolvedSession> {
        let cache = self.cache.as_ref()?;
        match self.bounded(Tier::Cache, cache.get(token)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn durable_lookup(&self, token: &str) -> SessionResult<Option<ResolvedSession>> {
        let durable = self.durable_tier()?;
        match self.bounded(Tier::Durable, durable.get(token)).await? {
            Some(found) => self.with_user(found).await,
            None => Ok(None),
        }
    }

    /// Attach the owning user when the tier did not carry a snapshot.
    /// A session whose user no longer exists resolves to `None`.
    async fn with_user(&self, mut found: ResolvedSession) -> SessionResult<Option<ResolvedSession>> {
        if found.user.is_some() {
            return Ok(Some(found));
        }
        let user_id = found.session.user_id;
        match self
            .bounded(Tier::Durable, self.users.find_by_id(user_id))
            .await?
        {
            Some(user) => {
                found.user = Some(user);
                Ok(Some(found))
            }
            None => {
                debug!(%user_id, session_id = %found.session.id, "Session owner no longer exists");
                Ok(None)
            }
        }
    }

    /// Cache-aside write after a durable hit. Failures are logged only.
    async fn backfill(&self, found: &ResolvedSession) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = self
            .bounded(Tier::Cache, cache.set(&found.session, found.user.as_ref()))
            .await
        {
            warn!(error = %e, session_id = %found.session.id, "Cache backfill failed");
        }
    }
}

fn expiry_after(now: DateTime<Utc>, lifetime: Duration) -> SessionResult<DateTime<Utc>> {
    now.checked_add_signed(lifetime)
        .ok_or_else(|| SessionError::Configuration("session lifetime out of range".into()))
}
