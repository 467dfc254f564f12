//! Integration tests for the session manager across every strategy.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tessera_auth::config::{SessionConfig, StatelessConfig, TierToggles};
use tessera_auth::manager::{SessionManager, SessionTiers};
use tessera_auth::strategy::Strategy;
use tessera_auth::token::StatelessTokenStore;
use tessera_cache::{CacheConfig, CacheSessionStore, KeyValueCache, MemoryCache};
use tessera_core::clock::{Clock, ManualClock};
use tessera_core::error::{SessionError, SessionResult};
use tessera_core::models::session::{ResolvedSession, Session, SessionOptions};
use tessera_core::models::user::User;
use tessera_core::repository::{SessionStore, UserRepository};
use tessera_db::{
    DurableSessionStore, InMemoryRecordStore, RecordOp, RecordUserRepository, SESSION_MODEL,
};
use uuid::Uuid;

type Manager = SessionManager<
    DurableSessionStore<InMemoryRecordStore>,
    CacheSessionStore<MemoryCache>,
    RecordUserRepository<InMemoryRecordStore>,
>;

const ALL_STRATEGIES: [Strategy; 5] = [
    Strategy::StatelessOnly,
    Strategy::CacheOnly,
    Strategy::DurableOnly,
    Strategy::CacheFirst,
    Strategy::DurableFirst,
];

const STATEFUL_STRATEGIES: [Strategy; 4] = [
    Strategy::CacheOnly,
    Strategy::DurableOnly,
    Strategy::CacheFirst,
    Strategy::DurableFirst,
];

struct Harness {
    manager: Manager,
    records: InMemoryRecordStore,
    cache: MemoryCache,
    clock: Arc<ManualClock>,
    alice: User,
    bob: User,
}

/// Whole-millisecond instant, matching the durable tier's resolution.
fn start() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap()
}

fn user(name: &str) -> User {
    User {
        id: Uuid::new_v4(),
        email: format!("{name}@example.com"),
        name: name.into(),
        email_verified: true,
        role: None,
        banned: false,
    }
}

/// 1h sessions, 15m refresh window, tiers matching `strategy`.
fn config_for(strategy: Strategy) -> SessionConfig {
    let (stateless, cache, durable) = match strategy {
        Strategy::StatelessOnly => (true, false, false),
        Strategy::CacheOnly => (false, true, false),
        Strategy::DurableOnly => (false, false, true),
        Strategy::CacheFirst | Strategy::DurableFirst => (false, true, true),
    };
    SessionConfig {
        default_duration_secs: 3_600,
        short_duration_secs: 600,
        update_age_secs: 900,
        prefer_durable: strategy == Strategy::DurableFirst,
        tiers: TierToggles {
            stateless,
            cache,
            durable,
        },
        stateless: StatelessConfig {
            secret: "test-signing-secret".into(),
            issuer: "tessera-test".into(),
        },
        ..SessionConfig::default()
    }
}

async fn harness_with(config: SessionConfig) -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let records = InMemoryRecordStore::new();
    let cache = MemoryCache::new(clock.clone());

    let users = RecordUserRepository::new(records.clone());
    let alice = user("alice");
    let bob = user("bob");
    users.insert(&alice).await.unwrap();
    users.insert(&bob).await.unwrap();

    let tiers = SessionTiers {
        durable: config
            .tiers
            .durable
            .then(|| DurableSessionStore::new(records.clone(), clock.clone())),
        cache: config.tiers.cache.then(|| {
            CacheSessionStore::new(cache.clone(), &CacheConfig::default(), clock.clone())
        }),
        stateless: config
            .tiers
            .stateless
            .then(|| StatelessTokenStore::new(&config.stateless, clock.clone()).unwrap()),
    };
    let manager = SessionManager::new(config, tiers, users, clock.clone()).unwrap();

    Harness {
        manager,
        records,
        cache,
        clock,
        alice,
        bob,
    }
}

async fn harness(strategy: Strategy) -> Harness {
    let h = harness_with(config_for(strategy)).await;
    assert_eq!(h.manager.strategy(), strategy);
    h
}

fn cache_key(token: &str) -> String {
    format!("{}{token}", CacheConfig::default().key_prefix)
}

// ---------------------------------------------------------------------------
// Create / Get
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_then_get_resolves_for_every_strategy() {
    for strategy in ALL_STRATEGIES {
        let h = harness(strategy).await;
        let now = h.clock.now();

        let issued = h
            .manager
            .create(h.alice.id, SessionOptions::default())
            .await
            .unwrap();
        assert_eq!(issued.session.user_id, h.alice.id);
        assert_eq!(issued.session.expires_at, now + Duration::hours(1));
        assert_eq!(issued.user, h.alice);

        let resolved = h.manager.get(&issued.token).await.unwrap().unwrap();
        assert_eq!(resolved.session.user_id, h.alice.id, "{strategy}");
        assert_eq!(resolved.session.expires_at, issued.session.expires_at, "{strategy}");
        assert_eq!(resolved.user.as_ref(), Some(&h.alice), "{strategy}");
    }
}

#[tokio::test]
async fn create_records_provenance() {
    let h = harness(Strategy::DurableOnly).await;
    let admin = Uuid::new_v4();

    let issued = h
        .manager
        .create(
            h.alice.id,
            SessionOptions {
                ip_address: Some("198.51.100.4".into()),
                user_agent: Some("Mozilla/5.0".into()),
                impersonated_by: Some(admin),
                metadata: HashMap::from([("device".to_owned(), serde_json::json!("laptop"))]),
                ..SessionOptions::default()
            },
        )
        .await
        .unwrap();

    let ResolvedSession { session, .. } = h.manager.get(&issued.token).await.unwrap().unwrap();
    assert_eq!(session.ip_address.as_deref(), Some("198.51.100.4"));
    assert_eq!(session.user_agent.as_deref(), Some("Mozilla/5.0"));
    assert_eq!(session.impersonated_by, Some(admin));
    assert_eq!(session.metadata["device"], "laptop");
}

#[tokio::test]
async fn create_for_unknown_user_fails() {
    let h = harness(Strategy::CacheFirst).await;
    let ghost = Uuid::new_v4();

    let err = h
        .manager
        .create(ghost, SessionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::UserNotFound { user_id } if user_id == ghost));
    assert_eq!(h.records.writes(SESSION_MODEL), 0);
}

#[tokio::test]
async fn create_honours_lifetime_options() {
    let h = harness(Strategy::DurableOnly).await;
    let now = h.clock.now();

    let short = h
        .manager
        .create(
            h.alice.id,
            SessionOptions {
                remember_me: Some(false),
                ..SessionOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(short.session.expires_at, now + Duration::minutes(10));

    let explicit = h
        .manager
        .create(
            h.alice.id,
            SessionOptions {
                remember_me: Some(false),
                expires_in: Some(Duration::minutes(3)),
                ..SessionOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(explicit.session.expires_at, now + Duration::minutes(3));

    let err = h
        .manager
        .create(
            h.alice.id,
            SessionOptions {
                expires_in: Some(Duration::zero()),
                ..SessionOptions::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::AlreadyExpired));
}

#[tokio::test]
async fn unknown_and_empty_tokens_are_not_found() {
    for strategy in STATEFUL_STRATEGIES {
        let h = harness(strategy).await;
        assert!(h.manager.get("no-such-token").await.unwrap().is_none());
        assert!(h.manager.get("").await.unwrap().is_none());
    }
}

// ---------------------------------------------------------------------------
// Expiry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sessions_expire_for_every_strategy() {
    for strategy in ALL_STRATEGIES {
        let h = harness(strategy).await;
        let issued = h
            .manager
            .create(h.alice.id, SessionOptions::default())
            .await
            .unwrap();

        h.clock.advance(Duration::minutes(59));
        assert!(h.manager.get(&issued.token).await.unwrap().is_some(), "{strategy}");

        h.clock.advance(Duration::minutes(1));
        assert!(
            h.manager.get(&issued.token).await.unwrap().is_none(),
            "{strategy} resolved an expired session"
        );
    }
}

// ---------------------------------------------------------------------------
// Delete / DeleteByUserID
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_revokes_on_stateful_strategies() {
    for strategy in STATEFUL_STRATEGIES {
        let h = harness(strategy).await;
        let issued = h
            .manager
            .create(h.alice.id, SessionOptions::default())
            .await
            .unwrap();

        h.manager.delete(&issued.token).await.unwrap();
        assert!(h.manager.get(&issued.token).await.unwrap().is_none(), "{strategy}");
        assert!(h.cache.get(&cache_key(&issued.session.token)).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn stateless_tokens_survive_delete() {
    let h = harness(Strategy::StatelessOnly).await;
    let issued = h
        .manager
        .create(h.alice.id, SessionOptions::default())
        .await
        .unwrap();

    h.manager.delete(&issued.token).await.unwrap();
    h.manager.delete_by_user_id(h.alice.id).await.unwrap();
    assert!(h.manager.get(&issued.token).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_by_user_id_leaves_other_users_alone() {
    for strategy in STATEFUL_STRATEGIES {
        let h = harness(strategy).await;
        let mut alice_tokens = Vec::new();
        for _ in 0..3 {
            let issued = h
                .manager
                .create(h.alice.id, SessionOptions::default())
                .await
                .unwrap();
            alice_tokens.push(issued.token);
        }
        let bob_session = h
            .manager
            .create(h.bob.id, SessionOptions::default())
            .await
            .unwrap();

        h.manager.delete_by_user_id(h.alice.id).await.unwrap();

        for token in &alice_tokens {
            assert!(h.manager.get(token).await.unwrap().is_none(), "{strategy}");
        }
        let still = h.manager.get(&bob_session.token).await.unwrap().unwrap();
        assert_eq!(still.session.user_id, h.bob.id, "{strategy}");
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_is_lazy_and_slides_expiry() {
    let h = harness(Strategy::DurableOnly).await;
    let t0 = h.clock.now();
    let issued = h
        .manager
        .create(h.alice.id, SessionOptions::default())
        .await
        .unwrap();
    let writes_after_create = h.records.writes(SESSION_MODEL);

    h.clock.advance(Duration::minutes(5));
    assert!(h.manager.update(&issued.session).await.unwrap().is_none());
    assert_eq!(h.records.writes(SESSION_MODEL), writes_after_create);

    h.clock.advance(Duration::minutes(15));
    let refreshed = h.manager.update(&issued.session).await.unwrap().unwrap();
    assert_eq!(refreshed.expires_at, t0 + Duration::minutes(80));
    assert_eq!(refreshed.updated_at, t0 + Duration::minutes(20));
    assert_eq!(h.records.writes(SESSION_MODEL), writes_after_create + 1);

    h.clock.advance(Duration::minutes(2));
    assert!(h.manager.update(&refreshed).await.unwrap().is_none());
    h.clock.advance(Duration::minutes(2));
    assert!(h.manager.update(&refreshed).await.unwrap().is_none());
    assert_eq!(h.records.writes(SESSION_MODEL), writes_after_create + 1);

    let stored = h.manager.get(&issued.token).await.unwrap().unwrap();
    assert_eq!(stored.session.expires_at, t0 + Duration::minutes(80));
}

#[tokio::test]
async fn update_refreshes_both_tiers_and_keeps_snapshot() {
    let h = harness(Strategy::CacheFirst).await;
    let t0 = h.clock.now();
    let issued = h
        .manager
        .create(h.alice.id, SessionOptions::default())
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(30));
    h.manager.update(&issued.session).await.unwrap().unwrap();

    // Past the original expiry, inside the extended one.
    h.clock.advance(Duration::minutes(45));
    let resolved = h.manager.get(&issued.token).await.unwrap().unwrap();
    assert_eq!(resolved.session.expires_at, t0 + Duration::minutes(90));
    assert_eq!(resolved.user, Some(h.alice.clone()));
}

#[tokio::test]
async fn absolute_expiry_is_never_extended() {
    let h = harness_with(SessionConfig {
        absolute_expiry: true,
        ..config_for(Strategy::DurableOnly)
    })
    .await;
    let issued = h
        .manager
        .create(h.alice.id, SessionOptions::default())
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(30));
    let refreshed = h.manager.update(&issued.session).await.unwrap().unwrap();
    assert_eq!(refreshed.expires_at, issued.session.expires_at);

    h.clock.advance(Duration::minutes(30));
    assert!(h.manager.get(&issued.token).await.unwrap().is_none());
}

#[tokio::test]
async fn update_skips_stateless_and_expired_sessions() {
    let stateless = harness(Strategy::StatelessOnly).await;
    let issued = stateless
        .manager
        .create(stateless.alice.id, SessionOptions::default())
        .await
        .unwrap();
    stateless.clock.advance(Duration::minutes(30));
    assert!(stateless.manager.update(&issued.session).await.unwrap().is_none());

    let durable = harness(Strategy::DurableOnly).await;
    let issued = durable
        .manager
        .create(durable.alice.id, SessionOptions::default())
        .await
        .unwrap();
    durable.clock.advance(Duration::hours(2));
    let writes = durable.records.writes(SESSION_MODEL);
    assert!(durable.manager.update(&issued.session).await.unwrap().is_none());
    assert_eq!(durable.records.writes(SESSION_MODEL), writes);
}

#[tokio::test]
async fn update_after_delete_does_not_restore_the_session() {
    for strategy in STATEFUL_STRATEGIES {
        let h = harness(strategy).await;
        let issued = h
            .manager
            .create(h.alice.id, SessionOptions::default())
            .await
            .unwrap();
        let seen = h.manager.get(&issued.token).await.unwrap().unwrap();

        h.manager.delete(&issued.token).await.unwrap();
        h.clock.advance(Duration::minutes(20));

        assert!(h.manager.update(&seen.session).await.unwrap().is_none(), "{strategy}");
        assert!(h.manager.get(&issued.token).await.unwrap().is_none(), "{strategy}");
        assert!(h.cache.get(&cache_key(&issued.token)).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn update_after_delete_by_user_id_does_not_restore_the_session() {
    for strategy in STATEFUL_STRATEGIES {
        let h = harness(strategy).await;
        let issued = h
            .manager
            .create(h.alice.id, SessionOptions::default())
            .await
            .unwrap();

        h.manager.delete_by_user_id(h.alice.id).await.unwrap();
        h.clock.advance(Duration::minutes(20));

        assert!(h.manager.update(&issued.session).await.unwrap().is_none(), "{strategy}");
        assert!(h.manager.get(&issued.token).await.unwrap().is_none(), "{strategy}");
        assert_eq!(h.records.len(SESSION_MODEL).await, 0);
    }
}

#[tokio::test]
async fn cache_first_refresh_of_uncached_session_leaves_cache_empty() {
    let h = harness(Strategy::CacheFirst).await;
    let issued = h
        .manager
        .create(h.alice.id, SessionOptions::default())
        .await
        .unwrap();
    h.cache.delete(&cache_key(&issued.token)).await.unwrap();

    h.clock.advance(Duration::minutes(20));
    let refreshed = h.manager.update(&issued.session).await.unwrap().unwrap();
    assert!(h.cache.get(&cache_key(&issued.token)).await.unwrap().is_none());

    // The next read backfills the refreshed expiry.
    let resolved = h.manager.get(&issued.token).await.unwrap().unwrap();
    assert_eq!(resolved.session.expires_at, refreshed.expires_at);
    assert!(h.cache.get(&cache_key(&issued.token)).await.unwrap().is_some());
}

// ---------------------------------------------------------------------------
// Tier fan-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cache_first_backfills_after_durable_hit() {
    let h = harness(Strategy::CacheFirst).await;
    let issued = h
        .manager
        .create(h.alice.id, SessionOptions::default())
        .await
        .unwrap();

    // Served from cache: no durable lookup.
    let lookups = h.records.calls(SESSION_MODEL, RecordOp::FindOne);
    assert!(h.manager.get(&issued.token).await.unwrap().is_some());
    assert_eq!(h.records.calls(SESSION_MODEL, RecordOp::FindOne), lookups);

    // Evict, forcing one durable round trip and a backfill.
    h.cache.delete(&cache_key(&issued.token)).await.unwrap();
    assert!(h.manager.get(&issued.token).await.unwrap().is_some());
    assert_eq!(h.records.calls(SESSION_MODEL, RecordOp::FindOne), lookups + 1);
    assert!(h.cache.get(&cache_key(&issued.token)).await.unwrap().is_some());

    let resolved = h.manager.get(&issued.token).await.unwrap().unwrap();
    assert_eq!(resolved.user, Some(h.alice.clone()));
    assert_eq!(h.records.calls(SESSION_MODEL, RecordOp::FindOne), lookups + 1);
}

#[tokio::test]
async fn cache_first_treats_cache_outage_as_miss() {
    let h = harness(Strategy::CacheFirst).await;
    let issued = h
        .manager
        .create(h.alice.id, SessionOptions::default())
        .await
        .unwrap();

    h.cache.close().await.unwrap();

    let resolved = h.manager.get(&issued.token).await.unwrap().unwrap();
    assert_eq!(resolved.session.id, issued.session.id);
    assert_eq!(resolved.user, Some(h.alice.clone()));
}

#[tokio::test]
async fn cache_only_surfaces_cache_outage() {
    let h = harness(Strategy::CacheOnly).await;
    let issued = h
        .manager
        .create(h.alice.id, SessionOptions::default())
        .await
        .unwrap();

    h.cache.close().await.unwrap();

    let err = h.manager.get(&issued.token).await.unwrap_err();
    assert!(err.is_store_error(), "{err}");
}

#[tokio::test]
async fn durable_first_does_not_fall_back_to_cache() {
    let h = harness(Strategy::DurableFirst).await;
    let now = h.clock.now();

    // Present in the cache only.
    let orphan = Session {
        id: Uuid::new_v4(),
        user_id: h.alice.id,
        token: "cache-only-token".into(),
        expires_at: now + Duration::hours(1),
        created_at: now,
        updated_at: now,
        ip_address: None,
        user_agent: None,
        impersonated_by: None,
        metadata: HashMap::new(),
    };
    let side_door = CacheSessionStore::new(h.cache.clone(), &CacheConfig::default(), h.clock.clone());
    side_door.set(&orphan, Some(&h.alice)).await.unwrap();

    assert!(h.manager.get("cache-only-token").await.unwrap().is_none());
}

#[tokio::test]
async fn durable_first_backfills_cache() {
    let h = harness(Strategy::DurableFirst).await;
    let issued = h
        .manager
        .create(h.alice.id, SessionOptions::default())
        .await
        .unwrap();
    h.cache.delete(&cache_key(&issued.token)).await.unwrap();

    let lookups = h.records.calls(SESSION_MODEL, RecordOp::FindOne);
    assert!(h.manager.get(&issued.token).await.unwrap().is_some());
    assert_eq!(h.records.calls(SESSION_MODEL, RecordOp::FindOne), lookups + 1);
    assert!(h.cache.get(&cache_key(&issued.token)).await.unwrap().is_some());
}

// ---------------------------------------------------------------------------
// Stateless
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stateless_round_trip_and_tamper() {
    let h = harness(Strategy::StatelessOnly).await;
    let issued = h
        .manager
        .create(h.alice.id, SessionOptions::default())
        .await
        .unwrap();
    assert_ne!(issued.token, issued.session.token);
    assert_eq!(h.records.writes(SESSION_MODEL), 0);

    let resolved = h.manager.get(&issued.token).await.unwrap().unwrap();
    assert_eq!(resolved.session, issued.session);
    assert_eq!(resolved.user, Some(issued.user.clone()));

    let (payload, signature) = issued.token.split_once('.').unwrap();
    let mut flipped = signature.as_bytes().to_vec();
    flipped[0] = if flipped[0] == b'A' { b'B' } else { b'A' };
    let tampered = format!("{payload}.{}", String::from_utf8(flipped).unwrap());

    let err = h.manager.get(&tampered).await.unwrap_err();
    assert!(err.is_input_error(), "{err}");
    assert!(h.manager.list_by_user_id(h.alice.id).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stateless_cannot_be_combined_with_stateful_tiers() {
    let clock = Arc::new(ManualClock::new(start()));
    let records = InMemoryRecordStore::new();
    let mut config = config_for(Strategy::DurableOnly);
    config.tiers.stateless = true;

    let tiers = SessionTiers {
        durable: Some(DurableSessionStore::new(records.clone(), clock.clone())),
        cache: None::<CacheSessionStore<MemoryCache>>,
        stateless: Some(StatelessTokenStore::new(&config.stateless, clock.clone()).unwrap()),
    };
    let result = SessionManager::new(
        config,
        tiers,
        RecordUserRepository::new(records),
        clock.clone(),
    );
    assert!(matches!(result, Err(SessionError::Configuration(_))));
}

#[tokio::test]
async fn enabled_tier_without_store_is_rejected() {
    let clock = Arc::new(ManualClock::new(start()));
    let records = InMemoryRecordStore::new();

    let tiers: SessionTiers<DurableSessionStore<InMemoryRecordStore>, CacheSessionStore<MemoryCache>> =
        SessionTiers::default();
    let result = SessionManager::new(
        config_for(Strategy::CacheFirst),
        tiers,
        RecordUserRepository::new(records),
        clock.clone(),
    );
    assert!(matches!(result, Err(SessionError::Configuration(_))));
}

#[tokio::test]
async fn store_for_disabled_tier_is_rejected() {
    let clock = Arc::new(ManualClock::new(start()));
    let records = InMemoryRecordStore::new();

    let tiers = SessionTiers {
        durable: Some(DurableSessionStore::new(records.clone(), clock.clone())),
        cache: Some(CacheSessionStore::new(
            MemoryCache::new(clock.clone()),
            &CacheConfig::default(),
            clock.clone(),
        )),
        stateless: None,
    };
    let result = SessionManager::new(
        config_for(Strategy::DurableOnly),
        tiers,
        RecordUserRepository::new(records),
        clock.clone(),
    );
    let Err(SessionError::Configuration(message)) = result else {
        panic!("a cache store under durable-only must be rejected");
    };
    assert!(message.contains("takes no cache store"), "{message}");
}

#[tokio::test]
async fn cookie_config_is_exposed() {
    let h = harness(Strategy::DurableOnly).await;
    assert_eq!(h.manager.cookie_config().name, "tessera.session_token");

    let issued = h
        .manager
        .create(h.alice.id, SessionOptions::default())
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(15));
    assert_eq!(h.manager.cookie_max_age(&issued.session), 45 * 60);
}

// ---------------------------------------------------------------------------
// Listing, cleanup, shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_by_user_id_returns_live_sessions() {
    for strategy in [Strategy::CacheOnly, Strategy::CacheFirst] {
        let h = harness(strategy).await;
        let short = SessionOptions {
            expires_in: Some(Duration::minutes(5)),
            ..SessionOptions::default()
        };
        h.manager.create(h.alice.id, short).await.unwrap();
        let long = h
            .manager
            .create(h.alice.id, SessionOptions::default())
            .await
            .unwrap();
        h.manager
            .create(h.bob.id, SessionOptions::default())
            .await
            .unwrap();

        assert_eq!(h.manager.list_by_user_id(h.alice.id).await.unwrap().len(), 2);

        h.clock.advance(Duration::minutes(10));
        let live = h.manager.list_by_user_id(h.alice.id).await.unwrap();
        assert_eq!(live.len(), 1, "{strategy}");
        assert_eq!(live[0].id, long.session.id);
    }
}

#[tokio::test]
async fn cleanup_reports_purged_entries() {
    let h = harness(Strategy::CacheFirst).await;
    let short = SessionOptions {
        expires_in: Some(Duration::minutes(5)),
        ..SessionOptions::default()
    };
    h.manager.create(h.alice.id, short.clone()).await.unwrap();
    h.manager.create(h.bob.id, short).await.unwrap();
    let kept = h
        .manager
        .create(h.alice.id, SessionOptions::default())
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(10));
    // Two lapsed durable records plus their two cache entries.
    assert_eq!(h.manager.cleanup().await.unwrap(), 4);
    assert_eq!(h.records.len(SESSION_MODEL).await, 1);
    assert!(h.manager.get(&kept.token).await.unwrap().is_some());
    assert_eq!(h.manager.cleanup().await.unwrap(), 0);
}

#[tokio::test]
async fn close_is_idempotent() {
    let h = harness(Strategy::CacheFirst).await;
    let issued = h
        .manager
        .create(h.alice.id, SessionOptions::default())
        .await
        .unwrap();

    h.manager.close().await.unwrap();
    h.manager.close().await.unwrap();

    assert!(h.manager.get(&issued.token).await.is_err());
    assert!(
        h.manager
            .create(h.alice.id, SessionOptions::default())
            .await
            .is_err()
    );
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// A cache tier that never answers.
struct StalledStore;

impl SessionStore for StalledStore {
    async fn set(&self, _session: &Session, _user: Option<&User>) -> SessionResult<()> {
        std::future::pending().await
    }

    async fn refresh(&self, _session: &Session) -> SessionResult<bool> {
        std::future::pending().await
    }

    async fn get(&self, _token: &str) -> SessionResult<Option<ResolvedSession>> {
        std::future::pending().await
    }

    async fn delete(&self, _token: &str) -> SessionResult<()> {
        std::future::pending().await
    }

    async fn delete_by_user_id(&self, _user_id: Uuid) -> SessionResult<u64> {
        std::future::pending().await
    }

    async fn list_by_user_id(&self, _user_id: Uuid) -> SessionResult<Vec<Session>> {
        std::future::pending().await
    }

    async fn cleanup(&self) -> SessionResult<u64> {
        std::future::pending().await
    }

    async fn close(&self) -> SessionResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn stalled_cache_times_out_into_durable_reads() {
    let clock = Arc::new(ManualClock::new(start()));
    let records = InMemoryRecordStore::new();
    let users = RecordUserRepository::new(records.clone());
    let alice = user("alice");
    users.insert(&alice).await.unwrap();

    let config = SessionConfig {
        store_timeout_ms: Some(50),
        ..config_for(Strategy::CacheFirst)
    };
    let tiers = SessionTiers {
        durable: Some(DurableSessionStore::new(records.clone(), clock.clone())),
        cache: Some(StalledStore),
        stateless: None,
    };
    let manager = SessionManager::new(config, tiers, users, clock.clone()).unwrap();

    let issued = manager
        .create(alice.id, SessionOptions::default())
        .await
        .unwrap();
    let resolved = manager.get(&issued.token).await.unwrap().unwrap();
    assert_eq!(resolved.session.id, issued.session.id);

    let err = manager.delete(&issued.token).await.unwrap_err();
    assert!(matches!(err, SessionError::Cache(_)));
    assert!(manager.get(&issued.token).await.unwrap().is_none());
}

#[tokio::test]
async fn stalled_user_lookup_times_out() {
    struct StalledUsers;

    impl UserRepository for StalledUsers {
        async fn find_by_id(&self, _id: Uuid) -> SessionResult<Option<User>> {
            std::future::pending().await
        }
    }

    let clock = Arc::new(ManualClock::new(start()));
    let config = SessionConfig {
        store_timeout_ms: Some(50),
        ..config_for(Strategy::DurableOnly)
    };
    let tiers = SessionTiers {
        durable: Some(DurableSessionStore::new(InMemoryRecordStore::new(), clock.clone())),
        cache: None::<CacheSessionStore<MemoryCache>>,
        stateless: None,
    };
    let manager = SessionManager::new(config, tiers, StalledUsers, clock.clone()).unwrap();

    let err = manager
        .create(Uuid::new_v4(), SessionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Database(_)), "{err}");
}

// ---------------------------------------------------------------------------
// Durable outages
// ---------------------------------------------------------------------------

/// A durable tier whose backend is unreachable.
struct FailingStore;

fn unreachable_db() -> SessionError {
    SessionError::Database("connection refused".into())
}

impl SessionStore for FailingStore {
    async fn set(&self, _session: &Session, _user: Option<&User>) -> SessionResult<()> {
        Err(unreachable_db())
    }

    async fn refresh(&self, _session: &Session) -> SessionResult<bool> {
        Err(unreachable_db())
    }

    async fn get(&self, _token: &str) -> SessionResult<Option<ResolvedSession>> {
        Err(unreachable_db())
    }

    async fn delete(&self, _token: &str) -> SessionResult<()> {
        Err(unreachable_db())
    }

    async fn delete_by_user_id(&self, _user_id: Uuid) -> SessionResult<u64> {
        Err(unreachable_db())
    }

    async fn list_by_user_id(&self, _user_id: Uuid) -> SessionResult<Vec<Session>> {
        Err(unreachable_db())
    }

    async fn cleanup(&self) -> SessionResult<u64> {
        Err(unreachable_db())
    }

    async fn close(&self) -> SessionResult<()> {
        Ok(())
    }
}

struct Outage {
    manager: SessionManager<
        FailingStore,
        CacheSessionStore<MemoryCache>,
        RecordUserRepository<InMemoryRecordStore>,
    >,
    cache: MemoryCache,
    clock: Arc<ManualClock>,
    alice: User,
}

async fn outage(strategy: Strategy) -> Outage {
    let clock = Arc::new(ManualClock::new(start()));
    let records = InMemoryRecordStore::new();
    let cache = MemoryCache::new(clock.clone());
    let users = RecordUserRepository::new(records.clone());
    let alice = user("alice");
    users.insert(&alice).await.unwrap();

    let tiers = SessionTiers {
        durable: Some(FailingStore),
        cache: Some(CacheSessionStore::new(
            cache.clone(),
            &CacheConfig::default(),
            clock.clone(),
        )),
        stateless: None,
    };
    let manager = SessionManager::new(config_for(strategy), tiers, users, clock.clone()).unwrap();
    Outage {
        manager,
        cache,
        clock,
        alice,
    }
}

/// Put a live session for `user` straight into the cache.
async fn seed_cache(cache: &MemoryCache, clock: &Arc<ManualClock>, user: &User, token: &str) {
    let now = clock.now();
    let session = Session {
        id: Uuid::new_v4(),
        user_id: user.id,
        token: token.into(),
        expires_at: now + Duration::hours(1),
        created_at: now,
        updated_at: now,
        ip_address: None,
        user_agent: None,
        impersonated_by: None,
        metadata: HashMap::new(),
    };
    CacheSessionStore::new(cache.clone(), &CacheConfig::default(), clock.clone())
        .set(&session, Some(user))
        .await
        .unwrap();
}

#[tokio::test]
async fn durable_outage_is_a_hard_failure_on_get() {
    for strategy in [Strategy::CacheFirst, Strategy::DurableFirst] {
        let o = outage(strategy).await;

        let err = o.manager.get("missing-from-cache").await.unwrap_err();
        assert!(matches!(err, SessionError::Database(_)), "{strategy}: {err}");
    }

    // Durable-first consults the durable tier even when the cache holds the token.
    let o = outage(Strategy::DurableFirst).await;
    seed_cache(&o.cache, &o.clock, &o.alice, "cached-token").await;
    let err = o.manager.get("cached-token").await.unwrap_err();
    assert!(matches!(err, SessionError::Database(_)), "{err}");
}

#[tokio::test]
async fn delete_reaches_cache_when_durable_fails() {
    let o = outage(Strategy::CacheFirst).await;
    seed_cache(&o.cache, &o.clock, &o.alice, "doomed-token").await;

    let err = o.manager.delete("doomed-token").await.unwrap_err();
    assert!(matches!(err, SessionError::Database(_)), "{err}");
    assert!(o.cache.get(&cache_key("doomed-token")).await.unwrap().is_none());

    seed_cache(&o.cache, &o.clock, &o.alice, "other-token").await;
    let err = o.manager.delete_by_user_id(o.alice.id).await.unwrap_err();
    assert!(matches!(err, SessionError::Database(_)), "{err}");
    assert!(o.cache.get(&cache_key("other-token")).await.unwrap().is_none());
}
