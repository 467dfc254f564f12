//! Tessera Server — Application entry point.

mod settings;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tessera_auth::{SessionManager, SessionTiers, StatelessTokenStore};
use tessera_cache::{CacheSessionStore, RedisCache};
use tessera_core::clock::{Clock, SystemClock};
use tessera_core::repository::{SessionStore, UserRepository};
use tessera_db::{DbManager, DurableSessionStore, RecordUserRepository};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::settings::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tessera=info".parse()?))
        .json()
        .init();

    info!("Starting Tessera session service...");

    let config = ServerConfig::load()?;
    let tiers = config.session.tiers;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Users live in the database whichever session tiers are enabled.
    let db = DbManager::connect(&config.db)
        .await
        .context("Failed to connect to SurrealDB")?;
    let users = RecordUserRepository::new(db.record_store());

    let durable = tiers
        .durable
        .then(|| DurableSessionStore::new(db.record_store(), clock.clone()));

    let cache = if tiers.cache {
        let backend = RedisCache::connect(&config.cache)
            .await
            .context("Failed to connect to Redis")?;
        Some(CacheSessionStore::new(backend, &config.cache, clock.clone()))
    } else {
        None
    };

    let stateless = tiers
        .stateless
        .then(|| StatelessTokenStore::new(&config.session.stateless, clock.clone()))
        .transpose()?;

    let manager = SessionManager::new(
        config.session,
        SessionTiers {
            durable,
            cache,
            stateless,
        },
        users,
        clock,
    )?;

    let interval = Duration::from_secs(config.cleanup_interval_secs);
    tokio::select! {
        () = run_cleanup(&manager, interval) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
    }

    manager.close().await?;
    info!("Tessera session service stopped.");
    Ok(())
}

/// Purge lapsed sessions every `every`. A zero interval disables the sweep.
async fn run_cleanup<D, C, U>(manager: &SessionManager<D, C, U>, every: Duration)
where
    D: SessionStore,
    C: SessionStore,
    U: UserRepository,
{
    if every.is_zero() {
        info!("Periodic session cleanup disabled");
        return std::future::pending().await;
    }

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match manager.cleanup().await {
            Ok(purged) => info!(purged, "Session cleanup sweep finished"),
            Err(e) => warn!(error = %e, "Session cleanup sweep failed"),
        }
    }
}
