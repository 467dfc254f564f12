//! Layered server configuration.

use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use config::{Environment, File};
use serde::Deserialize;
use tessera_auth::SessionConfig;
use tessera_cache::CacheConfig;
use tessera_db::DbConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub session: SessionConfig,
    pub cache: CacheConfig,
    pub db: DbConfig,
    /// Seconds between cleanup sweeps. Zero disables the sweep.
    pub cleanup_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            cache: CacheConfig::default(),
            db: DbConfig::default(),
            cleanup_interval_secs: 3_600,
        }
    }
}

impl ServerConfig {
    /// Load `config/base.toml`, then `config/{APP_ENV}.toml`, then
    /// `TESSERA__*` environment variables (e.g.
    /// `TESSERA__SESSION__STATELESS__SECRET`).
    pub fn load() -> Result<Self> {
        let environment = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let mut builder = config::Config::builder();

        let base_config = Path::new(&config_dir).join("base.toml");
        if base_config.exists() {
            builder = builder.add_source(File::from(base_config));
        }

        let env_config = Path::new(&config_dir).join(format!("{environment}.toml"));
        if env_config.exists() {
            builder = builder.add_source(File::from(env_config));
        }

        builder = builder.add_source(
            Environment::with_prefix("TESSERA")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
