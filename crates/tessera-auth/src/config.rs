//! Session configuration.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tessera_core::error::SessionError;
use tessera_core::models::session::Session;

/// Configuration for the session manager.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session lifetime in seconds (default: 604_800 = 7 days).
    pub default_duration_secs: u64,
    /// Lifetime when remember-me is explicitly off (default: 86_400 = 1 day).
    pub short_duration_secs: u64,
    /// Minimum age of the last write before a refresh rewrites the
    /// session (default: 86_400 = 1 day).
    pub update_age_secs: u64,
    /// Fix expiry at creation instead of sliding it on refresh.
    pub absolute_expiry: bool,
    /// With both cache and durable tiers, read the durable tier first.
    pub prefer_durable: bool,
    /// Per-call limit on cache and durable tier calls, in milliseconds.
    /// `None` leaves calls unbounded.
    pub store_timeout_ms: Option<u64>,
    pub tiers: TierToggles,
    pub stateless: StatelessConfig,
    /// Consumed by the HTTP layer, not by the manager.
    pub cookie: CookieConfig,
}

/// Which tiers are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TierToggles {
    pub stateless: bool,
    pub cache: bool,
    pub durable: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatelessConfig {
    /// HMAC-SHA256 signing secret.
    pub secret: String,
    /// Issuer embedded in, and required of, every envelope.
    pub issuer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

/// Cookie transport attributes for the session token.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    pub name: String,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl CookieConfig {
    /// `Max-Age` for a cookie carrying `session`, in whole seconds.
    pub fn max_age(&self, session: &Session, now: DateTime<Utc>) -> i64 {
        session
            .remaining(now)
            .map(|left| left.num_seconds())
            .unwrap_or(0)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_duration_secs: 604_800,
            short_duration_secs: 86_400,
            update_age_secs: 86_400,
            absolute_expiry: false,
            prefer_durable: false,
            store_timeout_ms: None,
            tiers: TierToggles::default(),
            stateless: StatelessConfig::default(),
            cookie: CookieConfig::default(),
        }
    }
}

impl Default for TierToggles {
    fn default() -> Self {
        Self {
            stateless: false,
            cache: false,
            durable: true,
        }
    }
}

impl Default for StatelessConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: "tessera".into(),
        }
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "tessera.session_token".into(),
            path: "/".into(),
            domain: None,
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1_000))
}

impl SessionConfig {
    pub fn default_duration(&self) -> Duration {
        seconds(self.default_duration_secs)
    }

    /// Remember-me-off lifetime, never longer than the default.
    pub fn short_duration(&self) -> Duration {
        seconds(self.short_duration_secs.min(self.default_duration_secs))
    }

    pub fn update_age(&self) -> Duration {
        seconds(self.update_age_secs)
    }

    pub fn store_timeout(&self) -> Option<StdDuration> {
        self.store_timeout_ms.map(StdDuration::from_millis)
    }

    /// Reject configurations the manager cannot honour.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.default_duration_secs == 0 {
            return Err(SessionError::Configuration(
                "default_duration_secs must be positive".into(),
            ));
        }
        if self.short_duration_secs == 0 {
            return Err(SessionError::Configuration(
                "short_duration_secs must be positive".into(),
            ));
        }
        if self.store_timeout_ms == Some(0) {
            return Err(SessionError::Configuration(
                "store_timeout_ms must be positive when set".into(),
            ));
        }
        if self.tiers.stateless {
            if self.stateless.secret.is_empty() {
                return Err(SessionError::Configuration(
                    "stateless tier requires a signing secret".into(),
                ));
            }
            if self.stateless.issuer.is_empty() {
                return Err(SessionError::Configuration(
                    "stateless tier requires an issuer".into(),
                ));
            }
        }
        // Strategy selection carries the remaining tier rules.
        crate::strategy::Strategy::select(self.tiers, self.prefer_durable).map(|_| ())
    }
}
