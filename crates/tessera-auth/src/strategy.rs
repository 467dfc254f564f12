//! Storage strategy selection.

use std::fmt;

use tessera_core::error::SessionError;

use crate::config::TierToggles;

/// Read/write fan-out policy, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Signed envelope only; no server-side state.
    StatelessOnly,
    CacheOnly,
    DurableOnly,
    /// Cache lookup, then durable with cache-aside backfill.
    CacheFirst,
    /// Durable lookup with cache backfill; no cache fallback on a miss.
    DurableFirst,
}

impl Strategy {
    /// Pick the strategy for a set of enabled tiers.
    ///
    /// The stateless tier cannot be combined with the others: its
    /// returned token is the signed envelope, which the cache and durable
    /// tiers never index.
    pub fn select(tiers: TierToggles, prefer_durable: bool) -> Result<Self, SessionError> {
        match (tiers.stateless, tiers.cache, tiers.durable) {
            (true, false, false) => Ok(Self::StatelessOnly),
            (true, _, _) => Err(SessionError::Configuration(
                "the stateless tier cannot be enabled together with cache or durable tiers".into(),
            )),
            (false, true, false) => Ok(Self::CacheOnly),
            (false, false, true) => Ok(Self::DurableOnly),
            (false, true, true) if prefer_durable => Ok(Self::DurableFirst),
            (false, true, true) => Ok(Self::CacheFirst),
            (false, false, false) => Err(SessionError::Configuration(
                "at least one session tier must be enabled".into(),
            )),
        }
    }

    pub fn uses_cache(self) -> bool {
        matches!(self, Self::CacheOnly | Self::CacheFirst | Self::DurableFirst)
    }

    pub fn uses_durable(self) -> bool {
        matches!(self, Self::DurableOnly | Self::CacheFirst | Self::DurableFirst)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StatelessOnly => "stateless-only",
            Self::CacheOnly => "cache-only",
            Self::DurableOnly => "durable-only",
            Self::CacheFirst => "cache-first",
            Self::DurableFirst => "durable-first",
        };
        f.write_str(name)
    }
}
