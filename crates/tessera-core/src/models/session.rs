//! Session domain model.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::User;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Bearer credential. Cache and durable tiers are keyed on it.
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Administrator currently impersonating `user_id`, if any.
    pub impersonated_by: Option<Uuid>,
    /// Extension fields not known to the core.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Session {
    /// A session is invalid at and after `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left before expiry, or `None` once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let left = self.expires_at - now;
        (left > Duration::zero()).then_some(left)
    }
}

/// A session together with the user snapshot stored next to it.
///
/// `user` is absent only when the tier that answered does not carry a
/// snapshot and none could be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSession {
    pub session: Session,
    pub user: Option<User>,
}

/// Creation input. Never persisted as-is.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// `Some(false)` asks for a short-lived session.
    pub remember_me: Option<bool>,
    /// Overrides the configured session duration.
    pub expires_in: Option<Duration>,
    pub impersonated_by: Option<Uuid>,
    pub metadata: HashMap<String, serde_json::Value>,
}
