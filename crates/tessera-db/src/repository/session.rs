//! Durable session tier over a [`RecordStore`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_core::clock::Clock;
use tessera_core::error::{SessionError, SessionResult};
use tessera_core::models::session::{ResolvedSession, Session};
use tessera_core::models::user::User;
use tessera_core::repository::{Predicate, Record, RecordStore, SessionStore};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DbError;

pub const SESSION_MODEL: &str = "sessions";

/// Stored shape of a session. Instants are Unix milliseconds so that
/// `expires_at` cutoffs compare numerically in any backend.
#[derive(Debug, Serialize, Deserialize)]
struct SessionRow {
    id: String,
    user_id: String,
    token: String,
    expires_at: i64,
    created_at: i64,
    updated_at: i64,
    ip_address: Option<String>,
    user_agent: Option<String>,
    impersonated_by: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

impl From<&Session> for SessionRow {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.to_string(),
            user_id: session.user_id.to_string(),
            token: session.token.clone(),
            expires_at: session.expires_at.timestamp_millis(),
            created_at: session.created_at.timestamp_millis(),
            updated_at: session.updated_at.timestamp_millis(),
            ip_address: session.ip_address.clone(),
            user_agent: session.user_agent.clone(),
            impersonated_by: session.impersonated_by.map(|id| id.to_string()),
            metadata: session.metadata.clone(),
        }
    }
}

fn corrupt(reason: String) -> DbError {
    DbError::Corrupt {
        model: SESSION_MODEL.into(),
        reason,
    }
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| corrupt(format!("invalid {field} UUID: {e}")))
}

fn parse_instant(millis: i64, field: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| corrupt(format!("{field} out of range: {millis}")))
}

impl SessionRow {
    fn into_record(self) -> Result<Record, DbError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(record)) => Ok(record),
            Ok(_) => Err(corrupt("row did not serialize to an object".into())),
            Err(e) => Err(corrupt(e.to_string())),
        }
    }

    fn from_record(record: Record) -> Result<Self, DbError> {
        serde_json::from_value(Value::Object(record)).map_err(|e| corrupt(e.to_string()))
    }

    fn try_into_session(self) -> Result<Session, DbError> {
        Ok(Session {
            id: parse_uuid(&self.id, "session")?,
            user_id: parse_uuid(&self.user_id, "user")?,
            token: self.token,
            expires_at: parse_instant(self.expires_at, "expires_at")?,
            created_at: parse_instant(self.created_at, "created_at")?,
            updated_at: parse_instant(self.updated_at, "updated_at")?,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            impersonated_by: self
                .impersonated_by
                .as_deref()
                .map(|id| parse_uuid(id, "impersonator"))
                .transpose()?,
            metadata: self.metadata,
        })
    }
}

fn record_to_session(record: Record) -> Result<Session, DbError> {
    SessionRow::from_record(record)?.try_into_session()
}

/// The record-of-truth tier.
///
/// Deliberately thin: it only knows the session model and leaves every
/// query mechanic to its [`RecordStore`]. It never embeds a user
/// snapshot.
#[derive(Clone)]
pub struct DurableSessionStore<R: RecordStore> {
    records: R,
    clock: Arc<dyn Clock>,
}

impl<R: RecordStore> DurableSessionStore<R> {
    pub fn new(records: R, clock: Arc<dyn Clock>) -> Self {
        Self { records, clock }
    }

    pub fn records(&self) -> &R {
        &self.records
    }
}

impl<R: RecordStore> SessionStore for DurableSessionStore<R> {
    /// Upsert by probe: update in place when the token is known, insert
    /// otherwise. Two concurrent first writes of one token can both
    /// insert; the backend's unique index on `token` rejects the second.
    async fn set(&self, session: &Session, _user: Option<&User>) -> SessionResult<()> {
        let by_token = [Predicate::eq("token", session.token.as_str())];
        let record = SessionRow::from(session).into_record()?;

        if self
            .records
            .find_one(SESSION_MODEL, &by_token)
            .await?
            .is_some()
        {
            self.records.update(SESSION_MODEL, &by_token, record).await?;
        } else {
            self.records.create(SESSION_MODEL, record).await?;
        }
        Ok(())
    }

    async fn refresh(&self, session: &Session) -> SessionResult<bool> {
        let record = SessionRow::from(session).into_record()?;
        let updated = self
            .records
            .update(
                SESSION_MODEL,
                &[Predicate::eq("token", session.token.as_str())],
                record,
            )
            .await?;
        Ok(updated > 0)
    }

    async fn get(&self, token: &str) -> SessionResult<Option<ResolvedSession>> {
        let Some(record) = self
            .records
            .find_one(SESSION_MODEL, &[Predicate::eq("token", token)])
            .await?
        else {
            return Ok(None);
        };

        let session = record_to_session(record)?;
        if session.is_expired_at(self.clock.now()) {
            debug!(session_id = %session.id, "Durable session expired");
            return Ok(None);
        }
        Ok(Some(ResolvedSession {
            session,
            user: None,
        }))
    }

    async fn delete(&self, token: &str) -> SessionResult<()> {
        self.records
            .delete_many(SESSION_MODEL, &[Predicate::eq("token", token)])
            .await?;
        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: Uuid) -> SessionResult<u64> {
        self.records
            .delete_many(
                SESSION_MODEL,
                &[Predicate::eq("user_id", user_id.to_string())],
            )
            .await
    }

    async fn list_by_user_id(&self, user_id: Uuid) -> SessionResult<Vec<Session>> {
        let now = self.clock.now().timestamp_millis();
        let records = self
            .records
            .find_many(
                SESSION_MODEL,
                &[
                    Predicate::eq("user_id", user_id.to_string()),
                    Predicate::gt("expires_at", now),
                ],
            )
            .await?;
        records
            .into_iter()
            .map(|r| record_to_session(r).map_err(SessionError::from))
            .collect()
    }

    async fn cleanup(&self) -> SessionResult<u64> {
        let now = self.clock.now().timestamp_millis();
        let purged = self
            .records
            .delete_many(SESSION_MODEL, &[Predicate::lt("expires_at", now)])
            .await?;
        if purged > 0 {
            info!(purged, "Purged expired durable sessions");
        }
        Ok(purged)
    }

    async fn close(&self) -> SessionResult<()> {
        self.records.close().await
    }
}
