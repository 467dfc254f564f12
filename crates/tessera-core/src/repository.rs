//! Storage contracts.
//!
//! [`RecordStore`] and [`UserRepository`] are the collaborators the
//! caller's environment provides. [`SessionStore`] is the contract each
//! session tier (stateless, cache, durable) implements for the manager.
//! All operations are async.

use std::cmp::Ordering;

use serde_json::Value;
use uuid::Uuid;

use crate::error::SessionResult;
use crate::models::{
    session::{ResolvedSession, Session},
    user::User,
};

/// An opaque field map as exchanged with the record store.
pub type Record = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Lt,
    Gt,
}

/// A single field condition. A filter is a slice of predicates that must
/// all hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Eq,
            value: value.into(),
        }
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Lt,
            value: value.into(),
        }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator: Operator::Gt,
            value: value.into(),
        }
    }

    /// Evaluate against a record. A missing field reads as `null`;
    /// ordering is defined between two numbers or two strings only.
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.get(&self.field).unwrap_or(&Value::Null);
        match self.operator {
            Operator::Eq => actual == &self.value,
            Operator::Lt => compare(actual, &self.value) == Some(Ordering::Less),
            Operator::Gt => compare(actual, &self.value) == Some(Ordering::Greater),
        }
    }
}

/// `true` when every predicate in `filter` holds for `record`.
pub fn matches_all(filter: &[Predicate], record: &Record) -> bool {
    filter.iter().all(|p| p.matches(record))
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Generic persistent storage addressed by model name.
pub trait RecordStore: Send + Sync {
    fn create(
        &self,
        model: &str,
        record: Record,
    ) -> impl Future<Output = SessionResult<Record>> + Send;
    fn find_one(
        &self,
        model: &str,
        filter: &[Predicate],
    ) -> impl Future<Output = SessionResult<Option<Record>>> + Send;
    fn find_many(
        &self,
        model: &str,
        filter: &[Predicate],
    ) -> impl Future<Output = SessionResult<Vec<Record>>> + Send;
    /// Merge `fields` into every matching record. Returns the match count.
    fn update(
        &self,
        model: &str,
        filter: &[Predicate],
        fields: Record,
    ) -> impl Future<Output = SessionResult<u64>> + Send;
    /// Returns the number of records removed.
    fn delete_many(
        &self,
        model: &str,
        filter: &[Predicate],
    ) -> impl Future<Output = SessionResult<u64>> + Send;
    /// Release held connections.
    fn close(&self) -> impl Future<Output = SessionResult<()>> + Send {
        async { Ok(()) }
    }
}

pub trait UserRepository: Send + Sync {
    fn find_by_id(&self, id: Uuid) -> impl Future<Output = SessionResult<Option<User>>> + Send;
}

// ---------------------------------------------------------------------------
// Session tiers
// ---------------------------------------------------------------------------

pub trait SessionStore: Send + Sync {
    /// Write `session`. Tiers that embed a user snapshot store `user`
    /// alongside it.
    fn set(
        &self,
        session: &Session,
        user: Option<&User>,
    ) -> impl Future<Output = SessionResult<()>> + Send;
    /// Rewrite an existing entry for `session.token`, never inserting one.
    /// Returns `false` when the tier holds no entry for the token, such as
    /// after a revoke.
    fn refresh(&self, session: &Session) -> impl Future<Output = SessionResult<bool>> + Send;
    /// Resolve a token. Unknown and expired tokens yield `None`.
    fn get(
        &self,
        token: &str,
    ) -> impl Future<Output = SessionResult<Option<ResolvedSession>>> + Send;
    fn delete(&self, token: &str) -> impl Future<Output = SessionResult<()>> + Send;
    /// Returns the number of sessions revoked.
    fn delete_by_user_id(&self, user_id: Uuid) -> impl Future<Output = SessionResult<u64>> + Send;
    /// Non-expired sessions owned by `user_id`.
    fn list_by_user_id(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = SessionResult<Vec<Session>>> + Send;
    /// Remove expired entries. Returns the number purged.
    fn cleanup(&self) -> impl Future<Output = SessionResult<u64>> + Send;
    fn close(&self) -> impl Future<Output = SessionResult<()>> + Send;
}
