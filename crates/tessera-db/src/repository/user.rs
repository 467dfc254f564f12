//! [`UserRepository`] over the `users` model of a [`RecordStore`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_core::error::SessionResult;
use tessera_core::models::user::User;
use tessera_core::repository::{Predicate, RecordStore, UserRepository};
use uuid::Uuid;

use crate::error::DbError;

pub const USER_MODEL: &str = "users";

/// DB-side row: the columns the session layer reads. Other columns a
/// user table carries are ignored.
#[derive(Debug, Serialize, Deserialize)]
struct UserRow {
    id: String,
    email: String,
    name: String,
    #[serde(default)]
    email_verified: bool,
    role: Option<String>,
    #[serde(default)]
    banned: bool,
}

impl UserRow {
    fn try_into_user(self) -> Result<User, DbError> {
        let id = Uuid::parse_str(&self.id).map_err(|e| DbError::Corrupt {
            model: USER_MODEL.into(),
            reason: format!("invalid UUID: {e}"),
        })?;
        Ok(User {
            id,
            email: self.email,
            name: self.name,
            email_verified: self.email_verified,
            role: self.role,
            banned: self.banned,
        })
    }
}

/// Resolves user snapshots from the same record store the durable tier
/// writes to.
#[derive(Clone)]
pub struct RecordUserRepository<R: RecordStore> {
    records: R,
}

impl<R: RecordStore> RecordUserRepository<R> {
    pub fn new(records: R) -> Self {
        Self { records }
    }

    /// Insert a user row. Users are owned outside the session layer;
    /// this exists for seeding and tests.
    pub async fn insert(&self, user: &User) -> SessionResult<()> {
        let row = UserRow {
            id: user.id.to_string(),
            email: user.email.clone(),
            name: user.name.clone(),
            email_verified: user.email_verified,
            role: user.role.clone(),
            banned: user.banned,
        };
        let Value::Object(record) = serde_json::to_value(row).map_err(|e| DbError::Corrupt {
            model: USER_MODEL.into(),
            reason: e.to_string(),
        })?
        else {
            return Err(DbError::Corrupt {
                model: USER_MODEL.into(),
                reason: "row did not serialize to an object".into(),
            }
            .into());
        };
        self.records.create(USER_MODEL, record).await?;
        Ok(())
    }
}

impl<R: RecordStore> UserRepository for RecordUserRepository<R> {
    async fn find_by_id(&self, id: Uuid) -> SessionResult<Option<User>> {
        let Some(record) = self
            .records
            .find_one(USER_MODEL, &[Predicate::eq("id", id.to_string())])
            .await?
        else {
            return Ok(None);
        };
        let row: UserRow =
            serde_json::from_value(Value::Object(record)).map_err(|e| DbError::Corrupt {
                model: USER_MODEL.into(),
                reason: e.to_string(),
            })?;
        Ok(Some(row.try_into_user()?))
    }
}
