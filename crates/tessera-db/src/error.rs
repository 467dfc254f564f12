//! Database-specific error types and conversions.

use tessera_core::error::SessionError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Corrupt {model} record: {reason}")]
    Corrupt { model: String, reason: String },

    #[error("Invalid field name: {0}")]
    InvalidField(String),
}

impl From<DbError> for SessionError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Corrupt { .. } => SessionError::Serialization(err.to_string()),
            other => SessionError::Database(other.to_string()),
        }
    }
}
