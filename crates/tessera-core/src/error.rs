//! Error types shared by every session tier.
//!
//! "No session" is never an error: unknown, expired and revoked tokens
//! resolve to `None`. The variants below are reserved for rejected input
//! and for tier failures.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("User not found: {user_id}")]
    UserNotFound { user_id: Uuid },

    #[error("Session is already expired")]
    AlreadyExpired,

    #[error("Invalid session token: {0}")]
    InvalidToken(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// The caller supplied something malformed or tampered with.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidToken(_) | Self::AlreadyExpired)
    }

    /// A tier could not be reached, or is misconfigured.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Cache(_) | Self::Database(_)
        )
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
