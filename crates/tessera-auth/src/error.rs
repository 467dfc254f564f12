//! Stateless token error types.

use tessera_core::error::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("issuer mismatch: expected {expected}, found {found}")]
    IssuerMismatch { expected: String, found: String },

    #[error("envelope encoding failed: {0}")]
    Encode(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<TokenError> for SessionError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed(_)
            | TokenError::SignatureMismatch
            | TokenError::IssuerMismatch { .. } => SessionError::InvalidToken(err.to_string()),
            TokenError::Encode(msg) => SessionError::Serialization(msg),
            TokenError::Crypto(msg) => SessionError::Crypto(msg),
        }
    }
}
