//! Opaque bearer token generation and the stateless signed-token tier.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tessera_core::clock::Clock;
use tessera_core::error::{SessionError, SessionResult};
use tessera_core::models::session::{ResolvedSession, Session};
use tessera_core::models::user::User;
use tessera_core::repository::SessionStore;
use tracing::debug;
use uuid::Uuid;

use crate::config::StatelessConfig;
use crate::error::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// Generate a cryptographically random opaque session token
/// (32 bytes → base64url-encoded, no padding).
pub fn generate_session_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rand::Rng::random(&mut rng);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Envelope as signed. Borrowed so issuing does not clone the session.
#[derive(Serialize)]
struct EnvelopeRef<'a> {
    session: &'a Session,
    user: Option<&'a User>,
    iss: &'a str,
    iat: i64,
}

#[derive(Deserialize)]
struct Envelope {
    session: Session,
    user: Option<User>,
    iss: String,
    #[allow(dead_code)]
    iat: i64,
}

/// Issues and verifies self-contained signed tokens:
/// `base64url(envelope JSON) "." base64url(HMAC-SHA256(first part))`.
///
/// Holds no server state, so issued tokens cannot be revoked before the
/// expiry they embed. `set`, `delete`, `delete_by_user_id` and `cleanup`
/// are no-ops.
pub struct StatelessTokenStore {
    secret: Vec<u8>,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl StatelessTokenStore {
    pub fn new(config: &StatelessConfig, clock: Arc<dyn Clock>) -> Result<Self, SessionError> {
        if config.secret.is_empty() {
            return Err(SessionError::Configuration(
                "stateless tier requires a signing secret".into(),
            ));
        }
        Ok(Self {
            secret: config.secret.as_bytes().to_vec(),
            issuer: config.issuer.clone(),
            clock,
        })
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| TokenError::Crypto(format!("HMAC key: {e}")))
    }

    /// Sign `session` and `user` into a token.
    pub fn create_token(&self, session: &Session, user: Option<&User>) -> Result<String, TokenError> {
        let envelope = EnvelopeRef {
            session,
            user,
            iss: &self.issuer,
            iat: self.clock.now().timestamp(),
        };
        let json = serde_json::to_vec(&envelope).map_err(|e| TokenError::Encode(e.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(json);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }

    /// Verify a token and decode its envelope.
    ///
    /// Tampered, malformed and foreign-issuer tokens are errors; a
    /// genuine token past its embedded expiry is `Ok(None)`.
    pub fn verify(&self, token: &str) -> Result<Option<ResolvedSession>, TokenError> {
        let (payload, signature) = token
            .split_once('.')
            .ok_or_else(|| TokenError::Malformed("missing signature segment".into()))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| TokenError::Malformed(format!("signature encoding: {e}")))?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        // Constant-time comparison.
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::SignatureMismatch)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| TokenError::Malformed(format!("payload encoding: {e}")))?;
        let envelope: Envelope = serde_json::from_slice(&json)
            .map_err(|e| TokenError::Malformed(format!("payload: {e}")))?;

        if envelope.iss != self.issuer {
            return Err(TokenError::IssuerMismatch {
                expected: self.issuer.clone(),
                found: envelope.iss,
            });
        }
        if envelope.session.is_expired_at(self.clock.now()) {
            debug!(session_id = %envelope.session.id, "Stateless session expired");
            return Ok(None);
        }
        Ok(Some(ResolvedSession {
            session: envelope.session,
            user: envelope.user,
        }))
    }
}

impl SessionStore for StatelessTokenStore {
    async fn set(&self, _session: &Session, _user: Option<&User>) -> SessionResult<()> {
        Ok(())
    }

    async fn refresh(&self, _session: &Session) -> SessionResult<bool> {
        Ok(false)
    }

    async fn get(&self, token: &str) -> SessionResult<Option<ResolvedSession>> {
        Ok(self.verify(token)?)
    }

    async fn delete(&self, _token: &str) -> SessionResult<()> {
        debug!("Stateless tokens cannot be revoked before expiry");
        Ok(())
    }

    async fn delete_by_user_id(&self, _user_id: Uuid) -> SessionResult<u64> {
        Ok(0)
    }

    async fn list_by_user_id(&self, _user_id: Uuid) -> SessionResult<Vec<Session>> {
        Ok(Vec::new())
    }

    async fn cleanup(&self) -> SessionResult<u64> {
        Ok(0)
    }

    async fn close(&self) -> SessionResult<()> {
        Ok(())
    }
}
