//! User snapshot model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-mostly projection of a user, embedded next to a session in the
/// cache and stateless tiers so a lookup needs one round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub email_verified: bool,
    pub role: Option<String>,
    pub banned: bool,
}
