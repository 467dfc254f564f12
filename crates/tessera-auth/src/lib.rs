//! Tessera Auth — Session manager, storage strategy selection, and
//! stateless signed session tokens.

pub mod config;
pub mod error;
pub mod manager;
pub mod strategy;
pub mod token;

pub use config::{CookieConfig, SameSite, SessionConfig, StatelessConfig, TierToggles};
pub use error::TokenError;
pub use manager::{IssuedSession, SessionManager, SessionTiers};
pub use strategy::Strategy;
pub use token::{StatelessTokenStore, generate_session_token};
