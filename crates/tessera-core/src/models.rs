//! Domain models for Tessera.
//!
//! A [`session::Session`] is owned by the session manager and mirrored
//! into whichever tiers are enabled. A [`user::User`] snapshot rides
//! along with it in the cache and stateless tiers.

pub mod session;
pub mod user;
