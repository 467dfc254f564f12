//! Tessera Database — the durable session tier and its storage plumbing.
//!
//! This crate provides:
//! - The durable tier ([`DurableSessionStore`]) and record-backed user
//!   resolution ([`RecordUserRepository`])
//! - Record store adapters: [`SurrealRecordStore`] and the process-local
//!   [`InMemoryRecordStore`]
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Error types ([`DbError`])

mod connection;
mod error;
pub mod record;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use record::{InMemoryRecordStore, RecordOp, SurrealRecordStore};
pub use repository::{DurableSessionStore, RecordUserRepository, SESSION_MODEL, USER_MODEL};
pub use schema::run_migrations;
