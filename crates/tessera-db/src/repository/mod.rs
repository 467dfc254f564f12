//! Session and user repositories over a record store.

mod session;
mod user;

pub use session::{DurableSessionStore, SESSION_MODEL};
pub use user::{RecordUserRepository, USER_MODEL};
