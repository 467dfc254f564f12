//! Tessera Core — session and user models, the error taxonomy, and the
//! storage contracts shared by every session tier.

pub mod clock;
pub mod error;
pub mod models;
pub mod repository;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{SessionError, SessionResult};
pub use models::session::{ResolvedSession, Session, SessionOptions};
pub use models::user::User;
pub use repository::{Operator, Predicate, Record, RecordStore, SessionStore, UserRepository};
