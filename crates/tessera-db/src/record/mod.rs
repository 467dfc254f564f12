//! [`RecordStore`](tessera_core::RecordStore) implementations.

mod memory;
mod surreal;

pub use memory::{InMemoryRecordStore, RecordOp};
pub use surreal::SurrealRecordStore;
