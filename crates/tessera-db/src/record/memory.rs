//! Process-local record store.
//!
//! Backs single-node deployments and tests. Every call is counted per
//! model so callers can assert on tier fan-out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tessera_core::error::SessionResult;
use tessera_core::repository::{Predicate, Record, RecordStore, matches_all};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordOp {
    Create,
    FindOne,
    FindMany,
    Update,
    DeleteMany,
}

impl RecordOp {
    pub fn is_write(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::DeleteMany)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    tables: Arc<RwLock<HashMap<String, Vec<Record>>>>,
    calls: Arc<Mutex<HashMap<(String, RecordOp), usize>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `op` calls made against `model`.
    pub fn calls(&self, model: &str, op: RecordOp) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(model.to_owned(), op))
            .copied()
            .unwrap_or(0)
    }

    /// Number of mutating calls made against `model`.
    pub fn writes(&self, model: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((m, op), _)| m == model && op.is_write())
            .map(|(_, n)| n)
            .sum()
    }

    /// Number of records currently held for `model`.
    pub async fn len(&self, model: &str) -> usize {
        self.tables.read().await.get(model).map_or(0, Vec::len)
    }

    fn record_call(&self, model: &str, op: RecordOp) {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((model.to_owned(), op))
            .or_default() += 1;
    }
}

impl RecordStore for InMemoryRecordStore {
    async fn create(&self, model: &str, record: Record) -> SessionResult<Record> {
        self.record_call(model, RecordOp::Create);
        self.tables
            .write()
            .await
            .entry(model.to_owned())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn find_one(&self, model: &str, filter: &[Predicate]) -> SessionResult<Option<Record>> {
        self.record_call(model, RecordOp::FindOne);
        let tables = self.tables.read().await;
        Ok(tables
            .get(model)
            .and_then(|rows| rows.iter().find(|r| matches_all(filter, r)))
            .cloned())
    }

    async fn find_many(&self, model: &str, filter: &[Predicate]) -> SessionResult<Vec<Record>> {
        self.record_call(model, RecordOp::FindMany);
        let tables = self.tables.read().await;
        Ok(tables
            .get(model)
            .map(|rows| {
                rows.iter()
                    .filter(|r| matches_all(filter, r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(&self, model: &str, filter: &[Predicate], fields: Record) -> SessionResult<u64> {
        self.record_call(model, RecordOp::Update);
        let mut tables = self.tables.write().await;
        let mut updated = 0;
        if let Some(rows) = tables.get_mut(model) {
            for row in rows.iter_mut().filter(|r| matches_all(filter, r)) {
                for (field, value) in &fields {
                    row.insert(field.clone(), value.clone());
                }
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_many(&self, model: &str, filter: &[Predicate]) -> SessionResult<u64> {
        self.record_call(model, RecordOp::DeleteMany);
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.get_mut(model) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !matches_all(filter, r));
        Ok((before - rows.len()) as u64)
    }
}
