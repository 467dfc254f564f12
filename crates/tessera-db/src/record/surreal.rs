//! SurrealDB implementation of [`RecordStore`].

use serde::Deserialize;
use serde_json::Value;
use surrealdb::{Connection, Surreal};
use tessera_core::error::{SessionError, SessionResult};
use tessera_core::repository::{Operator, Predicate, Record, RecordStore};

use crate::error::DbError;

/// Column holding the logical `id` field.
const KEY_COLUMN: &str = "record_key";

#[derive(Debug, Deserialize)]
struct CountRow {
    total: u64,
}

/// SurrealDB implementation of the record store.
///
/// Model names map to tables. Filters are rendered as SurrealQL with
/// every value bound as a parameter; field names are restricted to
/// plain identifiers.
#[derive(Clone)]
pub struct SurrealRecordStore<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRecordStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn execute(
        &self,
        sql: String,
        model: &str,
        binds: Vec<(String, Value)>,
    ) -> Result<surrealdb::Response, DbError> {
        let mut query = self.db.query(sql).bind(("table", model.to_owned()));
        for bind in binds {
            query = query.bind(bind);
        }
        query
            .await?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))
    }
}

fn column(field: &str) -> Result<&str, DbError> {
    let mut chars = field.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(DbError::InvalidField(field.to_owned()));
    }
    Ok(if field == "id" { KEY_COLUMN } else { field })
}

/// Render `filter` as a `WHERE` clause plus its parameter bindings.
fn where_clause(filter: &[Predicate]) -> Result<(String, Vec<(String, Value)>), DbError> {
    if filter.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let mut clauses = Vec::with_capacity(filter.len());
    let mut binds = Vec::with_capacity(filter.len());
    for (i, predicate) in filter.iter().enumerate() {
        let op = match predicate.operator {
            Operator::Eq => "=",
            Operator::Lt => "<",
            Operator::Gt => ">",
        };
        let param = format!("p{i}");
        clauses.push(format!("{} {op} ${param}", column(&predicate.field)?));
        binds.push((param, predicate.value.clone()));
    }
    Ok((format!(" WHERE {}", clauses.join(" AND ")), binds))
}

/// Rename the logical `id` field to its storage column.
fn to_row(mut record: Record) -> Result<Value, DbError> {
    for field in record.keys() {
        column(field)?;
    }
    if let Some(id) = record.remove("id") {
        record.insert(KEY_COLUMN.to_owned(), id);
    }
    Ok(Value::Object(record))
}

fn from_row(model: &str, row: Value) -> Result<Record, DbError> {
    let Value::Object(mut record) = row else {
        return Err(DbError::Corrupt {
            model: model.to_owned(),
            reason: "row is not an object".into(),
        });
    };
    if let Some(key) = record.remove(KEY_COLUMN) {
        record.insert("id".to_owned(), key);
    }
    Ok(record)
}

impl<C: Connection> RecordStore for SurrealRecordStore<C> {
    async fn create(&self, model: &str, record: Record) -> SessionResult<Record> {
        let row = to_row(record.clone())?;
        self.execute(
            "CREATE type::table($table) CONTENT $row RETURN NONE".into(),
            model,
            vec![("row".into(), row)],
        )
        .await?;
        Ok(record)
    }

    async fn find_one(&self, model: &str, filter: &[Predicate]) -> SessionResult<Option<Record>> {
        let (clause, binds) = where_clause(filter)?;
        let mut response = self
            .execute(
                format!("SELECT * OMIT id FROM type::table($table){clause} LIMIT 1"),
                model,
                binds,
            )
            .await?;
        let rows: Vec<Value> = response.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .next()
            .map(|row| from_row(model, row))
            .transpose()
            .map_err(SessionError::from)
    }

    async fn find_many(&self, model: &str, filter: &[Predicate]) -> SessionResult<Vec<Record>> {
        let (clause, binds) = where_clause(filter)?;
        let mut response = self
            .execute(
                format!("SELECT * OMIT id FROM type::table($table){clause}"),
                model,
                binds,
            )
            .await?;
        let rows: Vec<Value> = response.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|row| from_row(model, row).map_err(SessionError::from))
            .collect()
    }

    async fn update(&self, model: &str, filter: &[Predicate], fields: Record) -> SessionResult<u64> {
        let (clause, mut binds) = where_clause(filter)?;
        binds.push(("fields".into(), to_row(fields)?));
        // Count first, then merge, in one round trip.
        let mut response = self
            .execute(
                format!(
                    "SELECT count() AS total FROM type::table($table){clause} GROUP ALL; \
                     UPDATE type::table($table) MERGE $fields{clause} RETURN NONE;"
                ),
                model,
                binds,
            )
            .await?;
        let counts: Vec<CountRow> = response.take(0).map_err(DbError::from)?;
        Ok(counts.first().map(|r| r.total).unwrap_or(0))
    }

    async fn delete_many(&self, model: &str, filter: &[Predicate]) -> SessionResult<u64> {
        let (clause, binds) = where_clause(filter)?;
        let mut response = self
            .execute(
                format!(
                    "SELECT count() AS total FROM type::table($table){clause} GROUP ALL; \
                     DELETE type::table($table){clause} RETURN NONE;"
                ),
                model,
                binds,
            )
            .await?;
        let counts: Vec<CountRow> = response.take(0).map_err(DbError::from)?;
        Ok(counts.first().map(|r| r.total).unwrap_or(0))
    }
}
