//! Schema definitions and migration runner for SurrealDB.
//!
//! Tables are SCHEMALESS: the record store writes whatever field map the
//! durable tier hands it, and optional fields arrive as `NULL`. Integrity
//! comes from the indexes. The logical `id` field is stored as `record_key`
//! because SurrealDB reserves `id` for the record link.

use serde::Deserialize;
use surrealdb::{Connection, Surreal};
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, Deserialize)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Sessions
-- =======================================================================
DEFINE TABLE IF NOT EXISTS sessions SCHEMALESS;
DEFINE INDEX IF NOT EXISTS idx_sessions_key ON TABLE sessions \
    COLUMNS record_key UNIQUE;
DEFINE INDEX IF NOT EXISTS idx_sessions_token ON TABLE sessions \
    COLUMNS token UNIQUE;
DEFINE INDEX IF NOT EXISTS idx_sessions_user ON TABLE sessions \
    COLUMNS user_id;
DEFINE INDEX IF NOT EXISTS idx_sessions_expires ON TABLE sessions \
    COLUMNS expires_at;

-- =======================================================================
-- Users (read by the session layer, owned elsewhere)
-- =======================================================================
DEFINE TABLE IF NOT EXISTS users SCHEMALESS;
DEFINE INDEX IF NOT EXISTS idx_users_key ON TABLE users \
    COLUMNS record_key UNIQUE;
DEFINE INDEX IF NOT EXISTS idx_users_email ON TABLE users \
    COLUMNS email UNIQUE;
";

/// Run all pending migrations against the database.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            db.query("CREATE _migration SET version = $version, name = $name")
                .bind(("version", migration.version))
                .bind(("name", migration.name))
                .await?
                .check()
                .map_err(|e| {
                    DbError::Migration(format!(
                        "Failed to record migration v{}: {}",
                        migration.version, e,
                    ))
                })?;

            info!(version = migration.version, "Migration applied");
        }
    }

    Ok(())
}
