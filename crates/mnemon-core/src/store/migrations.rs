//! Schema migrations for the SQLite cold backend

use rusqlite::Connection;

use super::{StoreError, StoreResult};

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema with record JSON, filter columns, and FTS5",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Index created_at for consolidation sampling order",
        up: MIGRATION_V2_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
///
/// Records are stored as JSON in `data`; the scalar columns exist only to
/// serve `list_by_filter` without deserializing every row.
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memory_records (
    id TEXT PRIMARY KEY,
    memory_type TEXT NOT NULL,
    tier TEXT NOT NULL,
    state TEXT NOT NULL,
    importance REAL NOT NULL DEFAULT 0.5,
    created_at TEXT NOT NULL,
    last_accessed TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '',
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_state ON memory_records(state);
CREATE INDEX IF NOT EXISTS idx_records_importance ON memory_records(importance);
CREATE INDEX IF NOT EXISTS idx_records_type ON memory_records(memory_type);

CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
    record_id UNINDEXED,
    content,
    tokenize='porter unicode61'
);
"#;

/// V2: created_at index
const MIGRATION_V2_UP: &str = r#"
CREATE INDEX IF NOT EXISTS idx_records_created ON memory_records(created_at);
CREATE INDEX IF NOT EXISTS idx_records_last_accessed ON memory_records(last_accessed);
"#;

/// Apply all pending migrations, tracked via `user_version`
pub fn apply_migrations(conn: &Connection) -> StoreResult<()> {
    let current: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| StoreError::Unavailable(format!("read user_version: {e}")))?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.up)
            .map_err(|e| StoreError::Unavailable(format!(
                "migration v{} ({}): {e}",
                migration.version, migration.description
            )))?;
        conn.pragma_update(None, "user_version", migration.version)
            .map_err(|e| StoreError::Unavailable(format!("set user_version: {e}")))?;
        tracing::info!(
            version = migration.version,
            description = migration.description,
            "applied cold store migration"
        );
    }
    Ok(())
}
