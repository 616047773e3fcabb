//! SQLite cold-tier reference backend
//!
//! Durable, keyword-searchable archive. Records live as JSON in one table;
//! a few scalar columns are mirrored for filtering, and an FTS5 index serves
//! keyword search with sanitized queries.

use std::path::PathBuf;
use std::sync::Mutex;

use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};

use crate::memory::MemoryRecord;

use super::migrations::apply_migrations;
use super::{
    Capabilities, DurabilityClass, MemoryStore, RecordFilter, ScoredRecord, StoreError,
    StoreResult,
};

/// Sanitize untrusted text into an FTS5 OR-query
///
/// Each alphanumeric token is double-quoted; everything else is dropped, so
/// FTS5 operators and punctuation in user input cannot change query shape.
pub fn sanitize_fts5_query(raw: &str) -> String {
    raw.split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|token| !token.is_empty())
        .map(|token| format!("\"{token}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// SQLite-backed cold store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path`
    ///
    /// `None` resolves to the platform data directory, created with
    /// owner-only permissions on Unix.
    pub fn new(db_path: Option<PathBuf>) -> StoreResult<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("ai", "mnemon", "core").ok_or_else(|| {
                    StoreError::Unavailable("could not determine project directories".into())
                })?;
                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)
                    .map_err(|e| StoreError::Unavailable(format!("create data dir: {e}")))?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(0o700);
                    let _ = std::fs::set_permissions(data_dir, perms);
                }
                data_dir.join("mnemon-cold.db")
            }
        };

        let conn = Connection::open(&path)
            .map_err(|e| StoreError::Unavailable(format!("open {}: {e}", path.display())))?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -16000;
             PRAGMA temp_store = MEMORY;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| StoreError::Unavailable(format!("configure connection: {e}")))?;

        apply_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (tests)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Unavailable(format!("open in-memory: {e}")))?;
        apply_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("cold store lock poisoned".into()))
    }

    fn tags_column(record: &MemoryRecord) -> String {
        if record.tags.is_empty() {
            String::new()
        } else {
            format!(
                "|{}|",
                record.tags.iter().cloned().collect::<Vec<_>>().join("|")
            )
        }
    }

    fn row_to_record(data: &str) -> StoreResult<MemoryRecord> {
        serde_json::from_str(data)
            .map_err(|e| StoreError::Unavailable(format!("corrupt record row: {e}")))
    }
}

impl MemoryStore for SqliteStore {
    fn put(&self, record: &MemoryRecord) -> StoreResult<()> {
        let data = serde_json::to_string(record)
            .map_err(|e| StoreError::Unavailable(format!("serialize record: {e}")))?;
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO memory_records
                 (id, memory_type, tier, state, importance, created_at, last_accessed, tags, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                 memory_type = excluded.memory_type,
                 tier = excluded.tier,
                 state = excluded.state,
                 importance = excluded.importance,
                 created_at = excluded.created_at,
                 last_accessed = excluded.last_accessed,
                 tags = excluded.tags,
                 data = excluded.data",
            params![
                record.id,
                record.memory_type.as_str(),
                record.tier.as_str(),
                record.state.as_str(),
                record.importance,
                record.created_at.to_rfc3339(),
                record.last_accessed.to_rfc3339(),
                Self::tags_column(record),
                data,
            ],
        )
        .map_err(|e| StoreError::Unavailable(format!("put: {e}")))?;

        // Keep the FTS index in step; tombstones are not searchable
        conn.execute(
            "DELETE FROM memory_fts WHERE record_id = ?1",
            params![record.id],
        )
        .map_err(|e| StoreError::Unavailable(format!("fts delete: {e}")))?;
        if !record.is_tombstone() {
            conn.execute(
                "INSERT INTO memory_fts (record_id, content) VALUES (?1, ?2)",
                params![record.id, record.content],
            )
            .map_err(|e| StoreError::Unavailable(format!("fts insert: {e}")))?;
        }
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> StoreResult<MemoryRecord> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM memory_records WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Unavailable(format!("get: {e}")))?;
        match data {
            Some(data) => Self::row_to_record(&data),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM memory_records WHERE id = ?1", params![id])
            .map_err(|e| StoreError::Unavailable(format!("delete: {e}")))?;
        conn.execute("DELETE FROM memory_fts WHERE record_id = ?1", params![id])
            .map_err(|e| StoreError::Unavailable(format!("fts delete: {e}")))?;
        Ok(())
    }

    fn list_by_filter(&self, filter: &RecordFilter) -> StoreResult<Vec<MemoryRecord>> {
        let mut sql = String::from("SELECT data FROM memory_records WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !filter.include_tombstones {
            sql.push_str(" AND state != 'deleted'");
        }
        if let Some(memory_type) = filter.memory_type {
            sql.push_str(" AND memory_type = ?");
            args.push(Box::new(memory_type.as_str().to_string()));
        }
        if let Some(tier) = filter.tier {
            sql.push_str(" AND tier = ?");
            args.push(Box::new(tier.as_str().to_string()));
        }
        if let Some(tag) = &filter.tag {
            sql.push_str(" AND tags LIKE ?");
            args.push(Box::new(format!("%|{tag}|%")));
        }
        if let Some(min) = filter.min_importance {
            sql.push_str(" AND importance >= ?");
            args.push(Box::new(min));
        }
        sql.push_str(" ORDER BY id");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            args.push(Box::new(limit as i64));
        }

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Unavailable(format!("list prepare: {e}")))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| StoreError::Unavailable(format!("list query: {e}")))?;

        let mut records = Vec::new();
        for row in rows {
            let data = row.map_err(|e| StoreError::Unavailable(format!("list row: {e}")))?;
            records.push(Self::row_to_record(&data)?);
        }
        Ok(records)
    }

    fn count(&self) -> StoreResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM memory_records", [], |row| row.get(0))
            .map_err(|e| StoreError::Unavailable(format!("count: {e}")))?;
        Ok(count as u64)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_vector_search: false,
            typical_latency_ms: 50,
            durability_class: DurabilityClass::Archival,
        }
    }

    fn keyword_search(&self, query: &str, k: usize) -> StoreResult<Vec<ScoredRecord>> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT r.data, bm25(memory_fts) AS rank
                 FROM memory_fts
                 JOIN memory_records r ON r.id = memory_fts.record_id
                 WHERE memory_fts MATCH ?1 AND r.state != 'deleted'
                 ORDER BY rank
                 LIMIT ?2",
            )
            .map_err(|e| StoreError::Unavailable(format!("search prepare: {e}")))?;

        let rows = stmt
            .query_map(params![sanitized, k as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(|e| StoreError::Unavailable(format!("search query: {e}")))?;

        let mut scored = Vec::new();
        for row in rows {
            let (data, rank) = row.map_err(|e| StoreError::Unavailable(format!("search row: {e}")))?;
            // bm25 scores are "smaller is better" and negative for matches;
            // map onto (0, 1) monotonically
            let goodness = (-rank).max(0.0);
            scored.push(ScoredRecord {
                record: Self::row_to_record(&data)?,
                score: goodness / (1.0 + goodness),
            });
        }
        Ok(scored)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ForgetCause, MemoryType};
    use chrono::Utc;

    fn record(content: &str) -> MemoryRecord {
        MemoryRecord::new(content, MemoryType::Episodic, Utc::now())
    }

    #[test]
    fn test_sanitize_fts5_query() {
        assert_eq!(sanitize_fts5_query("hello world"), "\"hello\" OR \"world\"");
        assert_eq!(sanitize_fts5_query("a AND \"b\" NEAR(c)"), "\"a\" OR \"AND\" OR \"b\" OR \"NEARc\"");
        assert_eq!(sanitize_fts5_query("   "), "");
        assert_eq!(sanitize_fts5_query("!!!"), "");
    }

    #[test]
    fn test_roundtrip_preserves_record() {
        let store = SqliteStore::in_memory().unwrap();
        let mut r = record("the quarterly deploy finished");
        r.tags.insert("ops".into());
        r.embedding = Some(vec![0.1, 0.2]);
        store.put(&r).unwrap();

        let fetched = store.get_by_id(&r.id).unwrap();
        assert_eq!(fetched.content, r.content);
        assert_eq!(fetched.tags, r.tags);
        assert_eq!(fetched.embedding, r.embedding);

        assert!(matches!(
            store.get_by_id("mem_0_00000000"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_keyword_search_ranks_matches() {
        let store = SqliteStore::in_memory().unwrap();
        store.put(&record("deploy pipeline finished cleanly")).unwrap();
        store.put(&record("lunch menu for tuesday")).unwrap();

        let hits = store.keyword_search("deploy finished", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].record.content.contains("deploy"));
        assert!(hits[0].score > 0.0 && hits[0].score < 1.0);
    }

    #[test]
    fn test_tombstones_hidden_from_search_and_lists() {
        let store = SqliteStore::in_memory().unwrap();
        let mut r = record("sensitive deploy notes");
        store.put(&r).unwrap();
        assert_eq!(store.keyword_search("deploy", 10).unwrap().len(), 1);

        r.tombstone(ForgetCause::Privacy, Utc::now());
        store.put(&r).unwrap();

        assert!(store.keyword_search("deploy", 10).unwrap().is_empty());
        assert!(store.list_by_filter(&RecordFilter::all()).unwrap().is_empty());
        assert_eq!(
            store
                .list_by_filter(&RecordFilter::all().with_tombstones())
                .unwrap()
                .len(),
            1
        );
        // Direct id fetch still works during the grace window
        assert!(store.get_by_id(&r.id).is_ok());
    }

    #[test]
    fn test_filters_use_mirrored_columns() {
        let store = SqliteStore::in_memory().unwrap();
        let mut a = record("a");
        a.importance = 0.9;
        a.tags.insert("keep".into());
        let mut b = record("b");
        b.memory_type = MemoryType::Semantic;
        b.importance = 0.1;
        store.put(&a).unwrap();
        store.put(&b).unwrap();

        let hits = store
            .list_by_filter(&RecordFilter::all().with_min_importance(0.5))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, a.id);

        let hits = store
            .list_by_filter(&RecordFilter::all().with_type(MemoryType::Semantic))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, b.id);

        let hits = store.list_by_filter(&RecordFilter::all().with_tag("keep")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, a.id);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let r = record("x");
        store.put(&r).unwrap();
        store.delete(&r.id).unwrap();
        store.delete(&r.id).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cold.db");

        let store = SqliteStore::new(Some(path.clone())).unwrap();
        let r = record("durable note");
        store.put(&r).unwrap();
        drop(store);

        let store = SqliteStore::new(Some(path)).unwrap();
        assert_eq!(store.get_by_id(&r.id).unwrap().content, "durable note");
    }
}
