//! SQLite-backed presence store
//!
//! One row per `(document_id, user_id)`, enforced by the primary key and
//! written with `INSERT ... ON CONFLICT DO UPDATE`. Several processes can
//! share the same database file; SQLite serializes their writes.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::error::{PresenceError, PresenceResult};
use super::model::PresenceRecord;
use super::store::PresenceStore;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// How long a writer waits on another process's lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS presence (
            document_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            cursor TEXT NOT NULL,
            display_name TEXT,
            display_color TEXT,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (document_id, user_id)
        );

        -- Freshness filter and cleanup both range over updated_at
        CREATE INDEX IF NOT EXISTS idx_presence_doc_updated
            ON presence(document_id, updated_at);
        CREATE INDEX IF NOT EXISTS idx_presence_updated_at
            ON presence(updated_at);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: rusqlite::Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}

/// Presence store on a SQLite database
pub struct SqlitePresenceStore {
    conn: Mutex<Connection>,
}

impl SqlitePresenceStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> PresenceResult<Self> {
        if let Some(parent) = path.parent() {
            // Connection::open reports a missing directory as a generic CANTOPEN
            let _ = std::fs::create_dir_all(parent);
        }

        let conn = Connection::open(path).map_err(|source| PresenceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> PresenceResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> PresenceResult<Self> {
        if needs_init(&conn) {
            debug!("Initializing presence schema v{}", SCHEMA_VERSION);
            init_schema(&conn)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<PresenceRecord> {
    Ok(PresenceRecord {
        document_id: row.get(0)?,
        user_id: row.get(1)?,
        cursor: row.get(2)?,
        display_name: row.get(3)?,
        display_color: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl PresenceStore for SqlitePresenceStore {
    fn upsert(&self, record: &PresenceRecord) -> PresenceResult<()> {
        self.conn().execute(
            "INSERT INTO presence
                (document_id, user_id, cursor, display_name, display_color, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(document_id, user_id) DO UPDATE SET
                cursor = excluded.cursor,
                display_name = excluded.display_name,
                display_color = excluded.display_color,
                updated_at = excluded.updated_at",
            params![
                record.document_id,
                record.user_id,
                record.cursor,
                record.display_name,
                record.display_color,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    fn list_since(
        &self,
        document_id: &str,
        min_updated_at: i64,
    ) -> PresenceResult<Vec<PresenceRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT document_id, user_id, cursor, display_name, display_color, updated_at
             FROM presence
             WHERE document_id = ?1 AND updated_at >= ?2
             ORDER BY user_id",
        )?;
        let records = stmt
            .query_map(params![document_id, min_updated_at], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn delete_older_than(&self, cutoff: i64) -> PresenceResult<usize> {
        let removed = self
            .conn()
            .execute("DELETE FROM presence WHERE updated_at < ?1", [cutoff])?;
        Ok(removed)
    }

    fn get(&self, document_id: &str, user_id: &str) -> PresenceResult<Option<PresenceRecord>> {
        let conn = self.conn();
        let record = conn
            .query_row(
                "SELECT document_id, user_id, cursor, display_name, display_color, updated_at
                 FROM presence
                 WHERE document_id = ?1 AND user_id = ?2",
                params![document_id, user_id],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn count(&self) -> PresenceResult<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM presence", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(doc: &str, user: &str, cursor: &str, updated_at: i64) -> PresenceRecord {
        PresenceRecord {
            document_id: doc.to_string(),
            user_id: user.to_string(),
            cursor: cursor.to_string(),
            display_name: Some(format!("{} name", user)),
            display_color: None,
            updated_at,
        }
    }

    #[test]
    fn test_init_schema() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(needs_init(&conn));

        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), Some(SCHEMA_VERSION));
        assert!(!needs_init(&conn));

        let indexes: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        assert!(indexes.contains(&"idx_presence_updated_at".to_string()));
        assert!(indexes.contains(&"idx_presence_doc_updated".to_string()));
    }

    #[test]
    fn test_upsert_keeps_one_row() {
        let store = SqlitePresenceStore::open_in_memory().unwrap();
        store.upsert(&record("d", "u", "a", 1)).unwrap();
        store.upsert(&record("d", "u", "b", 2)).unwrap();
        store.upsert(&record("d", "u", "c", 3)).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        let stored = store.get("d", "u").unwrap().unwrap();
        assert_eq!(stored.cursor, "c");
        assert_eq!(stored.updated_at, 3);
    }

    #[test]
    fn test_upsert_overwrites_profile_fields() {
        let store = SqlitePresenceStore::open_in_memory().unwrap();
        let mut first = record("d", "u", "a", 1);
        first.display_color = Some("#fff".to_string());
        store.upsert(&first).unwrap();

        let mut second = record("d", "u", "a", 2);
        second.display_name = None;
        store.upsert(&second).unwrap();

        let stored = store.get("d", "u").unwrap().unwrap();
        assert_eq!(stored.display_name, None);
        assert_eq!(stored.display_color, None);
    }

    #[test]
    fn test_list_since() {
        let store = SqlitePresenceStore::open_in_memory().unwrap();
        store.upsert(&record("d", "zed", "", 100)).unwrap();
        store.upsert(&record("d", "amy", "", 200)).unwrap();
        store.upsert(&record("d", "old", "", 50)).unwrap();
        store.upsert(&record("e", "amy", "", 200)).unwrap();

        let users: Vec<String> = store
            .list_since("d", 100)
            .unwrap()
            .into_iter()
            .map(|r| r.user_id)
            .collect();
        assert_eq!(users, vec!["amy", "zed"]);
    }

    #[test]
    fn test_delete_older_than() {
        let store = SqlitePresenceStore::open_in_memory().unwrap();
        store.upsert(&record("d", "a", "", 30_000)).unwrap();
        store.upsert(&record("d", "b", "", 50_000)).unwrap();
        store.upsert(&record("e", "c", "", 40_000)).unwrap();

        assert_eq!(store.delete_older_than(40_000).unwrap(), 1);
        assert!(store.get("d", "a").unwrap().is_none());
        assert!(store.get("e", "c").unwrap().is_some());
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_file_database_shared_between_handles() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("presence.db");

        let writer = SqlitePresenceStore::open(&path).unwrap();
        let reader = SqlitePresenceStore::open(&path).unwrap();

        writer.upsert(&record("d", "u", "x", 10)).unwrap();
        assert_eq!(reader.list_since("d", 0).unwrap().len(), 1);
    }
}
