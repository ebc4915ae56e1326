//! SQLite-backed content store.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use vellum_types::ContentId;

use super::{ContentStore, StoreError, StoreResult};

const SCHEMA: &str = r#"
-- Payloads, one row per content version
CREATE TABLE IF NOT EXISTS contents (
    id BLOB PRIMARY KEY,
    bytes BLOB NOT NULL,
    length INTEGER NOT NULL,
    created_at INTEGER DEFAULT (unixepoch())
);
"#;

/// Content store persisted in a SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored payloads.
    pub fn count(&self) -> StoreResult<u64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM contents", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

impl ContentStore for SqliteStore {
    fn get_bytes(&self, id: ContentId) -> StoreResult<Vec<u8>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT bytes FROM contents WHERE id = ?1",
            params![id.as_bytes().as_slice()],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()?
        .ok_or(StoreError::Missing(id))
    }

    fn put_bytes(&self, id: ContentId, bytes: &[u8]) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO contents (id, bytes, length) VALUES (?1, ?2, ?3)",
            params![id.as_bytes().as_slice(), bytes, bytes.len() as i64],
        )?;
        Ok(())
    }

    fn discard(&self, id: ContentId) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM contents WHERE id = ?1",
            params![id.as_bytes().as_slice()],
        )?;
        Ok(())
    }

    fn contains(&self, id: ContentId) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM contents WHERE id = ?1",
                params![id.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}
