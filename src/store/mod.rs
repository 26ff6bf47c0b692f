// Embedded relational store: a single `rusqlite::Connection` behind a
// `Mutex`, running its own `CREATE TABLE IF NOT EXISTS` migrations on open,
// with a snapshot/clear contract layered on top.
//
// Snapshotting to disk is implemented as a WAL checkpoint rather than a
// full in-memory-image rewrite: SQLite already persists every statement to
// the `-wal` file; `save` truncates it back into the main database file so
// a crash between `save` calls loses at most the writes since the last
// checkpoint.

pub mod aggregates;
pub mod derived;
pub mod raw;
pub mod registry;
pub mod schema;
pub mod sync_progress;

use crate::error::StoreError;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct Store {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Store {
    /// Opens (creating if absent) the store at `path`, initializing the
    /// schema. Creates the parent directory if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: path.display().to_string(),
                    source,
                })?;
            }
        }
        let conn = Connection::open(&path).map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(schema::SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// In-memory store for tests and short-lived CLI invocations, never
    /// persisted to disk.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: ":memory:".to_string(),
            source,
        })?;
        conn.execute_batch(schema::SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes durable state to the backing file. Called after each ingest
    /// batch and at teardown.
    pub fn save(&self) -> Result<(), StoreError> {
        if self.path.as_os_str() == ":memory:" {
            return Ok(());
        }
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(|e| StoreError::Snapshot(e.to_string()))?;
        Ok(())
    }

    /// Truncates only derived tables, leaving raw data and persistent
    /// bookkeeping tables intact.
    pub fn clear_derived(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        for table in schema::DERIVED_TABLES {
            conn.execute(&format!("DELETE FROM {table}"), [])?;
        }
        Ok(())
    }

    /// Truncates raw, derived, and persistent tables alike.
    pub fn clear_all(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        for table in schema::RAW_TABLES
            .iter()
            .chain(schema::DERIVED_TABLES)
            .chain(schema::PERSISTENT_TABLES)
        {
            conn.execute(&format!("DELETE FROM {table}"), [])?;
        }
        Ok(())
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        Ok(f(&conn)?)
    }

    pub fn row_count(&self, table: &str) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_schema_and_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.row_count("raw_transactions").unwrap(), 0);
        // Re-running the batch against an already-initialized connection is safe.
        store
            .with_conn(|conn| conn.execute_batch(schema::SCHEMA_SQL))
            .unwrap();
    }

    #[test]
    fn clear_derived_keeps_persistent_tables() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO sync_progress (week_id, start_date, end_date, status) VALUES ('w1','2026-01-01','2026-01-08','complete')",
                    [],
                )
            })
            .unwrap();
        store.clear_derived().unwrap();
        assert_eq!(store.row_count("sync_progress").unwrap(), 1);
    }

    #[test]
    fn clear_all_truncates_everything() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO sync_progress (week_id, start_date, end_date, status) VALUES ('w1','2026-01-01','2026-01-08','complete')",
                    [],
                )
            })
            .unwrap();
        store.clear_all().unwrap();
        assert_eq!(store.row_count("sync_progress").unwrap(), 0);
    }
}
