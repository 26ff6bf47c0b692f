// SyncProgress FSM: one row per named week, pending -> in_progress ->
// complete | error. Re-entry on error or in_progress overwrites state;
// a complete week is skipped by sync-all.

use super::Store;
use crate::error::StoreError;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum SyncState {
    Pending,
    InProgress,
    Complete,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub week_id: String,
    pub start_date: String,
    pub end_date: String,
    pub status: SyncState,
    pub all_tx_count: i64,
    pub xtz_flow_count: i64,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
}

impl Store {
    /// Creates the week row as `pending` if absent; no-op if already present.
    pub fn ensure_week(&self, week_id: &str, start_date: &str, end_date: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO sync_progress (week_id, start_date, end_date, status)
                 VALUES (?1, ?2, ?3, ?4)",
                params![week_id, start_date, end_date, SyncState::Pending.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn mark_week_in_progress(&self, week_id: &str, started_at: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sync_progress SET status = ?2, started_at = ?3, error_message = NULL WHERE week_id = ?1",
                params![week_id, SyncState::InProgress.to_string(), started_at],
            )?;
            Ok(())
        })
    }

    pub fn mark_week_complete(
        &self,
        week_id: &str,
        completed_at: &str,
        all_tx_count: i64,
        xtz_flow_count: i64,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sync_progress
                 SET status = ?2, completed_at = ?3, all_tx_count = ?4, xtz_flow_count = ?5, error_message = NULL
                 WHERE week_id = ?1",
                params![week_id, SyncState::Complete.to_string(), completed_at, all_tx_count, xtz_flow_count],
            )?;
            Ok(())
        })
    }

    pub fn mark_week_error(&self, week_id: &str, message: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sync_progress SET status = ?2, error_message = ?3 WHERE week_id = ?1",
                params![week_id, SyncState::Error.to_string(), message],
            )?;
            Ok(())
        })
    }

    pub fn week_progress(&self, week_id: &str) -> Result<Option<SyncProgress>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT week_id, start_date, end_date, status, all_tx_count, xtz_flow_count, started_at, completed_at, error_message
                 FROM sync_progress WHERE week_id = ?1",
                params![week_id],
                map_sync_progress,
            )
            .optional()
        })
    }

    pub fn all_week_progress(&self) -> Result<Vec<SyncProgress>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT week_id, start_date, end_date, status, all_tx_count, xtz_flow_count, started_at, completed_at, error_message
                 FROM sync_progress ORDER BY week_id ASC",
            )?;
            let rows = stmt.query_map([], map_sync_progress)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_sync_progress(row: &rusqlite::Row) -> rusqlite::Result<SyncProgress> {
    let status: String = row.get(3)?;
    Ok(SyncProgress {
        week_id: row.get(0)?,
        start_date: row.get(1)?,
        end_date: row.get(2)?,
        status: status.parse().unwrap_or(SyncState::Pending),
        all_tx_count: row.get(4)?,
        xtz_flow_count: row.get(5)?,
        started_at: row.get(6)?,
        completed_at: row.get(7)?,
        error_message: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        store.ensure_week("week3", "2026-01-01", "2026-01-08").unwrap();
        assert_eq!(store.week_progress("week3").unwrap().unwrap().status, SyncState::Pending);

        store.mark_week_in_progress("week3", "2026-01-01T00:00:00Z").unwrap();
        let p = store.week_progress("week3").unwrap().unwrap();
        assert_eq!(p.status, SyncState::InProgress);
        assert!(p.started_at.is_some());

        store.mark_week_complete("week3", "2026-01-01T01:00:00Z", 2000, 500).unwrap();
        let p = store.week_progress("week3").unwrap().unwrap();
        assert_eq!(p.status, SyncState::Complete);
        assert_eq!(p.all_tx_count, 2000);
    }

    #[test]
    fn error_state_is_reenterable() {
        let store = Store::open_in_memory().unwrap();
        store.ensure_week("week4", "2026-01-08", "2026-01-15").unwrap();
        store.mark_week_error("week4", "indexer timeout").unwrap();
        let p = store.week_progress("week4").unwrap().unwrap();
        assert_eq!(p.status, SyncState::Error);
        assert_eq!(p.error_message.as_deref(), Some("indexer timeout"));

        store.mark_week_in_progress("week4", "2026-01-08T00:00:00Z").unwrap();
        let p = store.week_progress("week4").unwrap().unwrap();
        assert_eq!(p.status, SyncState::InProgress);
        assert!(p.error_message.is_none());
    }

    #[test]
    fn ensure_week_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.ensure_week("week1", "2026-01-01", "2026-01-08").unwrap();
        store.mark_week_in_progress("week1", "t").unwrap();
        store.ensure_week("week1", "2026-01-01", "2026-01-08").unwrap();
        assert_eq!(store.week_progress("week1").unwrap().unwrap().status, SyncState::InProgress);
    }
}
