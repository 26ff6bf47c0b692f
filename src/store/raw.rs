// Raw-table upserts and the indexed lookups the reconciler/classifier rely
// on. Raw rows are append-only and keyed by indexer id;
// `INSERT OR IGNORE` gives id-idempotent re-ingest for free.

use super::Store;
use crate::error::StoreError;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub id: i64,
    pub hash: String,
    pub level: i64,
    pub timestamp: String,
    pub sender: String,
    pub target: Option<String>,
    pub amount: i64,
    pub entrypoint: Option<String>,
    pub parameters: Option<String>,
    pub status: String,
    pub has_internals: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawTokenTransfer {
    pub id: i64,
    pub level: i64,
    pub timestamp: String,
    pub token_contract: String,
    pub token_id: String,
    pub token_standard: String,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub amount: String,
    pub transaction_id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawBalance {
    pub address: String,
    pub balance: Option<i64>,
    pub snapshot_ts: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawXtzTransfer {
    pub id: i64,
    pub hash: String,
    pub timestamp: String,
    pub sender: String,
    pub target: String,
    pub amount: i64,
    pub is_from_cex: bool,
    pub is_to_cex: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllTransaction {
    pub id: i64,
    pub hash: String,
    pub level: i64,
    pub timestamp: String,
    pub sender: String,
    pub target: Option<String>,
    pub amount: i64,
    pub entrypoint: Option<String>,
    pub parameters: Option<String>,
    pub status: String,
    pub has_internals: bool,
    pub tx_category: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct XtzFlow {
    pub id: i64,
    pub hash: String,
    pub timestamp: String,
    pub sender: String,
    pub target: String,
    pub amount: i64,
    pub flow_type: String,
}

impl Store {
    pub fn insert_raw_transactions(&self, rows: &[RawTransaction]) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let mut inserted = 0;
            for tx in rows {
                inserted += conn.execute(
                    "INSERT OR IGNORE INTO raw_transactions
                     (id, hash, level, timestamp, sender, target, amount, entrypoint, parameters, status, has_internals)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        tx.id, tx.hash, tx.level, tx.timestamp, tx.sender, tx.target, tx.amount,
                        tx.entrypoint, tx.parameters, tx.status, tx.has_internals
                    ],
                )?;
            }
            Ok(inserted)
        })
    }

    pub fn insert_raw_token_transfers(&self, rows: &[RawTokenTransfer]) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let mut inserted = 0;
            for t in rows {
                inserted += conn.execute(
                    "INSERT OR IGNORE INTO raw_token_transfers
                     (id, level, timestamp, token_contract, token_id, token_standard, from_address, to_address, amount, transaction_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        t.id, t.level, t.timestamp, t.token_contract, t.token_id, t.token_standard,
                        t.from_address, t.to_address, t.amount, t.transaction_id
                    ],
                )?;
            }
            Ok(inserted)
        })
    }

    /// Balance snapshots overwrite on re-snapshot.
    pub fn upsert_raw_balance(&self, row: &RawBalance) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO raw_balances (address, balance, snapshot_ts) VALUES (?1, ?2, ?3)
                 ON CONFLICT(address) DO UPDATE SET balance = excluded.balance, snapshot_ts = excluded.snapshot_ts",
                params![row.address, row.balance, row.snapshot_ts],
            )?;
            Ok(())
        })
    }

    pub fn insert_raw_xtz_transfers(&self, rows: &[RawXtzTransfer]) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let mut inserted = 0;
            for t in rows {
                inserted += conn.execute(
                    "INSERT OR IGNORE INTO raw_xtz_transfers
                     (id, hash, timestamp, sender, target, amount, is_from_cex, is_to_cex)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![t.id, t.hash, t.timestamp, t.sender, t.target, t.amount, t.is_from_cex, t.is_to_cex],
                )?;
            }
            Ok(inserted)
        })
    }

    pub fn insert_all_transactions(&self, rows: &[AllTransaction]) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let mut inserted = 0;
            for tx in rows {
                inserted += conn.execute(
                    "INSERT OR IGNORE INTO all_transactions
                     (id, hash, level, timestamp, sender, target, amount, entrypoint, parameters, status, has_internals, tx_category)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        tx.id, tx.hash, tx.level, tx.timestamp, tx.sender, tx.target, tx.amount,
                        tx.entrypoint, tx.parameters, tx.status, tx.has_internals, tx.tx_category
                    ],
                )?;
            }
            Ok(inserted)
        })
    }

    /// Classification writes are applied only when the category changes
    /// Updates are written only when the category actually changes.
    pub fn update_transaction_category(&self, id: i64, category: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE all_transactions SET tx_category = ?2
                 WHERE id = ?1 AND (tx_category IS NULL OR tx_category != ?2)",
                params![id, category],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn insert_xtz_flows(&self, rows: &[XtzFlow]) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let mut inserted = 0;
            for f in rows {
                inserted += conn.execute(
                    "INSERT OR IGNORE INTO xtz_flows (id, hash, timestamp, sender, target, amount, flow_type)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![f.id, f.hash, f.timestamp, f.sender, f.target, f.amount, f.flow_type],
                )?;
            }
            Ok(inserted)
        })
    }

    pub fn max_raw_transaction_id(&self) -> Result<i64, StoreError> {
        self.max_id("raw_transactions")
    }

    pub fn max_raw_token_transfer_id(&self) -> Result<i64, StoreError> {
        self.max_id("raw_token_transfers")
    }

    pub fn max_all_transaction_id(&self) -> Result<i64, StoreError> {
        self.max_id("all_transactions")
    }

    pub fn max_xtz_flow_id(&self) -> Result<i64, StoreError> {
        self.max_id("xtz_flows")
    }

    fn max_id(&self, table: &str) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(&format!("SELECT COALESCE(MAX(id), 0) FROM {table}"), [], |row| row.get(0))
        })
    }

    /// Addresses that appear as sender or target anywhere in raw data
    /// without a balance snapshot yet.
    pub fn addresses_missing_balance_snapshot(&self) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT addr FROM (
                    SELECT sender AS addr FROM raw_transactions
                    UNION
                    SELECT target AS addr FROM raw_transactions WHERE target IS NOT NULL
                    UNION
                    SELECT from_address AS addr FROM raw_token_transfers WHERE from_address IS NOT NULL
                    UNION
                    SELECT to_address AS addr FROM raw_token_transfers WHERE to_address IS NOT NULL
                 ) AS addrs
                 WHERE addr NOT IN (SELECT address FROM raw_balances)",
            )?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Indexed lookup: transactions by (target, entrypoint IN set), ascending id.
    pub fn transactions_by_target_entrypoints(
        &self,
        target: &str,
        entrypoints: &[String],
    ) -> Result<Vec<RawTransaction>, StoreError> {
        self.with_conn(|conn| {
            let placeholders = vec!["?"; entrypoints.len()].join(",");
            let sql = format!(
                "SELECT id, hash, level, timestamp, sender, target, amount, entrypoint, parameters, status, has_internals
                 FROM raw_transactions WHERE target = ?1 AND entrypoint IN ({placeholders}) ORDER BY id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut bind_params: Vec<&dyn rusqlite::ToSql> = vec![&target];
            for e in entrypoints {
                bind_params.push(e);
            }
            let rows = stmt
                .query_map(bind_params.as_slice(), map_raw_transaction)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// All raw transactions in ascending id order, for full-window scans
    /// (reconciler/deriver/classifier operate over full raw snapshots).
    pub fn all_raw_transactions(&self) -> Result<Vec<RawTransaction>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, hash, level, timestamp, sender, target, amount, entrypoint, parameters, status, has_internals
                 FROM raw_transactions ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], map_raw_transaction)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn all_raw_token_transfers(&self) -> Result<Vec<RawTokenTransfer>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, level, timestamp, token_contract, token_id, token_standard, from_address, to_address, amount, transaction_id
                 FROM raw_token_transfers ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], map_raw_token_transfer)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn transaction_by_id(&self, id: i64) -> Result<Option<RawTransaction>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, hash, level, timestamp, sender, target, amount, entrypoint, parameters, status, has_internals
                 FROM raw_transactions WHERE id = ?1",
                params![id],
                map_raw_transaction,
            )
            .optional()
        })
    }

    /// Token transfers keyed by the owning transaction id.
    pub fn token_transfers_by_transaction_id(&self, transaction_id: i64) -> Result<Vec<RawTokenTransfer>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, level, timestamp, token_contract, token_id, token_standard, from_address, to_address, amount, transaction_id
                 FROM raw_token_transfers WHERE transaction_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![transaction_id], map_raw_token_transfer)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn all_all_transactions(&self) -> Result<Vec<AllTransaction>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, hash, level, timestamp, sender, target, amount, entrypoint, parameters, status, has_internals, tx_category
                 FROM all_transactions ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(AllTransaction {
                        id: row.get(0)?,
                        hash: row.get(1)?,
                        level: row.get(2)?,
                        timestamp: row.get(3)?,
                        sender: row.get(4)?,
                        target: row.get(5)?,
                        amount: row.get(6)?,
                        entrypoint: row.get(7)?,
                        parameters: row.get(8)?,
                        status: row.get(9)?,
                        has_internals: row.get(10)?,
                        tx_category: row.get(11)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn all_raw_xtz_transfers(&self) -> Result<Vec<RawXtzTransfer>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, hash, timestamp, sender, target, amount, is_from_cex, is_to_cex
                 FROM raw_xtz_transfers ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(RawXtzTransfer {
                        id: row.get(0)?,
                        hash: row.get(1)?,
                        timestamp: row.get(2)?,
                        sender: row.get(3)?,
                        target: row.get(4)?,
                        amount: row.get(5)?,
                        is_from_cex: row.get(6)?,
                        is_to_cex: row.get(7)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Cumulative row count for a window, used by `sync_week` to stamp
    /// `SyncProgress` with the sum across every run over that window rather
    /// than just the most recent run's insert delta.
    pub fn count_all_transactions_in_window(&self, start: &str, end: &str) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM all_transactions WHERE timestamp >= ?1 AND timestamp < ?2",
                params![start, end],
                |row| row.get(0),
            )
        })
    }

    pub fn count_xtz_flows_in_window(&self, start: &str, end: &str) -> Result<i64, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM xtz_flows WHERE timestamp >= ?1 AND timestamp < ?2",
                params![start, end],
                |row| row.get(0),
            )
        })
    }

    pub fn all_xtz_flows(&self) -> Result<Vec<XtzFlow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, hash, timestamp, sender, target, amount, flow_type FROM xtz_flows ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(XtzFlow {
                        id: row.get(0)?,
                        hash: row.get(1)?,
                        timestamp: row.get(2)?,
                        sender: row.get(3)?,
                        target: row.get(4)?,
                        amount: row.get(5)?,
                        flow_type: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn balance(&self, address: &str) -> Result<Option<RawBalance>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT address, balance, snapshot_ts FROM raw_balances WHERE address = ?1",
                params![address],
                |row| {
                    Ok(RawBalance {
                        address: row.get(0)?,
                        balance: row.get(1)?,
                        snapshot_ts: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }
}

fn map_raw_transaction(row: &rusqlite::Row) -> rusqlite::Result<RawTransaction> {
    Ok(RawTransaction {
        id: row.get(0)?,
        hash: row.get(1)?,
        level: row.get(2)?,
        timestamp: row.get(3)?,
        sender: row.get(4)?,
        target: row.get(5)?,
        amount: row.get(6)?,
        entrypoint: row.get(7)?,
        parameters: row.get(8)?,
        status: row.get(9)?,
        has_internals: row.get(10)?,
    })
}

fn map_raw_token_transfer(row: &rusqlite::Row) -> rusqlite::Result<RawTokenTransfer> {
    Ok(RawTokenTransfer {
        id: row.get(0)?,
        level: row.get(1)?,
        timestamp: row.get(2)?,
        token_contract: row.get(3)?,
        token_id: row.get(4)?,
        token_standard: row.get(5)?,
        from_address: row.get(6)?,
        to_address: row.get(7)?,
        amount: row.get(8)?,
        transaction_id: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx(id: i64) -> RawTransaction {
        RawTransaction {
            id,
            hash: format!("op{id}"),
            level: 100,
            timestamp: "2026-01-10T00:00:05Z".to_string(),
            sender: "tz1Buyer".to_string(),
            target: Some("KT1Market".to_string()),
            amount: 5_000_000,
            entrypoint: Some("collect".to_string()),
            parameters: None,
            status: "applied".to_string(),
            has_internals: false,
        }
    }

    #[test]
    fn insert_is_idempotent_on_id() {
        let store = Store::open_in_memory().unwrap();
        let tx = sample_tx(1);
        assert_eq!(store.insert_raw_transactions(&[tx.clone()]).unwrap(), 1);
        assert_eq!(store.insert_raw_transactions(&[tx]).unwrap(), 0);
        assert_eq!(store.row_count("raw_transactions").unwrap(), 1);
    }

    #[test]
    fn max_id_resumes_correctly() {
        let store = Store::open_in_memory().unwrap();
        store.insert_raw_transactions(&[sample_tx(1), sample_tx(5)]).unwrap();
        assert_eq!(store.max_raw_transaction_id().unwrap(), 5);
    }

    #[test]
    fn lookup_by_target_and_entrypoints() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_raw_transactions(&[sample_tx(1), sample_tx(2)])
            .unwrap();
        let rows = store
            .transactions_by_target_entrypoints("KT1Market", &["collect".to_string()])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 1);
    }

    #[test]
    fn window_count_covers_full_range_regardless_of_insert_batch() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_all_transactions(&[
                AllTransaction {
                    id: 1,
                    hash: "op1".into(),
                    level: 1,
                    timestamp: "2026-01-10T00:00:00Z".into(),
                    sender: "tz1A".into(),
                    target: None,
                    amount: 0,
                    entrypoint: None,
                    parameters: None,
                    status: "applied".into(),
                    has_internals: false,
                    tx_category: None,
                },
                AllTransaction {
                    id: 2,
                    hash: "op2".into(),
                    level: 2,
                    timestamp: "2026-01-17T00:00:00Z".into(),
                    sender: "tz1A".into(),
                    target: None,
                    amount: 0,
                    entrypoint: None,
                    parameters: None,
                    status: "applied".into(),
                    has_internals: false,
                    tx_category: None,
                },
            ])
            .unwrap();
        let count = store
            .count_all_transactions_in_window("2026-01-10T00:00:00Z", "2026-01-17T00:00:00Z")
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn balance_snapshot_overwrites() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_raw_balance(&RawBalance { address: "tz1A".into(), balance: Some(10), snapshot_ts: "t1".into() })
            .unwrap();
        store
            .upsert_raw_balance(&RawBalance { address: "tz1A".into(), balance: Some(20), snapshot_ts: "t2".into() })
            .unwrap();
        let b = store.balance("tz1A").unwrap().unwrap();
        assert_eq!(b.balance, Some(20));
        assert_eq!(store.row_count("raw_balances").unwrap(), 1);
    }
}
