// Contract classifier cache and address registry writers/readers.

use super::Store;
use crate::error::StoreError;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractMetadata {
    pub address: String,
    pub is_fungible: bool,
    pub token_type: Option<String>,
    pub alias: Option<String>,
    pub checked_at: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AddressRegistryEntry {
    pub address: String,
    pub address_type: String,
    pub alias: Option<String>,
    pub tezos_domain: Option<String>,
    pub owned_domains: Option<String>,
    pub category: Option<String>,
    pub tx_count: i64,
    pub metadata: Option<String>,
    pub resolved_at: Option<String>,
}

impl Store {
    pub fn contract_metadata(&self, address: &str) -> Result<Option<ContractMetadata>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT address, is_fungible, token_type, alias, checked_at FROM contract_metadata WHERE address = ?1",
                params![address],
                |row| {
                    Ok(ContractMetadata {
                        address: row.get(0)?,
                        is_fungible: row.get(1)?,
                        token_type: row.get(2)?,
                        alias: row.get(3)?,
                        checked_at: row.get(4)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Authoritative after first write, overwrites any prior entry.
    pub fn upsert_contract_metadata(&self, row: &ContractMetadata) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO contract_metadata (address, is_fungible, token_type, alias, checked_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(address) DO UPDATE SET
                    is_fungible = excluded.is_fungible, token_type = excluded.token_type,
                    alias = excluded.alias, checked_at = excluded.checked_at",
                params![row.address, row.is_fungible, row.token_type, row.alias, row.checked_at],
            )?;
            Ok(())
        })
    }

    pub fn address_registry_entry(&self, address: &str) -> Result<Option<AddressRegistryEntry>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT address, address_type, alias, tezos_domain, owned_domains, category, tx_count, metadata, resolved_at
                 FROM address_registry WHERE address = ?1",
                params![address],
                map_registry_row,
            )
            .optional()
        })
    }

    pub fn upsert_address_registry_entry(&self, row: &AddressRegistryEntry) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO address_registry
                 (address, address_type, alias, tezos_domain, owned_domains, category, tx_count, metadata, resolved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(address) DO UPDATE SET
                    address_type = excluded.address_type, alias = excluded.alias,
                    tezos_domain = excluded.tezos_domain, owned_domains = excluded.owned_domains,
                    category = excluded.category, tx_count = excluded.tx_count,
                    metadata = excluded.metadata, resolved_at = excluded.resolved_at",
                params![
                    row.address, row.address_type, row.alias, row.tezos_domain, row.owned_domains,
                    row.category, row.tx_count, row.metadata, row.resolved_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn all_address_registry_entries(&self) -> Result<Vec<AddressRegistryEntry>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT address, address_type, alias, tezos_domain, owned_domains, category, tx_count, metadata, resolved_at
                 FROM address_registry ORDER BY address ASC",
            )?;
            let rows = stmt.query_map([], map_registry_row)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_registry_row(row: &rusqlite::Row) -> rusqlite::Result<AddressRegistryEntry> {
    Ok(AddressRegistryEntry {
        address: row.get(0)?,
        address_type: row.get(1)?,
        alias: row.get(2)?,
        tezos_domain: row.get(3)?,
        owned_domains: row.get(4)?,
        category: row.get(5)?,
        tx_count: row.get(6)?,
        metadata: row.get(7)?,
        resolved_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_metadata_roundtrips() {
        let store = Store::open_in_memory().unwrap();
        let row = ContractMetadata {
            address: "KT1Coll".into(),
            is_fungible: false,
            token_type: Some("nft".into()),
            alias: None,
            checked_at: "2026-01-10T00:00:00Z".into(),
        };
        store.upsert_contract_metadata(&row).unwrap();
        let fetched = store.contract_metadata("KT1Coll").unwrap().unwrap();
        assert_eq!(fetched, row);
    }

    #[test]
    fn contract_metadata_is_stable_across_reclassify() {
        let store = Store::open_in_memory().unwrap();
        let row = ContractMetadata {
            address: "KT1Coll".into(),
            is_fungible: false,
            token_type: Some("nft".into()),
            alias: None,
            checked_at: "2026-01-10T00:00:00Z".into(),
        };
        store.upsert_contract_metadata(&row).unwrap();
        let first = store.contract_metadata("KT1Coll").unwrap().unwrap();
        let second = store.contract_metadata("KT1Coll").unwrap().unwrap();
        assert_eq!(first, second);
    }
}
