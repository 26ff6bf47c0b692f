// Derived-table writers: buyers/creators sets, mints, listings, offer
// accepts, purchases, resales. Each insert is an upsert-ignore against the
// table's uniqueness constraint so the reconciler and deriver can be
// re-run freely after `clear_derived`.

use super::Store;
use crate::error::StoreError;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mint {
    pub op_hash: String,
    pub ts: String,
    pub creator: String,
    pub token_contract: String,
    pub token_id: String,
    pub transfer_id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub op_hash: String,
    pub ts: String,
    pub seller: Option<String>,
    pub marketplace: String,
    pub token_contract: String,
    pub token_id: String,
    pub list_price: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OfferAccept {
    pub op_hash: String,
    pub ts: String,
    pub seller: String,
    pub buyer: Option<String>,
    pub marketplace: String,
    pub token_contract: String,
    pub token_id: String,
    pub accepted_price: Option<i64>,
    pub reference_list_price: Option<i64>,
    pub under_list: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PurchaseKind {
    ListingPurchase,
    OpenEdition,
}

impl PurchaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseKind::ListingPurchase => "listing_purchase",
            PurchaseKind::OpenEdition => "open_edition",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub op_hash: String,
    pub ts: String,
    pub buyer: String,
    pub seller: Option<String>,
    pub marketplace: String,
    pub token_contract: String,
    pub token_id: String,
    pub qty: i64,
    pub spend: Option<i64>,
    pub kind: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resale {
    pub op_hash: String,
    pub ts: String,
    pub seller_collector: String,
    pub buyer: Option<String>,
    pub marketplace: String,
    pub token_contract: String,
    pub token_id: String,
    pub proceeds: Option<i64>,
}

impl Store {
    pub fn insert_buyer(&self, address: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute("INSERT OR IGNORE INTO buyers (address) VALUES (?1)", params![address])?;
            Ok(())
        })
    }

    pub fn is_buyer(&self, address: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM buyers WHERE address = ?1)",
                params![address],
                |row| row.get(0),
            )
        })
    }

    pub fn insert_creator(&self, address: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute("INSERT OR IGNORE INTO creators (address) VALUES (?1)", params![address])?;
            Ok(())
        })
    }

    pub fn all_buyers(&self) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT address FROM buyers ORDER BY address ASC")?;
            let rows = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn all_creators(&self) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT address FROM creators ORDER BY address ASC")?;
            let rows = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn set_buyer_balance_start(&self, address: &str, balance: Option<i64>, ts: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO buyer_balance_start (address, balance, ts) VALUES (?1, ?2, ?3)
                 ON CONFLICT(address) DO NOTHING",
                params![address, balance, ts],
            )?;
            Ok(())
        })
    }

    pub fn insert_mint(&self, mint: &Mint) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO mints (op_hash, ts, creator, token_contract, token_id, transfer_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![mint.op_hash, mint.ts, mint.creator, mint.token_contract, mint.token_id, mint.transfer_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn all_mints(&self) -> Result<Vec<Mint>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT op_hash, ts, creator, token_contract, token_id, transfer_id FROM mints ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Mint {
                        op_hash: row.get(0)?,
                        ts: row.get(1)?,
                        creator: row.get(2)?,
                        token_contract: row.get(3)?,
                        token_id: row.get(4)?,
                        transfer_id: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn insert_listing(&self, listing: &Listing) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO listings (op_hash, ts, seller, marketplace, token_contract, token_id, list_price)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    listing.op_hash, listing.ts, listing.seller, listing.marketplace,
                    listing.token_contract, listing.token_id, listing.list_price
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// Most recent Listing for (seller, token) with ts <= before_ts, used by
    /// offer-accept reconciliation for the reference price.
    pub fn latest_listing_price(
        &self,
        seller: &str,
        token_contract: &str,
        token_id: &str,
        before_ts: &str,
    ) -> Result<Option<i64>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT list_price FROM listings
                 WHERE seller = ?1 AND token_contract = ?2 AND token_id = ?3 AND ts <= ?4
                 ORDER BY ts DESC LIMIT 1",
                params![seller, token_contract, token_id, before_ts],
                |row| row.get(0),
            )
            .optional()
            .map(|opt| opt.flatten())
        })
    }

    pub fn insert_offer_accept(&self, offer: &OfferAccept) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO offer_accepts
                 (op_hash, ts, seller, buyer, marketplace, token_contract, token_id, accepted_price, reference_list_price, under_list)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    offer.op_hash, offer.ts, offer.seller, offer.buyer, offer.marketplace,
                    offer.token_contract, offer.token_id, offer.accepted_price,
                    offer.reference_list_price, offer.under_list
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn insert_purchase(&self, purchase: &Purchase) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO purchases
                 (op_hash, ts, buyer, seller, marketplace, token_contract, token_id, qty, spend, kind)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    purchase.op_hash, purchase.ts, purchase.buyer, purchase.seller, purchase.marketplace,
                    purchase.token_contract, purchase.token_id, purchase.qty, purchase.spend, purchase.kind
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn insert_resale(&self, resale: &Resale) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO resales
                 (op_hash, ts, seller_collector, buyer, marketplace, token_contract, token_id, proceeds)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    resale.op_hash, resale.ts, resale.seller_collector, resale.buyer,
                    resale.marketplace, resale.token_contract, resale.token_id, resale.proceeds
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn all_resales(&self) -> Result<Vec<Resale>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT op_hash, ts, seller_collector, buyer, marketplace, token_contract, token_id, proceeds
                 FROM resales ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Resale {
                        op_hash: row.get(0)?,
                        ts: row.get(1)?,
                        seller_collector: row.get(2)?,
                        buyer: row.get(3)?,
                        marketplace: row.get(4)?,
                        token_contract: row.get(5)?,
                        token_id: row.get(6)?,
                        proceeds: row.get(7)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn all_purchases(&self) -> Result<Vec<Purchase>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT op_hash, ts, buyer, seller, marketplace, token_contract, token_id, qty, spend, kind
                 FROM purchases ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Purchase {
                        op_hash: row.get(0)?,
                        ts: row.get(1)?,
                        buyer: row.get(2)?,
                        seller: row.get(3)?,
                        marketplace: row.get(4)?,
                        token_contract: row.get(5)?,
                        token_id: row.get(6)?,
                        qty: row.get(7)?,
                        spend: row.get(8)?,
                        kind: row.get(9)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// A purchase whose buyer equals `seller` and whose ts is strictly
    /// earlier than `before_ts`, for Resale validation / buy-price lookup.
    pub fn earliest_purchase_by_buyer_before(
        &self,
        buyer: &str,
        before_ts: &str,
    ) -> Result<Option<Purchase>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT op_hash, ts, buyer, seller, marketplace, token_contract, token_id, qty, spend, kind
                 FROM purchases WHERE buyer = ?1 AND ts < ?2 ORDER BY ts ASC LIMIT 1",
                params![buyer, before_ts],
                |row| {
                    Ok(Purchase {
                        op_hash: row.get(0)?,
                        ts: row.get(1)?,
                        buyer: row.get(2)?,
                        seller: row.get(3)?,
                        marketplace: row.get(4)?,
                        token_contract: row.get(5)?,
                        token_id: row.get(6)?,
                        qty: row.get(7)?,
                        spend: row.get(8)?,
                        kind: row.get(9)?,
                    })
                },
            )
            .optional()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_unique_on_op_buyer_token() {
        let store = Store::open_in_memory().unwrap();
        let p = Purchase {
            op_hash: "op1".into(),
            ts: "2026-01-10T00:00:05Z".into(),
            buyer: "tz1Buyer".into(),
            seller: Some("KT1Custody".into()),
            marketplace: "market_x".into(),
            token_contract: "KT1Coll".into(),
            token_id: "1".into(),
            qty: 1,
            spend: Some(5_000_000),
            kind: PurchaseKind::ListingPurchase.as_str().to_string(),
        };
        assert!(store.insert_purchase(&p).unwrap());
        assert!(!store.insert_purchase(&p).unwrap());
        assert_eq!(store.row_count("purchases").unwrap(), 1);
    }

    #[test]
    fn latest_listing_price_picks_most_recent_before_cutoff() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_listing(&Listing {
                op_hash: "l1".into(),
                ts: "2026-01-09T00:00:00Z".into(),
                seller: Some("tz1S".into()),
                marketplace: "market_x".into(),
                token_contract: "KT1Coll".into(),
                token_id: "1".into(),
                list_price: Some(10_000_000),
            })
            .unwrap();
        store
            .insert_listing(&Listing {
                op_hash: "l2".into(),
                ts: "2026-01-09T12:00:00Z".into(),
                seller: Some("tz1S".into()),
                marketplace: "market_x".into(),
                token_contract: "KT1Coll".into(),
                token_id: "1".into(),
                list_price: Some(9_000_000),
            })
            .unwrap();
        let price = store
            .latest_listing_price("tz1S", "KT1Coll", "1", "2026-01-10T00:00:00Z")
            .unwrap();
        assert_eq!(price, Some(9_000_000));
    }

    #[test]
    fn earliest_purchase_before_finds_prior_buy() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_purchase(&Purchase {
                op_hash: "op1".into(),
                ts: "2026-01-01T00:00:00Z".into(),
                buyer: "tz1S".into(),
                seller: Some("KT1Custody".into()),
                marketplace: "market_x".into(),
                token_contract: "KT1Coll".into(),
                token_id: "1".into(),
                qty: 1,
                spend: Some(1_000_000),
                kind: "listing_purchase".into(),
            })
            .unwrap();
        let found = store
            .earliest_purchase_by_buyer_before("tz1S", "2026-01-02T00:00:00Z")
            .unwrap();
        assert!(found.is_some());
    }
}
