// Aggregate-table writers for the daily/marketplace/flow summary tables the
// aggregator and flow engine produce. Every write here is a full replace
// (upsert by primary key) since aggregates are always recomputed from
// scratch over a cleared derived layer.

use super::Store;
use crate::error::StoreError;
use rusqlite::params;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub date: String,
    pub total_volume: i64,
    pub avg_price: Option<f64>,
    pub sale_count: i64,
    pub unique_buyers: i64,
    pub unique_sellers: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceStats {
    pub marketplace: String,
    pub sale_count: i64,
    pub volume: i64,
    pub share_pct: f64,
    pub estimated_fees: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyMarketplaceFees {
    pub date: String,
    pub marketplace: String,
    pub volume: i64,
    pub fees: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BuyerCexFlow {
    pub address: String,
    pub received_from_cex: i64,
    pub sent_to_cex: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CreatorFundFlow {
    pub address: String,
    pub mint_revenue: i64,
    pub resale_proceeds: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletXtzSummary {
    pub address: String,
    pub balance_start: Option<i64>,
    pub balance_end: Option<i64>,
    pub total_received: i64,
    pub total_sent: i64,
    pub received_from_sales: i64,
    pub spent_on_nfts: i64,
    pub cex_in: i64,
    pub cex_out: i64,
    pub bridge_in: i64,
    pub bridge_out: i64,
}

impl Store {
    pub fn upsert_daily_metrics(&self, row: &DailyMetrics) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO daily_metrics (date, total_volume, avg_price, sale_count, unique_buyers, unique_sellers)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(date) DO UPDATE SET
                    total_volume = excluded.total_volume, avg_price = excluded.avg_price,
                    sale_count = excluded.sale_count, unique_buyers = excluded.unique_buyers,
                    unique_sellers = excluded.unique_sellers",
                params![row.date, row.total_volume, row.avg_price, row.sale_count, row.unique_buyers, row.unique_sellers],
            )?;
            Ok(())
        })
    }

    pub fn all_daily_metrics(&self) -> Result<Vec<DailyMetrics>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT date, total_volume, avg_price, sale_count, unique_buyers, unique_sellers
                 FROM daily_metrics ORDER BY date ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(DailyMetrics {
                        date: row.get(0)?,
                        total_volume: row.get(1)?,
                        avg_price: row.get(2)?,
                        sale_count: row.get(3)?,
                        unique_buyers: row.get(4)?,
                        unique_sellers: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn upsert_marketplace_stats(&self, row: &MarketplaceStats) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO marketplace_stats (marketplace, sale_count, volume, share_pct, estimated_fees)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(marketplace) DO UPDATE SET
                    sale_count = excluded.sale_count, volume = excluded.volume,
                    share_pct = excluded.share_pct, estimated_fees = excluded.estimated_fees",
                params![row.marketplace, row.sale_count, row.volume, row.share_pct, row.estimated_fees],
            )?;
            Ok(())
        })
    }

    pub fn all_marketplace_stats(&self) -> Result<Vec<MarketplaceStats>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT marketplace, sale_count, volume, share_pct, estimated_fees FROM marketplace_stats ORDER BY marketplace ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(MarketplaceStats {
                        marketplace: row.get(0)?,
                        sale_count: row.get(1)?,
                        volume: row.get(2)?,
                        share_pct: row.get(3)?,
                        estimated_fees: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn upsert_daily_marketplace_fees(&self, row: &DailyMarketplaceFees) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO daily_marketplace_fees (date, marketplace, volume, fees) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(date, marketplace) DO UPDATE SET volume = excluded.volume, fees = excluded.fees",
                params![row.date, row.marketplace, row.volume, row.fees],
            )?;
            Ok(())
        })
    }

    pub fn all_daily_marketplace_fees(&self) -> Result<Vec<DailyMarketplaceFees>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT date, marketplace, volume, fees FROM daily_marketplace_fees ORDER BY date ASC, marketplace ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(DailyMarketplaceFees {
                        date: row.get(0)?,
                        marketplace: row.get(1)?,
                        volume: row.get(2)?,
                        fees: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn upsert_buyer_cex_flow(&self, row: &BuyerCexFlow) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO buyer_cex_flow (address, received_from_cex, sent_to_cex) VALUES (?1, ?2, ?3)
                 ON CONFLICT(address) DO UPDATE SET
                    received_from_cex = excluded.received_from_cex, sent_to_cex = excluded.sent_to_cex",
                params![row.address, row.received_from_cex, row.sent_to_cex],
            )?;
            Ok(())
        })
    }

    pub fn all_buyer_cex_flow(&self) -> Result<Vec<BuyerCexFlow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT address, received_from_cex, sent_to_cex FROM buyer_cex_flow ORDER BY address ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(BuyerCexFlow { address: row.get(0)?, received_from_cex: row.get(1)?, sent_to_cex: row.get(2)? })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn upsert_creator_fund_flow(&self, row: &CreatorFundFlow) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO creator_fund_flow (address, mint_revenue, resale_proceeds) VALUES (?1, ?2, ?3)
                 ON CONFLICT(address) DO UPDATE SET
                    mint_revenue = excluded.mint_revenue, resale_proceeds = excluded.resale_proceeds",
                params![row.address, row.mint_revenue, row.resale_proceeds],
            )?;
            Ok(())
        })
    }

    pub fn all_creator_fund_flow(&self) -> Result<Vec<CreatorFundFlow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT address, mint_revenue, resale_proceeds FROM creator_fund_flow ORDER BY address ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(CreatorFundFlow { address: row.get(0)?, mint_revenue: row.get(1)?, resale_proceeds: row.get(2)? })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn upsert_wallet_xtz_summary(&self, row: &WalletXtzSummary) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO wallet_xtz_summary
                 (address, balance_start, balance_end, total_received, total_sent, received_from_sales,
                  spent_on_nfts, cex_in, cex_out, bridge_in, bridge_out)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(address) DO UPDATE SET
                    balance_start = excluded.balance_start, balance_end = excluded.balance_end,
                    total_received = excluded.total_received, total_sent = excluded.total_sent,
                    received_from_sales = excluded.received_from_sales, spent_on_nfts = excluded.spent_on_nfts,
                    cex_in = excluded.cex_in, cex_out = excluded.cex_out,
                    bridge_in = excluded.bridge_in, bridge_out = excluded.bridge_out",
                params![
                    row.address, row.balance_start, row.balance_end, row.total_received, row.total_sent,
                    row.received_from_sales, row.spent_on_nfts, row.cex_in, row.cex_out, row.bridge_in, row.bridge_out
                ],
            )?;
            Ok(())
        })
    }

    pub fn all_wallet_xtz_summaries(&self) -> Result<Vec<WalletXtzSummary>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT address, balance_start, balance_end, total_received, total_sent, received_from_sales,
                        spent_on_nfts, cex_in, cex_out, bridge_in, bridge_out
                 FROM wallet_xtz_summary ORDER BY address ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(WalletXtzSummary {
                        address: row.get(0)?,
                        balance_start: row.get(1)?,
                        balance_end: row.get(2)?,
                        total_received: row.get(3)?,
                        total_sent: row.get(4)?,
                        received_from_sales: row.get(5)?,
                        spent_on_nfts: row.get(6)?,
                        cex_in: row.get(7)?,
                        cex_out: row.get(8)?,
                        bridge_in: row.get(9)?,
                        bridge_out: row.get(10)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_metrics_upsert_replaces() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_daily_metrics(&DailyMetrics {
                date: "2026-01-10".into(),
                total_volume: 1,
                avg_price: Some(1.0),
                sale_count: 1,
                unique_buyers: 1,
                unique_sellers: 1,
            })
            .unwrap();
        store
            .upsert_daily_metrics(&DailyMetrics {
                date: "2026-01-10".into(),
                total_volume: 2,
                avg_price: Some(2.0),
                sale_count: 2,
                unique_buyers: 2,
                unique_sellers: 2,
            })
            .unwrap();
        let all = store.all_daily_metrics().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].total_volume, 2);
    }

    #[test]
    fn wallet_xtz_summary_balance_invariant() {
        let store = Store::open_in_memory().unwrap();
        let row = WalletXtzSummary {
            address: "tz1A".into(),
            balance_start: Some(100),
            balance_end: Some(100 + 50 - 20),
            total_received: 50,
            total_sent: 20,
            ..Default::default()
        };
        store.upsert_wallet_xtz_summary(&row).unwrap();
        let fetched = store.all_wallet_xtz_summaries().unwrap();
        let w = &fetched[0];
        assert_eq!(w.balance_end, w.balance_start.map(|s| s + w.total_received - w.total_sent));
    }
}
