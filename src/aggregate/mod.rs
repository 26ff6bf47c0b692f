// Daily metrics, marketplace stats, daily-marketplace fees, and the
// coarse volume trend signal — all pure reductions over the Purchase
// table plus configured fee rates.

use crate::config::Config;
use crate::error::StoreError;
use crate::store::aggregates::{DailyMarketplaceFees, DailyMetrics, MarketplaceStats};
use crate::store::derived::Purchase;
use crate::store::Store;
use ahash::{AHashMap, AHashSet};
use itertools::Itertools;

#[derive(Clone, Debug, PartialEq)]
pub struct VolumeTrend {
    pub label: &'static str,
    pub pct_change: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregateSummary {
    pub days: u64,
    pub marketplaces: u64,
    pub trend: Option<VolumeTrendOwned>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VolumeTrendOwned {
    pub label: String,
    pub pct_change: f64,
}

fn iso_date(ts: &str) -> &str {
    ts.get(..10).unwrap_or(ts)
}

pub struct Aggregator<'a> {
    config: &'a Config,
    store: &'a Store,
}

impl<'a> Aggregator<'a> {
    pub fn new(config: &'a Config, store: &'a Store) -> Self {
        Self { config, store }
    }

    pub fn run(&self) -> Result<AggregateSummary, StoreError> {
        let purchases = self.store.all_purchases()?;

        let daily = self.compute_daily_metrics(&purchases);
        for row in &daily {
            self.store.upsert_daily_metrics(row)?;
        }

        let total_volume: i64 = purchases.iter().filter_map(|p| p.spend).sum();
        let marketplace_stats = self.compute_marketplace_stats(&purchases, total_volume);
        for row in &marketplace_stats {
            self.store.upsert_marketplace_stats(row)?;
        }

        let fees = self.compute_daily_marketplace_fees(&purchases);
        for row in &fees {
            self.store.upsert_daily_marketplace_fees(row)?;
        }

        let trend = volume_trend(&daily).map(|t| VolumeTrendOwned { label: t.label.to_string(), pct_change: t.pct_change });

        Ok(AggregateSummary {
            days: daily.len() as u64,
            marketplaces: marketplace_stats.len() as u64,
            trend,
        })
    }

    fn compute_daily_metrics(&self, purchases: &[Purchase]) -> Vec<DailyMetrics> {
        struct Acc {
            total_volume: i64,
            price_sum: f64,
            price_count: i64,
            sale_count: i64,
            buyers: AHashSet<String>,
            sellers: AHashSet<String>,
        }

        let mut by_date: AHashMap<String, Acc> = AHashMap::new();
        for p in purchases {
            let date = iso_date(&p.ts).to_string();
            let acc = by_date.entry(date).or_insert_with(|| Acc {
                total_volume: 0,
                price_sum: 0.0,
                price_count: 0,
                sale_count: 0,
                buyers: AHashSet::new(),
                sellers: AHashSet::new(),
            });
            acc.sale_count += 1;
            if let Some(spend) = p.spend {
                acc.total_volume += spend;
                if spend > 0 {
                    acc.price_sum += spend as f64;
                    acc.price_count += 1;
                }
            }
            acc.buyers.insert(p.buyer.clone());
            if let Some(seller) = &p.seller {
                acc.sellers.insert(seller.clone());
            }
        }

        by_date
            .into_iter()
            .map(|(date, acc)| DailyMetrics {
                date,
                total_volume: acc.total_volume,
                avg_price: if acc.price_count > 0 { Some(acc.price_sum / acc.price_count as f64) } else { None },
                sale_count: acc.sale_count,
                unique_buyers: acc.buyers.len() as i64,
                unique_sellers: acc.sellers.len() as i64,
            })
            .sorted_by(|a, b| a.date.cmp(&b.date))
            .collect()
    }

    fn compute_marketplace_stats(&self, purchases: &[Purchase], total_volume: i64) -> Vec<MarketplaceStats> {
        struct Acc {
            sale_count: i64,
            volume: i64,
        }
        let mut by_market: AHashMap<String, Acc> = AHashMap::new();
        for p in purchases {
            let acc = by_market.entry(p.marketplace.clone()).or_insert(Acc { sale_count: 0, volume: 0 });
            acc.sale_count += 1;
            if let Some(spend) = p.spend {
                acc.volume += spend;
            }
        }

        by_market
            .into_iter()
            .map(|(marketplace, acc)| {
                let share_pct = if total_volume > 0 { acc.volume as f64 / total_volume as f64 * 100.0 } else { 0.0 };
                let fee_rate = self.config.fee_rate(&marketplace);
                let estimated_fees = (acc.volume as f64 * fee_rate).floor() as i64;
                MarketplaceStats {
                    marketplace,
                    sale_count: acc.sale_count,
                    volume: acc.volume,
                    share_pct,
                    estimated_fees,
                }
            })
            .sorted_by(|a, b| a.marketplace.cmp(&b.marketplace))
            .collect()
    }

    fn compute_daily_marketplace_fees(&self, purchases: &[Purchase]) -> Vec<DailyMarketplaceFees> {
        let mut by_key: AHashMap<(String, String), i64> = AHashMap::new();
        for p in purchases {
            let key = (iso_date(&p.ts).to_string(), p.marketplace.clone());
            let entry = by_key.entry(key).or_insert(0);
            if let Some(spend) = p.spend {
                *entry += spend;
            }
        }
        by_key
            .into_iter()
            .map(|((date, marketplace), volume)| {
                let fee_rate = self.config.fee_rate(&marketplace);
                let fees = (volume as f64 * fee_rate).floor() as i64;
                DailyMarketplaceFees { date, marketplace, volume, fees }
            })
            .sorted_by(|a, b| a.date.cmp(&b.date).then(a.marketplace.cmp(&b.marketplace)))
            .collect()
    }
}

/// Splits the daily-metrics sequence at its midpoint and compares mean
/// daily volume of the two halves: "up" beyond +5%, "down" beyond -5%,
/// else "flat".
fn volume_trend(daily: &[DailyMetrics]) -> Option<VolumeTrend> {
    if daily.len() < 2 {
        return None;
    }
    let mid = daily.len() / 2;
    let (first_half, second_half) = daily.split_at(mid);
    let mean = |rows: &[DailyMetrics]| -> f64 {
        if rows.is_empty() {
            return 0.0;
        }
        rows.iter().map(|r| r.total_volume as f64).sum::<f64>() / rows.len() as f64
    };
    let first_mean = mean(first_half);
    let second_mean = mean(second_half);
    let pct_change = if first_mean.abs() > f64::EPSILON {
        (second_mean - first_mean) / first_mean * 100.0
    } else {
        0.0
    };
    let label = if pct_change > 5.0 {
        "up"
    } else if pct_change < -5.0 {
        "down"
    } else {
        "flat"
    };
    Some(VolumeTrend { label, pct_change })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        serde_yaml::from_str(
            r#"
indexer_base_url: "https://indexer.example.com"
marketplaces:
  - marketplace_name: market_x
    address: KT1Market
    fee_rate: 0.025
"#,
        )
        .unwrap()
    }

    fn purchase(date: &str, marketplace: &str, spend: i64) -> Purchase {
        Purchase {
            op_hash: format!("op_{date}_{spend}"),
            ts: format!("{date}T00:00:00Z"),
            buyer: "tz1Buyer".into(),
            seller: Some("tz1Seller".into()),
            marketplace: marketplace.into(),
            token_contract: "KT1Coll".into(),
            token_id: "1".into(),
            qty: 1,
            spend: Some(spend),
            kind: "listing_purchase".into(),
        }
    }

    #[test]
    fn daily_marketplace_fees_floor_of_volume_times_rate() {
        let config = config();
        let store = Store::open_in_memory().unwrap();
        store.insert_purchase(&purchase("2026-01-01", "market_x", 1_000_000)).unwrap();
        let summary = Aggregator::new(&config, &store).run().unwrap();
        assert_eq!(summary.days, 1);
        let fees = store.all_daily_marketplace_fees().unwrap();
        assert_eq!(fees[0].fees, (1_000_000f64 * 0.025).floor() as i64);
    }

    #[test]
    fn marketplace_stats_volume_matches_sum_of_spend() {
        let config = config();
        let store = Store::open_in_memory().unwrap();
        store.insert_purchase(&purchase("2026-01-01", "market_x", 1_000_000)).unwrap();
        store.insert_purchase(&Purchase { op_hash: "op2".into(), token_id: "2".into(), ..purchase("2026-01-02", "market_x", 2_000_000) }).unwrap();
        Aggregator::new(&config, &store).run().unwrap();
        let stats = store.all_marketplace_stats().unwrap();
        assert_eq!(stats[0].volume, 3_000_000);
    }

    #[test]
    fn volume_trend_detects_up() {
        let daily = vec![
            DailyMetrics { date: "2026-01-01".into(), total_volume: 100, avg_price: None, sale_count: 1, unique_buyers: 1, unique_sellers: 1 },
            DailyMetrics { date: "2026-01-02".into(), total_volume: 200, avg_price: None, sale_count: 1, unique_buyers: 1, unique_sellers: 1 },
        ];
        let trend = volume_trend(&daily).unwrap();
        assert_eq!(trend.label, "up");
    }
}
