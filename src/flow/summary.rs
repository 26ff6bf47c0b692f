// Per-wallet flow summaries: aggregates outgoing/incoming
// XtzFlow amounts partitioned by flow_type, with NFT-related buckets
// filled in via an (address, timestamp-to-second) join against Purchases.

use crate::error::StoreError;
use crate::store::aggregates::WalletXtzSummary;
use crate::store::Store;
use ahash::{AHashMap, AHashSet};

fn ts_second(ts: &str) -> &str {
    ts.get(..19).unwrap_or(ts)
}

pub fn compute_wallet_summaries(store: &Store) -> Result<Vec<WalletXtzSummary>, StoreError> {
    let flows = store.all_xtz_flows()?;

    let purchases = store.all_purchases()?;
    let buyer_index: AHashSet<(String, String)> =
        purchases.iter().map(|p| (p.buyer.clone(), ts_second(&p.ts).to_string())).collect();
    let seller_index: AHashSet<(String, String)> = purchases
        .iter()
        .filter_map(|p| p.seller.as_ref().map(|s| (s.clone(), ts_second(&p.ts).to_string())))
        .collect();

    let mut summaries: AHashMap<String, WalletXtzSummary> = AHashMap::new();

    for flow in &flows {
        let sender_entry = summaries.entry(flow.sender.clone()).or_insert_with(|| WalletXtzSummary {
            address: flow.sender.clone(),
            ..Default::default()
        });
        sender_entry.total_sent += flow.amount;
        match flow.flow_type.as_str() {
            "cex_deposit" => sender_entry.cex_out += flow.amount,
            "bridge_to_l2" => sender_entry.bridge_out += flow.amount,
            _ => {}
        }
        if buyer_index.contains(&(flow.sender.clone(), ts_second(&flow.timestamp).to_string())) {
            sender_entry.spent_on_nfts += flow.amount;
        }

        let target_entry = summaries.entry(flow.target.clone()).or_insert_with(|| WalletXtzSummary {
            address: flow.target.clone(),
            ..Default::default()
        });
        target_entry.total_received += flow.amount;
        match flow.flow_type.as_str() {
            "cex_withdrawal" => target_entry.cex_in += flow.amount,
            "bridge_from_l2" => target_entry.bridge_in += flow.amount,
            _ => {}
        }
        if seller_index.contains(&(flow.target.clone(), ts_second(&flow.timestamp).to_string())) {
            target_entry.received_from_sales += flow.amount;
        }
    }

    for summary in summaries.values_mut() {
        if let Some(balance) = store.balance(&summary.address)?.and_then(|b| b.balance) {
            summary.balance_start = Some(balance);
            summary.balance_end = Some(balance + summary.total_received - summary.total_sent);
        }
    }

    let mut rows: Vec<WalletXtzSummary> = summaries.into_values().collect();
    rows.sort_by(|a, b| a.address.cmp(&b.address));
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::raw::XtzFlow;

    #[test]
    fn balance_end_matches_invariant() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_raw_balance(&crate::store::raw::RawBalance {
                address: "tz1A".into(),
                balance: Some(1_000_000),
                snapshot_ts: "2026-01-01T00:00:00Z".into(),
            })
            .unwrap();
        store
            .insert_xtz_flows(&[
                XtzFlow {
                    id: 1,
                    hash: "op1".into(),
                    timestamp: "2026-01-02T00:00:00Z".into(),
                    sender: "tz1A".into(),
                    target: "tz1B".into(),
                    amount: 200_000,
                    flow_type: "p2p".into(),
                },
                XtzFlow {
                    id: 2,
                    hash: "op2".into(),
                    timestamp: "2026-01-03T00:00:00Z".into(),
                    sender: "tz1B".into(),
                    target: "tz1A".into(),
                    amount: 50_000,
                    flow_type: "p2p".into(),
                },
            ])
            .unwrap();

        let summaries = compute_wallet_summaries(&store).unwrap();
        let a = summaries.iter().find(|s| s.address == "tz1A").unwrap();
        assert_eq!(a.balance_end, a.balance_start.map(|s| s + a.total_received - a.total_sent));
    }
}
