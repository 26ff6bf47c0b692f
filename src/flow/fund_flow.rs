// Buyer-CEX and creator-fund flow aggregations: pure reductions over
// narrow-scope XTZ transfers and the purchase/resale/mint derived tables,
// the same "read a full snapshot, fold into an address-keyed map, sort"
// shape as `summary::compute_wallet_summaries`.

use crate::error::StoreError;
use crate::store::aggregates::{BuyerCexFlow, CreatorFundFlow};
use crate::store::Store;
use ahash::{AHashMap, AHashSet};

/// Narrow-scope XTZ transfers (sync-xtz) in or out of a CEX for every
/// already-derived buyer address.
pub fn compute_buyer_cex_flows(store: &Store) -> Result<Vec<BuyerCexFlow>, StoreError> {
    let transfers = store.all_raw_xtz_transfers()?;
    let buyers: AHashSet<String> = store.all_buyers()?.into_iter().collect();

    let mut flows: AHashMap<String, BuyerCexFlow> = AHashMap::new();
    for t in &transfers {
        if t.is_from_cex && buyers.contains(&t.target) {
            flows
                .entry(t.target.clone())
                .or_insert_with(|| BuyerCexFlow { address: t.target.clone(), ..Default::default() })
                .received_from_cex += t.amount;
        }
        if t.is_to_cex && buyers.contains(&t.sender) {
            flows
                .entry(t.sender.clone())
                .or_insert_with(|| BuyerCexFlow { address: t.sender.clone(), ..Default::default() })
                .sent_to_cex += t.amount;
        }
    }

    let mut rows: Vec<BuyerCexFlow> = flows.into_values().collect();
    rows.sort_by(|a, b| a.address.cmp(&b.address));
    Ok(rows)
}

/// Primary-sale and resale value attributable to each creator, joined via
/// the Mint table's (token_contract, token_id) -> creator mapping.
pub fn compute_creator_fund_flows(store: &Store) -> Result<Vec<CreatorFundFlow>, StoreError> {
    let mints = store.all_mints()?;
    let creator_by_token: AHashMap<(String, String), String> =
        mints.into_iter().map(|m| ((m.token_contract, m.token_id), m.creator)).collect();

    let mut flows: AHashMap<String, CreatorFundFlow> = AHashMap::new();

    for purchase in store.all_purchases()? {
        let key = (purchase.token_contract.clone(), purchase.token_id.clone());
        let Some(creator) = creator_by_token.get(&key) else { continue };
        flows
            .entry(creator.clone())
            .or_insert_with(|| CreatorFundFlow { address: creator.clone(), ..Default::default() })
            .mint_revenue += purchase.spend.unwrap_or(0);
    }

    for resale in store.all_resales()? {
        let key = (resale.token_contract.clone(), resale.token_id.clone());
        let Some(creator) = creator_by_token.get(&key) else { continue };
        flows
            .entry(creator.clone())
            .or_insert_with(|| CreatorFundFlow { address: creator.clone(), ..Default::default() })
            .resale_proceeds += resale.proceeds.unwrap_or(0);
    }

    let mut rows: Vec<CreatorFundFlow> = flows.into_values().collect();
    rows.sort_by(|a, b| a.address.cmp(&b.address));
    Ok(rows)
}
