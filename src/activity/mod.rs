pub mod param_walker;

use crate::config::Config;
use crate::error::StoreError;
use crate::store::derived::{Listing, Mint, OfferAccept};
use crate::store::Store;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActivityCounters {
    pub mints: u64,
    pub listings: u64,
    pub listings_skipped: u64,
    pub offer_accepts: u64,
}

pub struct ActivityDeriver<'a> {
    config: &'a Config,
    store: &'a Store,
}

impl<'a> ActivityDeriver<'a> {
    pub fn new(config: &'a Config, store: &'a Store) -> Self {
        Self { config, store }
    }

    pub fn run(&self) -> Result<ActivityCounters, StoreError> {
        let mut counters = ActivityCounters::default();
        counters.mints = self.derive_mints()?;
        let (listings, skipped) = self.derive_listings()?;
        counters.listings = listings;
        counters.listings_skipped = skipped;
        counters.offer_accepts = self.derive_offer_accepts()?;
        Ok(counters)
    }

    /// Every FA2 transfer with a null/empty `from` is a mint; a wallet `to`
    /// becomes the creator.
    fn derive_mints(&self) -> Result<u64, StoreError> {
        let transfers = self.store.all_raw_token_transfers()?;
        let mut count = 0;
        for transfer in &transfers {
            let from_is_mint = transfer.from_address.as_deref().map(str::is_empty).unwrap_or(true);
            if !from_is_mint {
                continue;
            }
            let Some(to) = &transfer.to_address else { continue };
            if !to.starts_with("tz") {
                continue;
            }
            self.store.insert_creator(to)?;
            let op_hash = match transfer.transaction_id.and_then(|id| self.store.transaction_by_id(id).ok().flatten()) {
                Some(tx) => tx.hash,
                None => format!("mint_{}", transfer.id),
            };
            let ts = transfer.timestamp.clone();
            let mint = Mint {
                op_hash,
                ts,
                creator: to.clone(),
                token_contract: transfer.token_contract.clone(),
                token_id: transfer.token_id.clone(),
                transfer_id: Some(transfer.id),
            };
            if self.store.insert_mint(&mint)? {
                count += 1;
            }
        }
        Ok(count)
    }

    fn derive_listings(&self) -> Result<(u64, u64), StoreError> {
        let mut inserted = 0;
        let mut skipped = 0;

        for marketplace in &self.config.marketplaces {
            if marketplace.list_entrypoints.is_empty() {
                continue;
            }
            let transactions = self
                .store
                .transactions_by_target_entrypoints(&marketplace.address, &marketplace.list_entrypoints)?;

            for tx in &transactions {
                let Some(params) =
                    tx.parameters.as_deref().and_then(|p| serde_json::from_str::<serde_json::Value>(p).ok())
                else {
                    skipped += 1;
                    continue;
                };
                let Some(found) = param_walker::extract_listing_params(&params) else {
                    skipped += 1;
                    continue;
                };

                let listing = Listing {
                    op_hash: tx.hash.clone(),
                    ts: tx.timestamp.clone(),
                    seller: Some(tx.sender.clone()),
                    marketplace: marketplace.marketplace_name.clone(),
                    token_contract: found.token_contract,
                    token_id: found.token_id,
                    list_price: found.price,
                };
                if self.store.insert_listing(&listing)? {
                    inserted += 1;
                }
            }
        }
        Ok((inserted, skipped))
    }

    fn derive_offer_accepts(&self) -> Result<u64, StoreError> {
        let mut inserted = 0;

        for marketplace in &self.config.marketplaces {
            if marketplace.accept_offer_entrypoints.is_empty() {
                continue;
            }
            let transactions = self
                .store
                .transactions_by_target_entrypoints(&marketplace.address, &marketplace.accept_offer_entrypoints)?;

            for tx in &transactions {
                let transfers = self.store.token_transfers_by_transaction_id(tx.id)?;
                let Some(transfer) = transfers.first() else { continue };
                let seller = tx.sender.clone();
                let accepted_price = Some(tx.amount);
                let reference_list_price = self.store.latest_listing_price(
                    &seller,
                    &transfer.token_contract,
                    &transfer.token_id,
                    &tx.timestamp,
                )?;
                let under_list = match (accepted_price, reference_list_price) {
                    (Some(a), Some(r)) => Some(a < r),
                    _ => None,
                };

                let offer_accept = OfferAccept {
                    op_hash: tx.hash.clone(),
                    ts: tx.timestamp.clone(),
                    seller,
                    buyer: transfer.to_address.clone(),
                    marketplace: marketplace.marketplace_name.clone(),
                    token_contract: transfer.token_contract.clone(),
                    token_id: transfer.token_id.clone(),
                    accepted_price,
                    reference_list_price,
                    under_list,
                };
                if self.store.insert_offer_accept(&offer_accept)? {
                    inserted += 1;
                }
            }
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::raw::{RawTokenTransfer, RawTransaction};

    fn config_with_market() -> Config {
        serde_yaml::from_str(
            r#"
indexer_base_url: "https://indexer.example.com"
marketplaces:
  - marketplace_name: market_x
    address: KT1Market
    buy_entrypoints: []
    list_entrypoints: [list]
    accept_offer_entrypoints: [accept_offer]
    fee_rate: 0.025
"#,
        )
        .unwrap()
    }

    #[test]
    fn mint_detected_from_null_from() {
        let config = config_with_market();
        let store = Store::open_in_memory().unwrap();
        store
            .insert_raw_token_transfers(&[RawTokenTransfer {
                id: 1,
                level: 1,
                timestamp: "2026-01-01T00:00:00Z".into(),
                token_contract: "KT1Coll".into(),
                token_id: "1".into(),
                token_standard: "fa2".into(),
                from_address: None,
                to_address: Some("tz1Creator".into()),
                amount: "1".into(),
                transaction_id: None,
            }])
            .unwrap();
        let counters = ActivityDeriver::new(&config, &store).run().unwrap();
        assert_eq!(counters.mints, 1);
        assert_eq!(store.row_count("creators").unwrap(), 1);
    }

    #[test]
    fn listing_under_list_scenario() {
        let config = config_with_market();
        let store = Store::open_in_memory().unwrap();
        store
            .insert_listing(&Listing {
                op_hash: "l1".into(),
                ts: "2026-01-01T00:00:00Z".into(),
                seller: Some("SELLER_S".into()),
                marketplace: "market_x".into(),
                token_contract: "KT1Coll".into(),
                token_id: "1".into(),
                list_price: Some(10_000_000),
            })
            .unwrap();
        store
            .insert_raw_transactions(&[RawTransaction {
                id: 1,
                hash: "op2".into(),
                level: 10,
                timestamp: "2026-01-01T01:00:00Z".into(),
                sender: "SELLER_S".into(),
                target: Some("KT1Market".into()),
                amount: 7_000_000,
                entrypoint: Some("accept_offer".into()),
                parameters: None,
                status: "applied".into(),
                has_internals: false,
            }])
            .unwrap();
        store
            .insert_raw_token_transfers(&[RawTokenTransfer {
                id: 2,
                level: 10,
                timestamp: "2026-01-01T01:00:00Z".into(),
                token_contract: "KT1Coll".into(),
                token_id: "1".into(),
                token_standard: "fa2".into(),
                from_address: Some("SELLER_S".into()),
                to_address: Some("tz1Buyer".into()),
                amount: "1".into(),
                transaction_id: Some(1),
            }])
            .unwrap();

        let counters = ActivityDeriver::new(&config, &store).run().unwrap();
        assert_eq!(counters.offer_accepts, 1);
    }
}
