// Sale reconciler: joins contract-call transactions with token-transfer
// events to produce verified Purchase and Resale rows. The weakest link is
// the timestamp-second join (two unrelated operations in the same second
// with the same sender collide); determinism comes from indexing raw
// transactions in ascending id and always taking the first match.

use crate::config::{Config, EDITION_SIZE_CEILING};
use crate::error::StoreError;
use crate::store::derived::{Purchase, PurchaseKind, Resale};
use crate::store::raw::{RawTokenTransfer, RawTransaction};
use crate::store::Store;
use ahash::AHashMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileCounters {
    pub purchases: u64,
    pub resales: u64,
    pub p2p_skipped: u64,
    pub fungible_skipped: u64,
    pub edition_size_skipped: u64,
}

fn truncate_to_second(ts: &str) -> &str {
    ts.get(..19).unwrap_or(ts)
}

fn is_wallet(address: &str) -> bool {
    address.starts_with("tz")
}

pub struct SaleReconciler<'a> {
    config: &'a Config,
    store: &'a Store,
}

/// Index of raw transactions by (timestamp-second, sender), preserving the
/// ascending-id order of first insertion so lookups return the first match.
struct SecondSenderIndex<'a> {
    by_key: AHashMap<(String, String), Vec<&'a RawTransaction>>,
}

impl<'a> SecondSenderIndex<'a> {
    fn build(transactions: &'a [RawTransaction]) -> Self {
        let mut by_key: AHashMap<(String, String), Vec<&RawTransaction>> = AHashMap::new();
        for tx in transactions {
            let key = (truncate_to_second(&tx.timestamp).to_string(), tx.sender.clone());
            by_key.entry(key).or_default().push(tx);
        }
        Self { by_key }
    }

    fn first(&self, second: &str, sender: &str) -> Option<&'a RawTransaction> {
        self.by_key
            .get(&(second.to_string(), sender.to_string()))
            .and_then(|v| v.first())
            .copied()
    }
}

impl<'a> SaleReconciler<'a> {
    pub fn new(config: &'a Config, store: &'a Store) -> Self {
        Self { config, store }
    }

    fn is_fungible(&self, contract: &str) -> bool {
        if self.config.fungible_set().contains(contract) {
            return true;
        }
        if self.config.nft_set().contains(contract) {
            return false;
        }
        self.store
            .contract_metadata(contract)
            .ok()
            .flatten()
            .map(|m| m.is_fungible)
            .unwrap_or(false)
    }

    /// amount <= 5555 AND (token_id != "0" OR contract not fungible).
    fn is_nft_transfer(&self, transfer: &RawTokenTransfer) -> Result<bool, u8> {
        let amount: u64 = match transfer.amount.parse() {
            Ok(a) => a,
            Err(_) => return Err(1), // unparseable amount, treat as exceeding the ceiling
        };
        if amount > EDITION_SIZE_CEILING {
            return Err(1);
        }
        if transfer.token_id == "0" && self.is_fungible(&transfer.token_contract) {
            return Err(2);
        }
        Ok(true)
    }

    pub fn run(&self) -> Result<ReconcileCounters, StoreError> {
        let transactions = self.store.all_raw_transactions()?;
        let transfers = self.store.all_raw_token_transfers()?;
        let index = SecondSenderIndex::build(&transactions);
        let address_to_marketplace = self.config.address_to_marketplace();
        let custody_to_marketplace = self.config.custody_to_marketplace();
        let open_edition = self.config.open_edition_set();

        let mut counters = ReconcileCounters::default();

        for transfer in &transfers {
            let (from, to) = match (&transfer.from_address, &transfer.to_address) {
                (Some(from), Some(to)) if is_wallet(to) => (from, to),
                _ => continue,
            };

            match self.is_nft_transfer(transfer) {
                Err(1) => {
                    counters.edition_size_skipped += 1;
                    continue;
                }
                Err(_) => {
                    counters.fungible_skipped += 1;
                    continue;
                }
                Ok(_) => {}
            }

            let second = truncate_to_second(&transfer.timestamp);
            let sale = self.reconcile_one(from, to, second, &index, &address_to_marketplace, &custody_to_marketplace);

            let Some((marketplace, seller, price_tx)) = sale else {
                counters.p2p_skipped += 1;
                continue;
            };

            let spend = price_tx.map(|tx| tx.amount);
            let kind = if spend == Some(0)
                && (open_edition.contains(&marketplace) || open_edition.contains(&transfer.token_contract))
            {
                PurchaseKind::OpenEdition
            } else {
                PurchaseKind::ListingPurchase
            };

            let op_hash = price_tx.map(|tx| tx.hash.clone()).unwrap_or_else(|| format!("transfer_{}", transfer.id));
            let purchase = Purchase {
                op_hash,
                ts: transfer.timestamp.clone(),
                buyer: to.clone(),
                seller: Some(seller.clone()),
                marketplace,
                token_contract: transfer.token_contract.clone(),
                token_id: transfer.token_id.clone(),
                qty: 1,
                spend,
                kind: kind.as_str().to_string(),
            };

            if self.store.insert_purchase(&purchase)? {
                counters.purchases += 1;
                self.store.insert_buyer(to)?;
                let starting_balance = self.store.balance(to)?.and_then(|b| b.balance);
                self.store.set_buyer_balance_start(to, starting_balance, &purchase.ts)?;

                // Invariant: a Resale requires a Purchase by this seller strictly
                // earlier than this sale, not just buyer-set membership.
                if self.store.is_buyer(&seller)?
                    && self.store.earliest_purchase_by_buyer_before(&seller, &purchase.ts)?.is_some()
                {
                    let resale = Resale {
                        op_hash: purchase.op_hash.clone(),
                        ts: purchase.ts.clone(),
                        seller_collector: seller.clone(),
                        buyer: Some(to.clone()),
                        marketplace: purchase.marketplace.clone(),
                        token_contract: purchase.token_contract.clone(),
                        token_id: purchase.token_id.clone(),
                        proceeds: spend,
                    };
                    if self.store.insert_resale(&resale)? {
                        counters.resales += 1;
                    }
                }
            }
        }

        counters.resales += self.reconcile_offer_accept_resales(&transactions, &transfers)?;

        Ok(counters)
    }

    /// Routes 1-3: returns (marketplace, seller, price_tx) on a verified sale.
    fn reconcile_one<'t>(
        &self,
        from: &str,
        to: &str,
        second: &str,
        index: &SecondSenderIndex<'t>,
        address_to_marketplace: &AHashMap<String, String>,
        custody_to_marketplace: &AHashMap<String, String>,
    ) -> Option<(String, String, Option<&'t RawTransaction>)> {
        // Route 1: custody.
        if let Some(marketplace) = custody_to_marketplace.get(from) {
            let price_tx = index.first(second, to);
            return Some((marketplace.clone(), from.to_string(), price_tx));
        }

        // Route 2: timestamp + buyer.
        if let Some(tx) = index.first(second, to) {
            if let Some(target) = &tx.target {
                if let Some(marketplace) = address_to_marketplace.get(target) {
                    return Some((marketplace.clone(), from.to_string(), Some(tx)));
                }
            }
        }

        // Route 3: timestamp + seller, only for accept-offer entrypoints.
        if let Some(tx) = index.first(second, from) {
            if let Some(target) = &tx.target {
                if let Some(marketplace_name) = address_to_marketplace.get(target) {
                    if let Some(marketplace) = self.config.marketplace_by_name(marketplace_name) {
                        if let Some(entrypoint) = &tx.entrypoint {
                            if marketplace.is_accept_offer_entrypoint(entrypoint) {
                                return Some((marketplace_name.clone(), from.to_string(), Some(tx)));
                            }
                        }
                    }
                }
            }
        }

        None
    }

    /// Offer-accept transactions sent by a prior buyer additionally produce
    /// a Resale from the FA2 transfer in the same operation.
    fn reconcile_offer_accept_resales(
        &self,
        transactions: &[RawTransaction],
        transfers: &[RawTokenTransfer],
    ) -> Result<u64, StoreError> {
        let address_to_marketplace = self.config.address_to_marketplace();
        let mut transfers_by_tx_id: AHashMap<i64, &RawTokenTransfer> = AHashMap::new();
        for t in transfers {
            if let Some(tx_id) = t.transaction_id {
                transfers_by_tx_id.entry(tx_id).or_insert(t);
            }
        }

        let mut resales = 0u64;
        for tx in transactions {
            let Some(target) = &tx.target else { continue };
            let Some(marketplace_name) = address_to_marketplace.get(target) else { continue };
            let Some(marketplace) = self.config.marketplace_by_name(marketplace_name) else { continue };
            let Some(entrypoint) = &tx.entrypoint else { continue };
            if !marketplace.is_accept_offer_entrypoint(entrypoint) {
                continue;
            }
            if !self.store.is_buyer(&tx.sender)?
                || self.store.earliest_purchase_by_buyer_before(&tx.sender, &tx.timestamp)?.is_none()
            {
                continue;
            }
            let Some(transfer) = transfers_by_tx_id.get(&tx.id) else { continue };
            if transfer.from_address.as_deref() != Some(tx.sender.as_str()) {
                continue;
            }
            let resale = Resale {
                op_hash: tx.hash.clone(),
                ts: tx.timestamp.clone(),
                seller_collector: tx.sender.clone(),
                buyer: transfer.to_address.clone(),
                marketplace: marketplace_name.clone(),
                token_contract: transfer.token_contract.clone(),
                token_id: transfer.token_id.clone(),
                proceeds: Some(tx.amount),
            };
            if self.store.insert_resale(&resale)? {
                resales += 1;
            }
        }
        Ok(resales)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_market() -> Config {
        serde_yaml::from_str(
            r#"
indexer_base_url: "https://indexer.example.com"
marketplaces:
  - marketplace_name: market_x
    address: KT1Market
    buy_entrypoints: [collect]
    list_entrypoints: [list]
    accept_offer_entrypoints: [accept_offer]
    custody_addresses: [KT1Custody]
    fee_rate: 0.025
  - marketplace_name: market_y
    address: KT1MarketY
    buy_entrypoints: [fulfill_ask]
    list_entrypoints: []
    accept_offer_entrypoints: []
    fee_rate: 0.02
"#,
        )
        .unwrap()
    }

    #[test]
    fn custody_sale_scenario() {
        let config = config_with_market();
        let store = Store::open_in_memory().unwrap();
        store
            .insert_raw_transactions(&[RawTransaction {
                id: 1,
                hash: "op1".into(),
                level: 100,
                timestamp: "2026-01-10T00:00:05Z".into(),
                sender: "BUYER_A".into(),
                target: Some("KT1Market".into()),
                amount: 5_000_000,
                entrypoint: Some("collect".into()),
                parameters: None,
                status: "applied".into(),
                has_internals: false,
            }])
            .unwrap();
        store
            .insert_raw_token_transfers(&[RawTokenTransfer {
                id: 100,
                level: 100,
                timestamp: "2026-01-10T00:00:05Z".into(),
                token_contract: "KT1Coll".into(),
                token_id: "1".into(),
                token_standard: "fa2".into(),
                from_address: Some("KT1Custody".into()),
                to_address: Some("BUYER_A".into()),
                amount: "1".into(),
                transaction_id: Some(1),
            }])
            .unwrap();

        let counters = SaleReconciler::new(&config, &store).run().unwrap();
        assert_eq!(counters.purchases, 1);
        let purchases = store.all_purchases().unwrap();
        assert_eq!(purchases[0].buyer, "BUYER_A");
        assert_eq!(purchases[0].seller.as_deref(), Some("KT1Custody"));
        assert_eq!(purchases[0].marketplace, "market_x");
        assert_eq!(purchases[0].spend, Some(5_000_000));
        assert_eq!(purchases[0].kind, "listing_purchase");
    }

    #[test]
    fn timestamp_join_sale_scenario() {
        let config = config_with_market();
        let store = Store::open_in_memory().unwrap();
        store
            .insert_raw_transactions(&[RawTransaction {
                id: 2,
                hash: "op2".into(),
                level: 200,
                timestamp: "2026-01-10T10:11:00Z".into(),
                sender: "BUYER_B".into(),
                target: Some("KT1MarketY".into()),
                amount: 2_500_000,
                entrypoint: Some("fulfill_ask".into()),
                parameters: None,
                status: "applied".into(),
                has_internals: false,
            }])
            .unwrap();
        store
            .insert_raw_token_transfers(&[RawTokenTransfer {
                id: 101,
                level: 200,
                timestamp: "2026-01-10T10:11:00Z".into(),
                token_contract: "KT1Coll".into(),
                token_id: "2".into(),
                token_standard: "fa2".into(),
                from_address: Some("SELLER_S".into()),
                to_address: Some("BUYER_B".into()),
                amount: "1".into(),
                transaction_id: None,
            }])
            .unwrap();

        let counters = SaleReconciler::new(&config, &store).run().unwrap();
        assert_eq!(counters.purchases, 1);
        let purchases = store.all_purchases().unwrap();
        assert_eq!(purchases[0].buyer, "BUYER_B");
        assert_eq!(purchases[0].seller.as_deref(), Some("SELLER_S"));
        assert_eq!(purchases[0].marketplace, "market_y");
    }

    #[test]
    fn p2p_transfer_is_rejected() {
        let config = config_with_market();
        let store = Store::open_in_memory().unwrap();
        store
            .insert_raw_token_transfers(&[RawTokenTransfer {
                id: 102,
                level: 300,
                timestamp: "2026-01-10T11:00:00Z".into(),
                token_contract: "KT1Coll".into(),
                token_id: "3".into(),
                token_standard: "fa2".into(),
                from_address: Some("tz1Friend".into()),
                to_address: Some("tz1Other".into()),
                amount: "1".into(),
                transaction_id: None,
            }])
            .unwrap();

        let counters = SaleReconciler::new(&config, &store).run().unwrap();
        assert_eq!(counters.purchases, 0);
        assert_eq!(counters.p2p_skipped, 1);
    }

    #[test]
    fn fungible_token_id_zero_is_excluded() {
        let config: Config = serde_yaml::from_str(
            r#"
indexer_base_url: "https://indexer.example.com"
known_fungible_contracts: ["KT1Fungible"]
"#,
        )
        .unwrap();
        let store = Store::open_in_memory().unwrap();
        store
            .insert_raw_token_transfers(&[RawTokenTransfer {
                id: 103,
                level: 400,
                timestamp: "2026-01-10T12:00:00Z".into(),
                token_contract: "KT1Fungible".into(),
                token_id: "0".into(),
                token_standard: "fa2".into(),
                from_address: Some("tz1A".into()),
                to_address: Some("tz1B".into()),
                amount: "1".into(),
                transaction_id: None,
            }])
            .unwrap();

        let counters = SaleReconciler::new(&config, &store).run().unwrap();
        assert_eq!(counters.purchases, 0);
        assert_eq!(counters.fungible_skipped, 1);
    }

    #[test]
    fn resale_requires_an_earlier_purchase_by_the_seller() {
        let config = config_with_market();
        let store = Store::open_in_memory().unwrap();

        // Seller is in the buyer set (membership alone used to be enough to
        // promote this to a Resale) but has no recorded Purchase row at all,
        // so this must NOT be promoted.
        store.insert_buyer("SELLER_X").unwrap();
        store
            .insert_raw_transactions(&[RawTransaction {
                id: 4,
                hash: "op4".into(),
                level: 400,
                timestamp: "2026-01-12T00:00:05Z".into(),
                sender: "BUYER_Y".into(),
                target: Some("KT1Market".into()),
                amount: 3_000_000,
                entrypoint: Some("collect".into()),
                parameters: None,
                status: "applied".into(),
                has_internals: false,
            }])
            .unwrap();
        store
            .insert_raw_token_transfers(&[RawTokenTransfer {
                id: 106,
                level: 400,
                timestamp: "2026-01-12T00:00:05Z".into(),
                token_contract: "KT1Coll".into(),
                token_id: "5".into(),
                token_standard: "fa2".into(),
                from_address: Some("SELLER_X".into()),
                to_address: Some("BUYER_Y".into()),
                amount: "1".into(),
                transaction_id: None,
            }])
            .unwrap();

        let counters = SaleReconciler::new(&config, &store).run().unwrap();
        assert_eq!(counters.purchases, 1);
        assert_eq!(counters.resales, 0);
    }

    #[test]
    fn amount_above_edition_ceiling_is_excluded() {
        let config = config_with_market();
        let store = Store::open_in_memory().unwrap();
        store
            .insert_raw_token_transfers(&[RawTokenTransfer {
                id: 104,
                level: 500,
                timestamp: "2026-01-10T13:00:00Z".into(),
                token_contract: "KT1Coll".into(),
                token_id: "1".into(),
                token_standard: "fa2".into(),
                from_address: Some("tz1A".into()),
                to_address: Some("tz1B".into()),
                amount: "9999".into(),
                transaction_id: None,
            }])
            .unwrap();

        let counters = SaleReconciler::new(&config, &store).run().unwrap();
        assert_eq!(counters.edition_size_skipped, 1);
    }
}
