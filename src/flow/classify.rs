// Transaction classification cascade: twelve ordered rules, evaluated top
// to bottom, first match wins.

use crate::config::Config;
use crate::error::StoreError;
use crate::store::raw::AllTransaction;
use crate::store::Store;
use ahash::AHashSet;
use once_cell::sync::Lazy;

static DEFI_ENTRYPOINTS: Lazy<AHashSet<&'static str>> = Lazy::new(|| {
    [
        "swap", "addliquidity", "removeliquidity", "stake", "unstake", "borrow", "repay", "deposit", "withdraw",
    ]
    .into_iter()
    .collect()
});

pub fn classify(tx: &AllTransaction, config: &Config, store: &Store) -> Result<&'static str, StoreError> {
    let address_to_marketplace = config.address_to_marketplace();
    let cex_set = config.cex_set();
    let bridge_set = config.bridge_set();

    if let Some(target) = &tx.target {
        if let Some(marketplace_name) = address_to_marketplace.get(target) {
            if let Some(marketplace) = config.marketplace_by_name(marketplace_name) {
                if let Some(entrypoint) = &tx.entrypoint {
                    if marketplace.is_buy_entrypoint(entrypoint) || marketplace.is_accept_offer_entrypoint(entrypoint) {
                        return Ok("nft_sale");
                    }
                    if marketplace.is_nft_activity_entrypoint(entrypoint) {
                        return Ok("nft_activity");
                    }
                }
                return Ok("nft_marketplace");
            }
        }

        if let Some(entry) = store.address_registry_entry(target)? {
            if matches!(entry.category.as_deref(), Some("nft_contract") | Some("nft_marketplace")) {
                return Ok("nft_activity");
            }
        }

        if bridge_set.contains(target) {
            return Ok("bridge");
        }
        if cex_set.contains(target) {
            return Ok("cex_deposit");
        }
        if cex_set.contains(&tx.sender) {
            return Ok("cex_withdrawal");
        }

        if let Some(entry) = store.address_registry_entry(target)? {
            if entry.category.as_deref() == Some("defi") {
                return Ok("defi");
            }
        }

        if let Some(entrypoint) = &tx.entrypoint {
            let lower = entrypoint.to_ascii_lowercase();
            if DEFI_ENTRYPOINTS.contains(&lower.as_str()) {
                return Ok("defi");
            }
            if lower == "setdelegate" || lower == "delegate" {
                return Ok("delegation");
            }
        }
    }

    if tx.entrypoint.is_none() && tx.amount > 0 {
        return Ok("xtz_transfer");
    }

    if tx.target.is_none() {
        return Ok("origination");
    }

    Ok("other")
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
    buy_entrypoints: [collect]
    list_entrypoints: [list]
    accept_offer_entrypoints: [accept_offer]
    fee_rate: 0.025
cex_addresses: ["tz1Cex"]
bridge_addresses: ["KT1Bridge"]
"#,
        )
        .unwrap()
    }

    fn tx(target: Option<&str>, entrypoint: Option<&str>, amount: i64, sender: &str) -> AllTransaction {
        AllTransaction {
            id: 1,
            hash: "op1".into(),
            level: 1,
            timestamp: "2026-01-01T00:00:00Z".into(),
            sender: sender.into(),
            target: target.map(String::from),
            amount,
            entrypoint: entrypoint.map(String::from),
            parameters: None,
            status: "applied".into(),
            has_internals: false,
            tx_category: None,
        }
    }

    #[test]
    fn nft_sale_for_buy_entrypoint() {
        let config = config();
        let store = Store::open_in_memory().unwrap();
        let category = classify(&tx(Some("KT1Market"), Some("collect"), 1_000_000, "tz1A"), &config, &store).unwrap();
        assert_eq!(category, "nft_sale");
    }

    #[test]
    fn nft_activity_for_list_entrypoint() {
        let config = config();
        let store = Store::open_in_memory().unwrap();
        let category = classify(&tx(Some("KT1Market"), Some("list"), 0, "tz1A"), &config, &store).unwrap();
        assert_eq!(category, "nft_activity");
    }

    #[test]
    fn bridge_classification() {
        let config = config();
        let store = Store::open_in_memory().unwrap();
        let category = classify(&tx(Some("KT1Bridge"), None, 1_000_000, "tz1A"), &config, &store).unwrap();
        assert_eq!(category, "bridge");
    }

    #[test]
    fn cex_deposit_and_withdrawal() {
        let config = config();
        let store = Store::open_in_memory().unwrap();
        assert_eq!(classify(&tx(Some("tz1Cex"), None, 1_000_000, "tz1A"), &config, &store).unwrap(), "cex_deposit");
        assert_eq!(classify(&tx(Some("KT1Other"), None, 1_000_000, "tz1Cex"), &config, &store).unwrap(), "cex_withdrawal");
    }

    #[test]
    fn origination_for_missing_target() {
        let config = config();
        let store = Store::open_in_memory().unwrap();
        assert_eq!(classify(&tx(None, None, 0, "tz1A"), &config, &store).unwrap(), "origination");
    }

    #[test]
    fn xtz_transfer_for_no_entrypoint_positive_amount() {
        let config = config();
        let store = Store::open_in_memory().unwrap();
        assert_eq!(classify(&tx(Some("KT1Other"), None, 1_000_000, "tz1A"), &config, &store).unwrap(), "xtz_transfer");
    }

    #[test]
    fn xtz_transfer_takes_precedence_over_missing_target_origination() {
        let config = config();
        let store = Store::open_in_memory().unwrap();
        assert_eq!(classify(&tx(None, None, 1_000_000, "tz1A"), &config, &store).unwrap(), "xtz_transfer");
    }
}
