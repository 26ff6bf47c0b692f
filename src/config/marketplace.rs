// Marketplace configuration: a named (address, entrypoint sets, fee rate)
// tuple — one outer struct carrying the marketplace identity, entrypoint
// groups the reconciler and activity deriver each care about.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MarketplaceConfig {
    pub marketplace_name: String,
    pub address: String,
    #[serde(default)]
    pub buy_entrypoints: Vec<String>,
    #[serde(default)]
    pub list_entrypoints: Vec<String>,
    #[serde(default)]
    pub accept_offer_entrypoints: Vec<String>,
    /// Custody/escrow contracts owned by this marketplace.
    #[serde(default)]
    pub custody_addresses: Vec<String>,
    pub fee_rate: f64,
}

impl MarketplaceConfig {
    pub fn is_buy_entrypoint(&self, entrypoint: &str) -> bool {
        self.buy_entrypoints.iter().any(|e| e == entrypoint)
    }

    pub fn is_list_entrypoint(&self, entrypoint: &str) -> bool {
        self.list_entrypoints.iter().any(|e| e == entrypoint)
    }

    pub fn is_accept_offer_entrypoint(&self, entrypoint: &str) -> bool {
        self.accept_offer_entrypoints.iter().any(|e| e == entrypoint)
    }

    /// True for any entrypoint this marketplace recognizes at all — used by
    /// the flow classifier's "looks like NFT activity" cascade step.
    pub fn is_nft_activity_entrypoint(&self, entrypoint: &str) -> bool {
        self.is_buy_entrypoint(entrypoint)
            || self.is_list_entrypoint(entrypoint)
            || self.is_accept_offer_entrypoint(entrypoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MarketplaceConfig {
        MarketplaceConfig {
            marketplace_name: "market_x".into(),
            address: "KT1Market".into(),
            buy_entrypoints: vec!["collect".into(), "fulfill_ask".into()],
            list_entrypoints: vec!["list".into()],
            accept_offer_entrypoints: vec!["accept_offer".into()],
            custody_addresses: vec!["KT1Custody".into()],
            fee_rate: 0.025,
        }
    }

    #[test]
    fn entrypoint_classification() {
        let m = sample();
        assert!(m.is_buy_entrypoint("collect"));
        assert!(m.is_list_entrypoint("list"));
        assert!(m.is_accept_offer_entrypoint("accept_offer"));
        assert!(!m.is_buy_entrypoint("list"));
        assert!(m.is_nft_activity_entrypoint("accept_offer"));
    }
}
