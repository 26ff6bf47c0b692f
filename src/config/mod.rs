// Configuration surface for the pipeline: marketplaces, address sets, and
// run-time knobs. YAML-first, deny_unknown_fields, with accessor methods
// that build the derived lookup tables the rest of the crate needs.

pub mod marketplace;

use crate::error::ConfigError;
use ahash::{AHashMap, AHashSet};
use marketplace::MarketplaceConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const QUERY_DEFAULT_RETRIES: u32 = 5;
pub const QUERY_DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_PAGE_SIZE: u32 = 1_000;
pub const DEFAULT_MAX_CONCURRENCY: usize = 6;
pub const DEFAULT_RATE_LIMIT_MS: u64 = 100;
pub const DEFAULT_WINDOW_DAYS: i64 = 7;
/// Transfers with amount above this ceiling are never NFT transfers.
pub const EDITION_SIZE_CEILING: u64 = 5_555;
pub const DEFAULT_IDENTITY_CALL_DELAY_MS: u64 = 250;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub indexer_base_url: String,
    #[serde(default)]
    pub marketplaces: Vec<MarketplaceConfig>,
    #[serde(default)]
    pub cex_addresses: Vec<String>,
    #[serde(default)]
    pub bridge_addresses: Vec<String>,
    #[serde(default)]
    pub known_fungible_contracts: Vec<String>,
    #[serde(default)]
    pub known_nft_contracts: Vec<String>,
    /// Marketplace-custody addresses that escrow tokens between list and fulfil.
    #[serde(default)]
    pub custody_addresses: Vec<String>,
    /// Marketplace names / token contracts treated as open-edition mints.
    #[serde(default)]
    pub open_edition_set: Vec<String>,
    #[serde(default = "Config::default_window_days")]
    pub window_days: i64,
    #[serde(default = "Config::default_page_size")]
    pub page_size: u32,
    #[serde(default = "Config::default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "Config::default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "Config::default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "Config::default_rate_limit_ms")]
    pub rate_limit_ms: u64,
    #[serde(default = "Config::default_db_path")]
    pub db_path: String,
    #[serde(default = "Config::default_out_dir")]
    pub out_dir: String,
    /// GraphQL endpoint for the identity adapter (`resolve`). Unset disables resolution.
    #[serde(default)]
    pub identity_endpoint: Option<String>,
    #[serde(default = "Config::default_identity_call_delay_ms")]
    pub identity_call_delay_ms: u64,
}

impl Config {
    pub const fn default_window_days() -> i64 {
        DEFAULT_WINDOW_DAYS
    }

    pub const fn default_page_size() -> u32 {
        DEFAULT_PAGE_SIZE
    }

    pub const fn default_max_concurrency() -> usize {
        DEFAULT_MAX_CONCURRENCY
    }

    pub const fn default_retry_attempts() -> u32 {
        QUERY_DEFAULT_RETRIES
    }

    pub const fn default_retry_base_delay_ms() -> u64 {
        QUERY_DEFAULT_RETRY_DELAY_MS
    }

    pub const fn default_rate_limit_ms() -> u64 {
        DEFAULT_RATE_LIMIT_MS
    }

    pub fn default_db_path() -> String {
        "data/pipeline.sqlite3".to_string()
    }

    pub fn default_out_dir() -> String {
        "out".to_string()
    }

    pub const fn default_identity_call_delay_ms() -> u64 {
        DEFAULT_IDENTITY_CALL_DELAY_MS
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.indexer_base_url.is_empty() {
            return Err(ConfigError::Invalid(
                "indexer_base_url must not be empty".to_string(),
            ));
        }
        url::Url::parse(&self.indexer_base_url)
            .map_err(|e| ConfigError::Invalid(format!("invalid indexer_base_url: {e}")))?;
        Ok(())
    }

    /// marketplace address -> marketplace name, used by the reconciler and
    /// flow classifier.
    pub fn address_to_marketplace(&self) -> AHashMap<String, String> {
        self.marketplaces
            .iter()
            .map(|m| (m.address.clone(), m.marketplace_name.clone()))
            .collect()
    }

    pub fn marketplace_by_name(&self, name: &str) -> Option<&MarketplaceConfig> {
        self.marketplaces.iter().find(|m| m.marketplace_name == name)
    }

    pub fn cex_set(&self) -> AHashSet<String> {
        self.cex_addresses.iter().cloned().collect()
    }

    pub fn bridge_set(&self) -> AHashSet<String> {
        self.bridge_addresses.iter().cloned().collect()
    }

    pub fn fungible_set(&self) -> AHashSet<String> {
        self.known_fungible_contracts.iter().cloned().collect()
    }

    pub fn nft_set(&self) -> AHashSet<String> {
        self.known_nft_contracts.iter().cloned().collect()
    }

    /// custody address -> marketplace name.
    pub fn custody_to_marketplace(&self) -> AHashMap<String, String> {
        self.marketplaces
            .iter()
            .flat_map(|m| m.custody_addresses.iter().map(move |c| (c.clone(), m.marketplace_name.clone())))
            .collect()
    }

    pub fn open_edition_set(&self) -> AHashSet<String> {
        self.open_edition_set.iter().cloned().collect()
    }

    pub fn fee_rate(&self, marketplace_name: &str) -> f64 {
        self.marketplace_by_name(marketplace_name)
            .map(|m| m.fee_rate)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_omitted() {
        let yaml = r#"
indexer_base_url: "https://indexer.example.com"
marketplaces: []
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.window_days, DEFAULT_WINDOW_DAYS);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.db_path, Config::default_db_path());
    }

    #[test]
    fn rejects_unknown_fields() {
        let yaml = r#"
indexer_base_url: "https://indexer.example.com"
bogus_field: 1
"#;
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn validate_rejects_bad_url() {
        let config = Config {
            indexer_base_url: "not a url".to_string(),
            marketplaces: vec![],
            cex_addresses: vec![],
            bridge_addresses: vec![],
            known_fungible_contracts: vec![],
            known_nft_contracts: vec![],
            custody_addresses: vec![],
            open_edition_set: vec![],
            window_days: 7,
            page_size: 1000,
            max_concurrency: 6,
            retry_attempts: 5,
            retry_base_delay_ms: 1000,
            rate_limit_ms: 100,
            db_path: "data/x.sqlite3".into(),
            out_dir: "out".into(),
            identity_endpoint: None,
            identity_call_delay_ms: 250,
        };
        assert!(config.validate().is_err());
    }
}
