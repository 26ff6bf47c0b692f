// Fungible-vs-NFT decision, cache-first with adapter fallback. Hard-coded
// sets always win; the cache is authoritative once written; only the
// residual after both goes to the network.

use crate::config::Config;
use crate::error::IndexerError;
use crate::indexer::client::IndexerClient;
use crate::store::registry::ContractMetadata;
use crate::store::Store;
use ahash::AHashMap;

const FUNGIBLE_SUPPLY_THRESHOLD: i64 = 1_000_000_000;
const CACHE_FLUSH_EVERY: usize = 10;

pub struct ContractClassifier<'a> {
    config: &'a Config,
    store: &'a Store,
    client: &'a IndexerClient,
}

impl<'a> ContractClassifier<'a> {
    pub fn new(config: &'a Config, store: &'a Store, client: &'a IndexerClient) -> Self {
        Self { config, store, client }
    }

    /// Classifies every contract in `contracts`, consulting known sets and
    /// the cache first and issuing adapter calls only for the residual.
    /// Returns contract -> is_fungible.
    pub async fn classify_batch(&self, contracts: &[String]) -> Result<AHashMap<String, bool>, IndexerError> {
        let fungible_set = self.config.fungible_set();
        let nft_set = self.config.nft_set();
        let mut results = AHashMap::new();
        let mut residual = Vec::new();

        for contract in contracts {
            if fungible_set.contains(contract) {
                results.insert(contract.clone(), true);
                continue;
            }
            if nft_set.contains(contract) {
                results.insert(contract.clone(), false);
                continue;
            }
            match self.store.contract_metadata(contract) {
                Ok(Some(cached)) => {
                    results.insert(contract.clone(), cached.is_fungible);
                }
                _ => residual.push(contract.clone()),
            }
        }

        let mut pending_writes = Vec::new();
        for contract in residual {
            let is_fungible = self.classify_via_adapter(&contract).await?;
            results.insert(contract.clone(), is_fungible);
            pending_writes.push(ContractMetadata {
                address: contract,
                is_fungible,
                token_type: Some(if is_fungible { "fungible" } else { "nft" }.to_string()),
                alias: None,
                checked_at: chrono::Utc::now().to_rfc3339(),
            });
            if pending_writes.len() >= CACHE_FLUSH_EVERY {
                self.flush(&mut pending_writes);
            }
        }
        self.flush(&mut pending_writes);

        Ok(results)
    }

    fn flush(&self, pending: &mut Vec<ContractMetadata>) {
        for row in pending.drain(..) {
            if let Err(e) = self.store.upsert_contract_metadata(&row) {
                tracing::warn!(error = %e, address = %row.address, "failed to persist contract classification");
            }
        }
    }

    async fn classify_via_adapter(&self, contract: &str) -> Result<bool, IndexerError> {
        let meta = self.client.contract_metadata(contract).await?;
        if meta.tags.iter().any(|t| t.eq_ignore_ascii_case("fa1.2")) {
            return Ok(true);
        }

        let token0 = self.client.token_metadata(contract, "0").await?;
        let token0 = match token0 {
            Some(t) => t,
            // token-id 0 not found: collection begins at id 1, conservative NFT default.
            None => return Ok(false),
        };

        if token0.decimals.map(|d| d > 0).unwrap_or(false) {
            return Ok(true);
        }
        if token0.artifact_uri.is_some() || token0.display_uri.is_some() || token0.thumbnail_uri.is_some() {
            return Ok(false);
        }
        if let Some(supply) = token0.supply.as_ref().and_then(|s| s.parse::<i64>().ok()) {
            if supply > FUNGIBLE_SUPPLY_THRESHOLD {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_config() -> Config {
        serde_yaml::from_str(
            r#"
indexer_base_url: "https://indexer.example.com"
known_fungible_contracts: ["KT1Fungible"]
known_nft_contracts: ["KT1Nft"]
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn known_sets_short_circuit_without_network() {
        let config = test_config();
        let store = Store::open_in_memory().unwrap();
        let client = IndexerClient::new("https://indexer.example.com", 100, 5, 1000, 0).unwrap();
        let classifier = ContractClassifier::new(&config, &store, &client);
        let result = classifier
            .classify_batch(&["KT1Fungible".to_string(), "KT1Nft".to_string()])
            .await
            .unwrap();
        assert_eq!(result.get("KT1Fungible"), Some(&true));
        assert_eq!(result.get("KT1Nft"), Some(&false));
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_without_network() {
        let config = test_config();
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_contract_metadata(&ContractMetadata {
                address: "KT1Cached".into(),
                is_fungible: true,
                token_type: Some("fungible".into()),
                alias: None,
                checked_at: "2026-01-01T00:00:00Z".into(),
            })
            .unwrap();
        let client = IndexerClient::new("https://indexer.example.com", 100, 5, 1000, 0).unwrap();
        let classifier = ContractClassifier::new(&config, &store, &client);
        let result = classifier.classify_batch(&["KT1Cached".to_string()]).await.unwrap();
        assert_eq!(result.get("KT1Cached"), Some(&true));
    }
}
