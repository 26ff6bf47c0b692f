// Rate-limited, retrying, paginated HTTP reader: a single client enforces
// minimum request spacing and exponential backoff, callers drive pagination
// by repeatedly asking for the next page.

use crate::error::IndexerError;
use crate::indexer::model::{
    ContractMetadataResponse, TokenMetadataResponse, WireBalanceSnapshot, WireTokenTransfer,
    WireTransaction, WireValueTransfer,
};
use serde::de::DeserializeOwned;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

#[derive(Clone, Debug)]
pub struct TransactionFilter {
    pub targets: Option<Vec<String>>,
    pub target_eq: Option<String>,
    pub entrypoints: Option<Vec<String>>,
    pub sender: Option<String>,
    pub window_start: String,
    pub window_end: String,
    pub after_id: Option<i64>,
    pub amount_gt: Option<i64>,
}

impl TransactionFilter {
    pub fn window(window_start: impl Into<String>, window_end: impl Into<String>) -> Self {
        Self {
            targets: None,
            target_eq: None,
            entrypoints: None,
            sender: None,
            window_start: window_start.into(),
            window_end: window_end.into(),
            after_id: None,
            amount_gt: None,
        }
    }

    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = Some(targets);
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_eq = Some(target.into());
        self
    }

    pub fn with_entrypoints(mut self, entrypoints: Vec<String>) -> Self {
        self.entrypoints = Some(entrypoints);
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_after_id(mut self, after_id: i64) -> Self {
        self.after_id = Some(after_id);
        self
    }

    pub fn value_bearing(mut self) -> Self {
        self.amount_gt = Some(0);
        self
    }
}

pub struct IndexerClient {
    http: reqwest::Client,
    base_url: Url,
    page_size: u32,
    retry_attempts: u32,
    retry_base_delay_ms: u64,
    rate_limit_ms: u64,
    last_request: Mutex<Option<Instant>>,
}

impl IndexerClient {
    pub fn new(
        base_url: &str,
        page_size: u32,
        retry_attempts: u32,
        retry_base_delay_ms: u64,
        rate_limit_ms: u64,
    ) -> Result<Self, IndexerError> {
        let base_url = Url::parse(base_url).map_err(|e| IndexerError::Terminal {
            status: 0,
            body: format!("invalid base url: {e}"),
        })?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            page_size,
            retry_attempts,
            retry_base_delay_ms,
            rate_limit_ms,
            last_request: Mutex::new(None),
        })
    }

    async fn throttle(&self) {
        let wait = {
            let mut last = self.last_request.lock().expect("rate limiter mutex poisoned");
            let now = Instant::now();
            let wait = match *last {
                Some(prev) => {
                    let elapsed = now.duration_since(prev);
                    let min_spacing = Duration::from_millis(self.rate_limit_ms);
                    min_spacing.checked_sub(elapsed)
                }
                None => None,
            };
            *last = Some(now);
            wait
        };
        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }
    }

    /// Exponential backoff on 429/5xx; any other non-2xx is terminal.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, IndexerError> {
        let mut url = self.base_url.join(path).expect("indexer path must be relative");
        url.query_pairs_mut().extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));

        let mut attempt = 0;
        loop {
            self.throttle().await;
            let response = self.http.get(url.clone()).send().await?;
            let status = response.status();
            if status.is_success() {
                let body = response.text().await?;
                return serde_json::from_str(&body).map_err(IndexerError::Decode);
            }
            if !IndexerError::is_retryable_status(status.as_u16()) {
                let body = response.text().await.unwrap_or_default();
                return Err(IndexerError::Terminal { status: status.as_u16(), body });
            }
            attempt += 1;
            if attempt >= self.retry_attempts {
                let body = response.text().await.unwrap_or_default();
                return Err(IndexerError::Terminal { status: status.as_u16(), body });
            }
            let delay = self.retry_base_delay_ms * 2u64.pow(attempt - 1);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    fn filter_query(&self, filter: &TransactionFilter) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("timestamp.ge", filter.window_start.clone()),
            ("timestamp.lt", filter.window_end.clone()),
            ("status", "applied".to_string()),
            ("sort.asc", "id".to_string()),
            ("limit", self.page_size.to_string()),
        ];
        if let Some(targets) = &filter.targets {
            query.push(("target.in", targets.join(",")));
        }
        if let Some(target) = &filter.target_eq {
            query.push(("target", target.clone()));
        }
        if let Some(entrypoints) = &filter.entrypoints {
            query.push(("entrypoint.in", entrypoints.join(",")));
        }
        if let Some(sender) = &filter.sender {
            query.push(("sender", sender.clone()));
        }
        if let Some(after_id) = filter.after_id {
            query.push(("id.gt", after_id.to_string()));
        }
        if let Some(amount_gt) = filter.amount_gt {
            query.push(("amount.gt", amount_gt.to_string()));
        }
        query
    }

    /// One page of transactions matching `filter`. The caller drives
    /// pagination by re-issuing with `after_id` set to the last row's id;
    /// a page shorter than `page_size` signals the end.
    pub async fn transactions_page(&self, filter: &TransactionFilter) -> Result<Vec<WireTransaction>, IndexerError> {
        let query = self.filter_query(filter);
        self.get_json("transactions", &query).await
    }

    pub async fn token_transfers_page(
        &self,
        window_start: &str,
        window_end: &str,
        after_id: Option<i64>,
    ) -> Result<Vec<WireTokenTransfer>, IndexerError> {
        let mut query = vec![
            ("timestamp.ge", window_start.to_string()),
            ("timestamp.lt", window_end.to_string()),
            ("token.standard", "fa2".to_string()),
            ("sort.asc", "id".to_string()),
            ("limit", self.page_size.to_string()),
        ];
        if let Some(after_id) = after_id {
            query.push(("id.gt", after_id.to_string()));
        }
        self.get_json("token-transfers", &query).await
    }

    pub async fn value_transfers_page(
        &self,
        window_start: &str,
        window_end: &str,
        after_id: Option<i64>,
    ) -> Result<Vec<WireValueTransfer>, IndexerError> {
        let filter = TransactionFilter::window(window_start, window_end).value_bearing();
        let mut query = self.filter_query(&filter);
        if let Some(after_id) = after_id {
            query.push(("id.gt", after_id.to_string()));
        }
        self.get_json("transfers", &query).await
    }

    /// Value-bearing transfers touching a single address, one direction at a
    /// time. `incoming = true` filters on target, `false` on sender.
    pub async fn address_value_transfers_page(
        &self,
        address: &str,
        incoming: bool,
        window_start: &str,
        window_end: &str,
        after_id: Option<i64>,
    ) -> Result<Vec<WireValueTransfer>, IndexerError> {
        let mut filter = TransactionFilter::window(window_start, window_end).value_bearing();
        filter = if incoming { filter.with_target(address) } else { filter.with_sender(address) };
        if let Some(after_id) = after_id {
            filter = filter.with_after_id(after_id);
        }
        let query = self.filter_query(&filter);
        self.get_json("transfers", &query).await
    }

    pub async fn balance_at(&self, address: &str, at: &str) -> Result<Option<WireBalanceSnapshot>, IndexerError> {
        let query = [
            ("timestamp.le", at.to_string()),
            ("sort.desc", "level".to_string()),
            ("limit", "1".to_string()),
        ];
        let page: Vec<WireBalanceSnapshot> = self
            .get_json(&format!("accounts/{address}/balance-history"), &query)
            .await?;
        Ok(page.into_iter().next())
    }

    pub async fn contract_metadata(&self, address: &str) -> Result<ContractMetadataResponse, IndexerError> {
        self.get_json(&format!("contracts/{address}"), &[]).await
    }

    pub async fn token_metadata(&self, address: &str, token_id: &str) -> Result<Option<TokenMetadataResponse>, IndexerError> {
        match self.get_json(&format!("tokens/{address}/{token_id}"), &[]).await {
            Ok(meta) => Ok(Some(meta)),
            Err(IndexerError::Terminal { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_status_matches_429_and_5xx() {
        assert!(IndexerError::is_retryable_status(429));
        assert!(IndexerError::is_retryable_status(500));
        assert!(IndexerError::is_retryable_status(503));
        assert!(!IndexerError::is_retryable_status(404));
        assert!(!IndexerError::is_retryable_status(200));
    }

    #[test]
    fn filter_query_includes_cursor_when_present() {
        let client = IndexerClient::new("https://indexer.example.com", 1000, 5, 1000, 100).unwrap();
        let filter = TransactionFilter::window("2026-01-01T00:00:00Z", "2026-01-08T00:00:00Z").with_after_id(42);
        let query = client.filter_query(&filter);
        assert!(query.iter().any(|(k, v)| *k == "id.gt" && v == "42"));
    }
}
