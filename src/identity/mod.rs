// Identity adapter: address -> {alias, reverse-name, owned-names}. Two
// GraphQL queries against a domains service; both are best-effort and
// failure-tolerant — a network error, a malformed response, or a missing
// record all resolve to `None`/empty rather than propagating, matching the
// adapter-miss error kind (never retried within the same run).

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const REVERSE_RECORD_QUERY: &str = "query($address: String!) { reverseRecord(address: $address) { name } }";
const OWNED_DOMAINS_QUERY: &str = "query($address: String!) { domains(owner: $address) { name } }";

pub struct IdentityAdapter {
    http: reqwest::Client,
    endpoint: String,
    call_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct GraphQlEnvelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ReverseRecordData {
    #[serde(rename = "reverseRecord")]
    reverse_record: Option<NameField>,
}

#[derive(Debug, Deserialize)]
struct NameField {
    name: String,
}

#[derive(Debug, Deserialize)]
struct OwnedDomainsData {
    domains: Vec<NameField>,
}

impl IdentityAdapter {
    pub fn new(endpoint: impl Into<String>, call_delay_ms: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            call_delay: Duration::from_millis(call_delay_ms),
        }
    }

    async fn query<T: for<'de> Deserialize<'de>>(&self, query: &str, address: &str) -> Option<T> {
        tokio::time::sleep(self.call_delay).await;
        let body = json!({ "query": query, "variables": { "address": address } });
        let response = match self.http.post(&self.endpoint).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, address, "identity adapter request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), address, "identity adapter returned non-2xx");
            return None;
        }
        match response.json::<GraphQlEnvelope<T>>().await {
            Ok(envelope) => envelope.data,
            Err(e) => {
                tracing::warn!(error = %e, address, "identity adapter response malformed");
                None
            }
        }
    }

    pub async fn reverse_name(&self, address: &str) -> Option<String> {
        self.query::<ReverseRecordData>(REVERSE_RECORD_QUERY, address)
            .await
            .and_then(|d| d.reverse_record)
            .map(|n| n.name)
    }

    pub async fn owned_names(&self, address: &str) -> Vec<String> {
        self.query::<OwnedDomainsData>(OWNED_DOMAINS_QUERY, address)
            .await
            .map(|d| d.domains.into_iter().map(|n| n.name).collect())
            .unwrap_or_default()
    }
}
