use thiserror::Error;

/// Errors surfaced by the embedded store. Malformed-row and
/// idempotency-violation failures never reach this type — they are
/// absorbed as skip counters or upsert-ignore semantics.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create store directory for {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("failed to snapshot store to disk: {0}")]
    Snapshot(String),
}

/// Transient vs terminal distinction for the indexer HTTP client.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("transient error after {attempts} attempts: {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("indexer returned non-2xx status {status}: {body}")]
    Terminal { status: u16, body: String },
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("failed to decode indexer response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl IndexerError {
    /// Retry on 429 or 5xx; anything else is terminal.
    pub fn is_retryable_status(status: u16) -> bool {
        status == 429 || (500..600).contains(&status)
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Indexer(#[from] IndexerError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
