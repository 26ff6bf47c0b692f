// DDL for the embedded store. Table and column names are a stable
// compatibility surface for sinks built against this crate, the way the
// teacher keeps `schema.rs` hand-aligned with the tables its processor
// writes.

pub const RAW_TABLES: &[&str] = &[
    "raw_transactions",
    "raw_token_transfers",
    "raw_balances",
    "raw_xtz_transfers",
    "all_transactions",
    "xtz_flows",
];

pub const DERIVED_TABLES: &[&str] = &[
    "buyers",
    "buyer_balance_start",
    "purchases",
    "creators",
    "mints",
    "listings",
    "offer_accepts",
    "resales",
    "daily_metrics",
    "marketplace_stats",
    "daily_marketplace_fees",
    "buyer_cex_flow",
    "creator_fund_flow",
    "wallet_xtz_summary",
];

/// contract_metadata, address_registry, and sync_progress persist across
/// analyze runs — they are neither raw nor derived for clearing purposes.
pub const PERSISTENT_TABLES: &[&str] = &[
    "sync_metadata",
    "sync_progress",
    "contract_metadata",
    "address_registry",
];

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS raw_transactions (
    id              INTEGER PRIMARY KEY,
    hash            TEXT NOT NULL,
    level           INTEGER NOT NULL,
    timestamp       TEXT NOT NULL,
    sender          TEXT NOT NULL,
    target          TEXT,
    amount          INTEGER NOT NULL,
    entrypoint      TEXT,
    parameters      TEXT,
    status          TEXT NOT NULL,
    has_internals   INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_raw_tx_target_entrypoint ON raw_transactions (target, entrypoint);
CREATE INDEX IF NOT EXISTS idx_raw_tx_sender_target ON raw_transactions (sender, target, entrypoint);
CREATE INDEX IF NOT EXISTS idx_raw_tx_ts_sender ON raw_transactions (timestamp, sender);

CREATE TABLE IF NOT EXISTS raw_token_transfers (
    id              INTEGER PRIMARY KEY,
    level           INTEGER NOT NULL,
    timestamp       TEXT NOT NULL,
    token_contract  TEXT NOT NULL,
    token_id        TEXT NOT NULL,
    token_standard  TEXT NOT NULL,
    from_address    TEXT,
    to_address      TEXT,
    amount          TEXT NOT NULL,
    transaction_id  INTEGER
);
CREATE INDEX IF NOT EXISTS idx_transfers_tx_id ON raw_token_transfers (transaction_id);
CREATE INDEX IF NOT EXISTS idx_transfers_mint ON raw_token_transfers (from_address, token_standard);
CREATE INDEX IF NOT EXISTS idx_transfers_token ON raw_token_transfers (token_contract, token_id);

CREATE TABLE IF NOT EXISTS raw_balances (
    address         TEXT PRIMARY KEY,
    balance         INTEGER,
    snapshot_ts     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS raw_xtz_transfers (
    id              INTEGER PRIMARY KEY,
    hash            TEXT NOT NULL,
    timestamp       TEXT NOT NULL,
    sender          TEXT NOT NULL,
    target          TEXT NOT NULL,
    amount          INTEGER NOT NULL,
    is_from_cex     INTEGER NOT NULL,
    is_to_cex       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_metadata (
    key             TEXT PRIMARY KEY,
    value           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_progress (
    week_id         TEXT PRIMARY KEY,
    start_date      TEXT NOT NULL,
    end_date        TEXT NOT NULL,
    status          TEXT NOT NULL,
    all_tx_count    INTEGER NOT NULL DEFAULT 0,
    xtz_flow_count  INTEGER NOT NULL DEFAULT 0,
    started_at      TEXT,
    completed_at    TEXT,
    error_message   TEXT
);

CREATE TABLE IF NOT EXISTS buyers (
    address         TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS buyer_balance_start (
    address         TEXT PRIMARY KEY,
    balance         INTEGER,
    ts              TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS purchases (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    op_hash         TEXT NOT NULL,
    ts              TEXT NOT NULL,
    buyer           TEXT NOT NULL,
    seller          TEXT,
    marketplace     TEXT NOT NULL,
    token_contract  TEXT NOT NULL,
    token_id        TEXT NOT NULL,
    qty             INTEGER NOT NULL,
    spend           INTEGER,
    kind            TEXT NOT NULL,
    UNIQUE (op_hash, buyer, token_contract, token_id)
);
CREATE INDEX IF NOT EXISTS idx_purchases_buyer ON purchases (buyer);
CREATE INDEX IF NOT EXISTS idx_purchases_ts ON purchases (ts);

CREATE TABLE IF NOT EXISTS creators (
    address         TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS mints (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    op_hash         TEXT NOT NULL,
    ts              TEXT NOT NULL,
    creator         TEXT NOT NULL,
    token_contract  TEXT NOT NULL,
    token_id        TEXT NOT NULL,
    transfer_id     INTEGER,
    UNIQUE (op_hash, token_contract, token_id)
);

CREATE TABLE IF NOT EXISTS listings (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    op_hash         TEXT NOT NULL,
    ts              TEXT NOT NULL,
    seller          TEXT,
    marketplace     TEXT NOT NULL,
    token_contract  TEXT NOT NULL,
    token_id        TEXT NOT NULL,
    list_price      INTEGER,
    UNIQUE (op_hash, token_contract, token_id)
);
CREATE INDEX IF NOT EXISTS idx_listings_seller_token_ts ON listings (seller, token_contract, token_id, ts);

CREATE TABLE IF NOT EXISTS offer_accepts (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    op_hash                 TEXT NOT NULL,
    ts                      TEXT NOT NULL,
    seller                  TEXT NOT NULL,
    buyer                   TEXT,
    marketplace             TEXT NOT NULL,
    token_contract          TEXT NOT NULL,
    token_id                TEXT NOT NULL,
    accepted_price          INTEGER,
    reference_list_price    INTEGER,
    under_list              INTEGER,
    UNIQUE (op_hash, token_contract, token_id)
);

CREATE TABLE IF NOT EXISTS resales (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    op_hash             TEXT NOT NULL,
    ts                  TEXT NOT NULL,
    seller_collector    TEXT NOT NULL,
    buyer               TEXT,
    marketplace         TEXT NOT NULL,
    token_contract      TEXT NOT NULL,
    token_id            TEXT NOT NULL,
    proceeds            INTEGER,
    UNIQUE (op_hash, seller_collector, token_contract, token_id)
);

CREATE TABLE IF NOT EXISTS daily_metrics (
    date            TEXT PRIMARY KEY,
    total_volume    INTEGER NOT NULL,
    avg_price       REAL,
    sale_count      INTEGER NOT NULL,
    unique_buyers   INTEGER NOT NULL,
    unique_sellers  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS marketplace_stats (
    marketplace     TEXT PRIMARY KEY,
    sale_count      INTEGER NOT NULL,
    volume          INTEGER NOT NULL,
    share_pct       REAL NOT NULL,
    estimated_fees  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS daily_marketplace_fees (
    date            TEXT NOT NULL,
    marketplace     TEXT NOT NULL,
    volume          INTEGER NOT NULL,
    fees            INTEGER NOT NULL,
    PRIMARY KEY (date, marketplace)
);

CREATE TABLE IF NOT EXISTS buyer_cex_flow (
    address             TEXT PRIMARY KEY,
    received_from_cex   INTEGER NOT NULL DEFAULT 0,
    sent_to_cex         INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS creator_fund_flow (
    address         TEXT PRIMARY KEY,
    mint_revenue    INTEGER NOT NULL DEFAULT 0,
    resale_proceeds INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS contract_metadata (
    address         TEXT PRIMARY KEY,
    is_fungible     INTEGER NOT NULL,
    token_type      TEXT,
    alias           TEXT,
    checked_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS address_registry (
    address         TEXT PRIMARY KEY,
    address_type    TEXT NOT NULL,
    alias           TEXT,
    tezos_domain    TEXT,
    owned_domains   TEXT,
    category        TEXT,
    tx_count        INTEGER NOT NULL DEFAULT 0,
    metadata        TEXT,
    resolved_at     TEXT
);

CREATE TABLE IF NOT EXISTS all_transactions (
    id              INTEGER PRIMARY KEY,
    hash            TEXT NOT NULL,
    level           INTEGER NOT NULL,
    timestamp       TEXT NOT NULL,
    sender          TEXT NOT NULL,
    target          TEXT,
    amount          INTEGER NOT NULL,
    entrypoint      TEXT,
    parameters      TEXT,
    status          TEXT NOT NULL,
    has_internals   INTEGER NOT NULL DEFAULT 0,
    tx_category     TEXT
);
CREATE INDEX IF NOT EXISTS idx_all_tx_category ON all_transactions (tx_category);

CREATE TABLE IF NOT EXISTS xtz_flows (
    id              INTEGER PRIMARY KEY,
    hash            TEXT NOT NULL,
    timestamp       TEXT NOT NULL,
    sender          TEXT NOT NULL,
    target          TEXT NOT NULL,
    amount          INTEGER NOT NULL,
    flow_type       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_xtz_flows_sender_ts ON xtz_flows (sender, timestamp);
CREATE INDEX IF NOT EXISTS idx_xtz_flows_target_ts ON xtz_flows (target, timestamp);

CREATE TABLE IF NOT EXISTS wallet_xtz_summary (
    address                 TEXT PRIMARY KEY,
    balance_start           INTEGER,
    balance_end             INTEGER,
    total_received          INTEGER NOT NULL DEFAULT 0,
    total_sent              INTEGER NOT NULL DEFAULT 0,
    received_from_sales     INTEGER NOT NULL DEFAULT 0,
    spent_on_nfts           INTEGER NOT NULL DEFAULT 0,
    cex_in                  INTEGER NOT NULL DEFAULT 0,
    cex_out                 INTEGER NOT NULL DEFAULT 0,
    bridge_in               INTEGER NOT NULL DEFAULT 0,
    bridge_out              INTEGER NOT NULL DEFAULT 0
);
"#;
