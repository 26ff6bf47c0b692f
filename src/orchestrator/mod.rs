// Command surface: one subcommand per pipeline phase, sharing a single
// Config/Store/IndexerClient wired up in `run`. Every branch returns
// `anyhow::Result` so `main` can exit non-zero on any unhandled error.

use crate::activity::ActivityDeriver;
use crate::aggregate::Aggregator;
use crate::classify::ContractClassifier;
use crate::config::Config;
use crate::flow::FlowEngine;
use crate::identity::IdentityAdapter;
use crate::indexer::IndexerClient;
use crate::ingest::Ingester;
use crate::reconcile::SaleReconciler;
use crate::store::registry::AddressRegistryEntry;
use crate::store::Store;
use ahash::AHashSet;
use anyhow::{anyhow, Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "nft-ledger-pipeline")]
pub struct Cli {
    #[arg(long, default_value = "config.yaml")]
    pub config: String,

    /// Truncate all tables before running the requested command.
    #[arg(long)]
    pub clear: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Pull marketplace-targeted transactions, FA2 transfers, and balance snapshots.
    Sync,
    /// Pull narrow-scope XTZ transfers for known buyers and creators.
    SyncXtz,
    /// Pull every transaction and value transfer in the window.
    SyncAll,
    /// Drive the per-week resumable ingest: a week id ("2026-W03"), "status", or "all".
    SyncWeek { target: String },
    /// Rebuild every derived table from raw data.
    Analyze,
    /// sync-all followed by analyze.
    Full,
    /// Seed the address registry from addresses seen in raw data.
    Discover,
    /// Fill in reverse names and owned domains for registry entries missing them.
    Resolve,
    /// Classify contracts seen in raw token transfers as fungible or NFT.
    Classify,
    /// Build the flow graph and report its size.
    Network {
        #[arg(long)]
        node_cap: Option<usize>,
    },
    /// Report row counts and week progress.
    Status,
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config).context("loading configuration")?;
    let store = Store::open(&config.db_path).context("opening store")?;

    if cli.clear {
        store.clear_all()?;
        tracing::info!("cleared all tables");
    }

    match cli.command {
        Command::Sync => {
            let client = indexer_client(&config)?;
            let (start, end) = trailing_window(&config);
            let ingester = Ingester::new(&config, &store, &client);
            let counters = ingester.sync_marketplace(&start, &end).await?;
            tracing::info!(?counters, "sync complete");
        }
        Command::SyncXtz => {
            let client = indexer_client(&config)?;
            let (start, end) = trailing_window(&config);
            let ingester = Ingester::new(&config, &store, &client);
            let counters = ingester.sync_xtz(&start, &end).await?;
            tracing::info!(?counters, "sync-xtz complete");
        }
        Command::SyncAll => {
            let client = indexer_client(&config)?;
            let (start, end) = trailing_window(&config);
            let ingester = Ingester::new(&config, &store, &client);
            let counters = ingester.sync_all(&start, &end).await?;
            tracing::info!(?counters, "sync-all complete");
        }
        Command::SyncWeek { target } => {
            run_sync_week(&config, &store, &target).await?;
        }
        Command::Analyze => {
            run_analyze(&config, &store)?;
        }
        Command::Full => {
            let client = indexer_client(&config)?;
            let (start, end) = trailing_window(&config);
            let ingester = Ingester::new(&config, &store, &client);
            ingester.sync_marketplace(&start, &end).await?;
            ingester.sync_xtz(&start, &end).await?;
            ingester.sync_all(&start, &end).await?;
            run_analyze(&config, &store)?;
        }
        Command::Discover => {
            run_discover(&config, &store)?;
        }
        Command::Resolve => {
            run_resolve(&config, &store).await?;
        }
        Command::Classify => {
            run_classify(&config, &store).await?;
        }
        Command::Network { node_cap } => {
            let engine = FlowEngine::new(&config, &store);
            let graph = engine.build_flow_graph(node_cap)?;
            tracing::info!(nodes = graph.nodes.len(), edges = graph.edges.len(), "flow graph built");
        }
        Command::Status => {
            run_status(&store)?;
        }
    }

    store.save()?;
    Ok(())
}

fn indexer_client(config: &Config) -> Result<IndexerClient> {
    Ok(IndexerClient::new(
        &config.indexer_base_url,
        config.page_size,
        config.retry_attempts,
        config.retry_base_delay_ms,
        config.rate_limit_ms,
    )?)
}

fn trailing_window(config: &Config) -> (String, String) {
    let end = Utc::now();
    let start = end - ChronoDuration::days(config.window_days);
    (start.to_rfc3339(), end.to_rfc3339())
}

fn run_analyze(config: &Config, store: &Store) -> Result<()> {
    store.clear_derived()?;
    let reconcile = SaleReconciler::new(config, store).run()?;
    let activity = ActivityDeriver::new(config, store).run()?;
    let aggregate = Aggregator::new(config, store).run()?;
    let (flow, _graph) = FlowEngine::new(config, store).run(None)?;
    tracing::info!(?reconcile, ?activity, ?aggregate, ?flow, "analyze complete");
    Ok(())
}

/// ISO week's Monday: Jan 4th always falls in week 1 of its year.
fn iso_week_monday(year: i32, week: u32) -> Option<NaiveDate> {
    use chrono::Datelike;
    let jan4 = NaiveDate::from_ymd_opt(year, 1, 4)?;
    let week1_monday = jan4 - ChronoDuration::days(jan4.weekday().num_days_from_monday() as i64);
    Some(week1_monday + ChronoDuration::weeks((week as i64) - 1))
}

fn parse_week_id(week_id: &str) -> Option<(NaiveDate, NaiveDate)> {
    let (year_str, week_str) = week_id.split_once("-W")?;
    let year: i32 = year_str.parse().ok()?;
    let week: u32 = week_str.parse().ok()?;
    let monday = iso_week_monday(year, week)?;
    Some((monday, monday + ChronoDuration::days(7)))
}

async fn run_sync_week(config: &Config, store: &Store, target: &str) -> Result<()> {
    let client = indexer_client(config)?;
    let ingester = Ingester::new(config, store, &client);

    match target {
        "status" => {
            for week in store.all_week_progress()? {
                println!(
                    "{} [{}..{}) status={} all_tx={} xtz_flows={} error={}",
                    week.week_id,
                    week.start_date,
                    week.end_date,
                    week.status,
                    week.all_tx_count,
                    week.xtz_flow_count,
                    week.error_message.as_deref().unwrap_or("-"),
                );
            }
        }
        "all" => {
            let pending: Vec<_> = store
                .all_week_progress()?
                .into_iter()
                .filter(|w| w.status != crate::store::sync_progress::SyncState::Complete)
                .collect();
            for week in pending {
                let counters = ingester.sync_week(&week.week_id, &week.start_date, &week.end_date).await?;
                tracing::info!(week = %week.week_id, ?counters, "sync-week complete");
            }
        }
        week_id => {
            let (start, end) = parse_week_id(week_id)
                .ok_or_else(|| anyhow!("week id must look like YYYY-Www, got {week_id}"))?;
            let counters = ingester
                .sync_week(week_id, &start.format("%Y-%m-%d").to_string(), &end.format("%Y-%m-%d").to_string())
                .await?;
            tracing::info!(week = %week_id, ?counters, "sync-week complete");
        }
    }
    Ok(())
}

fn classify_address(address: &str, config: &Config) -> &'static str {
    if config.cex_set().contains(address) {
        "cex"
    } else if config.bridge_set().contains(address) {
        "bridge"
    } else if config.address_to_marketplace().contains_key(address) {
        "marketplace"
    } else if address.starts_with("KT") {
        "contract"
    } else {
        "wallet"
    }
}

/// Seeds/refreshes address_registry from every sender/target/from/to address
/// seen in raw data, preserving prior identity-resolution fields.
fn run_discover(config: &Config, store: &Store) -> Result<()> {
    let mut counts: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
    for tx in store.all_raw_transactions()? {
        *counts.entry(tx.sender).or_insert(0) += 1;
        if let Some(target) = tx.target {
            *counts.entry(target).or_insert(0) += 1;
        }
    }
    for transfer in store.all_raw_token_transfers()? {
        if let Some(from) = transfer.from_address {
            *counts.entry(from).or_insert(0) += 1;
        }
        if let Some(to) = transfer.to_address {
            *counts.entry(to).or_insert(0) += 1;
        }
    }

    let mut discovered = 0u64;
    for (address, tx_count) in counts {
        let existing = store.address_registry_entry(&address)?;
        let address_type = classify_address(&address, config);
        let entry = AddressRegistryEntry {
            address: address.clone(),
            address_type: address_type.to_string(),
            alias: existing.as_ref().and_then(|e| e.alias.clone()),
            tezos_domain: existing.as_ref().and_then(|e| e.tezos_domain.clone()),
            owned_domains: existing.as_ref().and_then(|e| e.owned_domains.clone()),
            category: existing.as_ref().and_then(|e| e.category.clone()),
            tx_count,
            metadata: existing.as_ref().and_then(|e| e.metadata.clone()),
            resolved_at: existing.as_ref().and_then(|e| e.resolved_at.clone()),
        };
        store.upsert_address_registry_entry(&entry)?;
        discovered += 1;
    }
    tracing::info!(discovered, "discover complete");
    Ok(())
}

async fn run_resolve(config: &Config, store: &Store) -> Result<()> {
    let Some(endpoint) = &config.identity_endpoint else {
        tracing::warn!("identity_endpoint not configured, nothing to resolve");
        return Ok(());
    };
    let adapter = IdentityAdapter::new(endpoint.clone(), config.identity_call_delay_ms);

    let unresolved: Vec<String> = store
        .all_address_registry_entries()?
        .into_iter()
        .filter(|e| e.tezos_domain.is_none() && e.address_type == "wallet")
        .map(|e| e.address)
        .collect();

    let results: Vec<_> = stream::iter(unresolved)
        .map(|address| async {
            let reverse = adapter.reverse_name(&address).await;
            let owned = adapter.owned_names(&address).await;
            (address, reverse, owned)
        })
        .buffer_unordered(config.max_concurrency.max(1))
        .collect()
        .await;

    let mut resolved = 0u64;
    for (address, reverse, owned) in results {
        if reverse.is_none() && owned.is_empty() {
            continue;
        }
        if let Some(mut entry) = store.address_registry_entry(&address)? {
            entry.tezos_domain = reverse;
            entry.owned_domains = Some(serde_json::to_string(&owned).unwrap_or_default());
            entry.resolved_at = Some(Utc::now().to_rfc3339());
            store.upsert_address_registry_entry(&entry)?;
            resolved += 1;
        }
    }
    tracing::info!(resolved, "resolve complete");
    Ok(())
}

async fn run_classify(config: &Config, store: &Store) -> Result<()> {
    let client = indexer_client(config)?;
    let classifier = ContractClassifier::new(config, store, &client);

    let mut contracts: AHashSet<String> = AHashSet::new();
    for transfer in store.all_raw_token_transfers()? {
        contracts.insert(transfer.token_contract);
    }
    let unresolved: Vec<String> = contracts
        .into_iter()
        .filter(|c| store.contract_metadata(c).ok().flatten().is_none())
        .collect();

    let results = classifier.classify_batch(&unresolved).await?;
    for (contract, is_fungible) in &results {
        if let Some(mut entry) = store.address_registry_entry(contract)? {
            entry.category = Some(if *is_fungible { "fungible_contract" } else { "nft_contract" }.to_string());
            store.upsert_address_registry_entry(&entry)?;
        }
    }
    tracing::info!(classified = results.len(), "classify complete");
    Ok(())
}

fn run_status(store: &Store) -> Result<()> {
    for table in [
        "raw_transactions",
        "raw_token_transfers",
        "raw_balances",
        "raw_xtz_transfers",
        "purchases",
        "resales",
        "mints",
        "listings",
        "offer_accepts",
        "all_transactions",
        "xtz_flows",
        "address_registry",
        "contract_metadata",
        "buyer_cex_flow",
        "creator_fund_flow",
    ] {
        println!("{table}: {}", store.row_count(table)?);
    }
    for week in store.all_week_progress()? {
        println!(
            "week {} status={} error={}",
            week.week_id,
            week.status,
            week.error_message.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
