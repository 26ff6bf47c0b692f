pub mod classify;
pub mod fund_flow;
pub mod graph;
pub mod summary;

use crate::config::Config;
use crate::error::StoreError;
use crate::store::Store;
pub use graph::FlowGraph;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlowSummary {
    pub classified: u64,
    pub updated: u64,
    pub wallets: u64,
    pub buyer_cex_flows: u64,
    pub creator_fund_flows: u64,
}

pub struct FlowEngine<'a> {
    config: &'a Config,
    store: &'a Store,
}

impl<'a> FlowEngine<'a> {
    pub fn new(config: &'a Config, store: &'a Store) -> Self {
        Self { config, store }
    }

    /// Phase 1: classify every AllTransaction row. Writes only land when
    /// the category actually changes, to minimize write churn.
    pub fn classify_all(&self) -> Result<(u64, u64), StoreError> {
        let transactions = self.store.all_all_transactions()?;

        let mut classified = 0u64;
        let mut updated = 0u64;
        for tx in &transactions {
            let category = classify::classify(tx, self.config, self.store)?;
            classified += 1;
            if self.store.update_transaction_category(tx.id, category)? {
                updated += 1;
            }
        }
        Ok((classified, updated))
    }

    pub fn compute_wallet_summaries_and_persist(&self) -> Result<u64, StoreError> {
        let summaries = summary::compute_wallet_summaries(self.store)?;
        let count = summaries.len() as u64;
        for row in &summaries {
            self.store.upsert_wallet_xtz_summary(row)?;
        }
        Ok(count)
    }

    pub fn build_flow_graph(&self, node_cap: Option<usize>) -> Result<FlowGraph, StoreError> {
        let flows = self.store.all_xtz_flows()?;
        Ok(graph::build(&flows, node_cap))
    }

    /// Rebuilds `buyer_cex_flow` and `creator_fund_flow` from scratch each
    /// run, same full-replace contract as the other aggregate tables.
    pub fn compute_fund_flows_and_persist(&self) -> Result<(u64, u64), StoreError> {
        let cex_flows = fund_flow::compute_buyer_cex_flows(self.store)?;
        for row in &cex_flows {
            self.store.upsert_buyer_cex_flow(row)?;
        }

        let creator_flows = fund_flow::compute_creator_fund_flows(self.store)?;
        for row in &creator_flows {
            self.store.upsert_creator_fund_flow(row)?;
        }

        Ok((cex_flows.len() as u64, creator_flows.len() as u64))
    }

    pub fn run(&self, node_cap: Option<usize>) -> Result<(FlowSummary, FlowGraph), StoreError> {
        let (classified, updated) = self.classify_all()?;
        let wallets = self.compute_wallet_summaries_and_persist()?;
        let (buyer_cex_flows, creator_fund_flows) = self.compute_fund_flows_and_persist()?;
        let graph = self.build_flow_graph(node_cap)?;
        Ok((
            FlowSummary { classified, updated, wallets, buyer_cex_flows, creator_fund_flows },
            graph,
        ))
    }
}
