pub mod client;
pub mod model;

pub use client::{IndexerClient, TransactionFilter};
