//! blockstats - block range statistics for Ethereum
//!
//! Fetches a contiguous range of blocks and receipts over JSON-RPC,
//! classifies the addresses involved, decodes ERC-20/ERC-721 transfers and
//! aggregates per-address and network-wide statistics with ranked views.
//! Finished runs can be persisted into RocksDB.

pub mod aggregator;
pub mod cache;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod error;
pub mod fee;
pub mod fetcher;
pub mod keys;
pub mod locator;
pub mod persist;
pub mod pipeline;
pub mod ranking;
pub mod records;
pub mod rpc;
pub mod store;
pub mod types;

#[cfg(test)]
mod testutil;

// Re-export the main types for convenience
pub use cache::AddressCache;
pub use config::AnalyzerConfig;
pub use error::AnalysisError;
pub use pipeline::Analyzer;
pub use records::{AddressDetail, AddressKind, AddressStats, AnalysisResult, NetworkTotals};
pub use rpc::{ChainClient, RpcClient};
pub use store::{RocksStatsStore, StatsStore};
