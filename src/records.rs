//! Record types produced by an analysis run
//!
//! Address classifications, per-address counters, network totals and the
//! `AnalysisResult` consumed by rendering and persistence. All records are
//! serde-serializable: JSON for rendering, postcard for the store.

use crate::ranking::{RankedAddress, TopTransactions};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Key of the synthetic bucket for absent senders/recipients (contract creation).
pub const EMPTY_ADDRESS_KEY: &str = "";

/// Canonical map key for an address: lower-cased 0x-prefixed hex.
pub fn address_key(addr: &Address) -> String {
    format!("0x{:x}", addr)
}

/// Canonical key for an optional address, falling back to the empty bucket.
pub fn optional_address_key(addr: Option<&Address>) -> String {
    addr.map(address_key)
        .unwrap_or_else(|| EMPTY_ADDRESS_KEY.to_string())
}

/// Classification of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AddressKind {
    #[default]
    #[serde(alias = "unknown")]
    Unknown,
    #[serde(alias = "wallet")]
    Wallet,
    #[serde(rename = "ERC20", alias = "Erc20", alias = "erc20")]
    Erc20,
    #[serde(rename = "ERC721", alias = "Erc721", alias = "erc721")]
    Erc721,
    #[serde(alias = "erc_token_unconfirmed")]
    ErcTokenUnconfirmed,
    #[serde(alias = "other_contract")]
    OtherContract,
}

impl AddressKind {
    pub fn is_token(&self) -> bool {
        matches!(self, AddressKind::Erc20 | AddressKind::Erc721)
    }
}

/// Classification and display metadata for one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressDetail {
    /// Lower-cased 0x hex key
    pub address: String,
    pub kind: AddressKind,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl AddressDetail {
    /// Placeholder detail for an address that has not been classified.
    pub fn unknown(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            kind: AddressKind::Unknown,
            name: String::new(),
            symbol: String::new(),
            decimals: 0,
        }
    }

    pub fn with_kind(address: impl Into<String>, kind: AddressKind) -> Self {
        Self {
            kind,
            ..Self::unknown(address)
        }
    }
}

/// Counters accumulated for a single address during a run.
///
/// Counters only ever grow while the run is in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressStats {
    pub address: String,

    pub num_tx_sent_success: u64,
    pub num_tx_sent_failed: u64,
    pub num_tx_received_success: u64,
    pub num_tx_received_failed: u64,
    /// Failed zero-gas-price transactions with payload sent by this address
    pub num_failed_relay_sent: u64,

    /// Gas used by transactions this address sent
    pub gas_used: U256,
    /// Fees paid (gas used × gas price), successful or not
    pub gas_fee_total: U256,
    /// Fees paid on failed transactions
    pub gas_fee_failed: U256,

    pub value_sent: U256,
    pub value_received: U256,

    pub num_tx_erc20_sent: u64,
    pub num_tx_erc20_received: u64,
    /// Transfers executed by this address as the token contract
    pub num_tx_erc20_transfer: u64,
    pub erc20_amount_sent: U256,
    pub erc20_amount_received: U256,
    pub erc20_amount_transferred: U256,

    pub num_tx_erc721_sent: u64,
    pub num_tx_erc721_received: u64,
    pub num_tx_erc721_transfer: u64,

    /// Successful sent transactions by declared type tag
    pub tx_types: BTreeMap<u64, u64>,
}

impl AddressStats {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn num_tx_sent(&self) -> u64 {
        self.num_tx_sent_success + self.num_tx_sent_failed
    }

    pub fn num_tx_received(&self) -> u64 {
        self.num_tx_received_success + self.num_tx_received_failed
    }
}

/// Network-wide totals for the analysed range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTotals {
    pub num_blocks: u64,
    pub num_blocks_without_tx: u64,
    pub num_transactions: u64,
    pub num_tx_success: u64,
    pub num_tx_failed: u64,
    pub num_tx_with_data: u64,
    pub num_tx_zero_value: u64,
    pub num_tx_contract_creation: u64,
    pub num_failed_relay: u64,
    pub num_zero_fee_success: u64,
    pub num_tx_erc20_transfer: u64,
    pub num_tx_erc721_transfer: u64,
    /// Successful transactions by declared type tag
    pub tx_types: BTreeMap<u64, u64>,

    pub total_value: U256,
    pub total_gas_used: U256,
    pub total_gas_fee: U256,
    pub total_gas_fee_failed: U256,
}

/// Reason a transaction was singled out for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxTag {
    /// Failed, zero gas price, carries a payload (relay/bundle inclusion)
    FailedRelay,
    /// Successful, zero gas price, carries a payload
    ZeroFeeSuccess,
}

/// A tagged transaction with both parties' classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedTx {
    pub tag: TxTag,
    pub hash: B256,
    pub block_number: u64,
    pub from: String,
    pub to: String,
    pub value: U256,
    pub data_len: usize,
    pub from_detail: Option<AddressDetail>,
    pub to_detail: Option<AddressDetail>,
}

/// Everything one analysis run produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub start_block: u64,
    pub end_block: u64,
    /// Timestamp of the first block ingested (arrival order, not the minimum)
    pub start_timestamp: u64,
    /// Timestamp of the last block ingested (arrival order, not the maximum)
    pub end_timestamp: u64,

    pub totals: NetworkTotals,
    pub addresses: HashMap<String, AddressStats>,
    pub top_transactions: TopTransactions,
    pub tagged_transactions: Vec<TaggedTx>,
    /// Ranked address views by metric name, filled after aggregation
    pub rankings: BTreeMap<String, Vec<RankedAddress>>,
}

impl AnalysisResult {
    pub fn new(start_block: u64, end_block: u64, top_tx_capacity: usize) -> Self {
        Self {
            start_block,
            end_block,
            top_transactions: TopTransactions::new(top_tx_capacity),
            ..Default::default()
        }
    }

    /// Stats for `key`, created on first reference.
    pub fn stats_mut(&mut self, key: &str) -> &mut AddressStats {
        self.addresses
            .entry(key.to_string())
            .or_insert_with(|| AddressStats::new(key))
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            start_block: self.start_block,
            end_block: self.end_block,
            start_timestamp: self.start_timestamp,
            end_timestamp: self.end_timestamp,
            num_addresses: self.addresses.len() as u64,
            totals: self.totals.clone(),
        }
    }
}

/// Run-level record written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub start_block: u64,
    pub end_block: u64,
    pub start_timestamp: u64,
    pub end_timestamp: u64,
    pub num_addresses: u64,
    pub totals: NetworkTotals,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_address_key_is_lowercase() {
        let addr = address!("dac17f958d2ee523a2206206994597c13d831ec7");
        assert_eq!(address_key(&addr), "0xdac17f958d2ee523a2206206994597c13d831ec7");
        assert_eq!(optional_address_key(None), EMPTY_ADDRESS_KEY);
    }

    #[test]
    fn test_kind_deserialize_aliases() {
        let k: AddressKind = serde_json::from_str("\"ERC20\"").unwrap();
        assert_eq!(k, AddressKind::Erc20);
        let k: AddressKind = serde_json::from_str("\"erc721\"").unwrap();
        assert_eq!(k, AddressKind::Erc721);
        let k: AddressKind = serde_json::from_str("\"OtherContract\"").unwrap();
        assert_eq!(k, AddressKind::OtherContract);
        assert!(AddressKind::Erc20.is_token());
        assert!(!AddressKind::ErcTokenUnconfirmed.is_token());
    }

    #[test]
    fn test_stats_mut_creates_once() {
        let mut result = AnalysisResult::new(1, 2, 5);
        result.stats_mut("0xabc").num_tx_sent_success += 1;
        result.stats_mut("0xabc").num_tx_sent_failed += 1;
        assert_eq!(result.addresses.len(), 1);
        let stats = &result.addresses["0xabc"];
        assert_eq!(stats.address, "0xabc");
        assert_eq!(stats.num_tx_sent(), 2);
    }

    #[test]
    fn test_address_stats_postcard_roundtrip() {
        let mut stats = AddressStats::new("0x01");
        stats.value_sent = U256::from(123_456_789u64);
        stats.tx_types.insert(2, 7);
        let bytes = postcard::to_allocvec(&stats).unwrap();
        let decoded: AddressStats = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(stats, decoded);
    }
}
