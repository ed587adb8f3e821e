//! Top-N ranking engine
//!
//! Two mechanisms:
//! - bounded top-transaction lists maintained while blocks are ingested
//! - per-metric top-address views computed once aggregation is done
//!
//! Address views re-sort the full address set per metric. Entries are first
//! ordered by address so equal metric values rank deterministically.

use crate::cache::AddressCache;
use crate::config::AnalyzerConfig;
use crate::records::{AddressDetail, AddressStats, AnalysisResult};
use crate::rpc::ChainClient;
use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Default capacity of the top-transaction lists
pub const DEFAULT_TOP_TX: usize = 20;

/// Per-transaction facts kept in the top-transaction lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSummary {
    pub hash: B256,
    pub block_number: u64,
    pub from: String,
    pub to: String,
    pub value: U256,
    pub gas_used: U256,
    pub gas_price: U256,
    pub gas_fee: U256,
    pub data_len: usize,
    pub success: bool,
}

/// Metric a top-transaction list is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxMetric {
    GasFee,
    Value,
    DataSize,
}

impl TxMetric {
    pub fn value(&self, tx: &TxSummary) -> U256 {
        match self {
            TxMetric::GasFee => tx.gas_fee,
            TxMetric::Value => tx.value,
            TxMetric::DataSize => U256::from(tx.data_len),
        }
    }
}

/// Bounded list of the best transactions for one metric, sorted descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopTxList {
    pub metric: TxMetric,
    pub capacity: usize,
    pub entries: Vec<TxSummary>,
}

impl TopTxList {
    pub fn new(metric: TxMetric, capacity: usize) -> Self {
        Self {
            metric,
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Offer a transaction. Returns true if it was kept.
    ///
    /// When full, the candidate must strictly beat the current last entry,
    /// which it then replaces.
    pub fn insert(&mut self, tx: &TxSummary) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let metric = self.metric;
        if self.entries.len() < self.capacity {
            self.entries.push(tx.clone());
        } else {
            let worst = match self.entries.last() {
                Some(last) => metric.value(last),
                None => return false,
            };
            if metric.value(tx) <= worst {
                return false;
            }
            let last = self.entries.len() - 1;
            self.entries[last] = tx.clone();
        }
        self.entries
            .sort_by(|a, b| metric.value(b).cmp(&metric.value(a)));
        true
    }
}

/// The three top-transaction lists of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopTransactions {
    pub by_gas_fee: TopTxList,
    pub by_value: TopTxList,
    pub by_data_size: TopTxList,
}

impl TopTransactions {
    pub fn new(capacity: usize) -> Self {
        Self {
            by_gas_fee: TopTxList::new(TxMetric::GasFee, capacity),
            by_value: TopTxList::new(TxMetric::Value, capacity),
            by_data_size: TopTxList::new(TxMetric::DataSize, capacity),
        }
    }

    pub fn insert(&mut self, tx: &TxSummary) {
        self.by_gas_fee.insert(tx);
        self.by_value.insert(tx);
        self.by_data_size.insert(tx);
    }
}

impl Default for TopTransactions {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_TX)
    }
}

/// Per-address metrics with a ranked view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMetric {
    NumTxSentSuccess,
    NumTxSentFailed,
    NumTxReceivedSuccess,
    NumTxReceivedFailed,
    ValueSent,
    ValueReceived,
    GasUsed,
    GasFeeTotal,
    GasFeeFailed,
    FailedRelaySent,
    Erc20Sent,
    Erc20Received,
    Erc20Transfer,
    Erc20AmountTransferred,
    Erc721Sent,
    Erc721Received,
    Erc721Transfer,
}

impl AddressMetric {
    pub const ALL: [AddressMetric; 17] = [
        AddressMetric::NumTxSentSuccess,
        AddressMetric::NumTxSentFailed,
        AddressMetric::NumTxReceivedSuccess,
        AddressMetric::NumTxReceivedFailed,
        AddressMetric::ValueSent,
        AddressMetric::ValueReceived,
        AddressMetric::GasUsed,
        AddressMetric::GasFeeTotal,
        AddressMetric::GasFeeFailed,
        AddressMetric::FailedRelaySent,
        AddressMetric::Erc20Sent,
        AddressMetric::Erc20Received,
        AddressMetric::Erc20Transfer,
        AddressMetric::Erc20AmountTransferred,
        AddressMetric::Erc721Sent,
        AddressMetric::Erc721Received,
        AddressMetric::Erc721Transfer,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AddressMetric::NumTxSentSuccess => "num_tx_sent_success",
            AddressMetric::NumTxSentFailed => "num_tx_sent_failed",
            AddressMetric::NumTxReceivedSuccess => "num_tx_received_success",
            AddressMetric::NumTxReceivedFailed => "num_tx_received_failed",
            AddressMetric::ValueSent => "value_sent",
            AddressMetric::ValueReceived => "value_received",
            AddressMetric::GasUsed => "gas_used",
            AddressMetric::GasFeeTotal => "gas_fee_total",
            AddressMetric::GasFeeFailed => "gas_fee_failed",
            AddressMetric::FailedRelaySent => "failed_relay_sent",
            AddressMetric::Erc20Sent => "erc20_sent",
            AddressMetric::Erc20Received => "erc20_received",
            AddressMetric::Erc20Transfer => "erc20_transfer",
            AddressMetric::Erc20AmountTransferred => "erc20_amount_transferred",
            AddressMetric::Erc721Sent => "erc721_sent",
            AddressMetric::Erc721Received => "erc721_received",
            AddressMetric::Erc721Transfer => "erc721_transfer",
        }
    }

    pub fn value(&self, stats: &AddressStats) -> U256 {
        match self {
            AddressMetric::NumTxSentSuccess => U256::from(stats.num_tx_sent_success),
            AddressMetric::NumTxSentFailed => U256::from(stats.num_tx_sent_failed),
            AddressMetric::NumTxReceivedSuccess => U256::from(stats.num_tx_received_success),
            AddressMetric::NumTxReceivedFailed => U256::from(stats.num_tx_received_failed),
            AddressMetric::ValueSent => stats.value_sent,
            AddressMetric::ValueReceived => stats.value_received,
            AddressMetric::GasUsed => stats.gas_used,
            AddressMetric::GasFeeTotal => stats.gas_fee_total,
            AddressMetric::GasFeeFailed => stats.gas_fee_failed,
            AddressMetric::FailedRelaySent => U256::from(stats.num_failed_relay_sent),
            AddressMetric::Erc20Sent => U256::from(stats.num_tx_erc20_sent),
            AddressMetric::Erc20Received => U256::from(stats.num_tx_erc20_received),
            AddressMetric::Erc20Transfer => U256::from(stats.num_tx_erc20_transfer),
            AddressMetric::Erc20AmountTransferred => stats.erc20_amount_transferred,
            AddressMetric::Erc721Sent => U256::from(stats.num_tx_erc721_sent),
            AddressMetric::Erc721Received => U256::from(stats.num_tx_erc721_received),
            AddressMetric::Erc721Transfer => U256::from(stats.num_tx_erc721_transfer),
        }
    }

    /// Most-called contracts and token contracts get the larger list size.
    pub fn is_large(&self) -> bool {
        matches!(
            self,
            AddressMetric::NumTxReceivedSuccess
                | AddressMetric::Erc20Transfer
                | AddressMetric::Erc721Transfer
        )
    }

    pub fn limit(&self, config: &AnalyzerConfig) -> usize {
        if self.is_large() {
            config.top_n_large
        } else {
            config.top_n
        }
    }

    /// Human-readable rendering of a metric value.
    pub fn display(&self, value: U256, detail: &AddressDetail) -> String {
        match self {
            AddressMetric::ValueSent
            | AddressMetric::ValueReceived
            | AddressMetric::GasFeeTotal
            | AddressMetric::GasFeeFailed => format_units(value, 18),
            AddressMetric::Erc20AmountTransferred => format_units(value, detail.decimals),
            _ => value.to_string(),
        }
    }
}

/// One entry of a ranked address view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedAddress {
    pub rank: usize,
    pub detail: AddressDetail,
    pub value: U256,
    pub display: String,
    pub stats: AddressStats,
}

/// Top entries for one metric, without classification.
///
/// `entries` must already be ordered by address.
fn top_for_metric<'a>(
    entries: &[&'a AddressStats],
    metric: AddressMetric,
    limit: usize,
) -> Vec<&'a AddressStats> {
    let mut sorted = entries.to_vec();
    sorted.sort_by(|a, b| metric.value(b).cmp(&metric.value(a)));
    sorted
        .into_iter()
        .take(limit)
        .filter(|s| metric.value(s) > U256::ZERO)
        .collect()
}

/// Build every ranked view, classifying retained addresses on demand.
pub async fn rank_addresses(
    result: &AnalysisResult,
    cache: &AddressCache,
    chain: &dyn ChainClient,
    config: &AnalyzerConfig,
) -> BTreeMap<String, Vec<RankedAddress>> {
    let mut entries: Vec<&AddressStats> = result.addresses.values().collect();
    entries.sort_by(|a, b| a.address.cmp(&b.address));

    let mut views = BTreeMap::new();
    for metric in AddressMetric::ALL {
        let top = top_for_metric(&entries, metric, metric.limit(config));
        let mut ranked = Vec::with_capacity(top.len());
        for (i, stats) in top.into_iter().enumerate() {
            let detail = cache
                .classify_key(chain, &stats.address, config.allow_chain_queries())
                .await;
            let value = metric.value(stats);
            ranked.push(RankedAddress {
                rank: i + 1,
                display: metric.display(value, &detail),
                detail,
                value,
                stats: stats.clone(),
            });
        }
        debug!(metric = metric.name(), entries = ranked.len(), "Ranked addresses");
        views.insert(metric.name().to_string(), ranked);
    }
    views
}

/// Post-aggregation pass: fill the ranked views and any missing tagged-tx details.
pub async fn finalize(
    result: &mut AnalysisResult,
    cache: &AddressCache,
    chain: &dyn ChainClient,
    config: &AnalyzerConfig,
) {
    result.rankings = rank_addresses(result, cache, chain, config).await;

    let allow = config.allow_chain_queries();
    for tagged in result.tagged_transactions.iter_mut() {
        if tagged.from_detail.is_none() {
            tagged.from_detail = Some(cache.classify_key(chain, &tagged.from, allow).await);
        }
        if tagged.to_detail.is_none() {
            tagged.to_detail = Some(cache.classify_key(chain, &tagged.to, allow).await);
        }
    }
}

/// Scale a base-unit amount by `decimals` for display, trimming trailing zeros.
pub fn format_units(amount: U256, decimals: u8) -> String {
    let digits = amount.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}
