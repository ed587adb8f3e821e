//! Streaming statistics aggregation
//!
//! The aggregator owns the `AnalysisResult` for the duration of a run and is
//! driven by a single task draining the fetcher channel, so the address map
//! needs no locking. Every metric except the start/end timestamps is
//! independent of block arrival order.

use crate::cache::AddressCache;
use crate::decoder::decode_transfer;
use crate::fee::{calculate_effective_gas_price, calculate_fee};
use crate::records::{
    optional_address_key, AddressKind, AnalysisResult, TaggedTx, TxTag,
};
use crate::ranking::TxSummary;
use crate::rpc::ChainClient;
use crate::types::{BlockRecord, Receipt, Transaction};
use alloy_primitives::U256;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct Aggregator {
    result: AnalysisResult,
    cache: Arc<AddressCache>,
    chain: Arc<dyn ChainClient>,
    allow_chain_queries: bool,
    seen_first_block: bool,
}

impl Aggregator {
    pub fn new(
        result: AnalysisResult,
        cache: Arc<AddressCache>,
        chain: Arc<dyn ChainClient>,
        allow_chain_queries: bool,
    ) -> Self {
        Self {
            result,
            cache,
            chain,
            allow_chain_queries,
            seen_first_block: false,
        }
    }

    pub fn result(&self) -> &AnalysisResult {
        &self.result
    }

    pub fn into_result(self) -> AnalysisResult {
        self.result
    }

    /// Drain `rx` until every sender is dropped, then hand back the result.
    pub async fn consume(mut self, mut rx: mpsc::Receiver<BlockRecord>) -> AnalysisResult {
        while let Some(block) = rx.recv().await {
            self.ingest(&block).await;
        }
        info!(
            blocks = self.result.totals.num_blocks,
            transactions = self.result.totals.num_transactions,
            addresses = self.result.addresses.len(),
            "Aggregation complete"
        );
        self.result
    }

    /// Fold one block into the result.
    pub async fn ingest(&mut self, block: &BlockRecord) {
        // first-seen / last-seen, not min / max
        if !self.seen_first_block {
            self.result.start_timestamp = block.timestamp;
            self.seen_first_block = true;
        }
        self.result.end_timestamp = block.timestamp;

        let totals = &mut self.result.totals;
        totals.num_blocks += 1;
        if block.transactions.is_empty() {
            totals.num_blocks_without_tx += 1;
        }

        for tx in &block.transactions {
            let receipt = block
                .receipts
                .get(&tx.hash)
                .cloned()
                .unwrap_or_else(Receipt::degraded);
            self.ingest_transaction(block, tx, &receipt).await;
        }

        debug!(
            block = block.number,
            txs = block.num_transactions(),
            "Ingested block"
        );
    }

    async fn ingest_transaction(&mut self, block: &BlockRecord, tx: &Transaction, receipt: &Receipt) {
        let from = optional_address_key(tx.from.as_ref());
        let to = optional_address_key(tx.to.as_ref());

        let gas_price = match calculate_effective_gas_price(tx, receipt, block) {
            Ok(price) => price,
            Err(e) => {
                debug!(tx = ?tx.hash, error = %e, "No gas price, fee counted as zero");
                U256::ZERO
            }
        };
        let gas_fee = calculate_fee(receipt.gas_used, gas_price);
        let success = receipt.is_success();
        let zero_price = tx.gas_price_or_zero().is_zero();
        let has_data = !tx.input.is_empty();

        let totals = &mut self.result.totals;
        totals.num_transactions += 1;
        totals.total_gas_used += receipt.gas_used;
        totals.total_gas_fee += gas_fee;
        if tx.is_contract_creation() {
            totals.num_tx_contract_creation += 1;
        }

        let sender = self.result.stats_mut(&from);
        sender.gas_used += receipt.gas_used;
        sender.gas_fee_total += gas_fee;

        if success {
            let totals = &mut self.result.totals;
            totals.num_tx_success += 1;
            totals.total_value += tx.value;
            *totals.tx_types.entry(tx.type_tag()).or_insert(0) += 1;
            if tx.value.is_zero() {
                totals.num_tx_zero_value += 1;
            }
            if has_data {
                totals.num_tx_with_data += 1;
            }

            let sender = self.result.stats_mut(&from);
            sender.num_tx_sent_success += 1;
            sender.value_sent += tx.value;
            *sender.tx_types.entry(tx.type_tag()).or_insert(0) += 1;
            let recipient = self.result.stats_mut(&to);
            recipient.num_tx_received_success += 1;
            recipient.value_received += tx.value;

            if has_data && zero_price {
                self.result.totals.num_zero_fee_success += 1;
                self.tag(TxTag::ZeroFeeSuccess, block, tx, &from, &to, false).await;
            }

            self.attribute_token_transfer(tx, &from, &to).await;
        } else {
            let totals = &mut self.result.totals;
            totals.num_tx_failed += 1;
            totals.total_gas_fee_failed += gas_fee;

            let sender = self.result.stats_mut(&from);
            sender.num_tx_sent_failed += 1;
            sender.gas_fee_failed += gas_fee;
            self.result.stats_mut(&to).num_tx_received_failed += 1;

            if has_data && zero_price {
                self.result.totals.num_failed_relay += 1;
                self.result.stats_mut(&from).num_failed_relay_sent += 1;
                self.tag(TxTag::FailedRelay, block, tx, &from, &to, true).await;
            }
        }

        self.result.top_transactions.insert(&TxSummary {
            hash: tx.hash,
            block_number: block.number,
            from,
            to,
            value: tx.value,
            gas_used: receipt.gas_used,
            gas_price,
            gas_fee,
            data_len: tx.input.len(),
            success,
        });
    }

    /// Credit a decoded token transfer to the contract, token sender and token receiver.
    async fn attribute_token_transfer(&mut self, tx: &Transaction, from: &str, to: &str) {
        let Some(transfer) = decode_transfer(&tx.input) else {
            return;
        };
        let Some(contract) = tx.to else {
            return;
        };

        let detail = self
            .cache
            .classify(self.chain.as_ref(), contract, self.allow_chain_queries)
            .await;
        if !detail.kind.is_token() {
            return;
        }

        let token_sender = match transfer.sender {
            Some(addr) => optional_address_key(Some(&addr)),
            None => from.to_string(),
        };
        let token_receiver = match transfer.receiver {
            Some(addr) => optional_address_key(Some(&addr)),
            None => to.to_string(),
        };
        let amount = transfer.amount;

        match detail.kind {
            AddressKind::Erc20 => {
                self.result.totals.num_tx_erc20_transfer += 1;

                let stats = self.result.stats_mut(to);
                stats.num_tx_erc20_transfer += 1;
                stats.erc20_amount_transferred += amount;

                let stats = self.result.stats_mut(&token_sender);
                stats.num_tx_erc20_sent += 1;
                stats.erc20_amount_sent += amount;

                let stats = self.result.stats_mut(&token_receiver);
                stats.num_tx_erc20_received += 1;
                stats.erc20_amount_received += amount;
            }
            AddressKind::Erc721 => {
                self.result.totals.num_tx_erc721_transfer += 1;
                self.result.stats_mut(to).num_tx_erc721_transfer += 1;
                self.result.stats_mut(&token_sender).num_tx_erc721_sent += 1;
                self.result.stats_mut(&token_receiver).num_tx_erc721_received += 1;
            }
            _ => {}
        }

        debug!(
            tx = ?tx.hash,
            contract = to,
            sender = %token_sender,
            receiver = %token_receiver,
            method = ?transfer.method,
            "Token transfer"
        );
    }

    async fn tag(
        &mut self,
        tag: TxTag,
        block: &BlockRecord,
        tx: &Transaction,
        from: &str,
        to: &str,
        resolve_now: bool,
    ) {
        let (from_detail, to_detail) = if resolve_now {
            let chain = self.chain.as_ref();
            (
                Some(self.cache.classify_key(chain, from, self.allow_chain_queries).await),
                Some(self.cache.classify_key(chain, to, self.allow_chain_queries).await),
            )
        } else {
            (None, None)
        };

        self.result.tagged_transactions.push(TaggedTx {
            tag,
            hash: tx.hash,
            block_number: block.number,
            from: from.to_string(),
            to: to.to_string(),
            value: tx.value,
            data_len: tx.input.len(),
            from_detail,
            to_detail,
        });
    }
}
