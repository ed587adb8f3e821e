//! In-memory `ChainClient` for unit tests.

use crate::rpc::ChainClient;
use crate::types::{Block, Header, Receipt, Transaction};
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scripted chain. Unscripted calls fail the way a reverting node would.
#[derive(Default)]
pub struct MockChain {
    blocks: HashMap<u64, Block>,
    receipts: HashMap<B256, Receipt>,
    headers: HashMap<u64, u64>,
    latest: Option<Header>,
    code: HashMap<Address, Vec<u8>>,
    calls: HashMap<(Address, Vec<u8>), Vec<u8>>,
    failing_blocks: HashSet<u64>,
    total_calls: AtomicUsize,
    header_calls: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain whose block `n` has timestamp `genesis + n * interval`, up to `head`.
    pub fn with_regular_headers(head: u64, genesis: u64, interval: u64) -> Self {
        let mut chain = Self::new();
        for n in 0..=head {
            chain.headers.insert(n, genesis + n * interval);
        }
        chain.latest = Some(Header {
            number: head,
            timestamp: genesis + head * interval,
        });
        chain
    }

    pub fn add_block(&mut self, block: Block) {
        self.headers.insert(block.number, block.timestamp);
        self.blocks.insert(block.number, block);
    }

    pub fn add_receipt(&mut self, hash: B256, receipt: Receipt) {
        self.receipts.insert(hash, receipt);
    }

    pub fn fail_block(&mut self, number: u64) {
        self.failing_blocks.insert(number);
    }

    pub fn set_code(&mut self, addr: Address, code: Vec<u8>) {
        self.code.insert(addr, code);
    }

    pub fn set_call(&mut self, to: Address, data: Vec<u8>, out: Vec<u8>) {
        self.calls.insert((to, data), out);
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub fn header_calls(&self) -> usize {
        self.header_calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn block_by_number(&self, number: u64) -> Result<Block> {
        self.count();
        if self.failing_blocks.contains(&number) {
            anyhow::bail!("connection reset fetching block {}", number);
        }
        match self.blocks.get(&number) {
            Some(block) => Ok(block.clone()),
            None => anyhow::bail!("Block 0x{:x} not found", number),
        }
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>> {
        self.count();
        Ok(self.receipts.get(&tx_hash).cloned())
    }

    async fn header_by_number(&self, number: u64) -> Result<Header> {
        self.count();
        self.header_calls.fetch_add(1, Ordering::SeqCst);
        match self.headers.get(&number) {
            Some(ts) => Ok(Header {
                number,
                timestamp: *ts,
            }),
            None => anyhow::bail!("Block 0x{:x} not found", number),
        }
    }

    async fn latest_header(&self) -> Result<Header> {
        self.count();
        match self.latest {
            Some(h) => Ok(h),
            None => anyhow::bail!("no latest header scripted"),
        }
    }

    async fn code_at(&self, address: Address) -> Result<Vec<u8>> {
        self.count();
        Ok(self.code.get(&address).cloned().unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>> {
        self.count();
        match self.calls.get(&(to, data)) {
            Some(out) => Ok(out.clone()),
            None => anyhow::bail!("execution reverted"),
        }
    }
}

/// Deterministic hash for test transaction `n`.
pub fn tx_hash(n: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&n.to_be_bytes());
    B256::from(bytes)
}

/// A legacy transaction with the given parties and economics.
pub fn tx(
    n: u64,
    from: Address,
    to: Option<Address>,
    value: u64,
    gas_price: u64,
    input: Vec<u8>,
) -> Transaction {
    Transaction {
        hash: tx_hash(n),
        from: Some(from),
        to,
        value: U256::from(value),
        gas_price: Some(U256::from(gas_price)),
        max_fee_per_gas: None,
        max_priority_fee_per_gas: None,
        input,
        tx_type: Some(0),
    }
}

pub fn receipt(success: bool, gas_used: u64) -> Receipt {
    Receipt {
        status: Some(if success { 1 } else { 0 }),
        gas_used: U256::from(gas_used),
        effective_gas_price: None,
    }
}

pub fn block(number: u64, timestamp: u64, transactions: Vec<Transaction>) -> Block {
    Block {
        number,
        timestamp,
        base_fee_per_gas: None,
        transactions,
    }
}
