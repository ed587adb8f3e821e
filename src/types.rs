//! Ethereum JSON-RPC types
//!
//! Blocks, transactions, headers and receipts as returned by the node,
//! plus the `BlockRecord` handed from the fetcher pool to the aggregator.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// Ethereum block with full transaction details.
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    /// Block number (hex string in JSON, parsed to u64)
    #[serde(rename = "number", deserialize_with = "deserialize_hex_u64")]
    pub number: u64,

    /// Block timestamp in Unix seconds
    #[serde(rename = "timestamp", deserialize_with = "deserialize_hex_u64")]
    pub timestamp: u64,

    /// Base fee per gas (EIP-1559, absent before London)
    #[serde(rename = "baseFeePerGas", default, deserialize_with = "deserialize_hex_u256_opt")]
    pub base_fee_per_gas: Option<U256>,

    /// List of transactions in the block
    #[serde(rename = "transactions", default)]
    pub transactions: Vec<Transaction>,
}

/// Block header fields needed by the locator.
///
/// Deserialized from `eth_getBlockByNumber` with `full_tx = false`; the
/// remaining fields of the response are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Header {
    #[serde(rename = "number", deserialize_with = "deserialize_hex_u64")]
    pub number: u64,

    #[serde(rename = "timestamp", deserialize_with = "deserialize_hex_u64")]
    pub timestamp: u64,
}

/// Ethereum transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    /// Transaction hash (hex string in JSON)
    #[serde(rename = "hash", deserialize_with = "deserialize_hex_b256")]
    pub hash: B256,

    /// Sender as recovered by the node. `None` if the node could not provide it.
    #[serde(rename = "from", default, deserialize_with = "deserialize_hex_address_opt")]
    pub from: Option<Address>,

    /// Recipient address (None for contract creation)
    #[serde(rename = "to", default, deserialize_with = "deserialize_hex_address_opt")]
    pub to: Option<Address>,

    /// Value transferred in wei
    #[serde(rename = "value", deserialize_with = "deserialize_hex_u256")]
    pub value: U256,

    /// Gas price. For mined EIP-1559 transactions nodes report the effective price here.
    #[serde(rename = "gasPrice", default, deserialize_with = "deserialize_hex_u256_opt")]
    pub gas_price: Option<U256>,

    /// Max fee per gas (EIP-1559)
    #[serde(rename = "maxFeePerGas", default, deserialize_with = "deserialize_hex_u256_opt")]
    pub max_fee_per_gas: Option<U256>,

    /// Max priority fee per gas (EIP-1559)
    #[serde(
        rename = "maxPriorityFeePerGas",
        default,
        deserialize_with = "deserialize_hex_u256_opt"
    )]
    pub max_priority_fee_per_gas: Option<U256>,

    /// Transaction input data ("0x" for plain value transfers)
    #[serde(rename = "input", deserialize_with = "deserialize_hex_bytes")]
    pub input: Vec<u8>,

    /// Declared envelope type (0 legacy, 1 access list, 2 EIP-1559, 3 blob)
    #[serde(rename = "type", default, deserialize_with = "deserialize_hex_u64_opt")]
    pub tx_type: Option<u64>,
}

impl Transaction {
    /// Check if this is an EIP-1559 transaction (has maxFeePerGas).
    pub fn is_eip1559(&self) -> bool {
        self.max_fee_per_gas.is_some()
    }

    /// Check if this is a contract creation transaction (to is None).
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }

    /// Declared type tag, defaulting to legacy when the node omits it.
    pub fn type_tag(&self) -> u64 {
        self.tx_type.unwrap_or(0)
    }

    /// Gas price offered by the transaction, zero when unknown.
    pub fn gas_price_or_zero(&self) -> U256 {
        self.gas_price.unwrap_or(U256::ZERO)
    }
}

/// Transaction receipt.
#[derive(Debug, Clone, Deserialize)]
pub struct Receipt {
    /// 1 = success, 0 = failure. Pre-Byzantium receipts carry no status.
    #[serde(rename = "status", default, deserialize_with = "deserialize_hex_u64_opt")]
    pub status: Option<u64>,

    /// Gas used
    #[serde(rename = "gasUsed", deserialize_with = "deserialize_hex_u256")]
    pub gas_used: U256,

    /// Effective gas price (post-London)
    #[serde(
        rename = "effectiveGasPrice",
        default,
        deserialize_with = "deserialize_hex_u256_opt"
    )]
    pub effective_gas_price: Option<U256>,
}

impl Receipt {
    /// Receipt used when the node returns no receipt for a transaction.
    pub fn degraded() -> Self {
        Self {
            status: Some(1),
            gas_used: U256::from(1u64),
            effective_gas_price: None,
        }
    }

    /// Check if the transaction succeeded.
    pub fn is_success(&self) -> bool {
        self.status != Some(0)
    }
}

/// A fully fetched block: header fields, transactions and their receipts.
///
/// Immutable once built by a fetch worker.
#[derive(Debug, Clone)]
pub struct BlockRecord {
    pub number: u64,
    pub timestamp: u64,
    pub base_fee_per_gas: Option<U256>,
    pub transactions: Vec<Transaction>,
    /// Receipts by transaction hash. Missing entries fall back to `Receipt::degraded`.
    pub receipts: HashMap<B256, Receipt>,
}

impl BlockRecord {
    /// Assemble a record from a fetched block and its receipts.
    pub fn new(block: Block, receipts: HashMap<B256, Receipt>) -> Self {
        Self {
            number: block.number,
            timestamp: block.timestamp,
            base_fee_per_gas: block.base_fee_per_gas,
            transactions: block.transactions,
            receipts,
        }
    }

    pub fn num_transactions(&self) -> usize {
        self.transactions.len()
    }
}

// Hex helpers

/// Pad an odd-length hex string with a leading zero.
/// This handles cases where RPC returns hex strings without leading zeros.
pub(crate) fn pad_hex_string(s: &str) -> String {
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

/// Decode a hex string (with or without 0x prefix) into bytes.
pub(crate) fn decode_hex(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(Vec::new());
    }
    hex::decode(pad_hex_string(s))
}

fn parse_hex_u64(s: &str) -> Result<u64, std::num::ParseIntError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(s, 16)
}

fn parse_hex_u256(s: &str) -> Result<U256, hex::FromHexError> {
    let bytes = decode_hex(s)?;
    if bytes.len() > 32 {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    Ok(U256::from_be_slice(&bytes))
}

/// Deserialize a hex string to u64.
fn deserialize_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hex_u64(&s).map_err(serde::de::Error::custom)
}

/// Deserialize an optional hex string to u64.
fn deserialize_hex_u64_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) => parse_hex_u64(&s).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Deserialize a hex string to U256.
fn deserialize_hex_u256<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hex_u256(&s).map_err(serde::de::Error::custom)
}

/// Deserialize an optional hex string to U256.
fn deserialize_hex_u256_opt<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) => parse_hex_u256(&s).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Deserialize a hex string to B256.
fn deserialize_hex_b256<'de, D>(deserializer: D) -> Result<B256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let bytes = decode_hex(&s).map_err(serde::de::Error::custom)?;
    if bytes.len() != 32 {
        return Err(serde::de::Error::custom(format!(
            "Expected 32 bytes for hash, got {}",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

/// Deserialize an optional hex string to Address.
fn deserialize_hex_address_opt<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = match Option::<String>::deserialize(deserializer)? {
        Some(s) => s,
        None => return Ok(None),
    };
    let bytes = decode_hex(&s).map_err(serde::de::Error::custom)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    if bytes.len() != 20 {
        return Err(serde::de::Error::custom(format!(
            "Expected 20 bytes for address, got {}",
            bytes.len()
        )));
    }
    Ok(Some(Address::from_slice(&bytes)))
}

/// Deserialize a hex string to bytes.
fn deserialize_hex_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    decode_hex(&s).map_err(serde::de::Error::custom)
}
