//! Configuration and address dataset loading
//!
//! `AnalyzerConfig` carries the run parameters. The curated datasets are JSON
//! arrays of `{address, type?, name, symbol, decimals}` records; a missing
//! `type` means a wallet.
//!
//! # Example dataset:
//! ```json
//! [
//!   { "address": "0xdAC17F958D2ee523a2206206994597C13D831ec7", "type": "ERC20",
//!     "name": "Tether USD", "symbol": "USDT", "decimals": 6 },
//!   { "address": "0x28C6c06298d514Db089934071355E5743bf21d60", "name": "Binance 14" }
//! ]
//! ```

use crate::records::{AddressDetail, AddressKind};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Parameters of one analysis run.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Number of block fetch workers
    pub workers: usize,
    /// Capacity of the fetched-block channel
    pub block_channel_capacity: usize,
    /// Entries kept per top-address metric
    pub top_n: usize,
    /// Entries kept for the large top-address metrics
    pub top_n_large: usize,
    /// Entries kept per top-transaction list
    pub top_tx: usize,
    /// Cache-only classification (no chain probes)
    pub low_api: bool,
    /// Number of persistence workers
    pub persist_workers: usize,
}

impl AnalyzerConfig {
    pub fn allow_chain_queries(&self) -> bool {
        !self.low_api
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            workers: 5,
            block_channel_capacity: 100,
            top_n: 25,
            top_n_large: 100,
            top_tx: 20,
            low_api: false,
            persist_workers: 10,
        }
    }
}

/// One record of a curated address dataset.
#[derive(Debug, Deserialize)]
struct DatasetEntry {
    address: String,
    #[serde(rename = "type", default)]
    kind: Option<AddressKind>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    decimals: u8,
}

/// Load one dataset file into details keyed by lower-cased address.
pub fn load_dataset(path: &Path) -> Result<Vec<AddressDetail>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset file: {:?}", path))?;
    let entries: Vec<DatasetEntry> = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid dataset JSON in {:?}", path))?;

    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let address = parse_address(&entry.address).with_context(|| {
                format!("Invalid address in record {} of {:?}: {}", i, path, entry.address)
            })?;
            Ok(AddressDetail {
                address: format!("0x{:x}", address),
                kind: entry.kind.unwrap_or(AddressKind::Wallet),
                name: entry.name,
                symbol: entry.symbol,
                decimals: entry.decimals,
            })
        })
        .collect()
}

/// Load and merge the address and token datasets. Token records win on conflict.
pub fn load_datasets(
    addresses: Option<&Path>,
    tokens: Option<&Path>,
) -> Result<HashMap<String, AddressDetail>> {
    let mut merged = HashMap::new();
    for path in [addresses, tokens].into_iter().flatten() {
        for detail in load_dataset(path)? {
            merged.insert(detail.address.clone(), detail);
        }
    }
    Ok(merged)
}

/// Parse an address from a hex string.
///
/// Accepts addresses with or without 0x prefix, in any letter case.
fn parse_address(s: &str) -> Result<Address> {
    let bytes = crate::types::decode_hex(s.trim())
        .with_context(|| format!("Invalid hex address: {}", s))?;
    if bytes.len() != 20 {
        anyhow::bail!("Address must be 20 bytes (40 hex chars), got {} bytes", bytes.len());
    }
    Ok(Address::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_json(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_dataset_defaults_to_wallet() {
        let file = write_json(
            r#"[{ "address": "0x28C6c06298d514Db089934071355E5743bf21d60", "name": "Binance 14",
                  "symbol": "", "decimals": 0 }]"#,
        );
        let details = load_dataset(file.path()).unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].address, "0x28c6c06298d514db089934071355e5743bf21d60");
        assert_eq!(details[0].kind, AddressKind::Wallet);
        assert_eq!(details[0].name, "Binance 14");
    }

    #[test]
    fn test_load_datasets_merges_tokens_over_addresses() {
        let addresses = write_json(
            r#"[{ "address": "0xdAC17F958D2ee523a2206206994597C13D831ec7", "name": "tether" },
                { "address": "0x0000000000000000000000000000000000000001", "name": "one" }]"#,
        );
        let tokens = write_json(
            r#"[{ "address": "0xdac17f958d2ee523a2206206994597c13d831ec7", "type": "ERC20",
                  "name": "Tether USD", "symbol": "USDT", "decimals": 6 }]"#,
        );
        let merged = load_datasets(Some(addresses.path()), Some(tokens.path())).unwrap();
        assert_eq!(merged.len(), 2);
        let usdt = &merged["0xdac17f958d2ee523a2206206994597c13d831ec7"];
        assert_eq!(usdt.kind, AddressKind::Erc20);
        assert_eq!(usdt.decimals, 6);
    }

    #[test]
    fn test_load_dataset_rejects_bad_address() {
        let file = write_json(r#"[{ "address": "0x1234", "name": "short" }]"#);
        assert!(load_dataset(file.path()).is_err());
    }

    #[test]
    fn test_no_datasets_is_empty() {
        assert!(load_datasets(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_parse_address() {
        let addr1 = parse_address("0x0742d35Cc6634C0532925a3b844Bc9e7595f0bEb").unwrap();
        let addr2 = parse_address("0742d35Cc6634C0532925a3b844Bc9e7595f0bEb").unwrap();
        assert_eq!(addr1, addr2);
    }
}
