//! Address classification cache
//!
//! Resolves addresses to an `AddressDetail` (wallet, token, other contract).
//! Seeded from curated datasets at startup and extended lazily by probing
//! the chain. Shared between the aggregator and the ranking engine, so the
//! map sits behind a single lock that is never held across an RPC call.
//!
//! Probe order:
//! - ERC721: ERC165 `supportsInterface(0x80ac58cd)` returns true
//! - ERC20: `totalSupply()` and `balanceOf(0x0)` both answer with a word
//!   (only `totalSupply()` answering gives `ErcTokenUnconfirmed`)
//! - Contract code present: `OtherContract`, otherwise `Wallet`

use crate::records::{address_key, AddressDetail, AddressKind};
use crate::rpc::ChainClient;
use alloy_primitives::{Address, U256};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

const SUPPORTS_INTERFACE: [u8; 4] = [0x01, 0xff, 0xc9, 0xa7];
const ERC721_INTERFACE_ID: [u8; 4] = [0x80, 0xac, 0x58, 0xcd];
const TOTAL_SUPPLY: [u8; 4] = [0x18, 0x16, 0x0d, 0xdd];
const BALANCE_OF: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
const NAME: [u8; 4] = [0x06, 0xfd, 0xde, 0x03];
const SYMBOL: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];
const DECIMALS: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];

/// Cache of address classifications keyed by lower-cased hex address.
pub struct AddressCache {
    entries: RwLock<HashMap<String, AddressDetail>>,
}

impl AddressCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::with_entries(HashMap::new())
    }

    /// Create a cache seeded with known classifications.
    pub fn with_entries(entries: HashMap<String, AddressDetail>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Cached detail for `key`, if any.
    pub fn get(&self, key: &str) -> Option<AddressDetail> {
        self.entries.read().get(key).cloned()
    }

    /// Insert or upgrade a classification.
    pub fn insert(&self, detail: AddressDetail) {
        self.entries.write().insert(detail.address.clone(), detail);
    }

    /// Resolve an address.
    ///
    /// With `allow_chain_queries = false` an unknown address yields an
    /// uncached `Unknown` placeholder. Otherwise the chain is probed once and
    /// the result cached; later lookups never touch the chain.
    pub async fn classify(
        &self,
        chain: &dyn ChainClient,
        addr: Address,
        allow_chain_queries: bool,
    ) -> AddressDetail {
        let key = address_key(&addr);
        if let Some(detail) = self.get(&key) {
            return detail;
        }
        if !allow_chain_queries {
            return AddressDetail::unknown(key);
        }

        let detail = probe(chain, addr, key).await;
        debug!(address = %detail.address, kind = ?detail.kind, "Classified address");
        self.insert(detail.clone());
        detail
    }

    /// Resolve a canonical key. The empty bucket and unparsable keys stay `Unknown`.
    pub async fn classify_key(
        &self,
        chain: &dyn ChainClient,
        key: &str,
        allow_chain_queries: bool,
    ) -> AddressDetail {
        if let Some(detail) = self.get(key) {
            return detail;
        }
        match key.parse::<Address>() {
            Ok(addr) => self.classify(chain, addr, allow_chain_queries).await,
            Err(_) => AddressDetail::unknown(key),
        }
    }
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify an address by querying the chain. Probe errors count as "not this kind".
async fn probe(chain: &dyn ChainClient, addr: Address, key: String) -> AddressDetail {
    if supports_erc721(chain, addr).await {
        return token_detail(chain, addr, key, AddressKind::Erc721).await;
    }

    let has_total_supply = call_word(chain, addr, TOTAL_SUPPLY.to_vec()).await.is_some();
    if has_total_supply {
        let kind = if call_word(chain, addr, abi_call(BALANCE_OF, &[0u8; 32]))
            .await
            .is_some()
        {
            AddressKind::Erc20
        } else {
            AddressKind::ErcTokenUnconfirmed
        };
        return token_detail(chain, addr, key, kind).await;
    }

    let kind = match chain.code_at(addr).await {
        Ok(code) if !code.is_empty() => AddressKind::OtherContract,
        Ok(_) => AddressKind::Wallet,
        Err(e) => {
            debug!(address = %key, error = %e, "Code probe failed, assuming wallet");
            AddressKind::Wallet
        }
    };
    AddressDetail::with_kind(key, kind)
}

async fn supports_erc721(chain: &dyn ChainClient, addr: Address) -> bool {
    let mut arg = [0u8; 32];
    arg[..4].copy_from_slice(&ERC721_INTERFACE_ID);
    match call_word(chain, addr, abi_call(SUPPORTS_INTERFACE, &arg)).await {
        Some(word) => word == U256::from(1u64),
        None => false,
    }
}

/// Read name, symbol and decimals for a token. Missing metadata stays empty.
async fn token_detail(
    chain: &dyn ChainClient,
    addr: Address,
    key: String,
    kind: AddressKind,
) -> AddressDetail {
    let name = match chain.call(addr, NAME.to_vec()).await {
        Ok(out) => decode_abi_string(&out).unwrap_or_default(),
        Err(_) => String::new(),
    };
    let symbol = match chain.call(addr, SYMBOL.to_vec()).await {
        Ok(out) => decode_abi_string(&out).unwrap_or_default(),
        Err(_) => String::new(),
    };
    let decimals = if kind == AddressKind::Erc721 {
        0
    } else {
        call_word(chain, addr, DECIMALS.to_vec())
            .await
            .and_then(|d| u8::try_from(d).ok())
            .unwrap_or(0)
    };

    AddressDetail {
        address: key,
        kind,
        name,
        symbol,
        decimals,
    }
}

/// Call and interpret the first returned word as a uint256.
async fn call_word(chain: &dyn ChainClient, addr: Address, data: Vec<u8>) -> Option<U256> {
    let out = chain.call(addr, data).await.ok()?;
    out.get(..32).map(U256::from_be_slice)
}

fn abi_call(selector: [u8; 4], arg: &[u8; 32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&selector);
    data.extend_from_slice(arg);
    data
}

/// Decode an ABI `string` return value, accepting the legacy `bytes32` form.
pub(crate) fn decode_abi_string(out: &[u8]) -> Option<String> {
    if out.len() == 32 {
        let end = out.iter().position(|b| *b == 0).unwrap_or(32);
        return String::from_utf8(out[..end].to_vec()).ok();
    }

    let offset = usize::try_from(U256::from_be_slice(out.get(..32)?)).ok()?;
    let len_word = out.get(offset..offset.checked_add(32)?)?;
    let len = usize::try_from(U256::from_be_slice(len_word)).ok()?;
    let start = offset + 32;
    let bytes = out.get(start..start.checked_add(len)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}
