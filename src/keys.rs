//! Key encoding for the stats store
//!
//! All keys use a single-byte prefix followed by binary data, so RocksDB
//! iterates runs in block order and groups a run's addresses together.

/// Prefix of run summary keys
pub const RUN_PREFIX: u8 = b'R';

/// Prefix of per-address stats keys
pub const ADDRESS_STATS_PREFIX: u8 = b'A';

/// Length of a run key: prefix + start (8 bytes) + end (8 bytes)
pub const RUN_KEY_LEN: usize = 17;

fn push_range(key: &mut Vec<u8>, start: u64, end: u64) {
    key.extend_from_slice(&start.to_be_bytes());
    key.extend_from_slice(&end.to_be_bytes());
}

/// Encode a run summary key.
///
/// Format: byte 'R' (0x52) + start block (8 bytes, big-endian) + end block (8 bytes, big-endian)
pub fn encode_run_key(start: u64, end: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(RUN_KEY_LEN);
    key.push(RUN_PREFIX);
    push_range(&mut key, start, end);
    key
}

/// Encode a per-address stats key.
///
/// Format: byte 'A' (0x41) + start block (8 bytes) + end block (8 bytes) + address key bytes.
/// The empty-address bucket encodes to the bare 17-byte prefix.
pub fn encode_address_stats_key(start: u64, end: u64, address: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(RUN_KEY_LEN + address.len());
    key.push(ADDRESS_STATS_PREFIX);
    push_range(&mut key, start, end);
    key.extend_from_slice(address.as_bytes());
    key
}

/// Prefix shared by every address stats key of one run.
pub fn encode_address_stats_prefix(start: u64, end: u64) -> Vec<u8> {
    encode_address_stats_key(start, end, "")
}

/// Decode the block range from a run or address stats key.
pub fn decode_range(key: &[u8]) -> Option<(u64, u64)> {
    if key.len() < RUN_KEY_LEN {
        return None;
    }
    let start = u64::from_be_bytes(key[1..9].try_into().ok()?);
    let end = u64::from_be_bytes(key[9..17].try_into().ok()?);
    Some((start, end))
}
