//! StatsStore trait and RocksDB implementation
//!
//! Persists finished analysis runs: one summary record per run plus one
//! record per address. Values are postcard-encoded.

use crate::keys::{
    decode_range, encode_address_stats_key, encode_address_stats_prefix, encode_run_key,
    RUN_KEY_LEN,
};
use crate::records::{AddressStats, RunSummary};
use anyhow::{Context, Result};
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use std::path::Path;

const RUNS_CF: &str = "runs";
const ADDRESS_STATS_CF: &str = "address_stats";

/// Storage for finished runs.
///
/// Writes overwrite; callers that want insert-once semantics check first.
pub trait StatsStore: Send + Sync {
    fn put_run(&self, summary: &RunSummary) -> Result<()>;

    fn get_run(&self, start: u64, end: u64) -> Result<Option<RunSummary>>;

    /// All stored runs, ordered by start block.
    fn list_runs(&self) -> Result<Vec<RunSummary>>;

    fn put_address_stats(&self, start: u64, end: u64, stats: &AddressStats) -> Result<()>;

    fn get_address_stats(&self, start: u64, end: u64, address: &str)
        -> Result<Option<AddressStats>>;

    fn has_address_stats(&self, start: u64, end: u64, address: &str) -> Result<bool> {
        Ok(self.get_address_stats(start, end, address)?.is_some())
    }

    /// Every address record of one run, ordered by address key.
    fn get_run_address_stats(&self, start: u64, end: u64) -> Result<Vec<AddressStats>>;
}

/// RocksDB-backed implementation of StatsStore.
///
/// Column families:
/// - runs: run summaries
/// - address_stats: per-address counters of each run
pub struct RocksStatsStore {
    db: DB,
}

impl RocksStatsStore {
    /// Open or create a RocksDB database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let column_families = vec![
            ColumnFamilyDescriptor::new(RUNS_CF, Options::default()),
            ColumnFamilyDescriptor::new(ADDRESS_STATS_CF, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, column_families)
            .context("Failed to open RocksDB database")?;

        Ok(Self { db })
    }

    fn get_cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .with_context(|| format!("Column family '{}' not found", name))
    }
}

impl StatsStore for RocksStatsStore {
    fn put_run(&self, summary: &RunSummary) -> Result<()> {
        let cf = self.get_cf(RUNS_CF)?;
        let key = encode_run_key(summary.start_block, summary.end_block);
        let value = postcard::to_allocvec(summary).context("Failed to serialize run summary")?;
        self.db
            .put_cf(cf, &key, &value)
            .context("Failed to put run summary")?;
        Ok(())
    }

    fn get_run(&self, start: u64, end: u64) -> Result<Option<RunSummary>> {
        let cf = self.get_cf(RUNS_CF)?;
        let key = encode_run_key(start, end);
        match self.db.get_cf(cf, &key).context("Failed to get run summary")? {
            Some(bytes) => {
                let summary = postcard::from_bytes(&bytes)
                    .context("Failed to deserialize run summary")?;
                Ok(Some(summary))
            }
            None => Ok(None),
        }
    }

    fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let cf = self.get_cf(RUNS_CF)?;
        let mut runs = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item.context("Failed to read iterator")?;
            if decode_range(&key).is_none() {
                continue;
            }
            let summary: RunSummary =
                postcard::from_bytes(&value).context("Failed to deserialize run summary")?;
            runs.push(summary);
        }
        Ok(runs)
    }

    fn put_address_stats(&self, start: u64, end: u64, stats: &AddressStats) -> Result<()> {
        let cf = self.get_cf(ADDRESS_STATS_CF)?;
        let key = encode_address_stats_key(start, end, &stats.address);
        let value = postcard::to_allocvec(stats).context("Failed to serialize address stats")?;
        self.db
            .put_cf(cf, &key, &value)
            .with_context(|| format!("Failed to put stats for {}", stats.address))?;
        Ok(())
    }

    fn get_address_stats(
        &self,
        start: u64,
        end: u64,
        address: &str,
    ) -> Result<Option<AddressStats>> {
        let cf = self.get_cf(ADDRESS_STATS_CF)?;
        let key = encode_address_stats_key(start, end, address);
        match self.db.get_cf(cf, &key).context("Failed to get address stats")? {
            Some(bytes) => {
                let stats = postcard::from_bytes(&bytes)
                    .context("Failed to deserialize address stats")?;
                Ok(Some(stats))
            }
            None => Ok(None),
        }
    }

    fn get_run_address_stats(&self, start: u64, end: u64) -> Result<Vec<AddressStats>> {
        let cf = self.get_cf(ADDRESS_STATS_CF)?;
        let prefix = encode_address_stats_prefix(start, end);

        let mut out = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item.context("Failed to read iterator")?;
            if key.len() < RUN_KEY_LEN || !key.starts_with(&prefix) {
                break;
            }
            let stats: AddressStats =
                postcard::from_bytes(&value).context("Failed to deserialize address stats")?;
            out.push(stats);
        }
        Ok(out)
    }
}
