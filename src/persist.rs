//! Persistence of a finished run
//!
//! Address records go through a bounded queue to a pool of writers sharing
//! one store handle. Each writer checks for an existing record before
//! writing. The check and the write are separate operations, so two writers
//! racing on the same key can both write; duplicates found by the check are
//! logged and skipped. Store calls run on tokio's blocking pool.

use crate::error::AnalysisError;
use crate::records::{AddressStats, AnalysisResult};
use crate::store::StatsStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Outcome of persisting one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub written: usize,
    pub duplicates: usize,
    pub run_written: bool,
}

/// Write the run summary and every address record of `result`.
pub async fn persist_result(
    store: Arc<dyn StatsStore>,
    result: &AnalysisResult,
    workers: usize,
) -> Result<PersistReport> {
    let (start, end) = (result.start_block, result.end_block);
    let workers = workers.max(1);
    let (tx, rx) = mpsc::channel::<AddressStats>(workers * 2);
    let queue = Arc::new(Mutex::new(rx));

    let mut pool = JoinSet::new();
    for id in 0..workers {
        pool.spawn(persist_worker(id, store.clone(), queue.clone(), start, end));
    }

    for stats in result.addresses.values() {
        if tx.send(stats.clone()).await.is_err() {
            // every writer has exited; the join below reports why
            break;
        }
    }
    drop(tx);

    let mut report = PersistReport::default();
    while let Some(joined) = pool.join_next().await {
        let (written, duplicates) =
            joined.map_err(|e| AnalysisError::WorkerPanicked(e.to_string()))??;
        report.written += written;
        report.duplicates += duplicates;
    }

    let summary = result.summary();
    if store.get_run(start, end)?.is_some() {
        warn!("Run {}..={} already stored, keeping existing summary", start, end);
    } else {
        store
            .put_run(&summary)
            .with_context(|| format!("Failed to store run {}..={}", start, end))?;
        report.run_written = true;
    }

    info!(
        "Persisted run {}..={}: {} address records written, {} duplicates skipped",
        start, end, report.written, report.duplicates
    );
    Ok(report)
}

async fn persist_worker(
    id: usize,
    store: Arc<dyn StatsStore>,
    queue: Arc<Mutex<mpsc::Receiver<AddressStats>>>,
    start: u64,
    end: u64,
) -> Result<(usize, usize)> {
    let mut written = 0;
    let mut duplicates = 0;
    loop {
        let next = queue.lock().await.recv().await;
        let Some(stats) = next else {
            break;
        };

        let address = stats.address.clone();
        let store = store.clone();
        let stored =
            tokio::task::spawn_blocking(move || store_if_absent(store.as_ref(), start, end, &stats))
                .await
                .map_err(|e| AnalysisError::WorkerPanicked(e.to_string()))??;
        if stored {
            written += 1;
        } else {
            warn!(worker = id, address = %address, "Address stats already stored, skipping");
            duplicates += 1;
        }
    }
    debug!(worker = id, written, duplicates, "Persist worker finished");
    Ok((written, duplicates))
}

/// Write `stats` unless the run already holds a record for its address.
///
/// RocksDB calls block, so this runs on the blocking pool.
fn store_if_absent(store: &dyn StatsStore, start: u64, end: u64, stats: &AddressStats) -> Result<bool> {
    if store.has_address_stats(start, end, &stats.address)? {
        return Ok(false);
    }
    store.put_address_stats(start, end, stats)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RocksStatsStore;
    use alloy_primitives::U256;
    use tempfile::TempDir;

    fn result_with_addresses(n: usize) -> AnalysisResult {
        let mut result = AnalysisResult::new(10, 20, 5);
        result.totals.num_blocks = 11;
        for i in 0..n {
            let key = format!("0x{:040x}", i + 1);
            let stats = result.stats_mut(&key);
            stats.num_tx_sent_success = i as u64;
            stats.value_sent = U256::from(i as u64 * 1_000);
        }
        result.stats_mut("").num_tx_received_success = 1;
        result
    }

    #[tokio::test]
    async fn test_persist_writes_every_address_and_summary() {
        let temp_dir = TempDir::new().unwrap();
        let store: Arc<dyn StatsStore> = Arc::new(RocksStatsStore::open(temp_dir.path()).unwrap());
        let result = result_with_addresses(37);

        let report = persist_result(store.clone(), &result, 4).await.unwrap();
        assert_eq!(report.written, 38);
        assert_eq!(report.duplicates, 0);
        assert!(report.run_written);

        let stored = store.get_run_address_stats(10, 20).unwrap();
        assert_eq!(stored.len(), 38);
        let key = format!("0x{:040x}", 5);
        assert_eq!(
            store.get_address_stats(10, 20, &key).unwrap(),
            Some(result.addresses[&key].clone())
        );
        let summary = store.get_run(10, 20).unwrap().unwrap();
        assert_eq!(summary.num_addresses, 38);
        assert_eq!(summary.totals.num_blocks, 11);
    }

    #[tokio::test]
    async fn test_second_persist_skips_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let store: Arc<dyn StatsStore> = Arc::new(RocksStatsStore::open(temp_dir.path()).unwrap());
        let result = result_with_addresses(5);

        persist_result(store.clone(), &result, 2).await.unwrap();
        let report = persist_result(store.clone(), &result, 2).await.unwrap();
        assert_eq!(report.written, 0);
        assert_eq!(report.duplicates, 6);
        assert!(!report.run_written);
    }

    #[test]
    fn test_store_if_absent_writes_once() {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksStatsStore::open(temp_dir.path()).unwrap();
        let result = result_with_addresses(1);
        let stats = &result.addresses[&format!("0x{:040x}", 1)];

        assert!(store_if_absent(&store, 10, 20, stats).unwrap());
        assert!(!store_if_absent(&store, 10, 20, stats).unwrap());
        // same address under another run is a separate record
        assert!(store_if_absent(&store, 10, 21, stats).unwrap());
    }
}
