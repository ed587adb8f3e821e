//! Concurrent block and receipt retrieval
//!
//! A producer task fills a bounded queue of heights; a fixed pool of workers
//! pulls heights, fetches the block and then each receipt in turn, and pushes
//! the finished `BlockRecord` into a bounded output channel. Blocks come out
//! in no particular order. The first fetch error aborts the whole pool.

use crate::config::AnalyzerConfig;
use crate::error::AnalysisError;
use crate::rpc::ChainClient;
use crate::types::BlockRecord;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub workers: usize,
    /// Capacity of the height work queue
    pub queue_capacity: usize,
    /// Capacity of the block output channel
    pub output_capacity: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            workers: 5,
            queue_capacity: 100,
            output_capacity: 100,
        }
    }
}

impl From<&AnalyzerConfig> for FetchOptions {
    fn from(config: &AnalyzerConfig) -> Self {
        Self {
            workers: config.workers,
            queue_capacity: config.block_channel_capacity,
            output_capacity: config.block_channel_capacity,
        }
    }
}

/// Fetch one block and the receipts of all its transactions.
///
/// Receipts the node does not know are left out of the map.
pub async fn fetch_block(chain: &dyn ChainClient, height: u64) -> Result<BlockRecord> {
    let block = chain.block_by_number(height).await?;

    let mut receipts = HashMap::with_capacity(block.transactions.len());
    for tx in &block.transactions {
        match chain.transaction_receipt(tx.hash).await? {
            Some(receipt) => {
                receipts.insert(tx.hash, receipt);
            }
            None => debug!(block = height, tx = ?tx.hash, "Receipt missing"),
        }
    }

    Ok(BlockRecord::new(block, receipts))
}

/// Start fetching `start..=end`.
///
/// Returns the block stream and a supervisor handle. The handle resolves to
/// `AnalysisError::Fetch` for the first failing height, after which the
/// stream closes early.
pub fn spawn_fetchers(
    chain: Arc<dyn ChainClient>,
    start: u64,
    end: u64,
    opts: FetchOptions,
) -> Result<(mpsc::Receiver<BlockRecord>, JoinHandle<Result<()>>)> {
    if start > end {
        return Err(AnalysisError::InvalidRange { start, end }.into());
    }

    let (height_tx, height_rx) = mpsc::channel::<u64>(opts.queue_capacity.max(1));
    let (block_tx, block_rx) = mpsc::channel::<BlockRecord>(opts.output_capacity.max(1));
    let queue = Arc::new(Mutex::new(height_rx));

    let producer = tokio::spawn(async move {
        for height in start..=end {
            if height_tx.send(height).await.is_err() {
                break;
            }
        }
    });

    let workers = opts.workers.max(1);
    let mut pool = JoinSet::new();
    for id in 0..workers {
        pool.spawn(fetch_worker(
            id,
            chain.clone(),
            queue.clone(),
            block_tx.clone(),
        ));
    }
    drop(block_tx);

    info!(start, end, workers, "Fetching blocks");

    let supervisor = tokio::spawn(async move {
        while let Some(joined) = pool.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(AnalysisError::WorkerPanicked(e.to_string()).into()),
            };
            if let Err(e) = outcome {
                warn!(error = %e, "Fetch failed, aborting remaining workers");
                pool.abort_all();
                producer.abort();
                return Err(e);
            }
        }
        // all workers drained the queue, so the producer is done too
        let _ = producer.await;
        Ok(())
    });

    Ok((block_rx, supervisor))
}

async fn fetch_worker(
    id: usize,
    chain: Arc<dyn ChainClient>,
    queue: Arc<Mutex<mpsc::Receiver<u64>>>,
    out: mpsc::Sender<BlockRecord>,
) -> Result<()> {
    let mut fetched = 0usize;
    loop {
        let next = queue.lock().await.recv().await;
        let Some(height) = next else {
            break;
        };

        let record = fetch_block(chain.as_ref(), height).await.map_err(|e| {
            anyhow::Error::from(AnalysisError::Fetch {
                height,
                reason: format!("{:#}", e),
            })
        })?;

        if out.send(record).await.is_err() {
            debug!(worker = id, "Block consumer gone, stopping");
            break;
        }
        fetched += 1;
    }
    debug!(worker = id, fetched, "Fetch worker finished");
    Ok(())
}
