//! Analysis run orchestration
//!
//! Wires the locator, fetcher pool, aggregator and ranking engine together
//! for one block range.

use crate::aggregator::Aggregator;
use crate::cache::AddressCache;
use crate::config::AnalyzerConfig;
use crate::error::AnalysisError;
use crate::fetcher::{spawn_fetchers, FetchOptions};
use crate::locator::BlockLocator;
use crate::ranking::finalize;
use crate::records::AnalysisResult;
use crate::rpc::ChainClient;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Runs analyses against one chain with one shared classification cache.
pub struct Analyzer {
    chain: Arc<dyn ChainClient>,
    cache: Arc<AddressCache>,
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(chain: Arc<dyn ChainClient>, cache: Arc<AddressCache>, config: AnalyzerConfig) -> Self {
        Self {
            chain,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<AddressCache> {
        &self.cache
    }

    /// Convert a `[from_ts, to_ts)` time window to an inclusive block range.
    pub async fn resolve_time_range(&self, from_ts: u64, to_ts: u64) -> Result<(u64, u64)> {
        let locator = BlockLocator::new(self.chain.as_ref());
        let start = locator.locate_block_at_or_after(from_ts).await?;
        let end_exclusive = locator.locate_block_at_or_after(to_ts).await?;
        if end_exclusive <= start {
            return Err(AnalysisError::InvalidRange {
                start,
                end: end_exclusive,
            }
            .into());
        }
        info!(
            "Time range {}..{} resolved to blocks {}..={}",
            from_ts,
            to_ts,
            start,
            end_exclusive - 1
        );
        Ok((start, end_exclusive - 1))
    }

    /// Analyse blocks `start..=end`.
    ///
    /// A fetch failure aborts the run and nothing aggregated so far is returned.
    pub async fn run(&self, start: u64, end: u64) -> Result<AnalysisResult> {
        info!("Analysing blocks {} to {}", start, end);

        let (blocks, fetch_handle) = spawn_fetchers(
            self.chain.clone(),
            start,
            end,
            FetchOptions::from(&self.config),
        )?;

        let aggregator = Aggregator::new(
            AnalysisResult::new(start, end, self.config.top_tx),
            self.cache.clone(),
            self.chain.clone(),
            self.config.allow_chain_queries(),
        );
        let aggregate_handle = tokio::spawn(aggregator.consume(blocks));

        let fetched = fetch_handle
            .await
            .map_err(|e| AnalysisError::WorkerPanicked(e.to_string()))?;
        if let Err(e) = fetched {
            warn!("Run {}..={} aborted, discarding partial results", start, end);
            aggregate_handle.abort();
            return Err(e);
        }

        let mut result = aggregate_handle
            .await
            .map_err(|e| AnalysisError::WorkerPanicked(e.to_string()))
            .context("Aggregator task failed")?;

        finalize(&mut result, &self.cache, self.chain.as_ref(), &self.config).await;

        info!(
            "Run complete: {} blocks, {} transactions, {} addresses, {} tagged, {} classifications cached",
            result.totals.num_blocks,
            result.totals.num_transactions,
            result.addresses.len(),
            result.tagged_transactions.len(),
            self.cache.len()
        );
        Ok(result)
    }
}
