//! Timestamp to block height locator
//!
//! Finds the first block whose timestamp is at or after a target. Starts from
//! a linear estimate off a reference block, takes large proportional steps
//! while far away, then walks single blocks once within a minute of the target.

use crate::error::AnalysisError;
use crate::rpc::ChainClient;
use crate::types::Header;
use anyhow::Result;
use std::collections::VecDeque;
use tracing::debug;

/// Assumed average block interval in seconds
pub const AVG_BLOCK_INTERVAL_SECS: i64 = 13;

/// Distance (seconds) under which the locator walks block by block
const FINE_SEARCH_WINDOW_SECS: i64 = 60;

/// Number of recent deltas remembered for cycle detection
const DELTA_HISTORY: usize = 6;

/// Fixed-capacity history of recent deltas.
struct DeltaRing {
    deltas: VecDeque<i64>,
}

impl DeltaRing {
    fn new() -> Self {
        Self {
            deltas: VecDeque::with_capacity(DELTA_HISTORY),
        }
    }

    /// Record `delta`, returning true if it was already present.
    fn push(&mut self, delta: i64) -> bool {
        let seen = self.deltas.contains(&delta);
        if self.deltas.len() == DELTA_HISTORY {
            self.deltas.pop_front();
        }
        self.deltas.push_back(delta);
        seen
    }
}

/// Locates block heights by timestamp.
pub struct BlockLocator<'a> {
    chain: &'a dyn ChainClient,
    reference: Option<Header>,
}

impl<'a> BlockLocator<'a> {
    /// Locator that uses the chain head as its reference point.
    pub fn new(chain: &'a dyn ChainClient) -> Self {
        Self {
            chain,
            reference: None,
        }
    }

    /// Locator with a fixed reference (known height and timestamp).
    pub fn with_reference(chain: &'a dyn ChainClient, height: u64, timestamp: u64) -> Self {
        Self {
            chain,
            reference: Some(Header {
                number: height,
                timestamp,
            }),
        }
    }

    /// Height of the first block with `timestamp >= target`.
    pub async fn locate_block_at_or_after(&self, target: u64) -> Result<u64> {
        self.search(target).await.map_err(|e| {
            anyhow::Error::from(AnalysisError::Locate {
                target,
                reason: format!("{:#}", e),
            })
        })
    }

    async fn search(&self, target: u64) -> Result<u64> {
        let reference = match self.reference {
            Some(h) => h,
            None => self.chain.latest_header().await?,
        };

        let target = target as i64;
        let secs_back = reference.timestamp as i64 - target;
        let mut estimate = (reference.number as i64 - secs_back / AVG_BLOCK_INTERVAL_SECS).max(0);
        let mut divisor = AVG_BLOCK_INTERVAL_SECS;
        let mut history = DeltaRing::new();
        // highest height seen before the target, lowest seen at or after it
        let mut below: Option<i64> = None;
        let mut above: Option<i64> = None;

        loop {
            let header = self.chain.header_by_number(estimate as u64).await?;
            let delta = header.timestamp as i64 - target;
            debug!(height = estimate, delta, divisor, "Locator step");

            if delta < 0 {
                below = Some(below.map_or(estimate, |b| b.max(estimate)));
            } else {
                if estimate == 0 {
                    return Ok(0);
                }
                above = Some(above.map_or(estimate, |a| a.min(estimate)));
            }
            if let (Some(lo), Some(hi)) = (below, above) {
                if hi == lo + 1 {
                    return Ok(hi as u64);
                }
            }

            let next = if delta.abs() < FINE_SEARCH_WINDOW_SECS {
                if delta < 0 {
                    estimate + 1
                } else {
                    estimate - 1
                }
            } else {
                if history.push(delta) {
                    divisor += 1;
                    debug!(divisor, "Locator revisited a delta, damping step");
                }
                let mut step = delta / divisor;
                if step == 0 {
                    step = delta.signum();
                }
                estimate - step
            };

            // keep every probe strictly inside the bracket
            let mut next = next.max(0);
            if let Some(lo) = below {
                next = next.max(lo + 1);
            }
            if let Some(hi) = above {
                next = next.min(hi - 1);
            }
            estimate = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockChain;

    const GENESIS: u64 = 1_600_000_000;

    #[tokio::test]
    async fn test_exact_timestamp_returns_that_block() {
        let chain = MockChain::with_regular_headers(10_000, GENESIS, 13);
        let locator = BlockLocator::new(&chain);
        let target = GENESIS + 4_321 * 13;
        assert_eq!(locator.locate_block_at_or_after(target).await.unwrap(), 4_321);
        // linear estimate lands on the block, then one step each side
        assert!(chain.header_calls() <= 3);
    }

    #[tokio::test]
    async fn test_between_blocks_returns_next_block() {
        let chain = MockChain::with_regular_headers(10_000, GENESIS, 13);
        let locator = BlockLocator::new(&chain);
        let target = GENESIS + 4_321 * 13 + 1;
        assert_eq!(locator.locate_block_at_or_after(target).await.unwrap(), 4_322);
    }

    #[tokio::test]
    async fn test_irregular_intervals_converge() {
        // Blocks every 12s, but the locator assumes 13s.
        let chain = MockChain::with_regular_headers(50_000, GENESIS, 12);
        let locator = BlockLocator::with_reference(&chain, 50_000, GENESIS + 50_000 * 12);
        let target = GENESIS + 1_000 * 12 + 5;
        assert_eq!(locator.locate_block_at_or_after(target).await.unwrap(), 1_001);
    }

    #[tokio::test]
    async fn test_target_before_genesis_returns_zero() {
        let chain = MockChain::with_regular_headers(100, GENESIS, 13);
        let locator = BlockLocator::new(&chain);
        assert_eq!(locator.locate_block_at_or_after(GENESIS - 10).await.unwrap(), 0);
        assert_eq!(locator.locate_block_at_or_after(GENESIS - 100_000).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_header_failure_is_locate_error() {
        let chain = MockChain::new();
        let locator = BlockLocator::with_reference(&chain, 1_000, GENESIS);
        let err = locator.locate_block_at_or_after(GENESIS).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::Locate { .. })
        ));
    }

    #[tokio::test]
    async fn test_slow_block_before_target() {
        // 13s blocks, except block 500 arrives 80s after block 499
        let mut chain = MockChain::new();
        for n in 0..=1_000u64 {
            let ts = if n < 500 { GENESIS + n * 13 } else { GENESIS + 499 * 13 + 80 + (n - 500) * 13 };
            chain.add_block(crate::testutil::block(n, ts, vec![]));
        }
        let head_ts = GENESIS + 499 * 13 + 80 + 500 * 13;
        let locator = BlockLocator::with_reference(&chain, 1_000, head_ts);

        let block_500 = GENESIS + 499 * 13 + 80;
        assert_eq!(locator.locate_block_at_or_after(block_500 - 10).await.unwrap(), 500);
        assert_eq!(locator.locate_block_at_or_after(block_500 - 70).await.unwrap(), 500);
        assert_eq!(locator.locate_block_at_or_after(block_500).await.unwrap(), 500);
        assert!(chain.header_calls() < 100);
    }

    #[tokio::test]
    async fn test_gaps_everywhere_still_terminate() {
        // alternating 1s and 90s intervals
        let mut chain = MockChain::new();
        let mut ts = GENESIS;
        for n in 0..=2_000u64 {
            chain.add_block(crate::testutil::block(n, ts, vec![]));
            ts += if n % 2 == 0 { 1 } else { 90 };
        }
        let locator = BlockLocator::with_reference(&chain, 2_000, ts - 1);
        // block 1001 at GENESIS + 500 * 91 + 1, block 1002 ninety seconds later
        let target = GENESIS + 500 * 91 + 30;
        assert_eq!(locator.locate_block_at_or_after(target).await.unwrap(), 1_002);
    }

    #[test]
    fn test_delta_ring_detects_repeats_within_capacity() {
        let mut ring = DeltaRing::new();
        for d in 0..DELTA_HISTORY as i64 {
            assert!(!ring.push(d));
        }
        assert!(ring.push(3));
        // 0 was evicted by the pushes above
        assert!(!ring.push(0));
    }
}
