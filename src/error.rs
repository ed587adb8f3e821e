//! Run-level errors
//!
//! Failures that abort an analysis run. They travel inside `anyhow::Error`
//! and can be recovered with `downcast_ref::<AnalysisError>()`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("failed to locate block for timestamp {target}: {reason}")]
    Locate { target: u64, reason: String },

    #[error("failed to fetch block {height}: {reason}")]
    Fetch { height: u64, reason: String },

    #[error("worker task failed: {0}")]
    WorkerPanicked(String),

    #[error("invalid block range {start}..={end}")]
    InvalidRange { start: u64, end: u64 },
}
