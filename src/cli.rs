//! CLI implementation for blockstats
//!
//! `analyze` runs the pipeline over a block or time range; `runs` and
//! `show-run` read back what earlier runs persisted. All commands output
//! pretty JSON.

use crate::cache::AddressCache;
use crate::config::{load_datasets, AnalyzerConfig};
use crate::persist::persist_result;
use crate::pipeline::Analyzer;
use crate::records::address_key;
use crate::rpc::RpcClient;
use crate::store::{RocksStatsStore, StatsStore};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Block range statistics tool
#[derive(Parser, Debug)]
#[command(name = "blockstats")]
#[command(about = "Aggregate transaction statistics over a range of Ethereum blocks")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyse a block range (by height or by time)
    Analyze(AnalyzeArgs),
    /// List persisted runs
    Runs {
        /// Path to the RocksDB database directory
        #[arg(short, long, default_value = "./stats_db")]
        db_path: PathBuf,
    },
    /// Show the stored address stats of one run
    ShowRun {
        #[arg(short, long, default_value = "./stats_db")]
        db_path: PathBuf,
        /// First block of the run
        start: u64,
        /// Last block of the run
        end: u64,
        /// Only this address (hex, with or without 0x prefix)
        #[arg(short, long)]
        address: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// RPC endpoint URL
    #[arg(short, long, default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// First block (inclusive)
    #[arg(long, requires = "to_block")]
    from_block: Option<u64>,

    /// Last block (inclusive)
    #[arg(long, requires = "from_block")]
    to_block: Option<u64>,

    /// Start of the time window (unix seconds, inclusive)
    #[arg(long, requires = "to_time", conflicts_with_all = ["from_block", "to_block"])]
    from_time: Option<u64>,

    /// End of the time window (unix seconds, exclusive)
    #[arg(long, requires = "from_time", conflicts_with_all = ["from_block", "to_block"])]
    to_time: Option<u64>,

    /// Curated address dataset (JSON)
    #[arg(long)]
    addresses: Option<PathBuf>,

    /// Curated token dataset (JSON)
    #[arg(long)]
    tokens: Option<PathBuf>,

    /// Classify from the datasets only, never probe the chain
    #[arg(long)]
    low_api: bool,

    /// Block fetch workers
    #[arg(long, default_value_t = 5)]
    workers: usize,

    /// Entries per ranked address view
    #[arg(long, default_value_t = 25)]
    top_n: usize,

    /// Entries for the large ranked views
    #[arg(long, default_value_t = 100)]
    top_n_large: usize,

    /// Entries per top-transaction list
    #[arg(long, default_value_t = 20)]
    top_tx: usize,

    /// Persist the run into this RocksDB directory
    #[arg(short, long)]
    db_path: Option<PathBuf>,

    /// Persistence workers
    #[arg(long, default_value_t = 10)]
    persist_workers: usize,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Requested range, before any timestamp lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeRequest {
    Blocks { from: u64, to: u64 },
    Times { from: u64, to: u64 },
}

impl AnalyzeArgs {
    fn range(&self) -> Result<RangeRequest> {
        match (self.from_block, self.to_block, self.from_time, self.to_time) {
            (Some(from), Some(to), None, None) => Ok(RangeRequest::Blocks { from, to }),
            (None, None, Some(from), Some(to)) => Ok(RangeRequest::Times { from, to }),
            _ => anyhow::bail!(
                "Specify either --from-block/--to-block or --from-time/--to-time"
            ),
        }
    }

    fn config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            rpc_url: self.rpc_url.clone(),
            workers: self.workers,
            top_n: self.top_n,
            top_n_large: self.top_n_large,
            top_tx: self.top_tx,
            low_api: self.low_api,
            persist_workers: self.persist_workers,
            ..Default::default()
        }
    }
}

/// Run the CLI command and print JSON output.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => analyze(args).await,
        Commands::Runs { db_path } => {
            let store = open_store(&db_path)?;
            let runs = store.list_runs()?;
            write_json(&json!({ "runs": runs }), None)
        }
        Commands::ShowRun {
            db_path,
            start,
            end,
            address,
        } => {
            let store = open_store(&db_path)?;
            let value = match address {
                Some(address) => {
                    let key = parse_address_key(&address)?;
                    json!({
                        "start_block": start,
                        "end_block": end,
                        "address": key,
                        "stats": store.get_address_stats(start, end, &key)?,
                    })
                }
                None => json!({
                    "run": store.get_run(start, end)?,
                    "addresses": store.get_run_address_stats(start, end)?,
                }),
            };
            write_json(&value, None)
        }
    }
}

async fn analyze(args: AnalyzeArgs) -> Result<()> {
    let config = args.config();
    let range = args.range()?;

    let datasets = load_datasets(args.addresses.as_deref(), args.tokens.as_deref())
        .context("Failed to load address datasets")?;
    info!("Loaded {} known addresses", datasets.len());

    info!("RPC URL: {}", config.rpc_url);
    let chain = Arc::new(RpcClient::new(config.rpc_url.clone()));
    let cache = Arc::new(AddressCache::with_entries(datasets));
    let persist_workers = config.persist_workers;
    let analyzer = Analyzer::new(chain, cache, config);

    let (start, end) = match range {
        RangeRequest::Blocks { from, to } => (from, to),
        RangeRequest::Times { from, to } => analyzer
            .resolve_time_range(from, to)
            .await
            .context("Failed to resolve time range")?,
    };

    let result = analyzer.run(start, end).await?;

    if let Some(db_path) = &args.db_path {
        let store: Arc<dyn StatsStore> = Arc::new(open_store(db_path)?);
        persist_result(store, &result, persist_workers)
            .await
            .context("Failed to persist run")?;
    }

    write_json(&result, args.output.as_deref())
}

fn open_store(db_path: &Path) -> Result<RocksStatsStore> {
    RocksStatsStore::open(db_path)
        .with_context(|| format!("Failed to open database at {:?}", db_path))
}

/// Canonical key for a user-supplied address.
fn parse_address_key(s: &str) -> Result<String> {
    let bytes = crate::types::decode_hex(s.trim())
        .with_context(|| format!("Invalid hex address: {}", s))?;
    if bytes.len() != 20 {
        anyhow::bail!("Address must be 20 bytes (40 hex chars), got {} bytes", bytes.len());
    }
    Ok(address_key(&Address::from_slice(&bytes)))
}

/// Pretty-print `value` to `output`, or stdout when absent.
fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write report to {:?}", path))?;
            info!("Report written to {:?}", path);
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::AnalysisResult;
    use tempfile::TempDir;

    fn analyze_args(argv: &[&str]) -> AnalyzeArgs {
        let mut full = vec!["blockstats", "analyze"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Analyze(args) => args,
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_block_range_args() {
        let args = analyze_args(&["--from-block", "100", "--to-block", "200", "--low-api"]);
        assert_eq!(args.range().unwrap(), RangeRequest::Blocks { from: 100, to: 200 });
        let config = args.config();
        assert!(!config.allow_chain_queries());
        assert_eq!(config.workers, 5);
        assert_eq!(config.top_n, 25);
        assert_eq!(config.top_n_large, 100);
        assert_eq!(config.block_channel_capacity, 100);
    }

    #[test]
    fn test_time_range_args() {
        let args = analyze_args(&[
            "--from-time",
            "1700000000",
            "--to-time",
            "1700003600",
            "--top-n",
            "10",
        ]);
        assert_eq!(
            args.range().unwrap(),
            RangeRequest::Times {
                from: 1_700_000_000,
                to: 1_700_003_600
            }
        );
        assert_eq!(args.config().top_n, 10);
    }

    #[test]
    fn test_range_required() {
        let args = analyze_args(&[]);
        assert!(args.range().is_err());
    }

    #[test]
    fn test_mixed_range_rejected_by_parser() {
        let argv = [
            "blockstats",
            "analyze",
            "--from-block",
            "1",
            "--to-block",
            "2",
            "--from-time",
            "3",
            "--to-time",
            "4",
        ];
        assert!(Cli::try_parse_from(argv).is_err());
        assert!(Cli::try_parse_from(["blockstats", "analyze", "--from-block", "1"]).is_err());
    }

    #[test]
    fn test_parse_address_key() {
        let key = parse_address_key("0xDAC17F958D2ee523a2206206994597C13D831ec7").unwrap();
        assert_eq!(key, "0xdac17f958d2ee523a2206206994597c13d831ec7");
        assert!(parse_address_key("0x1234").is_err());
    }

    #[test]
    fn test_write_json_to_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.json");
        let result = AnalysisResult::new(7, 9, 3);

        write_json(&result, Some(&path)).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["start_block"], 7);
        assert_eq!(value["end_block"], 9);
    }
}
