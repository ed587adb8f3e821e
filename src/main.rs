//! blockstats - block range statistics over Ethereum JSON-RPC
//!
//! Fetches a range of blocks with their receipts, aggregates per-address and
//! network-wide counters, and prints ranked views as pretty JSON. Logs go to
//! stderr; set `RUST_LOG` to adjust verbosity.

use blockstats::cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
