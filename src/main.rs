//! # Main — CLI Entry Point
//!
//! Parses arguments, sets up logging, and hands off to [`cli::run_search`].
//!
//! ## Options
//!
//! - `--config` / `PRIMESCAN_CONFIG`: run file, TOML (`thread_count`,
//!   `upper_limit`, optional `strategy`, `mode`, `summary`) or plain
//!   `Threads = N` / `Max Value = 2^N` lines. Defaults to the first of
//!   `config.toml`, `config.txt` in the working directory.
//! - `--threads`, `--limit`: override the file; with both given the file may
//!   be absent.
//! - `--strategy`, `--mode`, `--summary`: override the file.
//! - `--progress-secs`: periodic progress log while the search runs.
//! - `--report`: write the run report as JSON.
//! - `--verify`: cross-check the result against the reference sieve.
//!
//! Result lines go to stdout; logs go to stderr (`LOG_FORMAT=json` for JSON,
//! `RUST_LOG` to filter).

mod cli;

use anyhow::Result;
use clap::Parser;
use primescan::{OutputMode, Strategy};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "primescan", about = "Enumerate primes with a pool of worker threads")]
struct Cli {
    /// Run configuration file (default: config.toml, then config.txt)
    #[arg(long, env = "PRIMESCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Worker thread count (overrides thread_count)
    #[arg(long)]
    threads: Option<usize>,

    /// Inclusive upper limit: an integer or 2^N (overrides upper_limit)
    #[arg(long)]
    limit: Option<String>,

    /// How candidates are split: contiguous, stride or cooperative
    #[arg(long)]
    strategy: Option<Strategy>,

    /// Output mode: stream (as found) or batch (sorted after join)
    #[arg(long)]
    mode: Option<OutputMode>,

    /// Print a per-worker summary after the batch listing
    #[arg(long)]
    summary: bool,

    /// Log search progress every N seconds
    #[arg(long)]
    progress_secs: Option<u64>,

    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Cross-check the found primes against the reference sieve
    #[arg(long)]
    verify: bool,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    cli::run_search(&cli)
}
