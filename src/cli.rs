//! # CLI Execution
//!
//! Resolves the run configuration (file overlaid with flags), runs the
//! engine against stdout, then handles the optional report and sieve
//! verification.

use anyhow::{Context, Result};
use primescan::config::{self, ConfigFile, LimitValue};
use primescan::sieve;
use primescan::{OutputMode, RunReport, SearchEngine, SearchOptions};
use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::Cli;

/// Load the config file and apply command-line overrides.
///
/// Without `--config` the default paths are tried in order. The file is
/// skipped when it does not exist and the flags already supply both
/// required keys.
fn resolve_config(cli: &Cli) -> Result<ConfigFile> {
    let overrides = ConfigFile {
        thread_count: cli.threads,
        upper_limit: cli.limit.clone().map(LimitValue::Text),
        strategy: cli.strategy,
        mode: cli.mode,
        summary: cli.summary.then_some(true),
    };
    let self_sufficient = overrides.thread_count.is_some() && overrides.upper_limit.is_some();
    let file = match cli.config.clone().or_else(config::find_default) {
        Some(path) if self_sufficient && !path.exists() => ConfigFile::default(),
        Some(path) => {
            debug!(path = %path.display(), "loading run configuration");
            config::load(&path)?
        }
        None if self_sufficient => ConfigFile::default(),
        None => anyhow::bail!(
            "no config file found (tried {}); pass --config, or --threads and --limit",
            config::DEFAULT_PATHS.join(", ")
        ),
    };
    Ok(file.overlay(overrides))
}

pub fn run_search(cli: &Cli) -> Result<()> {
    let file = resolve_config(cli)?;
    let search_config = file.search_config().context("invalid run configuration")?;
    let options = SearchOptions {
        strategy: file.strategy.unwrap_or_default(),
        mode: file.mode.unwrap_or_default(),
        summary: file.summary.unwrap_or(false),
        progress_interval: cli.progress_secs.filter(|&s| s > 0).map(Duration::from_secs),
    };

    let engine = SearchEngine::new(search_config, options);
    let mut stdout = io::stdout();
    let report = engine.run(&mut stdout)?;

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("cannot write report {}", path.display()))?;
        info!(path = %path.display(), "run report written");
    }

    if cli.verify {
        verify_against_sieve(&report)?;
    }
    Ok(())
}

/// Compare a finished run with the reference sieve. Batch runs compare the
/// full value list; stream runs retain no values and compare counts.
fn verify_against_sieve(report: &RunReport) -> Result<()> {
    if report.upper_limit > sieve::VERIFY_LIMIT {
        warn!(
            limit = report.upper_limit,
            max = sieve::VERIFY_LIMIT,
            "limit too large for sieve verification, skipping"
        );
        return Ok(());
    }
    let expected = sieve::generate_primes(report.upper_limit);
    match report.mode {
        OutputMode::Batch => {
            if report.primes != expected {
                let first_diff = report
                    .primes
                    .iter()
                    .zip(&expected)
                    .position(|(a, b)| a != b)
                    .unwrap_or_else(|| report.primes.len().min(expected.len()));
                anyhow::bail!(
                    "verification failed: {} primes found, sieve has {} (first difference at index {})",
                    report.primes.len(),
                    expected.len(),
                    first_diff
                );
            }
        }
        OutputMode::Stream => {
            if report.found != expected.len() as u64 {
                anyhow::bail!(
                    "verification failed: {} primes found, sieve has {}",
                    report.found,
                    expected.len()
                );
            }
        }
    }
    info!(primes = expected.len(), "verified against sieve");
    Ok(())
}
