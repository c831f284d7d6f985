//! # Config — Run Configuration
//!
//! Reads the key/value run file (TOML) and resolves it into an immutable
//! [`SearchConfig`]. Parsing and validation problems surface as `anyhow`
//! errors naming the offending key, before any worker exists.
//!
//! ```toml
//! thread_count = 4
//! upper_limit = "2^20"   # or a plain integer
//! strategy = "stride"    # optional: contiguous | stride | cooperative
//! mode = "batch"         # optional: stream | batch
//! summary = true         # optional, batch mode only
//! ```
//!
//! `upper_limit` may be a TOML integer, a decimal string, or `2^<exp>`.
//! TOML integers stop at `i64::MAX`, so the string forms are the only way
//! to reach the top of the `u64` range; `2^64` maps to `u64::MAX`.
//!
//! ## Plain Key/Value Files
//!
//! The older `config.txt` layout is read as well:
//!
//! ```text
//! # search settings
//! Threads = 4
//! Max Value = 2^20
//! ```
//!
//! One `Key = Value` per line, `#` comments, surrounding whitespace ignored.
//! `Threads` maps to `thread_count`, `Max Value` to `upper_limit`; other keys
//! are skipped with a warning. [`load`] uses this reader for `.txt` paths and
//! as a fallback when a file is not valid TOML.

use crate::engine::Strategy;
use crate::error::SearchError;
use crate::sink::OutputMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Run files tried in order when no path is given.
pub const DEFAULT_PATHS: [&str; 2] = ["config.toml", "config.txt"];

/// Resolved, validated run parameters. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchConfig {
    worker_count: usize,
    upper_limit: u64,
}

impl SearchConfig {
    pub fn new(worker_count: usize, upper_limit: u64) -> Result<Self, SearchError> {
        if worker_count == 0 {
            return Err(SearchError::InvalidConfig(
                "worker_count must be at least 1".into(),
            ));
        }
        Ok(SearchConfig {
            worker_count,
            upper_limit,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn upper_limit(&self) -> u64 {
        self.upper_limit
    }
}

/// `upper_limit` as written in the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LimitValue {
    Number(u64),
    Text(String),
}

impl LimitValue {
    pub fn resolve(&self) -> Result<u64> {
        match self {
            LimitValue::Number(n) => Ok(*n),
            LimitValue::Text(s) => parse_limit(s),
        }
    }
}

/// Parse a limit written as a decimal literal or as `2^<exp>`.
///
/// Underscore digit separators are accepted (`1_000_000`).
pub fn parse_limit(text: &str) -> Result<u64> {
    let text = text.trim();
    if let Some(exp) = text.strip_prefix("2^") {
        let exp: u32 = exp
            .trim()
            .parse()
            .with_context(|| format!("invalid exponent in upper_limit '{}'", text))?;
        return match exp {
            0..=63 => Ok(1u64 << exp),
            64 => Ok(u64::MAX),
            _ => anyhow::bail!("upper_limit '{}' exceeds the 64-bit range", text),
        };
    }
    let digits: String = text.chars().filter(|&c| c != '_').collect();
    digits
        .parse()
        .with_context(|| format!("invalid upper_limit '{}'", text))
}

/// Raw contents of a run file. Every key is optional here; missing required
/// keys are reported by [`ConfigFile::search_config`], after CLI overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub thread_count: Option<usize>,
    pub upper_limit: Option<LimitValue>,
    pub strategy: Option<Strategy>,
    pub mode: Option<OutputMode>,
    pub summary: Option<bool>,
}

impl ConfigFile {
    /// Take every key set in `other` over the values of `self`.
    pub fn overlay(self, other: ConfigFile) -> ConfigFile {
        ConfigFile {
            thread_count: other.thread_count.or(self.thread_count),
            upper_limit: other.upper_limit.or(self.upper_limit),
            strategy: other.strategy.or(self.strategy),
            mode: other.mode.or(self.mode),
            summary: other.summary.or(self.summary),
        }
    }

    pub fn search_config(&self) -> Result<SearchConfig> {
        let threads = self
            .thread_count
            .ok_or_else(|| anyhow::anyhow!("thread_count is required"))?;
        let limit = self
            .upper_limit
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("upper_limit is required"))?
            .resolve()?;
        Ok(SearchConfig::new(threads, limit)?)
    }
}

/// Parse a run file from a TOML string.
pub fn parse_toml(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Parse a plain `Key = Value` run file.
pub fn parse_key_value(content: &str) -> Result<ConfigFile> {
    let mut config = ConfigFile::default();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        match key {
            "Threads" => {
                let threads = value.parse().with_context(|| {
                    format!("line {}: invalid Threads value '{}'", index + 1, value)
                })?;
                config.thread_count = Some(threads);
            }
            "Max Value" => config.upper_limit = Some(LimitValue::Text(value.to_string())),
            other => warn!(key = other, line = index + 1, "ignoring unknown config key"),
        }
    }
    validate(&config)?;
    Ok(config)
}

/// Parse a run file from disk.
///
/// `.txt` files are read as plain key/value. Anything else is read as TOML;
/// if that fails and the plain reader finds at least one known key, its
/// result is used, otherwise the TOML error is returned.
pub fn load(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    let plain = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
    let parsed = if plain {
        parse_key_value(&content)
    } else {
        parse_toml(&content).or_else(|toml_err| match parse_key_value(&content) {
            Ok(config) if config != ConfigFile::default() => Ok(config),
            _ => Err(toml_err),
        })
    };
    parsed.with_context(|| format!("invalid config file {}", path.display()))
}

/// First of [`DEFAULT_PATHS`] that exists in the working directory.
pub fn find_default() -> Option<PathBuf> {
    DEFAULT_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn validate(config: &ConfigFile) -> Result<()> {
    if config.thread_count == Some(0) {
        anyhow::bail!("thread_count must be a positive integer");
    }
    if let Some(limit) = &config.upper_limit {
        limit.resolve()?;
    }
    Ok(())
}
