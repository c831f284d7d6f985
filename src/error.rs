//! # Error — Run Failures
//!
//! Errors that abort a search run. Configuration file problems are reported
//! earlier through `anyhow` by the `config` module; everything here happens
//! once a `SearchConfig` exists.
//!
//! Degenerate partitions (more workers than candidates, empty divisor
//! ranges) are not errors: they produce empty segments that complete at once.

use std::io;

/// Fatal conditions for a search run.
#[derive(Debug)]
pub enum SearchError {
    /// The resolved configuration is unusable (e.g. zero workers).
    InvalidConfig(String),
    /// The output destination failed; partial output must not pass as complete.
    Sink(io::Error),
    /// A worker panicked while scanning. `None` is the cooperative
    /// coordinator (including a divisor task that unwound into it).
    WorkerPanicked { worker: Option<usize> },
    /// The worker pool could not be created.
    ThreadPool(String),
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchError::InvalidConfig(msg) => write!(f, "invalid search configuration: {}", msg),
            SearchError::Sink(e) => write!(f, "result sink failed: {}", e),
            SearchError::WorkerPanicked { worker: Some(id) } => write!(f, "worker {} panicked", id),
            SearchError::WorkerPanicked { worker: None } => write!(f, "worker main panicked"),
            SearchError::ThreadPool(msg) => write!(f, "could not build worker pool: {}", msg),
        }
    }
}

impl std::error::Error for SearchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SearchError::Sink(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SearchError {
    fn from(e: io::Error) -> Self {
        SearchError::Sink(e)
    }
}

impl From<rayon::ThreadPoolBuildError> for SearchError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        SearchError::ThreadPool(e.to_string())
    }
}
