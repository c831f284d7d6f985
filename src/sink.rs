//! # Sink — Thread-Safe Result Collection and Emission
//!
//! Collects [`Discovery`] values from workers and turns them into output
//! lines on an injected writer. Two modes, fixed per run:
//!
//! | Mode | `record` | `finish` |
//! |------|----------|----------|
//! | `Stream` | writes the line at once, under the writer lock | nothing left to emit |
//! | `Batch` | pushes into the worker's private buffer (no lock) | sorts the merged set by value, writes every line, then the worker start/completion lines, then the optional per-worker summary |
//!
//! Worker start and completion lines ([`WorkerEvent`]) follow the same rule:
//! written as they happen in stream mode, held until `finish` in batch mode.
//!
//! In stream mode each worker's own lines are in increasing order (it scans
//! its segment monotonically); lines of different workers interleave freely.
//! In batch mode the global order is strictly increasing regardless of
//! scheduling, because ordering comes from the post-join sort.
//!
//! ## Failures
//!
//! A write error is fatal for the run. The sink keeps the first I/O error,
//! refuses every later write, and the engine reports that error once all
//! workers have joined.

use crate::error::SearchError;
use crate::partition::Segment;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Display format for discovery and run timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Number of values shown per worker in the batch summary.
pub const PREVIEW_LEN: usize = 5;

pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// When discoveries are surfaced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Emit each discovery as it happens.
    #[default]
    Stream,
    /// Buffer, merge, sort and emit after all workers finish.
    Batch,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Stream => write!(f, "stream"),
            OutputMode::Batch => write!(f, "batch"),
        }
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stream" => Ok(OutputMode::Stream),
            "batch" => Ok(OutputMode::Batch),
            other => Err(format!("unknown output mode '{}'", other)),
        }
    }
}

/// A confirmed prime and where it came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Discovery {
    pub value: u64,
    /// Range worker id, or `None` for the cooperative coordinator.
    pub worker: Option<usize>,
    pub discovered_at: DateTime<Local>,
}

impl Discovery {
    pub fn new(value: u64, worker: Option<usize>) -> Self {
        Discovery {
            value,
            worker,
            discovered_at: Local::now(),
        }
    }
}

fn worker_label(worker: Option<usize>) -> String {
    match worker {
        Some(id) => id.to_string(),
        None => "main".to_string(),
    }
}

impl fmt::Display for Discovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Thread {} at {} found {}",
            worker_label(self.worker),
            format_timestamp(&self.discovered_at),
            self.value
        )
    }
}

/// Lifecycle of one worker's scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerEvent {
    Started {
        worker: Option<usize>,
        segment: Segment,
        at: DateTime<Local>,
    },
    Completed {
        worker: Option<usize>,
        at: DateTime<Local>,
        tested: u64,
        found: u64,
    },
}

impl WorkerEvent {
    pub fn started(worker: Option<usize>, segment: Segment) -> Self {
        WorkerEvent::Started {
            worker,
            segment,
            at: Local::now(),
        }
    }

    pub fn completed(worker: Option<usize>, tested: u64, found: u64) -> Self {
        WorkerEvent::Completed {
            worker,
            at: Local::now(),
            tested,
            found,
        }
    }

    pub fn worker(&self) -> Option<usize> {
        match self {
            WorkerEvent::Started { worker, .. } | WorkerEvent::Completed { worker, .. } => *worker,
        }
    }

    /// Batch ordering: by worker, start before completion.
    fn order_key(&self) -> (Option<usize>, bool) {
        (self.worker(), matches!(self, WorkerEvent::Completed { .. }))
    }
}

impl fmt::Display for WorkerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerEvent::Started {
                worker,
                segment,
                at,
            } => write!(
                f,
                "Worker {} started {} at {}",
                worker_label(*worker),
                segment,
                format_timestamp(at)
            ),
            WorkerEvent::Completed {
                worker,
                at,
                tested,
                found,
            } => write!(
                f,
                "Worker {} completed at {} (checked {}, found {})",
                worker_label(*worker),
                format_timestamp(at),
                tested,
                found
            ),
        }
    }
}

/// Per-worker tally for the batch report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub worker: Option<usize>,
    pub count: usize,
    /// First [`PREVIEW_LEN`] values in ascending order.
    pub preview: Vec<u64>,
}

impl fmt::Display for WorkerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview: Vec<String> = self.preview.iter().map(u64::to_string).collect();
        write!(
            f,
            "Worker {}: {} primes [{}]",
            worker_label(self.worker),
            self.count,
            preview.join(", ")
        )?;
        if self.count > self.preview.len() {
            write!(f, " and {} more", self.count - self.preview.len())?;
        }
        Ok(())
    }
}

/// Group a value-sorted result set by worker.
///
/// Every id in `workers` gets an entry, so idle workers show up with zero.
pub fn summarize<I>(sorted: &[Discovery], workers: I) -> Vec<WorkerSummary>
where
    I: IntoIterator<Item = Option<usize>>,
{
    let mut groups: BTreeMap<Option<usize>, WorkerSummary> = workers
        .into_iter()
        .map(|w| {
            (
                w,
                WorkerSummary {
                    worker: w,
                    count: 0,
                    preview: Vec::new(),
                },
            )
        })
        .collect();
    for d in sorted {
        let entry = groups.entry(d.worker).or_insert_with(|| WorkerSummary {
            worker: d.worker,
            count: 0,
            preview: Vec::new(),
        });
        entry.count += 1;
        if entry.preview.len() < PREVIEW_LEN {
            entry.preview.push(d.value);
        }
    }
    groups.into_values().collect()
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panicking worker is reported by the engine; the data itself stays valid
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ResultSink<'w> {
    mode: OutputMode,
    summary: bool,
    out: Mutex<&'w mut (dyn Write + Send)>,
    results: Mutex<Vec<Discovery>>,
    events: Mutex<Vec<WorkerEvent>>,
    failed: AtomicBool,
    first_failure: Mutex<Option<io::Error>>,
}

impl<'w> ResultSink<'w> {
    pub fn new(out: &'w mut (dyn Write + Send), mode: OutputMode, summary: bool) -> Self {
        ResultSink {
            mode,
            summary,
            out: Mutex::new(out),
            results: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            failed: AtomicBool::new(false),
            first_failure: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// The first write error of the run, if any.
    pub fn take_failure(&self) -> Option<io::Error> {
        lock(&self.first_failure).take()
    }

    /// Write one line under the writer lock.
    pub fn write_line(&self, line: fmt::Arguments<'_>) -> Result<(), SearchError> {
        if self.has_failed() {
            return Err(SearchError::Sink(io::Error::other(
                "result sink already failed",
            )));
        }
        let mut out = lock(&self.out);
        match writeln!(out, "{}", line) {
            Ok(()) => Ok(()),
            Err(e) => {
                drop(out);
                Err(self.fail(e))
            }
        }
    }

    pub fn flush(&self) -> Result<(), SearchError> {
        let mut out = lock(&self.out);
        match out.flush() {
            Ok(()) => Ok(()),
            Err(e) => {
                drop(out);
                Err(self.fail(e))
            }
        }
    }

    fn fail(&self, e: io::Error) -> SearchError {
        let copy = io::Error::new(e.kind(), e.to_string());
        let mut first = lock(&self.first_failure);
        if first.is_none() {
            *first = Some(e);
        }
        self.failed.store(true, Ordering::Release);
        SearchError::Sink(copy)
    }

    /// Hand a discovery to the sink from a worker. `local` is the worker's
    /// private buffer, only used in batch mode.
    pub fn record(&self, local: &mut Vec<Discovery>, discovery: Discovery) -> Result<(), SearchError> {
        match self.mode {
            OutputMode::Stream => self.write_line(format_args!("{}", discovery)),
            OutputMode::Batch => {
                local.push(discovery);
                Ok(())
            }
        }
    }

    /// Report a worker starting or finishing its scan.
    pub fn worker_event(&self, event: WorkerEvent) -> Result<(), SearchError> {
        match self.mode {
            OutputMode::Stream => self.write_line(format_args!("{}", event)),
            OutputMode::Batch => {
                lock(&self.events).push(event);
                Ok(())
            }
        }
    }

    /// Merge a finished worker's buffer into the shared result set.
    pub fn finish_worker(&self, local: Vec<Discovery>) {
        if self.mode == OutputMode::Batch && !local.is_empty() {
            lock(&self.results).extend(local);
        }
    }

    /// Final emission after the join. Batch mode sorts, writes every
    /// discovery once, then the worker lifecycle lines, then the summary
    /// when enabled, and returns the sorted set. Stream mode has nothing retained and returns it empty.
    pub fn finish<I>(&self, workers: I) -> Result<Vec<Discovery>, SearchError>
    where
        I: IntoIterator<Item = Option<usize>>,
    {
        if self.mode == OutputMode::Stream {
            return Ok(Vec::new());
        }
        let mut sorted = std::mem::take(&mut *lock(&self.results));
        sorted.sort_unstable_by_key(|d| d.value);
        for d in &sorted {
            self.write_line(format_args!("{}", d))?;
        }
        let mut events = std::mem::take(&mut *lock(&self.events));
        events.sort_by_key(WorkerEvent::order_key);
        for e in &events {
            self.write_line(format_args!("{}", e))?;
        }
        if self.summary {
            for s in summarize(&sorted, workers) {
                self.write_line(format_args!("{}", s))?;
            }
        }
        Ok(sorted)
    }
}
