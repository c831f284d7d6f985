//! # Engine — Search Orchestration
//!
//! Drives one search run through a fixed state machine:
//!
//! ```text
//! Configured → Partitioned → Running → Joined → Reported
//! ```
//!
//! - **Configured**: a fresh [`RunContext`] (sink, counters, clock) exists and
//!   the start line is written. Nothing survives from earlier runs.
//! - **Partitioned**: range strategies build a [`PartitionPlan`] with one
//!   segment per worker. The cooperative strategy has no plan; it
//!   partitions divisors per candidate instead.
//! - **Running**: range strategies run one pool task per segment; the
//!   cooperative strategy walks the candidates on the calling thread and
//!   races the pool over each candidate's divisors.
//! - **Joined**: every task has returned. There is no timeout: the work is
//!   CPU-bound and finite.
//! - **Reported**: the sink's final emission (sort + lines + summary in batch
//!   mode), the end and elapsed lines, and the returned [`RunReport`].
//!
//! ## Failure Policy
//!
//! Range worker tasks and the cooperative coordinator both run under
//! `catch_unwind`; a divisor task that panics unwinds into the coordinator
//! and is caught there. After the join, a sink failure is reported first
//! (with the original I/O error); otherwise the failure of the lowest worker
//! id is returned.
//!
//! ## Worker Lines
//!
//! Every worker reports `Worker <id> started <segment> at <ts>` before its
//! scan and `Worker <id> completed at <ts> (checked T, found F)` after it.
//! The cooperative coordinator reports as `main` over `[2, limit]`.

use crate::config::SearchConfig;
use crate::cooperative::CooperativeTester;
use crate::error::SearchError;
use crate::is_prime;
use crate::partition::{partition, PartitionPlan, Segment, SplitPolicy};
use crate::progress::{Progress, TestedBatch};
use crate::sink::{
    format_timestamp, summarize, Discovery, OutputMode, ResultSink, WorkerEvent, WorkerSummary,
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// How candidates are distributed among workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Independent workers over contiguous blocks of `[2, limit]`.
    #[default]
    Contiguous,
    /// Independent workers over round-robin residue classes.
    Stride,
    /// Candidates in order; each candidate's divisors split across workers.
    Cooperative,
}

impl Strategy {
    /// Range partition policy, or `None` for cooperative testing.
    pub fn split_policy(&self) -> Option<SplitPolicy> {
        match self {
            Strategy::Contiguous => Some(SplitPolicy::Contiguous),
            Strategy::Stride => Some(SplitPolicy::Stride),
            Strategy::Cooperative => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Contiguous => write!(f, "contiguous"),
            Strategy::Stride => write!(f, "stride"),
            Strategy::Cooperative => write!(f, "cooperative"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "contiguous" => Ok(Strategy::Contiguous),
            "stride" => Ok(Strategy::Stride),
            "cooperative" => Ok(Strategy::Cooperative),
            other => Err(format!(
                "unknown strategy '{}' (expected contiguous, stride or cooperative)",
                other
            )),
        }
    }
}

/// Per-run choices besides the configuration itself.
#[derive(Clone, Debug, Default)]
pub struct SearchOptions {
    pub strategy: Strategy,
    pub mode: OutputMode,
    /// Per-worker summary after the batch listing.
    pub summary: bool,
    /// Log a progress line at this interval while running.
    pub progress_interval: Option<Duration>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RunState {
    Configured,
    Partitioned,
    Running,
    Joined,
    Reported,
}

impl RunState {
    /// The only legal successor; `Reported` is terminal.
    pub fn next(self) -> Option<RunState> {
        match self {
            RunState::Configured => Some(RunState::Partitioned),
            RunState::Partitioned => Some(RunState::Running),
            RunState::Running => Some(RunState::Joined),
            RunState::Joined => Some(RunState::Reported),
            RunState::Reported => None,
        }
    }
}

/// What one worker did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkerOutcome {
    /// `None` for the cooperative coordinator.
    pub worker: Option<usize>,
    pub segment: Option<Segment>,
    pub tested: u64,
    pub found: u64,
}

/// Result of a completed run.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub strategy: Strategy,
    pub mode: OutputMode,
    pub workers: usize,
    pub upper_limit: u64,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub elapsed_secs: f64,
    pub tested: u64,
    pub found: u64,
    pub per_worker: Vec<WorkerOutcome>,
    /// Batch mode only.
    pub summaries: Vec<WorkerSummary>,
    /// Sorted prime values; batch mode only.
    pub primes: Vec<u64>,
}

/// Fixed-size pool of OS threads with a single join point per batch of tasks.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self, SearchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("primescan-worker-{}", i))
            .build()?;
        Ok(WorkerPool { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `task(index, item)` once per item as separate pool tasks and wait
    /// for all of them. Results come back in item order; a panicking task
    /// yields `Err` with its payload instead of unwinding into the caller.
    pub fn run_all<T, R, F>(&self, items: &[T], task: F) -> Vec<std::thread::Result<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> R + Sync,
    {
        let slots: Vec<Mutex<Option<std::thread::Result<R>>>> =
            items.iter().map(|_| Mutex::new(None)).collect();
        self.pool.scope(|s| {
            for (index, (item, slot)) in items.iter().zip(&slots).enumerate() {
                let task = &task;
                s.spawn(move |_| {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| task(index, item)));
                    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(result);
                });
            }
        });
        slots
            .into_iter()
            .map(|slot| {
                slot.into_inner()
                    .unwrap_or_else(PoisonError::into_inner)
                    .unwrap_or_else(|| Err(Box::new("task never ran") as Box<dyn Any + Send>))
            })
            .collect()
    }
}

/// Per-run state. Built at `Configured`, dropped after `Reported`.
struct RunContext<'w> {
    state: RunState,
    sink: ResultSink<'w>,
    progress: Arc<Progress>,
    started_at: DateTime<Local>,
    clock: Instant,
}

impl<'w> RunContext<'w> {
    fn new(out: &'w mut (dyn Write + Send), options: &SearchOptions) -> Self {
        RunContext {
            state: RunState::Configured,
            sink: ResultSink::new(out, options.mode, options.summary),
            progress: Progress::new(),
            started_at: Local::now(),
            clock: Instant::now(),
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert_eq!(
            self.state.next(),
            Some(next),
            "illegal run state transition from {:?}",
            self.state
        );
        debug!(from = ?self.state, to = ?next, "run state");
        self.state = next;
    }

    /// Prefer the sink's original I/O error over whatever a worker saw.
    fn settle<T>(&self, result: Result<T, SearchError>) -> Result<T, SearchError> {
        match self.sink.take_failure() {
            Some(e) => Err(SearchError::Sink(e)),
            None => result,
        }
    }
}

pub struct SearchEngine {
    config: SearchConfig,
    options: SearchOptions,
}

impl SearchEngine {
    pub fn new(config: SearchConfig, options: SearchOptions) -> Self {
        SearchEngine { config, options }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Execute one full run, writing result lines to `out`.
    ///
    /// Each call builds its own plan, sink and counters; the engine itself
    /// keeps nothing between runs and may be reused.
    pub fn run(&self, out: &mut (dyn Write + Send)) -> Result<RunReport, SearchError> {
        let workers = self.config.worker_count();
        let limit = self.config.upper_limit();
        let strategy = self.options.strategy;
        let mode = self.options.mode;

        let mut ctx = RunContext::new(out, &self.options);
        info!(workers, limit, %strategy, %mode, "search starting");
        ctx.sink.write_line(format_args!(
            "Start: {} (workers={}, limit={}, strategy={}, mode={})",
            format_timestamp(&ctx.started_at),
            workers,
            limit,
            strategy,
            mode
        ))?;

        let reporter = self
            .options
            .progress_interval
            .map(|interval| ctx.progress.start_reporter(interval));

        let outcome = match strategy.split_policy() {
            Some(policy) => self.run_ranges(&mut ctx, policy),
            None => self.run_cooperative(&mut ctx),
        };

        ctx.progress.stop();
        if let Some(handle) = reporter {
            let _ = handle.join();
        }
        let per_worker = outcome?;

        let sorted = ctx.sink.finish(per_worker.iter().map(|o| o.worker))?;
        let finished_at = Local::now();
        let elapsed = ctx.clock.elapsed();
        let tested = ctx.progress.tested();
        let found = ctx.progress.found();

        ctx.sink
            .write_line(format_args!("End: {}", format_timestamp(&finished_at)))?;
        ctx.sink.write_line(format_args!(
            "Elapsed: {:.3}s (tested {} candidates, found {} primes)",
            elapsed.as_secs_f64(),
            tested,
            found
        ))?;
        ctx.sink.flush()?;
        ctx.advance(RunState::Reported);

        info!(
            tested,
            found,
            elapsed_secs = elapsed.as_secs_f64(),
            "search complete"
        );

        let summaries = match mode {
            OutputMode::Batch => summarize(&sorted, per_worker.iter().map(|o| o.worker)),
            OutputMode::Stream => Vec::new(),
        };
        Ok(RunReport {
            strategy,
            mode,
            workers,
            upper_limit: limit,
            started_at: ctx.started_at,
            finished_at,
            elapsed_secs: elapsed.as_secs_f64(),
            tested,
            found,
            per_worker,
            summaries,
            primes: sorted.iter().map(|d| d.value).collect(),
        })
    }

    fn run_ranges(
        &self,
        ctx: &mut RunContext<'_>,
        policy: SplitPolicy,
    ) -> Result<Vec<WorkerOutcome>, SearchError> {
        let workers = self.config.worker_count();
        let plan: PartitionPlan = partition(self.config.upper_limit(), workers, policy);
        ctx.advance(RunState::Partitioned);
        debug!(
            %policy,
            segments = plan.len(),
            idle = plan.idle_workers(),
            candidates = plan.total_values(),
            "partition plan ready"
        );

        let pool = WorkerPool::new(workers)?;
        ctx.advance(RunState::Running);
        let results = {
            let sink = &ctx.sink;
            let progress = &*ctx.progress;
            pool.run_all(plan.segments(), |worker, segment| {
                scan_segment(worker, *segment, sink, progress)
            })
        };
        ctx.advance(RunState::Joined);

        let mut outcomes = Vec::with_capacity(results.len());
        let mut first_failure = None;
        for (worker, result) in results.into_iter().enumerate() {
            match result {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => {
                    first_failure.get_or_insert(e);
                }
                Err(payload) => {
                    first_failure.get_or_insert(panic_failure(Some(worker), payload));
                }
            }
        }
        ctx.settle(match first_failure {
            Some(e) => Err(e),
            None => Ok(outcomes),
        })
    }

    fn run_cooperative(&self, ctx: &mut RunContext<'_>) -> Result<Vec<WorkerOutcome>, SearchError> {
        ctx.advance(RunState::Partitioned);
        let tester = CooperativeTester::new(self.config.worker_count())?;
        ctx.advance(RunState::Running);
        let result = contain_panic(None, || {
            scan_cooperative(&tester, self.config.upper_limit(), &ctx.sink, &ctx.progress)
        });
        ctx.advance(RunState::Joined);

        ctx.settle(result.map(|outcome| vec![outcome]))
    }
}

/// Run a worker body on the current thread, turning a panic into
/// `WorkerPanicked` the same way `WorkerPool::run_all` does for pool tasks.
fn contain_panic<T, F>(worker: Option<usize>, body: F) -> Result<T, SearchError>
where
    F: FnOnce() -> Result<T, SearchError>,
{
    panic::catch_unwind(AssertUnwindSafe(body))
        .unwrap_or_else(|payload| Err(panic_failure(worker, payload)))
}

fn panic_failure(worker: Option<usize>, payload: Box<dyn Any + Send>) -> SearchError {
    error!(worker = ?worker, panic = panic_message(&*payload), "worker panicked");
    SearchError::WorkerPanicked { worker }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("(non-string panic)")
}

/// Scan one range segment in increasing order.
fn scan_segment(
    worker: usize,
    segment: Segment,
    sink: &ResultSink<'_>,
    progress: &Progress,
) -> Result<WorkerOutcome, SearchError> {
    sink.worker_event(WorkerEvent::started(Some(worker), segment))?;
    let mut outcome = WorkerOutcome {
        worker: Some(worker),
        segment: Some(segment),
        tested: 0,
        found: 0,
    };

    let mut local = Vec::new();
    let mut batch = TestedBatch::new(progress);
    for n in segment.values() {
        batch.bump();
        outcome.tested += 1;
        if is_prime(n) {
            outcome.found += 1;
            progress.found.fetch_add(1, Ordering::Relaxed);
            sink.record(&mut local, Discovery::new(n, Some(worker)))?;
        }
    }
    batch.flush();
    sink.finish_worker(local);
    sink.worker_event(WorkerEvent::completed(
        Some(worker),
        outcome.tested,
        outcome.found,
    ))?;
    debug!(worker, %segment, tested = outcome.tested, found = outcome.found, "worker finished");
    Ok(outcome)
}

/// Walk `[2, limit]` on the calling thread, testing each candidate
/// cooperatively.
fn scan_cooperative(
    tester: &CooperativeTester,
    limit: u64,
    sink: &ResultSink<'_>,
    progress: &Progress,
) -> Result<WorkerOutcome, SearchError> {
    let span = Segment::new(2, limit, 1);
    sink.worker_event(WorkerEvent::started(None, span))?;
    let mut outcome = WorkerOutcome {
        worker: None,
        segment: Some(span),
        tested: 0,
        found: 0,
    };
    let mut local = Vec::new();
    let mut batch = TestedBatch::new(progress);
    for n in 2..=limit {
        batch.bump();
        outcome.tested += 1;
        if tester.is_prime(n) {
            outcome.found += 1;
            progress.found.fetch_add(1, Ordering::Relaxed);
            sink.record(&mut local, Discovery::new(n, None))?;
        }
    }
    batch.flush();
    sink.finish_worker(local);
    sink.worker_event(WorkerEvent::completed(None, outcome.tested, outcome.found))?;
    debug!(
        workers = tester.workers(),
        tested = outcome.tested,
        found = outcome.found,
        "cooperative scan finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    //! Tests for run orchestration.
    //!
    //! Covers the state machine order, the worker pool's join and panic
    //! containment, per-run isolation of counters, and the report. Output
    //! ordering across strategies and modes lives in `tests/engine_tests.rs`.

    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn engine(workers: usize, limit: u64, strategy: Strategy, mode: OutputMode) -> SearchEngine {
        SearchEngine::new(
            SearchConfig::new(workers, limit).unwrap(),
            SearchOptions {
                strategy,
                mode,
                ..SearchOptions::default()
            },
        )
    }

    // ── State Machine ───────────────────────────────────────────────

    /// Each state has exactly one successor and `Reported` is terminal.
    #[test]
    fn state_machine_is_linear() {
        let mut state = RunState::Configured;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            state = next;
            seen.push(state);
        }
        assert_eq!(
            seen,
            vec![
                RunState::Configured,
                RunState::Partitioned,
                RunState::Running,
                RunState::Joined,
                RunState::Reported,
            ]
        );
    }

    #[test]
    fn strategy_parsing_and_policy() {
        assert_eq!("stride".parse::<Strategy>(), Ok(Strategy::Stride));
        assert_eq!(Strategy::Contiguous.split_policy(), Some(SplitPolicy::Contiguous));
        assert_eq!(Strategy::Cooperative.split_policy(), None);
        assert!("random".parse::<Strategy>().is_err());
    }

    // ── Worker Pool ─────────────────────────────────────────────────

    /// Every item runs once and results come back in item order, not in
    /// completion order.
    #[test]
    fn pool_runs_every_task_once_in_item_order() {
        let pool = WorkerPool::new(4).unwrap();
        assert_eq!(pool.threads(), 4);
        let calls = AtomicUsize::new(0);
        let items: Vec<u64> = (0..10).collect();
        let results = pool.run_all(&items, |i, v| {
            calls.fetch_add(1, Ordering::Relaxed);
            (i, *v * 2)
        });
        assert_eq!(calls.load(Ordering::Relaxed), 10);
        for (i, r) in results.into_iter().enumerate() {
            assert_eq!(r.unwrap(), (i, i as u64 * 2));
        }
    }

    /// A panicking task becomes an `Err` slot; its siblings still finish.
    #[test]
    fn pool_contains_panics() {
        let pool = WorkerPool::new(2).unwrap();
        let items = [1u32, 2, 3];
        let results = pool.run_all(&items, |_, v| {
            if *v == 2 {
                panic!("boom");
            }
            *v
        });
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    /// A divisor task panicking inside a pool scope unwinds into the
    /// coordinator; it must surface as `WorkerPanicked`, not escape `run`.
    #[test]
    fn coordinator_contains_divisor_task_panic() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let result: Result<(), SearchError> = contain_panic(None, || {
            pool.scope(|s| s.spawn(|_| panic!("divisor task failed")));
            Ok(())
        });
        assert!(matches!(
            result,
            Err(SearchError::WorkerPanicked { worker: None })
        ));
    }

    #[test]
    fn contained_body_passes_results_through() {
        assert_eq!(contain_panic(Some(1), || Ok(7)).unwrap(), 7);
        let err = contain_panic::<(), _>(Some(1), || {
            Err(SearchError::InvalidConfig("bad".into()))
        })
        .unwrap_err();
        assert!(matches!(err, SearchError::InvalidConfig(_)));
    }

    // ── Runs ────────────────────────────────────────────────────────

    /// The worked example: three contiguous blocks and ten primes.
    #[test]
    fn thirty_over_three_contiguous_workers() {
        let mut out = Vec::new();
        let report = engine(3, 30, Strategy::Contiguous, OutputMode::Batch)
            .run(&mut out)
            .unwrap();
        assert_eq!(report.primes, vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert_eq!(report.tested, 29);
        assert_eq!(report.found, 10);
        let segments: Vec<Segment> = report.per_worker.iter().filter_map(|o| o.segment).collect();
        assert_eq!(
            segments,
            vec![Segment::new(2, 10, 1), Segment::new(11, 19, 1), Segment::new(20, 30, 1)]
        );
        let found: Vec<u64> = report.per_worker.iter().map(|o| o.found).collect();
        assert_eq!(found, vec![4, 4, 2]);
    }

    /// Two runs of one engine report identical counts: nothing carries
    /// over between runs.
    #[test]
    fn counters_are_fresh_for_every_run() {
        let e = engine(2, 100, Strategy::Stride, OutputMode::Stream);
        let first = e.run(&mut Vec::new()).unwrap();
        let second = e.run(&mut Vec::new()).unwrap();
        assert_eq!(first.found, 25);
        assert_eq!(second.found, 25);
        assert_eq!(first.tested, second.tested);
    }

    /// The progress reporter is started and joined within the run.
    #[test]
    fn run_with_progress_reporter_completes() {
        let e = SearchEngine::new(
            SearchConfig::new(2, 2_000).unwrap(),
            SearchOptions {
                progress_interval: Some(Duration::from_millis(10)),
                ..SearchOptions::default()
            },
        );
        assert_eq!(e.run(&mut Vec::new()).unwrap().found, 303);
    }

    #[test]
    fn cooperative_run_attributes_to_coordinator() {
        let mut out = Vec::new();
        let report = engine(3, 50, Strategy::Cooperative, OutputMode::Batch)
            .run(&mut out)
            .unwrap();
        assert_eq!(report.found, 15);
        assert_eq!(report.per_worker.len(), 1);
        assert_eq!(report.per_worker[0].worker, None);
        assert_eq!(report.per_worker[0].segment, Some(Segment::new(2, 50, 1)));
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Thread main at "));
        assert!(text.contains("Worker main started [2, 50] at "));
        assert!(text.contains("(checked 49, found 15)"));
    }

    #[test]
    fn report_serializes_to_json() {
        let report = engine(2, 20, Strategy::Contiguous, OutputMode::Batch)
            .run(&mut Vec::new())
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["strategy"], "contiguous");
        assert_eq!(json["mode"], "batch");
        assert_eq!(json["found"], 8);
        assert_eq!(json["primes"].as_array().unwrap().len(), 8);
    }
}
