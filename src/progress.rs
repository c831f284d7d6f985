//! # Progress — Per-Run Atomic Counters
//!
//! Counters shared between range workers and the optional background
//! reporter. One `Progress` is created for every run, so counts never leak
//! between runs or between concurrent test invocations.
//!
//! Workers do not touch `tested` per candidate: they accumulate locally and
//! flush in batches of [`FLUSH_EVERY`] (and once at segment end).
//!
//! ## Background Reporter
//!
//! `start_reporter` spawns a thread that logs `search progress` every
//! interval: tested, found, rate (candidates/sec) and elapsed time. It
//! polls the shutdown flag in short ticks so `stop()` + `join()` returns
//! promptly even with long intervals.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// Local tested-count batch size before a shared `fetch_add`.
pub const FLUSH_EVERY: u64 = 1024;

const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

pub struct Progress {
    pub tested: AtomicU64,
    pub found: AtomicU64,
    start: Instant,
    shutdown: AtomicBool,
}

impl Progress {
    pub fn new() -> Arc<Self> {
        Arc::new(Progress {
            tested: AtomicU64::new(0),
            found: AtomicU64::new(0),
            start: Instant::now(),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn tested(&self) -> u64 {
        self.tested.load(Ordering::Relaxed)
    }

    pub fn found(&self) -> u64 {
        self.found.load(Ordering::Relaxed)
    }

    pub fn start_reporter(self: &Arc<Self>, interval: Duration) -> thread::JoinHandle<()> {
        let progress = Arc::clone(self);
        thread::spawn(move || {
            let mut next = Instant::now() + interval;
            loop {
                thread::sleep(SHUTDOWN_POLL.min(interval));
                if progress.shutdown.load(Ordering::Relaxed) {
                    break;
                }
                if Instant::now() >= next {
                    progress.log_status();
                    next += interval;
                }
            }
        })
    }

    pub fn log_status(&self) {
        let elapsed = self.start.elapsed();
        let tested = self.tested();
        let found = self.found();
        let rate = if elapsed.as_secs_f64() > 0.0 {
            tested as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let h = elapsed.as_secs() / 3600;
        let m = (elapsed.as_secs() % 3600) / 60;
        let s = elapsed.as_secs() % 60;
        info!(
            tested,
            found,
            rate = format_args!("{:.2}", rate),
            elapsed = format_args!("{:02}:{:02}:{:02}", h, m, s),
            "search progress"
        );
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

/// Worker-local tested counter that flushes into a shared [`Progress`].
pub struct TestedBatch<'a> {
    progress: &'a Progress,
    pending: u64,
}

impl<'a> TestedBatch<'a> {
    pub fn new(progress: &'a Progress) -> Self {
        TestedBatch {
            progress,
            pending: 0,
        }
    }

    pub fn bump(&mut self) {
        self.pending += 1;
        if self.pending >= FLUSH_EVERY {
            self.flush();
        }
    }

    pub fn flush(&mut self) {
        if self.pending > 0 {
            self.progress.tested.fetch_add(self.pending, Ordering::Relaxed);
            self.pending = 0;
        }
    }
}

impl Drop for TestedBatch<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    //! Tests for the per-run counters, the batched `tested` updates and the
    //! reporter thread's shutdown.

    use super::*;

    // ── Counters ────────────────────────────────────────────────────

    #[test]
    fn counters_start_at_zero() {
        let p = Progress::new();
        assert_eq!(p.tested(), 0);
        assert_eq!(p.found(), 0);
    }

    /// 8 threads x 1000 increments must total exactly 8000.
    #[test]
    fn concurrent_increments_are_accurate() {
        let p = Progress::new();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let p = Arc::clone(&p);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        p.found.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(p.found(), 8000);
    }

    // ── Batched Updates ─────────────────────────────────────────────

    /// The shared counter moves only at the threshold and on drop; the
    /// remainder below the threshold is never lost.
    #[test]
    fn batch_flushes_at_threshold_and_on_drop() {
        let p = Progress::new();
        {
            let mut batch = TestedBatch::new(&p);
            for _ in 0..FLUSH_EVERY {
                batch.bump();
            }
            assert_eq!(p.tested(), FLUSH_EVERY);
            for _ in 0..10 {
                batch.bump();
            }
            assert_eq!(p.tested(), FLUSH_EVERY);
        }
        assert_eq!(p.tested(), FLUSH_EVERY + 10);
    }

    /// Each worker holds its own batch; the totals still add up exactly.
    #[test]
    fn batches_from_many_threads_sum_correctly() {
        let p = Progress::new();
        thread::scope(|s| {
            for _ in 0..6 {
                s.spawn(|| {
                    let mut batch = TestedBatch::new(&p);
                    for _ in 0..5_000 {
                        batch.bump();
                    }
                });
            }
        });
        assert_eq!(p.tested(), 30_000);
    }

    // ── Reporter ────────────────────────────────────────────────────

    /// The reporter polls the shutdown flag, so a long interval must not
    /// delay the join.
    #[test]
    fn reporter_exits_promptly_after_stop() {
        let p = Progress::new();
        let handle = p.start_reporter(Duration::from_secs(3600));
        p.stop();
        let begin = Instant::now();
        handle.join().unwrap();
        assert!(begin.elapsed() < Duration::from_secs(5));
    }

    /// Rate computation must tolerate a run that has barely started.
    #[test]
    fn log_status_with_zero_elapsed_does_not_panic() {
        let p = Progress::new();
        p.log_status();
    }

    #[test]
    fn multiple_stops_are_idempotent() {
        let p = Progress::new();
        p.stop();
        p.stop();
        assert!(p.shutdown.load(Ordering::Relaxed));
    }
}
