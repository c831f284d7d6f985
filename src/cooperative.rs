//! # Cooperative — Parallel Trial Division of a Single Candidate
//!
//! Splits the odd divisors of one candidate across workers (see
//! [`partition_divisors`]) and lets them race. The first worker to find a
//! divisor sets a shared [`CancelToken`]; every worker checks the token
//! before each division, so the others stop after at most one more division.
//!
//! The token is the only "composite" signal. It is set-only, so once every
//! worker has returned with the token unset, nobody can set it later and the
//! candidate is prime.
//!
//! Spawning threads per candidate costs far more than the divisions for small
//! `n`. [`CooperativeTester`] keeps a pool alive across candidates for the
//! engine; [`is_prime_cooperative`] is the one-shot form with scoped threads.

use crate::error::SearchError;
use crate::partition::{partition_divisors, Segment};
use std::sync::atomic::{AtomicBool, Ordering};

/// Single-shot cancellation flag: once set it stays set.
#[derive(Debug, Default)]
pub struct CancelToken {
    flag: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken {
            flag: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Pool-backed cooperative primality tester.
pub struct CooperativeTester {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl CooperativeTester {
    pub fn new(workers: usize) -> Result<Self, SearchError> {
        if workers == 0 {
            return Err(SearchError::InvalidConfig(
                "cooperative tester needs at least one worker".into(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("primescan-divisor-{}", i))
            .build()?;
        Ok(CooperativeTester { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Test `n` with one pool task per non-empty divisor segment.
    pub fn is_prime(&self, n: u64) -> bool {
        if let Some(answer) = trivial_answer(n) {
            return answer;
        }
        let plan = partition_divisors(n, self.workers);
        let token = CancelToken::new();
        self.pool.scope(|s| {
            for segment in plan.segments().iter().filter(|seg| !seg.is_empty()) {
                let token = &token;
                let segment = *segment;
                s.spawn(move |_| {
                    divide_segment(n, segment, token);
                });
            }
        });
        !token.is_cancelled()
    }
}

/// Test `n` with `workers` scoped threads racing over its divisors.
pub fn is_prime_cooperative(n: u64, workers: usize) -> bool {
    if let Some(answer) = trivial_answer(n) {
        return answer;
    }
    let plan = partition_divisors(n, workers.max(1));
    let token = CancelToken::new();
    std::thread::scope(|s| {
        for segment in plan.segments().iter().filter(|seg| !seg.is_empty()) {
            let token = &token;
            let segment = *segment;
            s.spawn(move || {
                divide_segment(n, segment, token);
            });
        }
    });
    !token.is_cancelled()
}

/// Cases decided without any trial division.
fn trivial_answer(n: u64) -> Option<bool> {
    match n {
        0 | 1 => Some(false),
        2 => Some(true),
        _ if n % 2 == 0 => Some(false),
        _ => None,
    }
}

/// Trial-divide `n` by the segment's divisors until one divides or the token
/// is set. Returns the number of divisions performed.
fn divide_segment(n: u64, segment: Segment, token: &CancelToken) -> u64 {
    let mut divisions = 0;
    for d in segment.values() {
        if token.is_cancelled() {
            break;
        }
        divisions += 1;
        if n % d == 0 {
            token.cancel();
            break;
        }
    }
    divisions
}
