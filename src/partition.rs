//! # Partition — Splitting Work Among Workers
//!
//! Two partitioners produce a [`PartitionPlan`], an ordered list of one
//! [`Segment`] per worker:
//!
//! - [`partition`] splits the candidate space `[2, limit]` for independent
//!   range workers, either as contiguous blocks or as a round-robin stride.
//! - [`partition_divisors`] splits the odd trial divisors `[3, isqrt(n)]` of
//!   a single candidate for cooperative testing.
//!
//! ## Segments
//!
//! Every segment is an arithmetic progression `start, start + step, … ≤ end`.
//! Contiguous blocks use `step = 1`, strides use `step = workers`, divisor
//! ranges use `step = 2`. A segment with `start > end` is empty; degenerate
//! plans (more workers than candidates) keep such segments so that worker
//! `i` always owns segment `i`.
//!
//! ## Invariants
//!
//! Segments of a plan are pairwise disjoint and their union is exactly the
//! input range. Contiguous blocks are ordered: worker 0 holds the lowest
//! values and the last worker absorbs the truncation remainder.

use crate::integer_sqrt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::StepBy;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// How the candidate space is split among range workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitPolicy {
    /// One contiguous block per worker.
    Contiguous,
    /// Worker `i` takes every `workers`-th candidate starting at `2 + i`.
    Stride,
}

impl fmt::Display for SplitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitPolicy::Contiguous => write!(f, "contiguous"),
            SplitPolicy::Stride => write!(f, "stride"),
        }
    }
}

impl FromStr for SplitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "contiguous" => Ok(SplitPolicy::Contiguous),
            "stride" => Ok(SplitPolicy::Stride),
            other => Err(format!("unknown split policy '{}'", other)),
        }
    }
}

/// An arithmetic progression of values owned by one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub start: u64,
    /// Inclusive upper bound (not necessarily a member of the progression).
    pub end: u64,
    pub step: u64,
}

impl Segment {
    pub fn new(start: u64, end: u64, step: u64) -> Self {
        debug_assert!(step > 0, "segment step must be positive");
        Segment { start, end, step }
    }

    /// An inverted segment owns nothing.
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Number of values in the segment.
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start) / self.step + 1
        }
    }

    /// Values in increasing order.
    pub fn values(&self) -> StepBy<RangeInclusive<u64>> {
        (self.start..=self.end).step_by(self.step as usize)
    }

    pub fn contains(&self, value: u64) -> bool {
        !self.is_empty()
            && value >= self.start
            && value <= self.end
            && (value - self.start) % self.step == 0
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "[empty]")
        } else if self.step == 1 {
            write!(f, "[{}, {}]", self.start, self.end)
        } else {
            write!(f, "[{}, {}] step {}", self.start, self.end, self.step)
        }
    }
}

/// One segment per worker, read-only once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PartitionPlan {
    segments: Vec<Segment>,
}

impl PartitionPlan {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Total number of values across all segments.
    pub fn total_values(&self) -> u64 {
        self.segments.iter().map(Segment::len).sum()
    }

    /// Workers whose segment is empty (degenerate plans).
    pub fn idle_workers(&self) -> usize {
        self.segments.iter().filter(|s| s.is_empty()).count()
    }
}

/// Split `[2, limit]` into `workers` segments according to `policy`.
///
/// `workers` must be at least 1. Limits below 2 yield a plan of empty
/// segments.
pub fn partition(limit: u64, workers: usize, policy: SplitPolicy) -> PartitionPlan {
    assert!(workers > 0, "partition requires at least one worker");
    let segments = match policy {
        SplitPolicy::Contiguous => contiguous_blocks(limit, workers),
        SplitPolicy::Stride => strides(limit, workers),
    };
    PartitionPlan { segments }
}

fn contiguous_blocks(limit: u64, workers: usize) -> Vec<Segment> {
    let w = workers as u64;
    let count = limit.saturating_sub(1);
    let chunk = count / w;
    (0..w)
        .map(|i| {
            let start = 2u64.saturating_add(i * chunk);
            let end = if i == w - 1 {
                limit
            } else {
                // 1 + (i+1)*chunk never exceeds limit since (i+1)*chunk <= count
                1 + (i + 1) * chunk
            };
            Segment::new(start, end, 1)
        })
        .collect()
}

fn strides(limit: u64, workers: usize) -> Vec<Segment> {
    let w = workers as u64;
    (0..w)
        .map(|i| Segment::new(2u64.saturating_add(i), limit, w))
        .collect()
}

/// Split the odd trial divisors `[3, isqrt(n)]` of `n` into `workers`
/// segments of `ceil(odd_count / workers)` divisors each.
pub fn partition_divisors(n: u64, workers: usize) -> PartitionPlan {
    assert!(workers > 0, "partition requires at least one worker");
    let w = workers as u64;
    let root = integer_sqrt(n);
    let odd_count = if root < 3 { 0 } else { (root - 3) / 2 + 1 };
    let chunk = odd_count.div_ceil(w);
    let last_odd = 3 + 2 * odd_count.saturating_sub(1);

    let segments = (0..w)
        .map(|i| {
            let first = i * chunk;
            if chunk == 0 || first >= odd_count {
                return Segment::new(1, 0, 2);
            }
            let start = 3 + 2 * first;
            let end = (start + 2 * (chunk - 1)).min(last_odd);
            Segment::new(start, end, 2)
        })
        .collect();
    PartitionPlan { segments }
}
