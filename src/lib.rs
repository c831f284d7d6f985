pub mod config;
pub mod cooperative;
pub mod engine;
pub mod error;
pub mod partition;
pub mod progress;
pub mod sieve;
pub mod sink;

pub use config::SearchConfig;
pub use cooperative::{is_prime_cooperative, CancelToken, CooperativeTester};
pub use engine::{RunReport, RunState, SearchEngine, SearchOptions, Strategy};
pub use error::SearchError;
pub use partition::{partition, partition_divisors, PartitionPlan, Segment, SplitPolicy};
pub use sink::{Discovery, OutputMode, ResultSink, WorkerEvent, WorkerSummary};

/// Trial-division primality test.
///
/// Divides by 2, then by every odd `d` with `d * d <= n`. O(sqrt(n)), no
/// allocation, no shared state; every `u64` is a valid input.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n == 2 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }
    let mut d = 3u64;
    // d <= n / d avoids overflowing d * d near u64::MAX
    while d <= n / d {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

/// Exact `floor(sqrt(n))` for every `u64`.
///
/// The f64 estimate can be off by one for large inputs, so it is corrected
/// with checked multiplication in both directions.
pub fn integer_sqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let mut r = (n as f64).sqrt() as u64;
    while r.checked_mul(r).map_or(true, |sq| sq > n) {
        r -= 1;
    }
    while (r + 1).checked_mul(r + 1).is_some_and(|sq| sq <= n) {
        r += 1;
    }
    r
}
