//! Property-based tests for partitioning and primality.
//!
//! # How to run
//!
//! ```bash
//! cargo test --test property_tests
//!
//! # More cases:
//! PROPTEST_CASES=10000 cargo test --test property_tests
//! ```
//!
//! Properties are named `prop_<function>_<invariant>`.

use primescan::partition::{partition, partition_divisors, SplitPolicy};
use primescan::{integer_sqrt, is_prime, is_prime_cooperative};
use proptest::prelude::*;

fn policy() -> impl Strategy<Value = SplitPolicy> {
    prop_oneof![Just(SplitPolicy::Contiguous), Just(SplitPolicy::Stride)]
}

// == Range partition ==========================================================

proptest! {
    /// Every candidate in [2, limit] lands in exactly one segment.
    #[test]
    fn prop_partition_covers_exactly_once(
        limit in 0u64..3_000,
        workers in 1usize..24,
        policy in policy(),
    ) {
        let plan = partition(limit, workers, policy);
        prop_assert_eq!(plan.len(), workers);
        let mut all: Vec<u64> = plan.segments().iter().flat_map(|s| s.values()).collect();
        all.sort_unstable();
        let expected: Vec<u64> = (2..=limit).collect();
        prop_assert_eq!(all, expected);
    }

    /// The plan's total never counts more values than the range holds.
    #[test]
    fn prop_partition_total_matches_range(
        limit in 0u64..1_000_000_000_000,
        workers in 1usize..64,
        policy in policy(),
    ) {
        let plan = partition(limit, workers, policy);
        prop_assert_eq!(plan.total_values(), limit.saturating_sub(1));
    }

    /// Contiguous segments are ordered and adjacent.
    #[test]
    fn prop_contiguous_segments_adjacent(limit in 2u64..1_000_000, workers in 1usize..32) {
        let plan = partition(limit, workers, SplitPolicy::Contiguous);
        let busy: Vec<_> = plan.segments().iter().filter(|s| !s.is_empty()).collect();
        prop_assert_eq!(busy.first().map(|s| s.start), Some(2));
        prop_assert_eq!(busy.last().map(|s| s.end), Some(limit));
        for pair in busy.windows(2) {
            prop_assert_eq!(pair[0].end + 1, pair[1].start);
        }
    }
}

// == Divisor partition ========================================================

proptest! {
    /// Divisor segments cover the odd numbers in [3, isqrt(n)] exactly once.
    #[test]
    fn prop_partition_divisors_disjoint_cover(n in 0u64..50_000_000, workers in 1usize..16) {
        let plan = partition_divisors(n, workers);
        let mut all: Vec<u64> = plan.segments().iter().flat_map(|s| s.values()).collect();
        all.sort_unstable();
        let root = integer_sqrt(n);
        let expected: Vec<u64> = (3..=root).step_by(2).collect();
        prop_assert_eq!(all, expected);
    }
}

// == Primality ================================================================

proptest! {
    #[test]
    fn prop_integer_sqrt_is_floor(n in any::<u64>()) {
        let r = integer_sqrt(n);
        prop_assert!(r.checked_mul(r).is_some_and(|sq| sq <= n));
        prop_assert!((r + 1).checked_mul(r + 1).map_or(true, |sq| sq > n));
    }

    /// A product of two factors above 1 is never prime.
    #[test]
    fn prop_is_prime_rejects_products(a in 2u64..50_000, b in 2u64..50_000) {
        prop_assert!(!is_prime(a * b));
    }

    #[test]
    fn prop_cooperative_agrees_with_sequential(n in 0u64..2_000_000, workers in 1usize..6) {
        prop_assert_eq!(is_prime_cooperative(n, workers), is_prime(n));
    }
}
