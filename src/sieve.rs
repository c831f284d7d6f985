//! # Sieve — Reference Prime Generation
//!
//! A plain odd-only sieve of Eratosthenes used as the trusted reference for
//! `--verify` and for the test suites. It is deliberately independent of
//! the trial-division oracle so the two can be checked against each other.
//!
//! Memory is one byte per odd number, so verification is capped at
//! [`VERIFY_LIMIT`].

/// Largest limit `--verify` will sieve (~50 MB of flags).
pub const VERIFY_LIMIT: u64 = 100_000_000;

/// Generate all primes up to and including `limit`.
pub fn generate_primes(limit: u64) -> Vec<u64> {
    if limit < 2 {
        return vec![];
    }
    let limit = limit as usize;
    // composite[i] describes the odd number 2*i + 1
    let half = limit / 2 + 1;
    let mut composite = vec![false; half];
    composite[0] = true; // 1

    let mut i = 1;
    while (2 * i + 1) * (2 * i + 1) <= limit {
        if !composite[i] {
            let p = 2 * i + 1;
            let mut m = p * p;
            while m <= limit {
                composite[m / 2] = true;
                m += 2 * p;
            }
        }
        i += 1;
    }

    let mut primes = Vec::with_capacity(estimate_prime_count(limit));
    primes.push(2);
    primes.extend(
        composite
            .iter()
            .enumerate()
            .filter(|&(i, &c)| !c && 2 * i + 1 <= limit)
            .map(|(i, _)| (2 * i + 1) as u64),
    );
    primes
}

/// Rough upper estimate of pi(n), only used to size the output vector.
fn estimate_prime_count(n: usize) -> usize {
    if n < 10 {
        return 4;
    }
    let nf = n as f64;
    (1.3 * nf / nf.ln()) as usize
}

#[cfg(test)]
mod tests {
    //! The sieve is the reference for every other suite, so it is pinned
    //! against published prime counts.

    use super::*;

    #[test]
    fn small_limits() {
        assert!(generate_primes(0).is_empty());
        assert!(generate_primes(1).is_empty());
        assert_eq!(generate_primes(2), vec![2]);
        assert_eq!(generate_primes(3), vec![2, 3]);
        assert_eq!(generate_primes(10), vec![2, 3, 5, 7]);
    }

    /// The limit is inclusive.
    #[test]
    fn limit_that_is_itself_prime_is_included() {
        assert_eq!(*generate_primes(97).last().unwrap(), 97);
        assert_eq!(*generate_primes(98).last().unwrap(), 97);
    }

    /// pi(10^k) for k = 2, 3, 4, 6.
    #[test]
    fn known_prime_counts() {
        assert_eq!(generate_primes(100).len(), 25);
        assert_eq!(generate_primes(1_000).len(), 168);
        assert_eq!(generate_primes(10_000).len(), 1_229);
        assert_eq!(generate_primes(1_000_000).len(), 78_498);
    }

    /// 9, 25, 49 sit exactly on p*p, where marking starts.
    #[test]
    fn odd_square_boundaries() {
        let primes = generate_primes(50);
        for sq in [9, 25, 49] {
            assert!(!primes.contains(&sq), "{} reported prime", sq);
        }
    }
}
