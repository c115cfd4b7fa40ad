//! Random sources for backoff jitter.
//!
//! [`RetryExecutor`](super::RetryExecutor) asks its source for an offset in
//! `[-spread, +spread]` and adds it to the computed delay. Swap in
//! [`SeededJitter`] or [`NoJitter`] to make delays reproducible.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of symmetric jitter offsets, in seconds.
pub trait JitterSource: Send + Sync {
    /// Sample uniformly from `[-spread, +spread]`.
    ///
    /// A non-finite or non-positive `spread` yields zero.
    fn offset(&self, spread: f64) -> f64;
}

/// Thread-local RNG. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn offset(&self, spread: f64) -> f64 {
        if !spread.is_finite() || spread <= 0.0 {
            return 0.0;
        }
        rand::thread_rng().gen_range(-spread..=spread)
    }
}

/// Deterministic RNG seeded up front, for reproducible delay sequences.
#[derive(Debug)]
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl JitterSource for SeededJitter {
    fn offset(&self, spread: f64) -> f64 {
        if !spread.is_finite() || spread <= 0.0 {
            return 0.0;
        }
        self.rng.lock().gen_range(-spread..=spread)
    }
}

/// Always zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn offset(&self, _spread: f64) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_rng_stays_in_range() {
        let source = ThreadRngJitter;
        for _ in 0..1_000 {
            let offset = source.offset(0.05);
            assert!((-0.05..=0.05).contains(&offset));
        }
    }

    #[test]
    fn zero_spread_is_zero() {
        assert_eq!(ThreadRngJitter.offset(0.0), 0.0);
        assert_eq!(SeededJitter::new(1).offset(0.0), 0.0);
    }

    #[test]
    fn non_finite_spread_is_zero() {
        for spread in [f64::INFINITY, f64::NAN, -1.0] {
            assert_eq!(ThreadRngJitter.offset(spread), 0.0);
            assert_eq!(SeededJitter::new(1).offset(spread), 0.0);
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let a = SeededJitter::new(42);
        let b = SeededJitter::new(42);
        let xs: Vec<f64> = (0..8).map(|_| a.offset(1.0)).collect();
        let ys: Vec<f64> = (0..8).map(|_| b.offset(1.0)).collect();
        assert_eq!(xs, ys);
    }
}
