//! xorshift64* random number generator
//!
//! Fast, deterministic PRNG with 64-bit state. Same seed, same sequence:
//! replications are reproducible bit-for-bit, and each replication gets an
//! independent stream derived from the base seed (see [`RngManager::for_replication`]).

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use simkernel_core::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let u = rng.next_f64();
/// assert!((0.0..1.0).contains(&u));
/// let service = rng.exponential(2.0);
/// assert!(service >= 0.0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed (zero is mapped to one)
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Independent stream for replication `replication` (1-based) of a run
    ///
    /// The base seed is mixed with the replication number through
    /// splitmix64 so neighbouring replications do not share prefixes.
    pub fn for_replication(base_seed: u64, replication: u32) -> Self {
        let mut z = base_seed.wrapping_add(0x9E37_79B9_7F4A_7C15u64.wrapping_mul(replication as u64 + 1));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        Self::new(z ^ (z >> 31))
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Current state (for replay)
    pub fn get_state(&self) -> u64 {
        self.state
    }

    /// Random f64 in [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Random f64 in (0.0, 1.0), safe for logarithms
    fn next_open_f64(&mut self) -> f64 {
        loop {
            let u = self.next_f64();
            if u > 0.0 {
                return u;
            }
        }
    }

    /// Integer in [min, max)
    ///
    /// # Panics
    /// Panics if min >= max
    pub fn range(&mut self, min: i64, max: i64) -> i64 {
        assert!(min < max, "min must be less than max");

        let value = self.next();
        let range_size = (max - min) as u64;
        min + (value % range_size) as i64
    }

    /// Continuous uniform in [min, max)
    pub fn uniform(&mut self, min: f64, max: f64) -> f64 {
        min + (max - min) * self.next_f64()
    }

    /// Exponential with the given mean
    pub fn exponential(&mut self, mean: f64) -> f64 {
        -mean * self.next_open_f64().ln()
    }

    /// Normal via Box-Muller (one variate per call, the pair's twin is dropped
    /// so the stream position depends only on the number of calls)
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_open_f64();
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    /// Triangular on [min, max] with the given mode
    pub fn triangular(&mut self, min: f64, mode: f64, max: f64) -> f64 {
        let span = max - min;
        if span <= 0.0 {
            return min;
        }
        let u = self.next_f64();
        let cut = (mode - min) / span;
        if u < cut {
            min + (u * span * (mode - min)).sqrt()
        } else {
            max - ((1.0 - u) * span * (max - mode)).sqrt()
        }
    }

    /// Erlang with `k` phases and overall mean `mean`
    pub fn erlang(&mut self, mean: f64, k: u32) -> f64 {
        let k = k.max(1);
        let phase_mean = mean / k as f64;
        (0..k).map(|_| self.exponential(phase_mean)).sum()
    }

    /// Log-normal parameterised by the mean and standard deviation of the
    /// resulting (not the underlying normal) distribution
    pub fn lognormal(&mut self, mean: f64, std_dev: f64) -> f64 {
        if mean <= 0.0 {
            return 0.0;
        }
        let variance = std_dev * std_dev;
        let sigma2 = (1.0 + variance / (mean * mean)).ln();
        let mu = mean.ln() - sigma2 / 2.0;
        self.normal(mu, sigma2.sqrt()).exp()
    }

    /// Index into `weights` drawn proportionally to the weights
    ///
    /// Returns `None` when the weights are empty or all non-positive.
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if total <= 0.0 {
            return None;
        }
        let mut target = self.next_f64() * total;
        let mut last_positive = None;
        for (idx, weight) in weights.iter().enumerate() {
            if *weight <= 0.0 {
                continue;
            }
            last_positive = Some(idx);
            if target < *weight {
                return Some(idx);
            }
            target -= weight;
        }
        last_positive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_seed_converted_to_nonzero() {
        let rng = RngManager::new(0);
        assert_ne!(rng.get_state(), 0, "Zero seed should be converted to 1");
    }

    #[test]
    #[should_panic(expected = "min must be less than max")]
    fn test_range_invalid_bounds() {
        let mut rng = RngManager::new(12345);
        rng.range(100, 50);
    }

    #[test]
    fn test_replication_streams_differ() {
        let mut a = RngManager::for_replication(42, 1);
        let mut b = RngManager::for_replication(42, 2);
        assert_ne!(a.next(), b.next());

        let mut a2 = RngManager::for_replication(42, 1);
        let mut a3 = RngManager::for_replication(42, 1);
        assert_eq!(a2.next(), a3.next());
    }

    #[test]
    fn test_exponential_mean_close() {
        let mut rng = RngManager::new(7);
        let n = 20_000;
        let mean: f64 = (0..n).map(|_| rng.exponential(2.0)).sum::<f64>() / n as f64;
        assert!((mean - 2.0).abs() < 0.1, "sample mean {mean}");
    }

    #[test]
    fn test_triangular_within_bounds() {
        let mut rng = RngManager::new(99);
        for _ in 0..1000 {
            let v = rng.triangular(0.75, 1.5, 3.0);
            assert!((0.75..=3.0).contains(&v));
        }
    }

    #[test]
    fn test_weighted_index_skips_zero_weights() {
        let mut rng = RngManager::new(3);
        for _ in 0..200 {
            let idx = rng.weighted_index(&[0.0, 1.0, 0.0]).unwrap();
            assert_eq!(idx, 1);
        }
        assert_eq!(rng.weighted_index(&[]), None);
        assert_eq!(rng.weighted_index(&[0.0, -1.0]), None);
    }
}
