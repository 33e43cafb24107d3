//! Statistics collectors
//!
//! - [`StatisticsCollector`]: observational statistics over a stream of
//!   scalar values (Welford's running mean and variance)
//! - [`Counter`]: a plain integer that can go up and down
//! - [`TimeWeighted`]: level statistics weighted by how long each level was
//!   held (resource busy units, queue length)
//!
//! Collectors never format anything; reporting layers read the accessors
//! or a [`Summary`].

pub mod student_t;

use serde::{Deserialize, Serialize};

/// Confidence level used when none is configured
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Read-only snapshot of a collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub num_elements: u64,
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub variance: f64,
    pub std_deviation: f64,
    pub variation_coef: f64,
    pub half_width: f64,
}

// ============================================================================
// Observational statistics
// ============================================================================

/// Running statistics over `collect`ed observations
///
/// Empty collectors report zero for every accessor.
///
/// # Example
/// ```
/// use simkernel_core::stats::StatisticsCollector;
///
/// let mut waits = StatisticsCollector::new();
/// for value in [10.0, 20.0, 30.0] {
///     waits.collect(value);
/// }
/// assert_eq!(waits.num_elements(), 3);
/// assert_eq!(waits.average(), 20.0);
/// assert_eq!(waits.min(), 10.0);
/// assert_eq!(waits.max(), 30.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsCollector {
    count: u64,
    min: f64,
    max: f64,
    mean: f64,
    /// Sum of squared deviations from the running mean
    m2: f64,
    confidence_level: f64,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self::with_confidence(DEFAULT_CONFIDENCE)
    }

    pub fn with_confidence(confidence_level: f64) -> Self {
        Self {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            mean: 0.0,
            m2: 0.0,
            confidence_level,
        }
    }

    pub fn collect(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Forget every observation (confidence level is kept)
    pub fn clear(&mut self) {
        *self = Self::with_confidence(self.confidence_level);
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    pub fn set_confidence_level(&mut self, level: f64) {
        self.confidence_level = level;
    }

    pub fn num_elements(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.max
        }
    }

    pub fn average(&self) -> f64 {
        self.mean
    }

    /// Sample variance (n - 1 denominator)
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_deviation(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Standard deviation over mean; zero when the mean is zero
    pub fn variation_coef(&self) -> f64 {
        if self.mean == 0.0 {
            0.0
        } else {
            self.std_deviation() / self.mean
        }
    }

    /// Half-width of the t-based confidence interval for the mean
    pub fn half_width_confidence_interval(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let p = 1.0 - (1.0 - self.confidence_level) / 2.0;
        let t = student_t::t_quantile(p, self.count - 1);
        t * self.std_deviation() / (self.count as f64).sqrt()
    }

    pub fn summary(&self) -> Summary {
        Summary {
            num_elements: self.count,
            min: self.min(),
            max: self.max(),
            average: self.average(),
            variance: self.variance(),
            std_deviation: self.std_deviation(),
            variation_coef: self.variation_coef(),
            half_width: self.half_width_confidence_interval(),
        }
    }
}

impl Default for StatisticsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Counter
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counter {
    value: i64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, by: i64) {
        self.value += by;
    }

    pub fn decrement(&mut self, by: i64) {
        self.value -= by;
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn clear(&mut self) {
        self.value = 0;
    }
}

// ============================================================================
// Time-weighted statistics
// ============================================================================

/// Statistics of a piecewise-constant level over time
///
/// Zero-duration levels contribute nothing to the average but still count
/// towards min and max.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeWeighted {
    level: f64,
    last_change: f64,
    start: f64,
    area: f64,
    area_sq: f64,
    min: f64,
    max: f64,
    changes: u64,
}

impl TimeWeighted {
    /// Start observing at `now` with the given level
    pub fn new(level: f64, now: f64) -> Self {
        Self {
            level,
            last_change: now,
            start: now,
            area: 0.0,
            area_sq: 0.0,
            min: level,
            max: level,
            changes: 0,
        }
    }

    fn accumulate(&mut self, now: f64) {
        let held = now - self.last_change;
        if held > 0.0 {
            self.area += self.level * held;
            self.area_sq += self.level * self.level * held;
            self.last_change = now;
        }
    }

    /// Level changes at `now`
    pub fn update(&mut self, level: f64, now: f64) {
        self.accumulate(now);
        self.level = level;
        self.changes += 1;
        self.min = self.min.min(level);
        self.max = self.max.max(level);
    }

    /// Drop the history; keep the current level as the new baseline
    pub fn rebase(&mut self, now: f64) {
        *self = Self::new(self.level, now);
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn num_changes(&self) -> u64 {
        self.changes
    }

    /// Time-weighted average up to `now`
    pub fn average(&self, now: f64) -> f64 {
        let span = now - self.start;
        if span <= 0.0 {
            return self.level;
        }
        let tail = (now - self.last_change).max(0.0);
        (self.area + self.level * tail) / span
    }

    /// Time-weighted variance up to `now`
    pub fn variance(&self, now: f64) -> f64 {
        let span = now - self.start;
        if span <= 0.0 {
            return 0.0;
        }
        let tail = (now - self.last_change).max(0.0);
        let mean = self.average(now);
        let mean_sq = (self.area_sq + self.level * self.level * tail) / span;
        (mean_sq - mean * mean).max(0.0)
    }

    pub fn summary(&self, now: f64) -> Summary {
        let average = self.average(now);
        let variance = self.variance(now);
        let std_deviation = variance.sqrt();
        Summary {
            num_elements: self.changes,
            min: self.min,
            max: self.max,
            average,
            variance,
            std_deviation,
            variation_coef: if average == 0.0 { 0.0 } else { std_deviation / average },
            half_width: 0.0,
        }
    }
}

impl Default for TimeWeighted {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}
