//! Simulation time
//!
//! The kernel runs on a continuous virtual clock. Times are `f64` values in
//! the replication's base time unit, wrapped in [`SimTime`] so they can be
//! totally ordered inside the event calendar.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A point on the simulation clock
///
/// # Example
/// ```
/// use simkernel_core::SimTime;
///
/// let t = SimTime::new(2.5);
/// assert!(t > SimTime::ZERO);
/// assert_eq!(t.value(), 2.5);
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimTime(f64);

impl SimTime {
    /// Start of every replication
    pub const ZERO: SimTime = SimTime(0.0);

    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// NaN and infinite values cannot be scheduled.
    pub fn is_valid(self) -> bool {
        self.0.is_finite()
    }

    /// Time advanced by `delta` (same unit as the clock)
    pub fn after(self, delta: f64) -> Self {
        Self(self.0 + delta)
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Default for SimTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<f64> for SimTime {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// Unit attached to time expressions and to the replication clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Picosecond,
    Nanosecond,
    Microsecond,
    Millisecond,
    #[default]
    Second,
    Minute,
    Hour,
    Day,
    Week,
}

impl TimeUnit {
    pub const ALL: [TimeUnit; 9] = [
        TimeUnit::Picosecond,
        TimeUnit::Nanosecond,
        TimeUnit::Microsecond,
        TimeUnit::Millisecond,
        TimeUnit::Second,
        TimeUnit::Minute,
        TimeUnit::Hour,
        TimeUnit::Day,
        TimeUnit::Week,
    ];

    /// Length of one unit expressed in seconds
    pub fn seconds(self) -> f64 {
        match self {
            TimeUnit::Picosecond => 1e-12,
            TimeUnit::Nanosecond => 1e-9,
            TimeUnit::Microsecond => 1e-6,
            TimeUnit::Millisecond => 1e-3,
            TimeUnit::Second => 1.0,
            TimeUnit::Minute => 60.0,
            TimeUnit::Hour => 3_600.0,
            TimeUnit::Day => 86_400.0,
            TimeUnit::Week => 604_800.0,
        }
    }

    /// Factor that converts a value in `self` into `target` units
    ///
    /// # Example
    /// ```
    /// use simkernel_core::TimeUnit;
    ///
    /// assert_eq!(TimeUnit::Hour.factor_to(TimeUnit::Minute), 60.0);
    /// assert_eq!(TimeUnit::Second.factor_to(TimeUnit::Second), 1.0);
    /// ```
    pub fn factor_to(self, target: TimeUnit) -> f64 {
        if self == target {
            1.0
        } else {
            self.seconds() / target.seconds()
        }
    }

    /// Stable integer code used by persistence records
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<TimeUnit> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeUnit::Picosecond => "picosecond",
            TimeUnit::Nanosecond => "nanosecond",
            TimeUnit::Microsecond => "microsecond",
            TimeUnit::Millisecond => "millisecond",
            TimeUnit::Second => "second",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order_puts_nan_last() {
        let mut times = vec![SimTime::new(3.0), SimTime::new(f64::NAN), SimTime::new(1.0)];
        times.sort();
        assert_eq!(times[0], SimTime::new(1.0));
        assert!(!times[2].is_valid());
    }

    #[test]
    fn test_unit_codes_round_trip() {
        for unit in TimeUnit::ALL {
            assert_eq!(TimeUnit::from_code(unit.code()), Some(unit));
        }
        assert_eq!(TimeUnit::from_code(42), None);
        assert_eq!(TimeUnit::from_code(-1), None);
    }

    #[test]
    fn test_minutes_to_hours() {
        let factor = TimeUnit::Minute.factor_to(TimeUnit::Hour);
        assert!((factor - 1.0 / 60.0).abs() < 1e-12);
    }
}
