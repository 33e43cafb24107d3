//! Run configuration

use crate::core::time::TimeUnit;
use crate::error::{SimResult, SimulationError};
use crate::stats::DEFAULT_CONFIDENCE;
use crate::trace::TraceLevel;
use serde::{Deserialize, Serialize};

/// Replication parameters of a run
///
/// # Fields
///
/// * `number_of_replications` - Independent replications to execute
/// * `replication_length` - Clock value (in `time_unit`) that ends a replication
/// * `warm_up_period` - Initial window whose observations are discarded
/// * `time_unit` - Base unit of the replication clock
/// * `termination_condition` - Expression ending a replication early when true
/// * `rng_seed` - Base seed; each replication derives its own stream from it
/// * `trace_level` - Most verbose level delivered to trace sinks
/// * `confidence_level` - Level of every confidence interval half-width
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub number_of_replications: u32,
    pub replication_length: f64,
    pub warm_up_period: f64,
    pub time_unit: TimeUnit,
    pub termination_condition: Option<String>,
    pub rng_seed: u64,
    pub trace_level: TraceLevel,
    pub confidence_level: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            number_of_replications: 1,
            replication_length: 3600.0,
            warm_up_period: 0.0,
            time_unit: TimeUnit::Second,
            termination_condition: None,
            rng_seed: 12345,
            trace_level: TraceLevel::Event,
            confidence_level: DEFAULT_CONFIDENCE,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> SimResult<()> {
        if self.number_of_replications == 0 {
            return Err(SimulationError::InvalidConfig(
                "number_of_replications must be at least 1".to_string(),
            ));
        }
        if self.replication_length.is_nan() || self.replication_length <= 0.0 {
            return Err(SimulationError::InvalidConfig(format!(
                "replication_length must be positive (got {})",
                self.replication_length
            )));
        }
        if self.warm_up_period.is_nan() || self.warm_up_period < 0.0 {
            return Err(SimulationError::InvalidConfig(format!(
                "warm_up_period must be non-negative (got {})",
                self.warm_up_period
            )));
        }
        if self.warm_up_period >= self.replication_length {
            return Err(SimulationError::InvalidConfig(format!(
                "warm_up_period ({}) must be shorter than replication_length ({})",
                self.warm_up_period, self.replication_length
            )));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(SimulationError::InvalidConfig(format!(
                "confidence_level must be in (0, 1) (got {})",
                self.confidence_level
            )));
        }
        Ok(())
    }

    /// True when the warm-up window is non-empty
    pub fn has_warm_up(&self) -> bool {
        self.warm_up_period > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let cases = [
            SimulationConfig {
                number_of_replications: 0,
                ..Default::default()
            },
            SimulationConfig {
                replication_length: 0.0,
                ..Default::default()
            },
            SimulationConfig {
                replication_length: f64::NAN,
                ..Default::default()
            },
            SimulationConfig {
                warm_up_period: -1.0,
                ..Default::default()
            },
            SimulationConfig {
                replication_length: 10.0,
                warm_up_period: 10.0,
                ..Default::default()
            },
            SimulationConfig {
                confidence_level: 1.0,
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(SimulationError::InvalidConfig(_))),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"replication_length": 60, "warm_up_period": 10, "time_unit": "minute"}"#)
                .unwrap();
        assert_eq!(config.replication_length, 60.0);
        assert_eq!(config.warm_up_period, 10.0);
        assert_eq!(config.time_unit, TimeUnit::Minute);
        assert_eq!(config.number_of_replications, 1);
        assert_eq!(config.trace_level, TraceLevel::Event);
    }
}
