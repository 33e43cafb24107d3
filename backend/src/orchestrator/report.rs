//! Per-replication and cross-replication results

use crate::stats::{StatisticsCollector, Summary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why a replication stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The clock reached the replication length
    LengthReached,
    /// The termination condition evaluated true
    TerminationCondition,
    /// Nothing left on the calendar (idle system)
    CalendarEmpty,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            EndReason::LengthReached => "replication length reached",
            EndReason::TerminationCondition => "termination condition true",
            EndReason::CalendarEmpty => "calendar empty",
        };
        f.write_str(text)
    }
}

/// Collector snapshots taken when one replication ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationSummary {
    /// 1-based
    pub replication: u32,
    pub end_time: f64,
    pub reason: EndReason,
    pub statistics: BTreeMap<String, Summary>,
    pub counters: BTreeMap<String, i64>,
}

/// Results of a whole run
///
/// Cross-replication statistics aggregate each replication's average (or
/// counter value), one observation per replication, so their confidence
/// intervals are independent-replication intervals.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub model: String,
    replications: Vec<ReplicationSummary>,
    across: BTreeMap<String, StatisticsCollector>,
    confidence_level: f64,
}

impl SimulationReport {
    pub fn new(model: impl Into<String>, confidence_level: f64) -> Self {
        Self {
            model: model.into(),
            replications: Vec::new(),
            across: BTreeMap::new(),
            confidence_level,
        }
    }

    pub fn add(&mut self, summary: ReplicationSummary) {
        let level = self.confidence_level;
        let averages = summary
            .statistics
            .iter()
            .map(|(name, s)| (name, s.average))
            .chain(summary.counters.iter().map(|(name, v)| (name, *v as f64)));
        for (name, value) in averages {
            self.across
                .entry(name.clone())
                .or_insert_with(|| StatisticsCollector::with_confidence(level))
                .collect(value);
        }
        self.replications.push(summary);
    }

    pub fn replications(&self) -> &[ReplicationSummary] {
        &self.replications
    }

    pub fn replication(&self, replication: u32) -> Option<&ReplicationSummary> {
        self.replications.iter().find(|r| r.replication == replication)
    }

    /// Cross-replication collector for a statistic or counter
    pub fn across(&self, name: &str) -> Option<&StatisticsCollector> {
        self.across.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.across.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.replications.is_empty()
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model '{}': {} replication(s)", self.model, self.replications.len())?;
        for r in &self.replications {
            writeln!(f, "  replication {} ended at {} ({})", r.replication, r.end_time, r.reason)?;
        }
        writeln!(
            f,
            "{:<40} {:>6} {:>12} {:>12} {:>12} {:>12}",
            "collector", "n", "average", "min", "max", "half-width"
        )?;
        for (name, collector) in &self.across {
            writeln!(
                f,
                "{:<40} {:>6} {:>12.4} {:>12.4} {:>12.4} {:>12.4}",
                name,
                collector.num_elements(),
                collector.average(),
                collector.min(),
                collector.max(),
                collector.half_width_confidence_interval()
            )?;
        }
        Ok(())
    }
}
