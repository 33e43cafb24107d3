//! Trace boundary
//!
//! The kernel emits leveled [`SimEvent`] records to injected [`TraceSink`]s.
//! How records are formatted or stored is up to the sink. A record reaches
//! the sinks only when its level is at or below the configured threshold;
//! the optional in-memory [`EventLog`] kept by the [`Tracer`] records every
//! level so determinism digests do not depend on the threshold.

use crate::models::event::{EventLog, SimEvent};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trace verbosity, least to most verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TraceLevel {
    ErrorFatal,
    Results,
    ErrorRecover,
    Warning,
    #[default]
    Event,
    Arrival,
    Internal,
    Detailed,
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraceLevel::ErrorFatal => "error_fatal",
            TraceLevel::Results => "results",
            TraceLevel::ErrorRecover => "error_recover",
            TraceLevel::Warning => "warning",
            TraceLevel::Event => "event",
            TraceLevel::Arrival => "arrival",
            TraceLevel::Internal => "internal",
            TraceLevel::Detailed => "detailed",
        };
        f.write_str(name)
    }
}

/// Receiver of trace records
pub trait TraceSink: Send {
    fn record(&mut self, level: TraceLevel, event: &SimEvent);
}

/// Forwards records to the `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn record(&mut self, level: TraceLevel, event: &SimEvent) {
        let kind = event.event_type();
        let time = event.time();
        match level {
            TraceLevel::ErrorFatal => tracing::error!(time, kind, ?event, "simulation aborted"),
            TraceLevel::ErrorRecover | TraceLevel::Warning => {
                tracing::warn!(time, kind, ?event)
            }
            TraceLevel::Results | TraceLevel::Event => tracing::info!(time, kind, ?event),
            TraceLevel::Arrival | TraceLevel::Internal => tracing::debug!(time, kind, ?event),
            TraceLevel::Detailed => tracing::trace!(time, kind, ?event),
        }
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn record(&mut self, _level: TraceLevel, _event: &SimEvent) {}
}

impl TraceSink for EventLog {
    fn record(&mut self, _level: TraceLevel, event: &SimEvent) {
        self.log(event.clone());
    }
}

/// Level filter plus fan-out to the registered sinks
pub struct Tracer {
    level: TraceLevel,
    sinks: Vec<Box<dyn TraceSink>>,
    log: Option<EventLog>,
}

impl Tracer {
    pub fn new(level: TraceLevel) -> Self {
        Self {
            level,
            sinks: Vec::new(),
            log: None,
        }
    }

    pub fn level(&self) -> TraceLevel {
        self.level
    }

    pub fn set_level(&mut self, level: TraceLevel) {
        self.level = level;
    }

    pub fn add_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.sinks.push(sink);
    }

    /// Start keeping every record in memory
    pub fn enable_log(&mut self) {
        if self.log.is_none() {
            self.log = Some(EventLog::new());
        }
    }

    pub fn log(&self) -> Option<&EventLog> {
        self.log.as_ref()
    }

    pub fn take_log(&mut self) -> Option<EventLog> {
        self.log.take()
    }

    /// True when a record at `level` would reach the sinks
    pub fn enabled(&self, level: TraceLevel) -> bool {
        level <= self.level
    }

    pub fn emit(&mut self, event: SimEvent) {
        let level = event.level();
        if level <= self.level {
            for sink in &mut self.sinks {
                sink.record(level, &event);
            }
        }
        if let Some(log) = &mut self.log {
            log.log(event);
        }
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new(TraceLevel::default())
    }
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("level", &self.level)
            .field("sinks", &self.sinks.len())
            .field("log", &self.log.as_ref().map(EventLog::len))
            .finish()
    }
}
