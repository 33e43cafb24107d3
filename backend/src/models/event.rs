//! Trace records for simulation replay and auditing.
//!
//! [`SimEvent`] captures every observable state change of a replication:
//! entity creation, dispatch into a component, queueing, allocation and
//! release of resource units, delays, routing decisions and disposal.
//! Records enable:
//! - Determinism checks (same seed, same dispatch sequence, same digest)
//! - Debugging (understand what happened and when)
//! - Auditing (verify that every release matches an earlier allocation)
//!
//! # Example
//!
//! ```rust
//! use simkernel_core::models::event::{EventLog, SimEvent};
//! use simkernel_core::EntityId;
//!
//! let mut log = EventLog::new();
//! log.log(SimEvent::Dispatched {
//!     time: 2.0,
//!     component: "Seize_1".to_string(),
//!     entity: EntityId::new(7),
//!     port: 0,
//! });
//!
//! assert_eq!(log.events_for_entity(EntityId::new(7)).len(), 1);
//! ```

use crate::models::entity::EntityId;
use crate::trace::TraceLevel;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Simulation event capturing a state change.
///
/// All records carry the simulation time at which they happened. Records
/// are appended in dispatch order, so equal-time records keep causal order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SimEvent {
    /// A replication begins (clock at zero, calendar primed)
    ReplicationStarted { time: f64, replication: u32 },

    /// Warm-up window closed; statistics collected so far were discarded
    WarmUpEnded { time: f64 },

    /// A replication stopped
    ReplicationEnded {
        time: f64,
        replication: u32,
        reason: String,
    },

    /// A source component minted a new entity
    EntityCreated {
        time: f64,
        component: String,
        entity: EntityId,
        entity_type: String,
    },

    /// An entity entered a component's dispatch entry point
    Dispatched {
        time: f64,
        component: String,
        entity: EntityId,
        port: u32,
    },

    /// A seize could not be satisfied and the entity now waits
    Queued {
        time: f64,
        component: String,
        entity: EntityId,
        queue: String,
        position: usize,
    },

    /// Units of a resource were granted to an entity
    ///
    /// `transferred` counts units handed over directly from a release
    /// without passing through the idle state.
    Allocated {
        time: f64,
        component: String,
        entity: EntityId,
        resource: String,
        quantity: u32,
        transferred: u32,
    },

    /// Units of a resource were given back
    Released {
        time: f64,
        component: String,
        entity: EntityId,
        resource: String,
        quantity: u32,
    },

    /// Entity scheduled to leave a delay
    Delayed {
        time: f64,
        component: String,
        entity: EntityId,
        until: f64,
    },

    /// Bounded queue was full; entity routed away or destroyed
    Balked {
        time: f64,
        component: String,
        entity: EntityId,
        queue: String,
    },

    /// Bounded queue was full; entity held until space frees
    Blocked {
        time: f64,
        component: String,
        entity: EntityId,
        queue: String,
    },

    /// Entity reached a component with no outgoing connection
    Absorbed {
        time: f64,
        component: String,
        entity: EntityId,
    },

    /// Routing decision taken
    Branched {
        time: f64,
        component: String,
        entity: EntityId,
        branch: usize,
    },

    /// Entity left the system
    Disposed {
        time: f64,
        component: String,
        entity: EntityId,
        time_in_system: f64,
    },

    /// The run aborted
    Fatal { time: f64, message: String },
}

impl SimEvent {
    /// Simulation time of the record
    pub fn time(&self) -> f64 {
        match self {
            SimEvent::ReplicationStarted { time, .. } => *time,
            SimEvent::WarmUpEnded { time } => *time,
            SimEvent::ReplicationEnded { time, .. } => *time,
            SimEvent::EntityCreated { time, .. } => *time,
            SimEvent::Dispatched { time, .. } => *time,
            SimEvent::Queued { time, .. } => *time,
            SimEvent::Allocated { time, .. } => *time,
            SimEvent::Released { time, .. } => *time,
            SimEvent::Delayed { time, .. } => *time,
            SimEvent::Balked { time, .. } => *time,
            SimEvent::Blocked { time, .. } => *time,
            SimEvent::Absorbed { time, .. } => *time,
            SimEvent::Branched { time, .. } => *time,
            SimEvent::Disposed { time, .. } => *time,
            SimEvent::Fatal { time, .. } => *time,
        }
    }

    /// Verbosity at which the record is delivered to trace sinks
    pub fn level(&self) -> TraceLevel {
        match self {
            SimEvent::Fatal { .. } => TraceLevel::ErrorFatal,
            SimEvent::Balked { .. } | SimEvent::Blocked { .. } => TraceLevel::ErrorRecover,
            SimEvent::Absorbed { .. } => TraceLevel::Warning,
            SimEvent::ReplicationStarted { .. }
            | SimEvent::WarmUpEnded { .. }
            | SimEvent::ReplicationEnded { .. }
            | SimEvent::EntityCreated { .. }
            | SimEvent::Queued { .. }
            | SimEvent::Allocated { .. }
            | SimEvent::Released { .. }
            | SimEvent::Disposed { .. } => TraceLevel::Event,
            SimEvent::Dispatched { .. } => TraceLevel::Arrival,
            SimEvent::Delayed { .. } | SimEvent::Branched { .. } => TraceLevel::Internal,
        }
    }

    /// Record type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            SimEvent::ReplicationStarted { .. } => "ReplicationStarted",
            SimEvent::WarmUpEnded { .. } => "WarmUpEnded",
            SimEvent::ReplicationEnded { .. } => "ReplicationEnded",
            SimEvent::EntityCreated { .. } => "EntityCreated",
            SimEvent::Dispatched { .. } => "Dispatched",
            SimEvent::Queued { .. } => "Queued",
            SimEvent::Allocated { .. } => "Allocated",
            SimEvent::Released { .. } => "Released",
            SimEvent::Delayed { .. } => "Delayed",
            SimEvent::Balked { .. } => "Balked",
            SimEvent::Blocked { .. } => "Blocked",
            SimEvent::Absorbed { .. } => "Absorbed",
            SimEvent::Branched { .. } => "Branched",
            SimEvent::Disposed { .. } => "Disposed",
            SimEvent::Fatal { .. } => "Fatal",
        }
    }

    /// Entity involved (if applicable)
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            SimEvent::EntityCreated { entity, .. }
            | SimEvent::Dispatched { entity, .. }
            | SimEvent::Queued { entity, .. }
            | SimEvent::Allocated { entity, .. }
            | SimEvent::Released { entity, .. }
            | SimEvent::Delayed { entity, .. }
            | SimEvent::Balked { entity, .. }
            | SimEvent::Blocked { entity, .. }
            | SimEvent::Absorbed { entity, .. }
            | SimEvent::Branched { entity, .. }
            | SimEvent::Disposed { entity, .. } => Some(*entity),
            _ => None,
        }
    }

    /// Component involved (if applicable)
    pub fn component(&self) -> Option<&str> {
        match self {
            SimEvent::EntityCreated { component, .. }
            | SimEvent::Dispatched { component, .. }
            | SimEvent::Queued { component, .. }
            | SimEvent::Allocated { component, .. }
            | SimEvent::Released { component, .. }
            | SimEvent::Delayed { component, .. }
            | SimEvent::Balked { component, .. }
            | SimEvent::Blocked { component, .. }
            | SimEvent::Absorbed { component, .. }
            | SimEvent::Branched { component, .. }
            | SimEvent::Disposed { component, .. } => Some(component),
            _ => None,
        }
    }
}

/// In-memory recorder of trace records with query helpers
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<SimEvent>,
}

impl EventLog {
    /// Create empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Append a record
    pub fn log(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    /// All records in order
    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Records stamped with exactly `time`
    pub fn events_at_time(&self, time: f64) -> Vec<&SimEvent> {
        self.events.iter().filter(|e| e.time() == time).collect()
    }

    /// Records of one type (see [`SimEvent::event_type`])
    pub fn events_of_type(&self, event_type: &str) -> Vec<&SimEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    pub fn events_for_entity(&self, entity: EntityId) -> Vec<&SimEvent> {
        self.events
            .iter()
            .filter(|e| e.entity() == Some(entity))
            .collect()
    }

    pub fn events_for_component(&self, component: &str) -> Vec<&SimEvent> {
        self.events
            .iter()
            .filter(|e| e.component() == Some(component))
            .collect()
    }

    /// The (time, component, entity) tuple of every dispatch, in order
    pub fn dispatch_sequence(&self) -> Vec<(f64, &str, EntityId)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SimEvent::Dispatched {
                    time,
                    component,
                    entity,
                    ..
                } => Some((*time, component.as_str(), *entity)),
                _ => None,
            })
            .collect()
    }

    /// SHA-256 over the dispatch sequence, hex encoded
    ///
    /// Two runs of the same model with the same seed produce the same digest.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (time, component, entity) in self.dispatch_sequence() {
            hasher.update(time.to_bits().to_le_bytes());
            hasher.update(component.as_bytes());
            hasher.update([0u8]);
            hasher.update(entity.raw().to_le_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatched(time: f64, component: &str, entity: u64) -> SimEvent {
        SimEvent::Dispatched {
            time,
            component: component.to_string(),
            entity: EntityId::new(entity),
            port: 0,
        }
    }

    #[test]
    fn test_event_time_and_type() {
        let event = SimEvent::Released {
            time: 5.0,
            component: "Release_1".to_string(),
            entity: EntityId::new(1),
            resource: "M1".to_string(),
            quantity: 1,
        };

        assert_eq!(event.time(), 5.0);
        assert_eq!(event.event_type(), "Released");
        assert_eq!(event.level(), TraceLevel::Event);
        assert_eq!(event.component(), Some("Release_1"));
    }

    #[test]
    fn test_absorbed_is_a_warning() {
        let event = SimEvent::Absorbed {
            time: 1.0,
            component: "Delay_1".to_string(),
            entity: EntityId::new(3),
        };
        assert_eq!(event.level(), TraceLevel::Warning);
    }

    #[test]
    fn test_event_log_queries() {
        let mut log = EventLog::new();
        assert!(log.is_empty());

        log.log(dispatched(1.0, "Seize_1", 1));
        log.log(dispatched(1.0, "Delay_1", 1));
        log.log(dispatched(2.0, "Seize_1", 2));
        log.log(SimEvent::WarmUpEnded { time: 2.0 });

        assert_eq!(log.len(), 4);
        assert_eq!(log.events_at_time(1.0).len(), 2);
        assert_eq!(log.events_of_type("Dispatched").len(), 3);
        assert_eq!(log.events_for_entity(EntityId::new(1)).len(), 2);
        assert_eq!(log.events_for_component("Seize_1").len(), 2);

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_digest_depends_on_dispatch_order_only() {
        let mut a = EventLog::new();
        a.log(dispatched(1.0, "A", 1));
        a.log(SimEvent::WarmUpEnded { time: 1.5 });
        a.log(dispatched(2.0, "B", 1));

        let mut b = EventLog::new();
        b.log(dispatched(1.0, "A", 1));
        b.log(dispatched(2.0, "B", 1));
        assert_eq!(a.digest(), b.digest());

        let mut c = EventLog::new();
        c.log(dispatched(2.0, "B", 1));
        c.log(dispatched(1.0, "A", 1));
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest().len(), 64);
    }
}
