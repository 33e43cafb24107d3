//! Calendar event types
//!
//! An event is a `(time, priority, payload)` triple plus a sequence id
//! assigned by the calendar. Events are totally ordered so that popping the
//! calendar is deterministic:
//!
//! 1. **Time** ascending
//! 2. **Priority** descending (higher value dispatched first)
//! 3. **Id** ascending (insertion order among equals)

use crate::components::ComponentId;
use crate::core::time::SimTime;
use crate::models::entity::EntityId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Sequence number assigned by the calendar at scheduling time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(u64);

impl EventId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event.{}", self.0)
    }
}

/// What happens when the event fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Entity arrives at `target` on input `port`
    Arrival {
        entity: EntityId,
        target: ComponentId,
        port: u32,
    },

    /// A source component creates its next batch of entities
    Creation { source: ComponentId },

    /// End of the warm-up window
    WarmUpEnd,
}

impl EventKind {
    /// Component the event is dispatched to, if any
    pub fn target(&self) -> Option<ComponentId> {
        match self {
            EventKind::Arrival { target, .. } => Some(*target),
            EventKind::Creation { source } => Some(*source),
            EventKind::WarmUpEnd => None,
        }
    }
}

/// A pending future action owned by the calendar
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub time: SimTime,
    pub priority: i32,
    pub kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Event {}

impl Ord for Event {
    /// Reversed so that `BinaryHeap` pops the earliest event first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: u64, time: f64, priority: i32) -> Event {
        Event {
            id: EventId::new(id),
            time: SimTime::new(time),
            priority,
            kind: EventKind::WarmUpEnd,
        }
    }

    #[test]
    fn test_earlier_time_is_greater() {
        assert!(event(2, 1.0, 0) > event(1, 2.0, 0));
    }

    #[test]
    fn test_higher_priority_wins_at_same_time() {
        assert!(event(2, 1.0, 5) > event(1, 1.0, 0));
    }

    #[test]
    fn test_lower_id_wins_among_equals() {
        assert!(event(1, 1.0, 0) > event(2, 1.0, 0));
    }
}
