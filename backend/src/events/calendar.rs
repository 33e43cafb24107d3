//! Deterministic event calendar
//!
//! A `BinaryHeap` with reversed `Ord` on [`Event`] acts as a min-heap keyed
//! by `(time, -priority, id)`. Ids are strictly increasing within a
//! replication, so two runs with the same inputs pop events in the same
//! order. The calendar also owns the clock: [`Calendar::advance`] moves it
//! to the popped event's time and nothing can be scheduled before it.

use crate::core::time::SimTime;
use crate::error::{SimResult, SimulationError};
use crate::events::types::{Event, EventId, EventKind};
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Default)]
pub struct Calendar {
    /// Min-heap (via reversed Ord on Event)
    queue: BinaryHeap<Event>,
    next_id: u64,
    now: SimTime,
}

impl Calendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulation clock
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Insert an event
    ///
    /// # Errors
    /// `InvalidTime` when `time` is NaN, infinite, or earlier than the clock.
    pub fn schedule(&mut self, time: SimTime, priority: i32, kind: EventKind) -> SimResult<EventId> {
        if !time.is_valid() || time < self.now {
            return Err(SimulationError::InvalidTime {
                requested: time.value(),
                now: self.now.value(),
            });
        }
        let id = EventId::new(self.next_id);
        self.next_id += 1;
        self.queue.push(Event {
            id,
            time,
            priority,
            kind,
        });
        Ok(id)
    }

    /// Remove and return the earliest event, moving the clock to its time
    pub fn advance(&mut self) -> Option<Event> {
        let event = self.queue.pop()?;
        self.now = event.time;
        Some(event)
    }

    /// Time of the next event without removing it
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|e| e.time)
    }

    pub fn peek(&self) -> Option<&Event> {
        self.queue.peek()
    }

    /// Move the clock forward without dispatching (end of replication)
    ///
    /// Ignored when `time` is earlier than the clock.
    pub fn advance_clock_to(&mut self, time: SimTime) {
        if time > self.now {
            self.now = time;
        }
    }

    /// Withdraw a pending event
    ///
    /// Returns false when the id is unknown or already dispatched.
    pub fn cancel(&mut self, id: EventId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|e| e.id != id);
        self.queue.len() != before
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every pending event, rewind the clock and the id sequence
    pub fn reset(&mut self) {
        self.queue.clear();
        self.next_id = 0;
        self.now = SimTime::ZERO;
    }

    /// All pending events in dispatch order (the calendar is left untouched)
    pub fn pending(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.queue.iter().copied().collect();
        events.sort_by(|a, b| b.cmp(a));
        events
    }
}
