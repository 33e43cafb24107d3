//! Event Calendar Tests
//!
//! Ordering contract of the calendar:
//! - time ascending
//! - higher priority first among equal times
//! - insertion order among equal (time, priority)
//! - no scheduling into the past; the clock only moves forward

use proptest::prelude::*;
use simkernel_core::{Calendar, ComponentId, EventKind, SimTime, SimulationError};

// ============================================================================
// Test Helpers
// ============================================================================

fn creation(source: usize) -> EventKind {
    EventKind::Creation {
        source: ComponentId::new(source),
    }
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_events_pop_by_time_then_priority_then_insertion() {
    let mut calendar = Calendar::new();
    calendar.schedule(SimTime::new(5.0), 0, creation(0)).unwrap();
    calendar.schedule(SimTime::new(1.0), 0, creation(1)).unwrap();
    calendar.schedule(SimTime::new(1.0), 10, creation(2)).unwrap();
    calendar.schedule(SimTime::new(1.0), 0, creation(3)).unwrap();

    let order: Vec<EventKind> = std::iter::from_fn(|| calendar.advance()).map(|e| e.kind).collect();
    assert_eq!(order, vec![creation(2), creation(1), creation(3), creation(0)]);
}

#[test]
fn test_peek_time_does_not_remove() {
    let mut calendar = Calendar::new();
    assert_eq!(calendar.peek_time(), None);
    calendar.schedule(SimTime::new(3.0), 0, creation(0)).unwrap();
    assert_eq!(calendar.peek_time(), Some(SimTime::new(3.0)));
    assert_eq!(calendar.len(), 1);
    assert_eq!(calendar.now(), SimTime::ZERO);
}

#[test]
fn test_clock_follows_dispatch_and_rejects_the_past() {
    let mut calendar = Calendar::new();
    calendar.schedule(SimTime::new(4.0), 0, creation(0)).unwrap();
    calendar.advance().unwrap();
    assert_eq!(calendar.now().value(), 4.0);

    let err = calendar.schedule(SimTime::new(3.5), 0, creation(0)).unwrap_err();
    assert_eq!(
        err,
        SimulationError::InvalidTime {
            requested: 3.5,
            now: 4.0
        }
    );
    // Same instant is allowed
    assert!(calendar.schedule(SimTime::new(4.0), 0, creation(0)).is_ok());
}

#[test]
fn test_cancel_pending_then_noop() {
    let mut calendar = Calendar::new();
    let first = calendar.schedule(SimTime::new(1.0), 0, creation(0)).unwrap();
    calendar.schedule(SimTime::new(2.0), 0, creation(1)).unwrap();
    assert!(calendar.cancel(first));
    assert!(!calendar.cancel(first));
    assert_eq!(calendar.advance().unwrap().kind, creation(1));
    assert!(calendar.is_empty());
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_pop_order_is_sorted(events in prop::collection::vec((0u32..50, -3i32..3), 1..200)) {
        let mut calendar = Calendar::new();
        let mut expected = Vec::new();
        for (seq, (time, priority)) in events.iter().enumerate() {
            calendar.schedule(SimTime::new(*time as f64), *priority, creation(seq)).unwrap();
            expected.push((*time, -*priority, seq));
        }
        expected.sort();

        let mut popped = Vec::new();
        let mut last = SimTime::ZERO;
        while let Some(event) = calendar.advance() {
            prop_assert!(event.time >= last);
            last = event.time;
            let EventKind::Creation { source } = event.kind else {
                unreachable!("only creations were scheduled");
            };
            popped.push(source.index());
        }
        let expected: Vec<usize> = expected.into_iter().map(|(_, _, seq)| seq).collect();
        prop_assert_eq!(popped, expected);
    }
}
