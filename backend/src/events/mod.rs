//! Event calendar
//!
//! Orders every pending future action (entity arrivals, creations, the
//! warm-up boundary) and owns the simulation clock.

pub mod calendar;
pub mod types;

pub use calendar::Calendar;
pub use types::{Event, EventId, EventKind};
