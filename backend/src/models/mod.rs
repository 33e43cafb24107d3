//! Domain models for the simulation kernel

pub mod entity;
pub mod event;

// Re-exports
pub use entity::{Entity, EntityId, EntityStore};
pub use event::{EventLog, SimEvent};
