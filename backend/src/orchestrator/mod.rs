//! Orchestrator - replication controller and event loop
//!
//! See `engine.rs` for the run loop and `context.rs` for what components
//! see while an event is dispatched.

pub mod config;
pub mod context;
pub mod engine;
pub mod report;

// Re-export main types for convenience
pub use config::SimulationConfig;
pub use context::{DispatchContext, RunState};
pub use engine::{Phase, Simulation, StepOutcome};
pub use report::{EndReason, ReplicationSummary, SimulationReport};
