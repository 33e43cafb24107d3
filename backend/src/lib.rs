//! Simulation Kernel Core - Rust Engine
//!
//! Discrete-event simulation kernel with deterministic execution.
//!
//! # Architecture
//!
//! - **core**: Simulation time and time units
//! - **events**: Event calendar (time, priority, insertion order)
//! - **models**: Entities and trace records
//! - **components**: Graph nodes and the dispatch protocol
//! - **allocation**: Seize / queue / release state machine
//! - **data**: Resources, queues, sets, statistics, counters, variables
//! - **model**: Model assembly, check and persistence
//! - **orchestrator**: Replication controller and event loop
//! - **stats**: Statistics collectors
//! - **expression**: Expression evaluation seam
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. Busy units of a resource stay within `0..=capacity`
//! 2. All randomness is deterministic (seeded RNG per replication)
//! 3. A Process always releases exactly what it seized

// Module declarations
pub mod allocation;
pub mod components;
pub mod core;
pub mod data;
pub mod error;
pub mod events;
pub mod expression;
pub mod model;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod rng;
pub mod stats;
pub mod trace;

// Re-exports for convenience
pub use allocation::{AllocationType, SeizableItem, SeizableTarget, SelectionRule};
pub use components::{
    Component, ComponentId, Create, Decide, DecideMode, Delay, Dispose, ModelComponent, Process, QueueFullAction,
    Record, Release, Seize,
};
pub use core::time::{SimTime, TimeUnit};
pub use data::{DataDefinition, DataManager, DefinitionId, DefinitionKind, OrderRule};
pub use error::{SimResult, SimulationError};
pub use events::{Calendar, Event, EventId, EventKind};
pub use expression::{DefaultEvaluator, EvalScope, ExpressionError, ExpressionEvaluator};
pub use model::{CheckIssue, CheckReport, Model};
pub use models::{
    entity::{Entity, EntityId, EntityStore},
    event::{EventLog, SimEvent},
};
pub use orchestrator::{
    EndReason, Phase, ReplicationSummary, Simulation, SimulationConfig, SimulationReport, StepOutcome,
};
pub use persistence::{FieldValue, ModelRecord, PersistenceError, PersistenceRecord};
pub use rng::RngManager;
pub use stats::{Counter, StatisticsCollector, Summary, TimeWeighted};
pub use trace::{NullSink, TraceLevel, TraceSink, Tracer, TracingSink};
