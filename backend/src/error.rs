//! Kernel error taxonomy
//!
//! Only programming-contract violations are fatal at run time
//! (`InvalidTime`, `ReleaseMismatch`). Structural problems are collected by
//! model checking into a [`CheckReport`] before a run starts.

use crate::expression::ExpressionError;
use crate::model::CheckReport;
use crate::models::entity::EntityId;
use crate::persistence::PersistenceError;
use thiserror::Error;

/// Errors raised while assembling or running a simulation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Cannot schedule event at time {requested} when the clock is at {now}")]
    InvalidTime { requested: f64, now: f64 },

    #[error("{entity} releases {requested} unit(s) of '{resource}' but holds {held}")]
    ReleaseMismatch {
        entity: EntityId,
        resource: String,
        requested: u32,
        held: u32,
    },

    #[error("Seize '{component}' requests {requested} unit(s) but '{resource}' has capacity {capacity}")]
    UnsatisfiableSeize {
        component: String,
        resource: String,
        requested: u32,
        capacity: u32,
    },

    #[error("Create '{component}' asks for {requested} entities in one batch (limit {limit})")]
    BatchTooLarge {
        component: String,
        requested: f64,
        limit: u64,
    },

    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    #[error("Data definition not found: {0}")]
    DefinitionNotFound(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("Model check failed:\n{0}")]
    InvalidModel(CheckReport),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("A {kind} named '{name}' already exists")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Simulation already finished")]
    AlreadyFinished,

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Convenience alias used across the kernel
pub type SimResult<T> = Result<T, SimulationError>;
