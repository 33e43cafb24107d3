//! Expression evaluation seam
//!
//! Components hold their timing, quantity and routing parameters as
//! expression strings (`"expo(5)"`, `"NQ(Queue_1) > 3"`). The kernel only
//! needs those strings to resolve to a sampled number on demand, so it
//! depends on the [`ExpressionEvaluator`] trait; [`DefaultEvaluator`] is the
//! built-in implementation.

mod parser;

pub use parser::DefaultEvaluator;

use crate::rng::RngManager;
use thiserror::Error;

/// Errors raised while parsing or evaluating an expression
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Cannot parse '{expression}': {message}")]
    Parse { expression: String, message: String },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Function {function} takes {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    #[error("Invalid argument to {function}: {message}")]
    InvalidArgument { function: String, message: String },

    #[error("Division by zero")]
    DivisionByZero,
}

/// Read-only view of simulation state an expression may reference
pub trait EvalScope {
    /// Current simulation time (`tnow`)
    fn now(&self) -> f64;

    /// Number of entities waiting in a queue (`NQ(name)`)
    fn queue_length(&self, queue: &str) -> Option<f64>;

    /// Busy units of a resource (`NR(name)`)
    fn resource_busy(&self, resource: &str) -> Option<f64>;

    /// Capacity of a resource (`MR(name)`)
    fn resource_capacity(&self, resource: &str) -> Option<f64>;

    fn variable(&self, name: &str) -> Option<f64>;

    /// Attribute of the entity being processed, if there is one
    fn attribute(&self, name: &str) -> Option<f64>;
}

/// Resolves expression strings to numbers
///
/// Booleans are numbers: zero is false, anything else is true.
pub trait ExpressionEvaluator: Send {
    /// Syntax and function-arity check, without evaluating
    fn check(&mut self, expression: &str) -> Result<(), ExpressionError>;

    fn evaluate(
        &mut self,
        expression: &str,
        scope: &dyn EvalScope,
        rng: &mut RngManager,
    ) -> Result<f64, ExpressionError>;
}

/// Scope with nothing in it but the clock
///
/// Used for model checks and for expressions evaluated outside any entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyScope {
    pub now: f64,
}

impl EvalScope for EmptyScope {
    fn now(&self) -> f64 {
        self.now
    }

    fn queue_length(&self, _queue: &str) -> Option<f64> {
        None
    }

    fn resource_busy(&self, _resource: &str) -> Option<f64> {
        None
    }

    fn resource_capacity(&self, _resource: &str) -> Option<f64> {
        None
    }

    fn variable(&self, _name: &str) -> Option<f64> {
        None
    }

    fn attribute(&self, _name: &str) -> Option<f64> {
        None
    }
}
