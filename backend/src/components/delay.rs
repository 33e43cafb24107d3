//! Delay: hold an entity for a sampled time, then pass it on

use crate::components::{CheckScope, ComponentId, LoadScope, ModelComponent, SaveScope};
use crate::core::time::TimeUnit;
use crate::error::{SimResult, SimulationError};
use crate::models::entity::EntityId;
use crate::models::event::SimEvent;
use crate::orchestrator::context::DispatchContext;
use crate::persistence::{PersistenceError, PersistenceRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct Delay {
    pub expression: String,
    pub unit: TimeUnit,
    /// Priority of the scheduled departure event
    pub priority: i32,
}

impl Default for Delay {
    fn default() -> Self {
        Self {
            expression: "1".to_string(),
            unit: TimeUnit::Second,
            priority: 0,
        }
    }
}

impl Delay {
    pub fn new(expression: impl Into<String>, unit: TimeUnit) -> Self {
        Self {
            expression: expression.into(),
            unit,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl ModelComponent for Delay {
    fn typename(&self) -> &'static str {
        "Delay"
    }

    fn on_dispatch(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: ComponentId,
        entity: EntityId,
        _port: u32,
    ) -> SimResult<()> {
        let now = ctx.now();
        let sampled = ctx.evaluate(&self.expression, Some(entity))?;
        let duration = sampled * self.unit.factor_to(ctx.run.base_unit);
        if duration.is_nan() || duration < 0.0 {
            return Err(SimulationError::InvalidTime {
                requested: now + duration,
                now,
            });
        }

        let until = now + duration;
        let Some(next) = ctx.components.node(id)?.connections.front() else {
            return ctx.forward(id, entity);
        };
        ctx.trace(SimEvent::Delayed {
            time: now,
            component: ctx.component_name(id).to_string(),
            entity,
            until,
        });
        ctx.schedule_arrival(until, self.priority, entity, next)?;
        Ok(())
    }

    fn check(&self, id: ComponentId, scope: &mut CheckScope<'_>) {
        scope.expression(id, "delay", &self.expression);
    }

    fn save_instance(&self, record: &mut PersistenceRecord, scope: &SaveScope<'_>) {
        record.save_field("delayExpression", self.expression.as_str(), "1", scope.save_defaults);
        record.save_field("delayTimeUnit", self.unit, TimeUnit::Second, scope.save_defaults);
        // Not "priority": a Process folds this record next to its Seize's
        record.save_field("delayPriority", self.priority, 0, scope.save_defaults);
    }

    fn load_instance(&mut self, record: &PersistenceRecord, _scope: &LoadScope<'_>) -> Result<(), PersistenceError> {
        self.expression = record.text_or("delayExpression", "1")?.to_string();
        self.unit = record.time_unit_or("delayTimeUnit", TimeUnit::Second)?;
        self.priority = record.int_or("delayPriority", 0)? as i32;
        Ok(())
    }
}
