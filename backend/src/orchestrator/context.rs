//! Per-replication run state and the dispatch context handed to components

use crate::allocation::Holdings;
use crate::components::{ComponentArena, ComponentId, Connection, ModelComponent};
use crate::core::time::{SimTime, TimeUnit};
use crate::data::{DataManager, DefinitionKind};
use crate::error::{SimResult, SimulationError};
use crate::events::{Calendar, EventId, EventKind};
use crate::expression::{EvalScope, ExpressionEvaluator};
use crate::models::entity::{Entity, EntityId, EntityStore};
use crate::models::event::SimEvent;
use crate::rng::RngManager;
use crate::trace::Tracer;
use std::collections::BTreeMap;
use tracing::warn;

/// Mutable state of the replication in progress
#[derive(Debug)]
pub struct RunState {
    /// Pending events; owns the clock
    pub calendar: Calendar,
    pub entities: EntityStore,
    pub rng: RngManager,
    pub holdings: Holdings,
    /// Entities created so far, per Create
    pub creations: BTreeMap<ComponentId, u64>,
    /// Unit of the replication clock
    pub base_unit: TimeUnit,
    pub replication: u32,
}

impl RunState {
    pub fn new(seed: u64, base_unit: TimeUnit) -> Self {
        Self {
            calendar: Calendar::new(),
            entities: EntityStore::new(),
            rng: RngManager::new(seed),
            holdings: Holdings::new(),
            creations: BTreeMap::new(),
            base_unit,
            replication: 0,
        }
    }
}

/// Borrowed view of one simulation step
///
/// Components are read-only while the simulation runs; everything they
/// change lives in the data definitions and the run state.
pub struct DispatchContext<'a> {
    pub components: &'a ComponentArena,
    pub data: &'a mut DataManager,
    pub evaluator: &'a mut dyn ExpressionEvaluator,
    pub run: &'a mut RunState,
    pub tracer: &'a mut Tracer,
}

impl DispatchContext<'_> {
    pub fn now(&self) -> f64 {
        self.run.calendar.now().value()
    }

    pub fn component_name(&self, id: ComponentId) -> &str {
        self.components.name_of(id)
    }

    pub fn trace(&mut self, event: SimEvent) {
        self.tracer.emit(event);
    }

    pub fn entity(&self, id: EntityId) -> SimResult<&Entity> {
        self.run.entities.get(id).ok_or(SimulationError::EntityNotFound(id))
    }

    pub fn entity_mut(&mut self, id: EntityId) -> SimResult<&mut Entity> {
        self.run
            .entities
            .get_mut(id)
            .ok_or(SimulationError::EntityNotFound(id))
    }

    /// Enter `target` on input `port`
    pub fn dispatch(&mut self, target: ComponentId, entity: EntityId, port: u32) -> SimResult<()> {
        let components = self.components;
        let node = components.node(target)?;
        self.trace(SimEvent::Dispatched {
            time: self.now(),
            component: node.name.clone(),
            entity,
            port,
        });
        if let Some(counter) = node.number_in {
            self.data.increment(counter, 1)?;
        }
        node.kind.on_dispatch(self, target, entity, port)
    }

    /// Send the entity along the first connection of `from`
    pub fn forward(&mut self, from: ComponentId, entity: EntityId) -> SimResult<()> {
        self.forward_to(from, entity, 0)
    }

    /// Send the entity along connection `index` of `from`
    ///
    /// With no such connection the entity is absorbed: destroyed, with a
    /// warning traced.
    pub fn forward_to(&mut self, from: ComponentId, entity: EntityId, index: usize) -> SimResult<()> {
        let components = self.components;
        match components.node(from)?.connections.get(index) {
            Some(Connection { target, port }) => self.dispatch(target, entity, port),
            None => {
                let component = components.name_of(from).to_string();
                warn!(component = %component, entity = %entity, "no outgoing connection, entity absorbed");
                self.trace(SimEvent::Absorbed {
                    time: self.now(),
                    component,
                    entity,
                });
                self.dispose(entity);
                Ok(())
            }
        }
    }

    /// Entity reaches `connection` after a delay
    pub fn schedule_arrival(
        &mut self,
        time: f64,
        priority: i32,
        entity: EntityId,
        connection: Connection,
    ) -> SimResult<EventId> {
        self.run.calendar.schedule(
            SimTime::new(time),
            priority,
            EventKind::Arrival {
                entity,
                target: connection.target,
                port: connection.port,
            },
        )
    }

    pub fn schedule_creation(&mut self, time: f64, source: ComponentId) -> SimResult<EventId> {
        self.run
            .calendar
            .schedule(SimTime::new(time), 0, EventKind::Creation { source })
    }

    /// Evaluate an expression, with `entity`'s attributes in scope
    pub fn evaluate(&mut self, expression: &str, entity: Option<EntityId>) -> SimResult<f64> {
        let now = self.now();
        let scope = RunScope {
            now,
            data: self.data,
            entity: entity.and_then(|id| self.run.entities.get(id)),
        };
        Ok(self.evaluator.evaluate(expression, &scope, &mut self.run.rng)?)
    }

    /// Destroy an entity and forget what it holds
    pub fn dispose(&mut self, entity: EntityId) -> Option<Entity> {
        let held = self.run.holdings.remove_entity(entity);
        if !held.is_empty() {
            warn!(entity = %entity, grants = held.len(), "entity destroyed while holding resources");
        }
        self.run.entities.remove(entity)
    }
}

/// Expression scope over live run state
pub struct RunScope<'a> {
    pub now: f64,
    pub data: &'a DataManager,
    pub entity: Option<&'a Entity>,
}

impl EvalScope for RunScope<'_> {
    fn now(&self) -> f64 {
        self.now
    }

    fn queue_length(&self, queue: &str) -> Option<f64> {
        let id = self.data.find(DefinitionKind::Queue, queue)?;
        self.data.queue(id).ok().map(|q| q.len() as f64)
    }

    fn resource_busy(&self, resource: &str) -> Option<f64> {
        let id = self.data.find(DefinitionKind::Resource, resource)?;
        self.data.resource(id).ok().map(|r| r.busy() as f64)
    }

    fn resource_capacity(&self, resource: &str) -> Option<f64> {
        let id = self.data.find(DefinitionKind::Resource, resource)?;
        self.data.resource(id).ok().map(|r| r.capacity() as f64)
    }

    fn variable(&self, name: &str) -> Option<f64> {
        let id = self.data.find(DefinitionKind::Variable, name)?;
        self.data.variable(id).ok().map(|v| v.value)
    }

    fn attribute(&self, name: &str) -> Option<f64> {
        self.entity.and_then(|e| e.attribute(name))
    }
}
