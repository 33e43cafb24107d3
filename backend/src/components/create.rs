//! Create: the source of entities
//!
//! The first batch is created at `first_creation`; every batch schedules the
//! next one after a sampled time between creations, until
//! `max_creations` entities exist (unbounded when `None`).

use crate::components::{CheckScope, ComponentId, LoadScope, ModelComponent, SaveScope};
use crate::core::time::{SimTime, TimeUnit};
use crate::error::{SimResult, SimulationError};
use crate::models::entity::EntityId;
use crate::models::event::SimEvent;
use crate::orchestrator::context::DispatchContext;
use crate::persistence::{PersistenceError, PersistenceRecord};
use tracing::trace;

/// Most entities a single creation event may mint
pub const MAX_BATCH: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Create {
    pub entity_type: String,
    pub interval: String,
    pub unit: TimeUnit,
    pub entities_per_creation: String,
    /// Time of the first batch, in `unit`
    pub first_creation: f64,
    pub max_creations: Option<u64>,
}

impl Default for Create {
    fn default() -> Self {
        Self {
            entity_type: "Entity".to_string(),
            interval: "1".to_string(),
            unit: TimeUnit::Second,
            entities_per_creation: "1".to_string(),
            first_creation: 0.0,
            max_creations: None,
        }
    }
}

impl Create {
    pub fn new(entity_type: impl Into<String>, interval: impl Into<String>, unit: TimeUnit) -> Self {
        Self {
            entity_type: entity_type.into(),
            interval: interval.into(),
            unit,
            ..Self::default()
        }
    }

    pub fn with_first_creation(mut self, time: f64) -> Self {
        self.first_creation = time;
        self
    }

    pub fn with_max_creations(mut self, max: u64) -> Self {
        self.max_creations = Some(max);
        self
    }

    pub fn with_entities_per_creation(mut self, expression: impl Into<String>) -> Self {
        self.entities_per_creation = expression.into();
        self
    }

    /// First creation time on the replication clock
    pub fn first_time(&self, base_unit: TimeUnit) -> f64 {
        self.first_creation * self.unit.factor_to(base_unit)
    }

    /// Handle a creation event: mint a batch, schedule the next, forward
    pub fn create(&self, ctx: &mut DispatchContext<'_>, id: ComponentId) -> SimResult<()> {
        let now = ctx.now();
        let created = ctx.run.creations.get(&id).copied().unwrap_or(0);
        let remaining = self.max_creations.map_or(u64::MAX, |max| max.saturating_sub(created));

        let batch = ctx.evaluate(&self.entities_per_creation, None)?;
        if batch.round() > MAX_BATCH as f64 {
            return Err(SimulationError::BatchTooLarge {
                component: ctx.component_name(id).to_string(),
                requested: batch,
                limit: MAX_BATCH,
            });
        }
        let batch = if batch.is_nan() || batch < 0.0 { 0 } else { batch.round() as u64 };
        let batch = batch.min(remaining);

        if remaining > batch {
            let gap = ctx.evaluate(&self.interval, None)? * self.unit.factor_to(ctx.run.base_unit);
            if gap.is_nan() || gap < 0.0 {
                return Err(SimulationError::InvalidTime {
                    requested: now + gap,
                    now,
                });
            }
            ctx.schedule_creation(now + gap, id)?;
        }
        *ctx.run.creations.entry(id).or_insert(0) += batch;

        let component = ctx.component_name(id).to_string();
        let mut minted = Vec::new();
        for _ in 0..batch {
            let entity = ctx.run.entities.create(&self.entity_type, SimTime::new(now));
            ctx.trace(SimEvent::EntityCreated {
                time: now,
                component: component.clone(),
                entity,
                entity_type: self.entity_type.clone(),
            });
            minted.push(entity);
        }
        trace!(component = %component, count = minted.len(), "batch created");
        for entity in minted {
            ctx.forward(id, entity)?;
        }
        Ok(())
    }
}

impl ModelComponent for Create {
    fn typename(&self) -> &'static str {
        "Create"
    }

    /// Entities arriving from elsewhere pass straight through
    fn on_dispatch(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: ComponentId,
        entity: EntityId,
        _port: u32,
    ) -> SimResult<()> {
        ctx.forward(id, entity)
    }

    fn check(&self, id: ComponentId, scope: &mut CheckScope<'_>) {
        scope.expression(id, "time between creations", &self.interval);
        scope.expression(id, "entities per creation", &self.entities_per_creation);
        if self.first_creation < 0.0 || self.first_creation.is_nan() {
            scope.error(id, "first creation time is negative");
        }
        if scope.components.node(id).map(|n| n.connections.is_empty()).unwrap_or(true) {
            scope.error(id, "has no outgoing connection");
        }
    }

    fn save_instance(&self, record: &mut PersistenceRecord, scope: &SaveScope<'_>) {
        let d = scope.save_defaults;
        record.save_field("entityType", self.entity_type.as_str(), "Entity", d);
        record.save_field("timeBetweenCreations", self.interval.as_str(), "1", d);
        record.save_field("timeUnit", self.unit, TimeUnit::Second, d);
        record.save_field("entitiesPerCreation", self.entities_per_creation.as_str(), "1", d);
        record.save_field("firstCreation", self.first_creation, 0.0, d);
        if let Some(max) = self.max_creations {
            record.insert("maxCreations", max as i64);
        }
    }

    fn load_instance(&mut self, record: &PersistenceRecord, _scope: &LoadScope<'_>) -> Result<(), PersistenceError> {
        self.entity_type = record.text_or("entityType", "Entity")?.to_string();
        self.interval = record.text_or("timeBetweenCreations", "1")?.to_string();
        self.unit = record.time_unit_or("timeUnit", TimeUnit::Second)?;
        self.entities_per_creation = record.text_or("entitiesPerCreation", "1")?.to_string();
        self.first_creation = record.float_or("firstCreation", 0.0)?;
        self.max_creations = match record.int_or("maxCreations", -1)? {
            max if max < 0 => None,
            max => Some(max as u64),
        };
        Ok(())
    }
}
