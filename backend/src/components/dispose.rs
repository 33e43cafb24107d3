//! Dispose: where entities leave the system

use crate::components::{CheckScope, ComponentId, LoadScope, ModelComponent, SaveScope};
use crate::error::{SimResult, SimulationError};
use crate::models::entity::EntityId;
use crate::models::event::SimEvent;
use crate::orchestrator::context::DispatchContext;
use crate::persistence::{PersistenceError, PersistenceRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispose;

impl ModelComponent for Dispose {
    fn typename(&self) -> &'static str {
        "Dispose"
    }

    fn on_dispatch(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: ComponentId,
        entity: EntityId,
        _port: u32,
    ) -> SimResult<()> {
        let now = ctx.now();
        let record = ctx.entity(entity)?;
        let time_in_system = now - record.created_at().value();
        let statistics = format!("{}.TimeInSystem", record.entity_type());

        let report = ctx
            .components
            .get(id)
            .is_some_and(|n| n.report_statistics);
        if report {
            let stat = ctx.data.internal_statistics(&statistics);
            ctx.data.collect(stat, time_in_system)?;
        }
        ctx.trace(SimEvent::Disposed {
            time: now,
            component: ctx.component_name(id).to_string(),
            entity,
            time_in_system,
        });
        ctx.dispose(entity)
            .map(|_| ())
            .ok_or(SimulationError::EntityNotFound(entity))
    }

    fn check(&self, id: ComponentId, scope: &mut CheckScope<'_>) {
        if scope.components.node(id).is_ok_and(|n| !n.connections.is_empty()) {
            scope.warning(id, "connections of a Dispose are never used");
        }
    }

    fn save_instance(&self, _record: &mut PersistenceRecord, _scope: &SaveScope<'_>) {}

    fn load_instance(&mut self, _record: &PersistenceRecord, _scope: &LoadScope<'_>) -> Result<(), PersistenceError> {
        Ok(())
    }
}
