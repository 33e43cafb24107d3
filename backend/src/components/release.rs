//! Release: give back units seized earlier and wake waiting requests

use crate::allocation::seizable::{load_items, save_items};
use crate::allocation::{protocol, SeizableItem, SeizableTarget};
use crate::components::seize::Seize;
use crate::components::{CheckScope, ComponentId, LoadScope, ModelComponent, SaveScope};
use crate::error::SimResult;
use crate::models::entity::EntityId;
use crate::orchestrator::context::DispatchContext;
use crate::persistence::{PersistenceError, PersistenceRecord};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Release {
    pub requests: Vec<SeizableItem>,
    pub priority: i32,
    /// Release whatever the entity holds under each item's save attribute
    /// instead of evaluating the quantity
    pub release_held: bool,
}

impl Release {
    pub fn new(requests: Vec<SeizableItem>) -> Self {
        Self {
            requests,
            ..Self::default()
        }
    }
}

impl ModelComponent for Release {
    fn typename(&self) -> &'static str {
        "Release"
    }

    fn on_dispatch(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: ComponentId,
        entity: EntityId,
        _port: u32,
    ) -> SimResult<()> {
        protocol::release(ctx, id, self, entity)
    }

    fn check(&self, id: ComponentId, scope: &mut CheckScope<'_>) {
        Seize::check_items(&self.requests, id, scope);
        for (i, item) in self.requests.iter().enumerate() {
            if matches!(item.target, SeizableTarget::Set(_)) && item.save_attribute().is_none() {
                scope.error(id, format!("request {i} releases a set member but has no save attribute"));
            }
        }
    }

    fn save_instance(&self, record: &mut PersistenceRecord, scope: &SaveScope<'_>) {
        save_items(&self.requests, record, scope.save_defaults, scope.data);
        record.save_field("priority", self.priority, 0, scope.save_defaults);
        record.save_field("releaseHeld", self.release_held, false, scope.save_defaults);
    }

    fn load_instance(&mut self, record: &PersistenceRecord, scope: &LoadScope<'_>) -> Result<(), PersistenceError> {
        self.requests = load_items(record, scope.data)?;
        self.priority = record.int_or("priority", 0)? as i32;
        self.release_held = record.bool_or("releaseHeld", false)?;
        Ok(())
    }
}
