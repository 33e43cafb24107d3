//! Seize: acquire resource units, waiting in a queue when they are busy

use crate::allocation::seizable::{load_items, save_items};
use crate::allocation::{protocol, AllocationType, SeizableItem, SeizableTarget, SelectionRule};
use crate::components::{CheckScope, ComponentId, LoadScope, ModelComponent, SaveScope};
use crate::data::{DataDefinition, DataManager, DefinitionId, DefinitionKind};
use crate::error::{SimResult, SimulationError};
use crate::models::entity::EntityId;
use crate::orchestrator::context::DispatchContext;
use crate::persistence::{FieldValue, PersistenceError, PersistenceRecord};
use std::collections::BTreeMap;

/// What happens to an entity that finds a bounded queue full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueFullAction {
    /// Leave through the second connection, or be destroyed without one
    #[default]
    Balk,
    /// Wait outside the queue until a place frees
    Block,
}

impl QueueFullAction {
    pub fn code(self) -> i64 {
        match self {
            QueueFullAction::Balk => 0,
            QueueFullAction::Block => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(QueueFullAction::Balk),
            1 => Some(QueueFullAction::Block),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Seize {
    pub requests: Vec<SeizableItem>,
    /// Waiting line; the model creates `<name>.Queue` when left unset
    pub queue: Option<DefinitionId>,
    /// Higher priority Seizes are offered released units first
    pub priority: i32,
    pub allocation_type: AllocationType,
    pub queue_full: QueueFullAction,
}

impl Seize {
    pub fn new(requests: Vec<SeizableItem>) -> Self {
        Self {
            requests,
            ..Self::default()
        }
    }

    pub fn with_queue(mut self, queue: DefinitionId) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_allocation_type(mut self, allocation_type: AllocationType) -> Self {
        self.allocation_type = allocation_type;
        self
    }

    pub fn with_queue_full(mut self, action: QueueFullAction) -> Self {
        self.queue_full = action;
        self
    }

    /// Every resource this Seize may draw from (set members expanded)
    pub fn resources(&self, data: &DataManager) -> Vec<DefinitionId> {
        let mut resources: Vec<DefinitionId> = Vec::new();
        for item in &self.requests {
            let candidates = match item.target {
                SeizableTarget::Resource(id) => vec![id],
                SeizableTarget::Set(id) => data.set(id).map(|s| s.members().to_vec()).unwrap_or_default(),
            };
            for id in candidates {
                if !resources.contains(&id) {
                    resources.push(id);
                }
            }
        }
        resources
    }

    /// Checks shared with Release: references, quantities, expressions
    pub(crate) fn check_items(items: &[SeizableItem], id: ComponentId, scope: &mut CheckScope<'_>) {
        if items.is_empty() {
            scope.warning(id, "request list is empty");
        }
        for (i, item) in items.iter().enumerate() {
            scope.expression(id, &format!("quantity of request {i}"), &item.quantity);
            match item.target {
                SeizableTarget::Resource(resource) => {
                    scope.definition(id, resource, DefinitionKind::Resource);
                }
                SeizableTarget::Set(set) => {
                    if scope.definition(id, set, DefinitionKind::Set) {
                        let empty = scope.data.set(set).map(|s| s.is_empty()).unwrap_or(true);
                        if empty {
                            let name = scope.data.name_of(set).to_string();
                            scope.error(id, format!("set '{name}' has no members"));
                        }
                    }
                    scope.expression(id, &format!("member index of request {i}"), &item.member_index);
                }
            }
        }
    }

    /// The one resource `item` can be granted from, when known before the run
    fn fixed_resource(item: &SeizableItem, data: &DataManager) -> Option<DefinitionId> {
        match (item.target, item.selection) {
            (SeizableTarget::Resource(id), _) => Some(id),
            (SeizableTarget::Set(set), SelectionRule::SpecificMember) => {
                let index = item.member_index.trim().parse::<f64>().ok()?;
                let members = data.set(set).ok()?.members();
                match members.len() {
                    1 => members.first().copied(),
                    _ if index >= 0.0 => members.get(index.round() as usize).copied(),
                    _ => None,
                }
            }
            (SeizableTarget::Set(set), _) => match data.set(set).ok()?.members() {
                [only] => Some(*only),
                _ => None,
            },
        }
    }

    fn unsatisfiable(id: ComponentId, scope: &mut CheckScope<'_>, resource: String, requested: f64, capacity: u32) {
        let error = SimulationError::UnsatisfiableSeize {
            component: scope.components.name_of(id).to_string(),
            resource,
            requested: requested.round() as u32,
            capacity,
        };
        scope.error(id, error.to_string());
    }

    /// Largest capacity any target of `item` offers
    fn largest_capacity(item: &SeizableItem, scope: &CheckScope<'_>) -> Option<(String, u32)> {
        let capacity_of = |id: DefinitionId| match scope.data.get(id) {
            Some(DataDefinition::Resource(r)) => Some((r.name().to_string(), r.capacity())),
            _ => None,
        };
        match item.target {
            SeizableTarget::Resource(id) => capacity_of(id),
            SeizableTarget::Set(id) => scope
                .data
                .set(id)
                .ok()?
                .members()
                .iter()
                .filter_map(|m| capacity_of(*m))
                .fold(None, |best: Option<(String, u32)>, (name, cap)| match best {
                    Some((_, most)) if most >= cap => best,
                    _ => Some((name, cap)),
                }),
        }
    }
}

impl ModelComponent for Seize {
    fn typename(&self) -> &'static str {
        "Seize"
    }

    fn on_dispatch(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: ComponentId,
        entity: EntityId,
        _port: u32,
    ) -> SimResult<()> {
        protocol::seize(ctx, id, self, entity)
    }

    fn check(&self, id: ComponentId, scope: &mut CheckScope<'_>) {
        Self::check_items(&self.requests, id, scope);
        match self.queue {
            Some(queue) => {
                scope.definition(id, queue, DefinitionKind::Queue);
            }
            None => scope.error(id, "no queue"),
        }

        // Quantities only known by evaluation are checked at run time. Items
        // bound to one resource draw on it together, as `plan` counts them.
        let mut totals: BTreeMap<DefinitionId, f64> = BTreeMap::new();
        for item in &self.requests {
            let Ok(requested) = item.quantity.trim().parse::<f64>() else {
                continue;
            };
            match Self::fixed_resource(item, scope.data) {
                Some(resource) => *totals.entry(resource).or_insert(0.0) += requested,
                None => {
                    if let Some((resource, capacity)) = Self::largest_capacity(item, scope) {
                        if requested > capacity as f64 {
                            Self::unsatisfiable(id, scope, resource, requested, capacity);
                        }
                    }
                }
            }
        }
        for (resource, requested) in totals {
            if let Some(DataDefinition::Resource(r)) = scope.data.get(resource) {
                if requested > r.capacity() as f64 {
                    let (name, capacity) = (r.name().to_string(), r.capacity());
                    Self::unsatisfiable(id, scope, name, requested, capacity);
                }
            }
        }

        // Two set grants recorded under one attribute would lose a member
        let mut seen: Vec<&str> = Vec::new();
        for item in self.requests.iter().filter(|i| matches!(i.target, SeizableTarget::Set(_))) {
            if let Some(attribute) = item.save_attribute() {
                if seen.contains(&attribute) {
                    scope.error(id, format!("save attribute '{attribute}' records more than one set request"));
                }
                seen.push(attribute);
            }
        }
    }

    fn save_instance(&self, record: &mut PersistenceRecord, scope: &SaveScope<'_>) {
        save_items(&self.requests, record, scope.save_defaults, scope.data);
        record.save_field("priority", self.priority, 0, scope.save_defaults);
        record.save_field(
            "allocationType",
            FieldValue::Enum(self.allocation_type.code()),
            FieldValue::Enum(0),
            scope.save_defaults,
        );
        if let Some(queue) = self.queue {
            record.insert("queueName", scope.data.name_of(queue));
        }
        record.save_field(
            "queueFull",
            FieldValue::Enum(self.queue_full.code()),
            FieldValue::Enum(0),
            scope.save_defaults,
        );
    }

    fn load_instance(&mut self, record: &PersistenceRecord, scope: &LoadScope<'_>) -> Result<(), PersistenceError> {
        self.requests = load_items(record, scope.data)?;
        self.priority = record.int_or("priority", 0)? as i32;
        self.allocation_type = AllocationType::from_code(record.enum_or("allocationType", 0)?).ok_or(
            PersistenceError::InvalidField {
                field: "allocationType".to_string(),
                expected: "allocation type code 0 or 1",
            },
        )?;
        self.queue = match record.text_or("queueName", "")? {
            "" => None,
            name => Some(scope.data.find(DefinitionKind::Queue, name).ok_or_else(|| {
                PersistenceError::UnknownReference {
                    kind: "Queue",
                    name: name.to_string(),
                }
            })?),
        };
        self.queue_full = QueueFullAction::from_code(record.enum_or("queueFull", 0)?).ok_or(
            PersistenceError::InvalidField {
                field: "queueFull".to_string(),
                expected: "queue full action code 0 or 1",
            },
        )?;
        Ok(())
    }
}
