//! Process: Seize, then Delay, then Release, as one component
//!
//! A Process is configured with a detached Seize and Delay. When inserted
//! into a model it is split into three internal nodes (`<name>.Seize`,
//! `<name>.Delay`, `<name>.Release`) owned by the Process and wired in that
//! order. Before every run, model check copies the Process's connections
//! onto the internal Release and rebuilds the Release's request list from
//! the Seize's, so the Release always gives back exactly what the Seize
//! took.

use crate::allocation::{SeizableItem, SeizableTarget, SelectionRule};
use crate::components::delay::Delay;
use crate::components::seize::Seize;
use crate::components::{CheckScope, ComponentId, LoadScope, ModelComponent, SaveScope};
use crate::data::DataManager;
use crate::error::{SimResult, SimulationError};
use crate::models::entity::EntityId;
use crate::orchestrator::context::DispatchContext;
use crate::persistence::{keys, PersistenceError, PersistenceRecord};

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessParts {
    /// Configured, not yet inserted into a model
    Detached { seize: Box<Seize>, delay: Box<Delay> },
    /// Internal nodes in the model's arena
    Attached {
        seize: ComponentId,
        delay: ComponentId,
        release: ComponentId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Process {
    parts: ProcessParts,
}

impl Process {
    pub fn new(seize: Seize, delay: Delay) -> Self {
        Self {
            parts: ProcessParts::Detached {
                seize: Box::new(seize),
                delay: Box::new(delay),
            },
        }
    }

    pub fn parts(&self) -> &ProcessParts {
        &self.parts
    }

    /// Internal Seize, Delay and Release, once attached
    pub fn internal(&self) -> Option<(ComponentId, ComponentId, ComponentId)> {
        match self.parts {
            ProcessParts::Attached { seize, delay, release } => Some((seize, delay, release)),
            ProcessParts::Detached { .. } => None,
        }
    }

    /// Hand the detached parts over for insertion
    pub(crate) fn take_detached(&mut self) -> Option<(Seize, Delay)> {
        match &self.parts {
            ProcessParts::Detached { seize, delay } => Some(((**seize).clone(), (**delay).clone())),
            ProcessParts::Attached { .. } => None,
        }
    }

    pub(crate) fn attach(&mut self, seize: ComponentId, delay: ComponentId, release: ComponentId) {
        self.parts = ProcessParts::Attached { seize, delay, release };
    }

    /// Attribute recording what the internal Seize allocated for one item
    pub fn save_attribute_name(process: &str, item: &SeizableItem, data: &DataManager) -> String {
        format!("Entity.{process}.{}SaveAttribute", data.name_of(item.target.definition()))
    }

    /// Release list mirroring a Seize list item by item
    pub fn mirrored_release_items(items: &[SeizableItem]) -> Vec<SeizableItem> {
        items
            .iter()
            .map(|item| SeizableItem {
                selection: SelectionRule::SpecificMember,
                ..item.clone()
            })
            .collect()
    }

    /// Give every Seize item a save attribute (generating missing ones)
    ///
    /// Generated names are unique within the list: a second item on the
    /// same target gets its position appended, so each grant is recorded
    /// and released on its own.
    pub fn assign_save_attributes(process: &str, items: &mut [SeizableItem], data: &DataManager) {
        let mut taken: Vec<String> = items
            .iter()
            .filter_map(|item| item.save_attribute().map(str::to_string))
            .collect();
        for (i, item) in items.iter_mut().enumerate() {
            if item.save_attribute().is_some() {
                continue;
            }
            let base = Self::save_attribute_name(process, item, data);
            let mut name = base.clone();
            let mut suffix = i;
            while taken.contains(&name) {
                name = format!("{base}{suffix}");
                suffix += 1;
            }
            taken.push(name.clone());
            item.save_attribute = name;
        }
    }

    fn part_record(scope: &SaveScope<'_>, id: ComponentId, part: &dyn ModelComponent) -> PersistenceRecord {
        let mut record = match scope.components.get(id) {
            Some(node) => node.save(id, scope),
            None => {
                let mut record = PersistenceRecord::new();
                part.save_instance(&mut record, scope);
                record
            }
        };
        record.erase(&keys::PART_IDENTITY);
        record
    }
}

impl ModelComponent for Process {
    fn typename(&self) -> &'static str {
        "Process"
    }

    fn on_dispatch(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: ComponentId,
        entity: EntityId,
        _port: u32,
    ) -> SimResult<()> {
        match self.parts {
            ProcessParts::Attached { seize, .. } => ctx.dispatch(seize, entity, 0),
            ProcessParts::Detached { .. } => Err(SimulationError::ComponentNotFound(format!(
                "internal seize of '{}'",
                ctx.component_name(id)
            ))),
        }
    }

    fn check(&self, id: ComponentId, scope: &mut CheckScope<'_>) {
        // The internal parts are nodes of their own and are checked as such
        match self.parts {
            ProcessParts::Detached { .. } => scope.error(id, "not inserted into a model"),
            ProcessParts::Attached { seize, delay, release } => {
                let wired = [(seize, "Seize"), (delay, "Delay"), (release, "Release")]
                    .iter()
                    .all(|(part, typename)| {
                        scope
                            .components
                            .get(*part)
                            .is_some_and(|n| n.owner == Some(id) && n.kind.typename() == *typename)
                    });
                if !wired {
                    scope.error(id, "internal Seize/Delay/Release are missing");
                }
            }
        }
    }

    fn save_instance(&self, record: &mut PersistenceRecord, scope: &SaveScope<'_>) {
        match &self.parts {
            ProcessParts::Attached { seize, delay, release } => {
                let (Some(seize_node), Some(delay_node)) = (scope.components.get(*seize), scope.components.get(*delay))
                else {
                    return;
                };
                record.merge(Self::part_record(scope, *seize, &seize_node.kind));
                record.merge(Self::part_record(scope, *delay, &delay_node.kind));
                if let Some(release_node) = scope.components.get(*release) {
                    let release_record = release_node.save(*release, scope);
                    if let Some(next) = release_record.get(keys::NEXT_ID) {
                        record.insert(keys::NEXT_ID, next.clone());
                    }
                }
            }
            ProcessParts::Detached { seize, delay } => {
                let invalid = ComponentId::new(usize::MAX);
                record.merge(Self::part_record(scope, invalid, seize.as_ref()));
                record.merge(Self::part_record(scope, invalid, delay.as_ref()));
            }
        }
    }

    /// Reads the folded Seize and Delay fields into detached parts
    fn load_instance(&mut self, record: &PersistenceRecord, scope: &LoadScope<'_>) -> Result<(), PersistenceError> {
        let mut seize = Seize::default();
        seize.load_instance(record, scope)?;
        let mut delay = Delay::default();
        delay.load_instance(record, scope)?;
        *self = Process::new(seize, delay);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataDefinition, Resource, ResourceSet};

    #[test]
    fn test_generated_save_attributes_and_mirror() {
        let mut data = DataManager::new();
        let m1 = data
            .insert(DataDefinition::Resource(Resource::new("M1", 1)))
            .unwrap();
        let set = data
            .insert(DataDefinition::Set(ResourceSet::new("Machines", vec![m1])))
            .unwrap();
        let mut items = vec![
            SeizableItem::resource(m1),
            SeizableItem::set(set, SelectionRule::LargestRemainingCapacity),
            SeizableItem::resource(m1).with_save_attribute("mine"),
        ];
        Process::assign_save_attributes("Process_1", &mut items, &data);
        assert_eq!(items[0].save_attribute, "Entity.Process_1.M1SaveAttribute");
        assert_eq!(items[1].save_attribute, "Entity.Process_1.MachinesSaveAttribute");
        assert_eq!(items[2].save_attribute, "mine");

        let release = Process::mirrored_release_items(&items);
        assert_eq!(release.len(), 3);
        assert!(release.iter().all(|i| i.selection == SelectionRule::SpecificMember));
        assert!(matches!(release[1].target, SeizableTarget::Set(id) if id == set));
        assert_eq!(release[1].save_attribute, items[1].save_attribute);
    }

    #[test]
    fn test_generated_save_attributes_unique_per_item() {
        let mut data = DataManager::new();
        let m1 = data
            .insert(DataDefinition::Resource(Resource::new("M1", 1)))
            .unwrap();
        let set = data
            .insert(DataDefinition::Set(ResourceSet::new("Machines", vec![m1])))
            .unwrap();
        let mut items = vec![
            SeizableItem::set(set, SelectionRule::LargestRemainingCapacity),
            SeizableItem::set(set, SelectionRule::LargestRemainingCapacity),
            SeizableItem::resource(m1).with_save_attribute("Entity.Process_1.MachinesSaveAttribute2"),
            SeizableItem::set(set, SelectionRule::PreferredOrder),
        ];
        Process::assign_save_attributes("Process_1", &mut items, &data);
        assert_eq!(items[0].save_attribute, "Entity.Process_1.MachinesSaveAttribute");
        assert_eq!(items[1].save_attribute, "Entity.Process_1.MachinesSaveAttribute1");
        assert_eq!(items[3].save_attribute, "Entity.Process_1.MachinesSaveAttribute3");
    }

    #[test]
    fn test_take_detached_only_once_attached_is_none() {
        let mut process = Process::new(Seize::default(), Delay::new("5", crate::TimeUnit::Second));
        let (_, delay) = process.take_detached().unwrap();
        assert_eq!(delay.expression, "5");
        process.attach(ComponentId::new(1), ComponentId::new(2), ComponentId::new(3));
        assert!(process.take_detached().is_none());
        assert_eq!(
            process.internal(),
            Some((ComponentId::new(1), ComponentId::new(2), ComponentId::new(3)))
        );
    }
}
