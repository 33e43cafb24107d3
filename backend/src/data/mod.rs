//! Data definitions
//!
//! Everything in a model that is not a component lives here: resources,
//! queues, resource sets, variables, and the statistics and counters that
//! components and users collect into. Definitions are stored in one arena
//! and addressed by [`DefinitionId`]; each kind is a variant of the closed
//! [`DataDefinition`] enum, resolved by pattern matching.
//!
//! Unlike components, definitions carry run-time state (busy counts, queue
//! contents, collectors) and are mutated while a replication runs.

pub mod queue;
pub mod resource;
pub mod set;

pub use queue::{OrderRule, Queue, Waiting};
pub use resource::{Resource, Subscriber};
pub use set::ResourceSet;

use crate::error::{SimResult, SimulationError};
use crate::models::entity::EntityId;
use crate::persistence::{keys, FieldValue, PersistenceError, PersistenceRecord};
use crate::stats::{Counter, StatisticsCollector, Summary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable handle of a data definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DefinitionId(usize);

impl DefinitionId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Definition.{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DefinitionKind {
    Resource,
    Queue,
    Set,
    Statistics,
    Counter,
    Variable,
}

impl DefinitionKind {
    /// Persistence typename
    pub fn typename(self) -> &'static str {
        match self {
            DefinitionKind::Resource => "Resource",
            DefinitionKind::Queue => "Queue",
            DefinitionKind::Set => "Set",
            DefinitionKind::Statistics => "Statistics",
            DefinitionKind::Counter => "Counter",
            DefinitionKind::Variable => "Variable",
        }
    }

    pub fn from_typename(typename: &str) -> Option<DefinitionKind> {
        match typename {
            "Resource" => Some(DefinitionKind::Resource),
            "Queue" => Some(DefinitionKind::Queue),
            "Set" => Some(DefinitionKind::Set),
            "Statistics" => Some(DefinitionKind::Statistics),
            "Counter" => Some(DefinitionKind::Counter),
            "Variable" => Some(DefinitionKind::Variable),
            _ => None,
        }
    }
}

/// User statistics, or one generated for a component (`internal`)
#[derive(Debug, Clone)]
pub struct StatisticsDefinition {
    pub name: String,
    pub collector: StatisticsCollector,
    pub internal: bool,
}

#[derive(Debug, Clone)]
pub struct CounterDefinition {
    pub name: String,
    pub counter: Counter,
    pub internal: bool,
}

/// Named numeric value, reset to its initial value every replication
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub initial: f64,
    pub value: f64,
}

impl Variable {
    pub fn new(name: impl Into<String>, initial: f64) -> Self {
        Self {
            name: name.into(),
            initial,
            value: initial,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DataDefinition {
    Resource(Resource),
    Queue(Queue),
    Set(ResourceSet),
    Statistics(StatisticsDefinition),
    Counter(CounterDefinition),
    Variable(Variable),
}

impl DataDefinition {
    pub fn kind(&self) -> DefinitionKind {
        match self {
            DataDefinition::Resource(_) => DefinitionKind::Resource,
            DataDefinition::Queue(_) => DefinitionKind::Queue,
            DataDefinition::Set(_) => DefinitionKind::Set,
            DataDefinition::Statistics(_) => DefinitionKind::Statistics,
            DataDefinition::Counter(_) => DefinitionKind::Counter,
            DataDefinition::Variable(_) => DefinitionKind::Variable,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DataDefinition::Resource(r) => r.name(),
            DataDefinition::Queue(q) => q.name(),
            DataDefinition::Set(s) => s.name(),
            DataDefinition::Statistics(s) => &s.name,
            DataDefinition::Counter(c) => &c.name,
            DataDefinition::Variable(v) => &v.name,
        }
    }

    /// Generated by the kernel; not persisted
    pub fn is_internal(&self) -> bool {
        match self {
            DataDefinition::Statistics(s) => s.internal,
            DataDefinition::Counter(c) => c.internal,
            _ => false,
        }
    }

    /// Write this definition's fields
    pub fn save_instance(&self, record: &mut PersistenceRecord, save_defaults: bool, data: &DataManager) {
        record.insert(keys::TYPENAME, self.kind().typename());
        record.insert(keys::NAME, self.name());
        match self {
            DataDefinition::Resource(r) => {
                record.save_field("capacity", r.capacity(), 1u32, save_defaults);
                record.save_field("persistent", r.is_persistent(), false, save_defaults);
            }
            DataDefinition::Queue(q) => {
                record.save_field(
                    "orderRule",
                    FieldValue::Enum(q.order().code()),
                    FieldValue::Enum(0),
                    save_defaults,
                );
                record.save_field(
                    "orderAttribute",
                    q.order().attribute().unwrap_or(""),
                    "",
                    save_defaults,
                );
                record.save_field(
                    "capacity",
                    q.capacity().map(|c| c as i64).unwrap_or(0),
                    0i64,
                    save_defaults,
                );
                record.save_field("persistent", q.is_persistent(), false, save_defaults);
            }
            DataDefinition::Set(s) => {
                record.insert("members", s.len() as i64);
                for (i, member) in s.members().iter().enumerate() {
                    let name = data.get(*member).map(|d| d.name()).unwrap_or("");
                    record.insert(format!("member{i}"), name);
                }
            }
            DataDefinition::Statistics(_) | DataDefinition::Counter(_) => {}
            DataDefinition::Variable(v) => {
                record.save_field("initialValue", v.initial, 0.0, save_defaults);
            }
        }
    }

    /// Rebuild a definition from a record
    ///
    /// Sets resolve their members by name against `data`, so resources must
    /// be loaded first.
    pub fn load_instance(record: &PersistenceRecord, data: &DataManager) -> Result<DataDefinition, PersistenceError> {
        let typename = record.text(keys::TYPENAME)?;
        let kind = DefinitionKind::from_typename(typename)
            .ok_or_else(|| PersistenceError::UnknownTypename(typename.to_string()))?;
        let name = record.text(keys::NAME)?.to_string();

        let definition = match kind {
            DefinitionKind::Resource => {
                let capacity = record.int_or("capacity", 1)?;
                let capacity = u32::try_from(capacity).map_err(|_| PersistenceError::InvalidField {
                    field: "capacity".to_string(),
                    expected: "non-negative integer",
                })?;
                let mut resource = Resource::new(name, capacity);
                resource.set_persistent(record.bool_or("persistent", false)?);
                DataDefinition::Resource(resource)
            }
            DefinitionKind::Queue => {
                let attribute = record.text_or("orderAttribute", "")?;
                let code = record.enum_or("orderRule", 0)?;
                let order = OrderRule::from_code(code, attribute).ok_or_else(|| PersistenceError::InvalidField {
                    field: "orderRule".to_string(),
                    expected: "order rule code 0..=4",
                })?;
                let mut queue = Queue::new(name, order);
                let capacity = record.int_or("capacity", 0)?;
                queue.set_capacity((capacity > 0).then_some(capacity as usize));
                queue.set_persistent(record.bool_or("persistent", false)?);
                DataDefinition::Queue(queue)
            }
            DefinitionKind::Set => {
                let count = record.int_or("members", 0)?;
                let mut members = Vec::new();
                for i in 0..count {
                    let member = record.text(&format!("member{i}"))?;
                    let id = data
                        .find(DefinitionKind::Resource, member)
                        .ok_or_else(|| PersistenceError::UnknownReference {
                            kind: "Resource",
                            name: member.to_string(),
                        })?;
                    members.push(id);
                }
                DataDefinition::Set(ResourceSet::new(name, members))
            }
            DefinitionKind::Statistics => DataDefinition::Statistics(StatisticsDefinition {
                name,
                collector: StatisticsCollector::new(),
                internal: false,
            }),
            DefinitionKind::Counter => DataDefinition::Counter(CounterDefinition {
                name,
                counter: Counter::new(),
                internal: false,
            }),
            DefinitionKind::Variable => {
                DataDefinition::Variable(Variable::new(name, record.float_or("initialValue", 0.0)?))
            }
        };
        Ok(definition)
    }
}

/// Arena of data definitions with per-kind name lookup
#[derive(Debug, Clone)]
pub struct DataManager {
    definitions: Vec<DataDefinition>,
    index: BTreeMap<(DefinitionKind, String), DefinitionId>,
    confidence_level: f64,
}

impl DataManager {
    pub fn new() -> Self {
        Self {
            definitions: Vec::new(),
            index: BTreeMap::new(),
            confidence_level: crate::stats::DEFAULT_CONFIDENCE,
        }
    }

    /// Add a definition; names are unique per kind
    pub fn insert(&mut self, definition: DataDefinition) -> SimResult<DefinitionId> {
        let key = (definition.kind(), definition.name().to_string());
        if self.index.contains_key(&key) {
            return Err(SimulationError::DuplicateName {
                kind: key.0.typename(),
                name: key.1,
            });
        }
        let id = DefinitionId(self.definitions.len());
        self.definitions.push(definition);
        self.index.insert(key, id);
        Ok(id)
    }

    pub fn get(&self, id: DefinitionId) -> Option<&DataDefinition> {
        self.definitions.get(id.0)
    }

    pub fn get_mut(&mut self, id: DefinitionId) -> Option<&mut DataDefinition> {
        self.definitions.get_mut(id.0)
    }

    pub fn find(&self, kind: DefinitionKind, name: &str) -> Option<DefinitionId> {
        self.index.get(&(kind, name.to_string())).copied()
    }

    /// Display name of a definition (empty when unknown)
    pub fn name_of(&self, id: DefinitionId) -> &str {
        self.get(id).map(|d| d.name()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DefinitionId, &DataDefinition)> {
        self.definitions
            .iter()
            .enumerate()
            .map(|(i, d)| (DefinitionId(i), d))
    }

    fn missing(id: DefinitionId) -> SimulationError {
        SimulationError::DefinitionNotFound(id.to_string())
    }

    pub fn resource(&self, id: DefinitionId) -> SimResult<&Resource> {
        match self.get(id) {
            Some(DataDefinition::Resource(r)) => Ok(r),
            _ => Err(Self::missing(id)),
        }
    }

    pub fn resource_mut(&mut self, id: DefinitionId) -> SimResult<&mut Resource> {
        match self.get_mut(id) {
            Some(DataDefinition::Resource(r)) => Ok(r),
            _ => Err(Self::missing(id)),
        }
    }

    pub fn queue(&self, id: DefinitionId) -> SimResult<&Queue> {
        match self.get(id) {
            Some(DataDefinition::Queue(q)) => Ok(q),
            _ => Err(Self::missing(id)),
        }
    }

    pub fn queue_mut(&mut self, id: DefinitionId) -> SimResult<&mut Queue> {
        match self.get_mut(id) {
            Some(DataDefinition::Queue(q)) => Ok(q),
            _ => Err(Self::missing(id)),
        }
    }

    pub fn set(&self, id: DefinitionId) -> SimResult<&ResourceSet> {
        match self.get(id) {
            Some(DataDefinition::Set(s)) => Ok(s),
            _ => Err(Self::missing(id)),
        }
    }

    pub fn variable(&self, id: DefinitionId) -> SimResult<&Variable> {
        match self.get(id) {
            Some(DataDefinition::Variable(v)) => Ok(v),
            _ => Err(Self::missing(id)),
        }
    }

    pub fn variable_mut(&mut self, id: DefinitionId) -> SimResult<&mut Variable> {
        match self.get_mut(id) {
            Some(DataDefinition::Variable(v)) => Ok(v),
            _ => Err(Self::missing(id)),
        }
    }

    pub fn statistics(&self, id: DefinitionId) -> SimResult<&StatisticsCollector> {
        match self.get(id) {
            Some(DataDefinition::Statistics(s)) => Ok(&s.collector),
            _ => Err(Self::missing(id)),
        }
    }

    pub fn counter(&self, id: DefinitionId) -> SimResult<&Counter> {
        match self.get(id) {
            Some(DataDefinition::Counter(c)) => Ok(&c.counter),
            _ => Err(Self::missing(id)),
        }
    }

    /// Add an observation to a Statistics definition
    pub fn collect(&mut self, id: DefinitionId, value: f64) -> SimResult<()> {
        match self.get_mut(id) {
            Some(DataDefinition::Statistics(s)) => {
                s.collector.collect(value);
                Ok(())
            }
            _ => Err(Self::missing(id)),
        }
    }

    pub fn increment(&mut self, id: DefinitionId, by: i64) -> SimResult<()> {
        match self.get_mut(id) {
            Some(DataDefinition::Counter(c)) => {
                c.counter.increment(by);
                Ok(())
            }
            _ => Err(Self::missing(id)),
        }
    }

    /// Find or create a kernel-generated Statistics definition
    pub fn internal_statistics(&mut self, name: &str) -> DefinitionId {
        if let Some(id) = self.find(DefinitionKind::Statistics, name) {
            return id;
        }
        let id = DefinitionId(self.definitions.len());
        self.definitions.push(DataDefinition::Statistics(StatisticsDefinition {
            name: name.to_string(),
            collector: StatisticsCollector::with_confidence(self.confidence_level),
            internal: true,
        }));
        self.index
            .insert((DefinitionKind::Statistics, name.to_string()), id);
        id
    }

    /// Find or create a kernel-generated Counter definition
    pub fn internal_counter(&mut self, name: &str) -> DefinitionId {
        if let Some(id) = self.find(DefinitionKind::Counter, name) {
            return id;
        }
        let id = DefinitionId(self.definitions.len());
        self.definitions.push(DataDefinition::Counter(CounterDefinition {
            name: name.to_string(),
            counter: Counter::new(),
            internal: true,
        }));
        self.index.insert((DefinitionKind::Counter, name.to_string()), id);
        id
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    pub fn set_confidence_level(&mut self, level: f64) {
        self.confidence_level = level;
        for definition in &mut self.definitions {
            match definition {
                DataDefinition::Statistics(s) => s.collector.set_confidence_level(level),
                DataDefinition::Queue(q) => q.set_confidence_level(level),
                _ => {}
            }
        }
    }

    /// Start a replication at `now`
    ///
    /// Non-persistent queues are emptied, persistent resources keep the
    /// units given in `held` (units held by entities that survive), every
    /// other resource starts idle, variables return to their initial value
    /// and every collector is cleared. Returns the entities dropped from
    /// queues.
    pub fn reset_for_replication(&mut self, now: f64, held: &BTreeMap<DefinitionId, u32>) -> Vec<EntityId> {
        let mut dropped = Vec::new();
        for (i, definition) in self.definitions.iter_mut().enumerate() {
            match definition {
                DataDefinition::Resource(r) => {
                    let busy = if r.is_persistent() {
                        held.get(&DefinitionId(i)).copied().unwrap_or(0)
                    } else {
                        0
                    };
                    r.reset(busy, now);
                }
                DataDefinition::Queue(q) => dropped.extend(q.reset(now)),
                DataDefinition::Set(_) => {}
                DataDefinition::Statistics(s) => s.collector.clear(),
                DataDefinition::Counter(c) => c.counter.clear(),
                DataDefinition::Variable(v) => v.value = v.initial,
            }
        }
        dropped
    }

    /// Discard every collector but keep state (end of warm-up)
    pub fn clear_statistics(&mut self, now: f64) {
        for definition in &mut self.definitions {
            match definition {
                DataDefinition::Resource(r) => r.clear_statistics(now),
                DataDefinition::Queue(q) => q.clear_statistics(now),
                DataDefinition::Statistics(s) => s.collector.clear(),
                DataDefinition::Counter(c) => c.counter.clear(),
                DataDefinition::Set(_) | DataDefinition::Variable(_) => {}
            }
        }
    }

    /// Every collector summarised at `now`, keyed by display name
    ///
    /// Resource and queue collectors are named `<name>.<Statistic>`.
    pub fn summaries(&self, now: f64) -> (BTreeMap<String, Summary>, BTreeMap<String, i64>) {
        let mut statistics = BTreeMap::new();
        let mut counters = BTreeMap::new();
        for definition in &self.definitions {
            match definition {
                DataDefinition::Resource(r) => {
                    statistics.insert(format!("{}.NumberBusy", r.name()), r.busy_level().summary(now));
                    counters.insert(format!("{}.SeizedUnits", r.name()), r.seized_units());
                    counters.insert(format!("{}.ReleasedUnits", r.name()), r.released_units());
                    counters.insert(format!("{}.IdledUnits", r.name()), r.idled_units());
                    counters.insert(format!("{}.TransferredUnits", r.name()), r.transferred_units());
                }
                DataDefinition::Queue(q) => {
                    statistics.insert(format!("{}.TimeInQueue", q.name()), q.time_in_queue().summary());
                    statistics.insert(
                        format!("{}.NumberInQueue", q.name()),
                        q.number_in_queue().summary(now),
                    );
                }
                DataDefinition::Statistics(s) => {
                    statistics.insert(s.name.clone(), s.collector.summary());
                }
                DataDefinition::Counter(c) => {
                    counters.insert(c.name.clone(), c.counter.value());
                }
                DataDefinition::Set(_) | DataDefinition::Variable(_) => {}
            }
        }
        (statistics, counters)
    }
}

impl Default for DataManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_unique_per_kind() {
        let mut data = DataManager::new();
        data.insert(DataDefinition::Resource(Resource::new("M1", 1)))
            .unwrap();
        let dup = data.insert(DataDefinition::Resource(Resource::new("M1", 2)));
        assert!(matches!(dup, Err(SimulationError::DuplicateName { .. })));
        // Same name, different kind is fine
        data.insert(DataDefinition::Queue(Queue::new("M1", OrderRule::Fifo)))
            .unwrap();
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_typed_accessors_reject_wrong_kind() {
        let mut data = DataManager::new();
        let id = data
            .insert(DataDefinition::Variable(Variable::new("limit", 3.0)))
            .unwrap();
        assert!(data.resource(id).is_err());
        assert_eq!(data.variable(id).unwrap().value, 3.0);
    }

    #[test]
    fn test_internal_definitions_are_reused() {
        let mut data = DataManager::new();
        let a = data.internal_counter("Create_1.NumberIn");
        let b = data.internal_counter("Create_1.NumberIn");
        assert_eq!(a, b);
        assert!(data.get(a).unwrap().is_internal());
        data.increment(a, 2).unwrap();
        assert_eq!(data.counter(a).unwrap().value(), 2);
    }

    #[test]
    fn test_reset_keeps_persistent_resource_holdings() {
        let mut data = DataManager::new();
        let mut kept = Resource::new("Kept", 3);
        kept.set_persistent(true);
        let kept = data.insert(DataDefinition::Resource(kept)).unwrap();
        let plain = data
            .insert(DataDefinition::Resource(Resource::new("Plain", 3)))
            .unwrap();
        data.resource_mut(plain).unwrap().allocate(2, false, 0.0);

        let held = BTreeMap::from([(kept, 2), (plain, 2)]);
        data.reset_for_replication(0.0, &held);
        assert_eq!(data.resource(kept).unwrap().busy(), 2);
        assert_eq!(data.resource(plain).unwrap().busy(), 0);
    }

    #[test]
    fn test_definition_record_round_trip() {
        let mut data = DataManager::new();
        let m1 = data
            .insert(DataDefinition::Resource(Resource::new("M1", 2)))
            .unwrap();
        let m2 = data
            .insert(DataDefinition::Resource(Resource::new("M2", 1)))
            .unwrap();
        let set = data
            .insert(DataDefinition::Set(ResourceSet::new("Machines", vec![m1, m2])))
            .unwrap();

        let mut record = PersistenceRecord::new();
        data.get(set).unwrap().save_instance(&mut record, false, &data);
        let loaded = DataDefinition::load_instance(&record, &data).unwrap();
        match loaded {
            DataDefinition::Set(s) => assert_eq!(s.members(), &[m1, m2]),
            other => panic!("expected a set, got {other:?}"),
        }

        let mut queue = Queue::new("Line", OrderRule::LowestValue("due".into()));
        queue.set_capacity(Some(4));
        let mut record = PersistenceRecord::new();
        DataDefinition::Queue(queue).save_instance(&mut record, false, &data);
        match DataDefinition::load_instance(&record, &data).unwrap() {
            DataDefinition::Queue(q) => {
                assert_eq!(q.order(), &OrderRule::LowestValue("due".into()));
                assert_eq!(q.capacity(), Some(4));
            }
            other => panic!("expected a queue, got {other:?}"),
        }
    }
}
