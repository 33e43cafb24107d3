//! Entity model
//!
//! An entity is the token that flows through the component graph. It carries
//! a type name, its creation time, a priority, and named numeric attributes.
//! Seize writes the identity of allocated resources into attributes so the
//! matching Release can find them again.

use crate::core::time::SimTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier of an entity within a simulation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity.{}", self.0)
    }
}

/// A unit flowing through the model
///
/// # Example
/// ```
/// use simkernel_core::{Entity, EntityId, SimTime};
///
/// let mut customer = Entity::new(EntityId::new(1), "Customer", SimTime::ZERO);
/// customer.set_attribute("size", 3.0);
/// assert_eq!(customer.attribute("size"), Some(3.0));
/// assert_eq!(customer.priority(), 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    entity_type: String,
    created_at: SimTime,
    /// Higher value = more urgent
    priority: i32,
    attributes: BTreeMap<String, f64>,
}

impl Entity {
    pub fn new(id: EntityId, entity_type: impl Into<String>, created_at: SimTime) -> Self {
        Self {
            id,
            entity_type: entity_type.into(),
            created_at,
            priority: 0,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn created_at(&self) -> SimTime {
        self.created_at
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    pub fn attribute(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).copied()
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: f64) {
        self.attributes.insert(name.into(), value);
    }

    /// Remove an attribute, returning its last value
    pub fn clear_attribute(&mut self, name: &str) -> Option<f64> {
        self.attributes.remove(name)
    }

    pub fn attributes(&self) -> &BTreeMap<String, f64> {
        &self.attributes
    }
}

/// Owner of every live entity in a run
///
/// Ids are never reused within one simulation, including across
/// replications, so entities held in persistent queues keep their identity.
#[derive(Debug, Clone)]
pub struct EntityStore {
    entities: BTreeMap<EntityId, Entity>,
    next_id: u64,
    created: u64,
    destroyed: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
            next_id: 1,
            created: 0,
            destroyed: 0,
        }
    }

    /// Mint a new entity and take ownership of it
    pub fn create(&mut self, entity_type: &str, now: SimTime) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.created += 1;
        self.entities.insert(id, Entity::new(id, entity_type, now));
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Destroy an entity (Dispose, or end-of-replication cleanup)
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let removed = self.entities.remove(&id);
        if removed.is_some() {
            self.destroyed += 1;
        }
        removed
    }

    /// Keep only the entities for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(EntityId) -> bool) {
        let before = self.entities.len();
        self.entities.retain(|id, _| keep(*id));
        self.destroyed += (before - self.entities.len()) as u64;
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities created since the store was built
    pub fn created_count(&self) -> u64 {
        self.created
    }

    pub fn destroyed_count(&self) -> u64 {
        self.destroyed
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}
