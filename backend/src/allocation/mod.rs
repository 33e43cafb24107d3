//! Resource allocation
//!
//! Seize requests are all-or-nothing: either every item of an entity's
//! request list is granted at once or the entity waits in a queue holding
//! nothing. Every grant is recorded as a [`Holding`] so the matching Release
//! gives back exactly what was taken.
//!
//! # Modules
//!
//! - `seizable`: request descriptors, selection rules and allocation types
//! - `protocol`: seize, enqueue, release and the queue re-scan

pub mod protocol;
pub mod seizable;

pub use seizable::{AllocationRequest, AllocationType, SeizableItem, SeizableTarget, SelectionRule};

use crate::data::DefinitionId;
use crate::models::entity::EntityId;
use std::collections::BTreeMap;

/// Units of one resource granted to an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub resource: DefinitionId,
    pub quantity: u32,
    pub save_attribute: Option<String>,
}

/// Outstanding grants per entity
#[derive(Debug, Clone, Default)]
pub struct Holdings {
    by_entity: BTreeMap<EntityId, Vec<Holding>>,
}

impl Holdings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, entity: EntityId, holding: Holding) {
        self.by_entity.entry(entity).or_default().push(holding);
    }

    /// Units of `resource` the entity holds, optionally only those recorded
    /// under `save_attribute`
    pub fn held(&self, entity: EntityId, resource: DefinitionId, save_attribute: Option<&str>) -> u32 {
        self.by_entity
            .get(&entity)
            .into_iter()
            .flatten()
            .filter(|h| h.resource == resource && Self::matches(h, save_attribute))
            .map(|h| h.quantity)
            .sum()
    }

    fn matches(holding: &Holding, save_attribute: Option<&str>) -> bool {
        save_attribute.is_none() || holding.save_attribute.as_deref() == save_attribute
    }

    /// Give back `quantity` units, most recent grant first
    ///
    /// Returns the units held before the call when that is less than
    /// `quantity`; nothing changes in that case.
    pub fn take(
        &mut self,
        entity: EntityId,
        resource: DefinitionId,
        quantity: u32,
        save_attribute: Option<&str>,
    ) -> Result<(), u32> {
        let held = self.held(entity, resource, save_attribute);
        if held < quantity {
            return Err(held);
        }
        let Some(list) = self.by_entity.get_mut(&entity) else {
            return Ok(());
        };
        let mut remaining = quantity;
        for holding in list.iter_mut().rev() {
            if remaining == 0 {
                break;
            }
            if holding.resource == resource && Self::matches(holding, save_attribute) {
                let taken = remaining.min(holding.quantity);
                holding.quantity -= taken;
                remaining -= taken;
            }
        }
        list.retain(|h| h.quantity > 0);
        if list.is_empty() {
            self.by_entity.remove(&entity);
        }
        Ok(())
    }

    /// True while any grant is still recorded under `save_attribute`
    pub fn uses_attribute(&self, entity: EntityId, save_attribute: &str) -> bool {
        self.by_entity
            .get(&entity)
            .is_some_and(|list| list.iter().any(|h| h.save_attribute.as_deref() == Some(save_attribute)))
    }

    pub fn of(&self, entity: EntityId) -> &[Holding] {
        self.by_entity.get(&entity).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn remove_entity(&mut self, entity: EntityId) -> Vec<Holding> {
        self.by_entity.remove(&entity).unwrap_or_default()
    }

    /// Keep only the holdings of entities for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(EntityId) -> bool) {
        self.by_entity.retain(|id, _| keep(*id));
    }

    /// Units held per resource, over every entity
    pub fn totals(&self) -> BTreeMap<DefinitionId, u32> {
        let mut totals = BTreeMap::new();
        for holding in self.by_entity.values().flatten() {
            *totals.entry(holding.resource).or_insert(0) += holding.quantity;
        }
        totals
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(resource: usize, quantity: u32, attr: Option<&str>) -> Holding {
        Holding {
            resource: DefinitionId::new(resource),
            quantity,
            save_attribute: attr.map(str::to_string),
        }
    }

    #[test]
    fn test_take_more_than_held_changes_nothing() {
        let mut holdings = Holdings::new();
        let e = EntityId::new(1);
        holdings.grant(e, holding(0, 2, None));
        assert_eq!(holdings.take(e, DefinitionId::new(0), 3, None), Err(2));
        assert_eq!(holdings.held(e, DefinitionId::new(0), None), 2);
    }

    #[test]
    fn test_take_filters_by_attribute() {
        let mut holdings = Holdings::new();
        let e = EntityId::new(1);
        holdings.grant(e, holding(0, 1, Some("a")));
        holdings.grant(e, holding(0, 2, Some("b")));
        assert_eq!(holdings.held(e, DefinitionId::new(0), Some("a")), 1);
        assert_eq!(holdings.held(e, DefinitionId::new(0), None), 3);

        holdings.take(e, DefinitionId::new(0), 2, Some("b")).unwrap();
        assert!(!holdings.uses_attribute(e, "b"));
        assert!(holdings.uses_attribute(e, "a"));

        holdings.take(e, DefinitionId::new(0), 1, None).unwrap();
        assert!(holdings.is_empty());
    }

    #[test]
    fn test_totals_sum_across_entities() {
        let mut holdings = Holdings::new();
        holdings.grant(EntityId::new(1), holding(0, 1, None));
        holdings.grant(EntityId::new(2), holding(0, 2, None));
        holdings.grant(EntityId::new(2), holding(1, 1, None));
        holdings.retain(|e| e != EntityId::new(1));
        let totals = holdings.totals();
        assert_eq!(totals[&DefinitionId::new(0)], 2);
        assert_eq!(totals[&DefinitionId::new(1)], 1);
    }
}
