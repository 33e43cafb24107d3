//! Set: an ordered group of resources a request can pick from
//!
//! Declaration order is the tie-break order for every selection rule.

use crate::data::DefinitionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSet {
    name: String,
    members: Vec<DefinitionId>,
}

impl ResourceSet {
    pub fn new(name: impl Into<String>, members: Vec<DefinitionId>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[DefinitionId] {
        &self.members
    }

    pub fn member(&self, index: usize) -> Option<DefinitionId> {
        self.members.get(index).copied()
    }

    pub fn push(&mut self, resource: DefinitionId) {
        self.members.push(resource);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
