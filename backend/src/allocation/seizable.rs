//! Request descriptors shared by Seize and Release

use crate::data::{DataManager, DefinitionId, DefinitionKind};
use crate::persistence::{keys, FieldValue, PersistenceError, PersistenceRecord};

/// What a request draws units from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeizableTarget {
    Resource(DefinitionId),
    /// One member of a resource set, picked by the selection rule
    Set(DefinitionId),
}

impl SeizableTarget {
    pub fn definition(self) -> DefinitionId {
        match self {
            SeizableTarget::Resource(id) | SeizableTarget::Set(id) => id,
        }
    }

    fn code(self) -> i64 {
        match self {
            SeizableTarget::Resource(_) => 0,
            SeizableTarget::Set(_) => 1,
        }
    }
}

/// How a set member is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionRule {
    /// The member at the evaluated index (seize) or the one recorded in the
    /// save attribute (release)
    #[default]
    SpecificMember,
    /// Member with the most idle units; ties go to the earlier member
    LargestRemainingCapacity,
    /// First member, in declaration order, with enough idle units
    PreferredOrder,
}

impl SelectionRule {
    pub fn code(self) -> i64 {
        match self {
            SelectionRule::SpecificMember => 0,
            SelectionRule::LargestRemainingCapacity => 1,
            SelectionRule::PreferredOrder => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<SelectionRule> {
        match code {
            0 => Some(SelectionRule::SpecificMember),
            1 => Some(SelectionRule::LargestRemainingCapacity),
            2 => Some(SelectionRule::PreferredOrder),
            _ => None,
        }
    }
}

/// Accounting of units handed over from a release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationType {
    /// Freed units pass through the idle state before being granted
    #[default]
    Direct,
    /// Freed units go straight to the waiting request
    Transfer,
}

impl AllocationType {
    pub fn code(self) -> i64 {
        match self {
            AllocationType::Direct => 0,
            AllocationType::Transfer => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<AllocationType> {
        match code {
            0 => Some(AllocationType::Direct),
            1 => Some(AllocationType::Transfer),
            _ => None,
        }
    }
}

/// One line of a Seize or Release request list
///
/// Quantity and member index are expressions, evaluated per entity.
#[derive(Debug, Clone, PartialEq)]
pub struct SeizableItem {
    pub target: SeizableTarget,
    pub quantity: String,
    pub selection: SelectionRule,
    /// Zero-based member index, for `SpecificMember` on a set
    pub member_index: String,
    /// Entity attribute receiving the allocated resource's id
    pub save_attribute: String,
}

impl SeizableItem {
    pub fn resource(resource: DefinitionId) -> Self {
        Self {
            target: SeizableTarget::Resource(resource),
            quantity: "1".to_string(),
            selection: SelectionRule::SpecificMember,
            member_index: "0".to_string(),
            save_attribute: String::new(),
        }
    }

    pub fn set(set: DefinitionId, selection: SelectionRule) -> Self {
        Self {
            target: SeizableTarget::Set(set),
            selection,
            ..Self::resource(set)
        }
    }

    pub fn with_quantity(mut self, quantity: impl Into<String>) -> Self {
        self.quantity = quantity.into();
        self
    }

    pub fn with_member_index(mut self, index: impl Into<String>) -> Self {
        self.member_index = index.into();
        self
    }

    pub fn with_save_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.save_attribute = attribute.into();
        self
    }

    pub fn save_attribute(&self) -> Option<&str> {
        (!self.save_attribute.is_empty()).then_some(self.save_attribute.as_str())
    }

    /// Write item `index` of a request list
    pub fn save(&self, record: &mut PersistenceRecord, index: usize, save_defaults: bool, data: &DataManager) {
        let key = |base: &str| keys::numbered(base, index);
        record.save_field(
            &key("resourceType"),
            FieldValue::Enum(self.target.code()),
            FieldValue::Enum(0),
            save_defaults,
        );
        record.insert(key("resourceName"), data.name_of(self.target.definition()));
        record.save_field(&key("quantityExpression"), self.quantity.as_str(), "1", save_defaults);
        record.save_field(
            &key("selectionRule"),
            FieldValue::Enum(self.selection.code()),
            FieldValue::Enum(0),
            save_defaults,
        );
        record.save_field(&key("memberIndex"), self.member_index.as_str(), "0", save_defaults);
        record.save_field(&key("saveAttribute"), self.save_attribute.as_str(), "", save_defaults);
    }

    /// Read item `index` of a request list, resolving names against `data`
    pub fn load(record: &PersistenceRecord, index: usize, data: &DataManager) -> Result<Self, PersistenceError> {
        let key = |base: &str| keys::numbered(base, index);
        let type_key = key("resourceType");
        let name = record.text(&key("resourceName"))?;
        let (kind, build): (DefinitionKind, fn(DefinitionId) -> SeizableTarget) = match record.enum_or(&type_key, 0)? {
            0 => (DefinitionKind::Resource, SeizableTarget::Resource),
            1 => (DefinitionKind::Set, SeizableTarget::Set),
            _ => {
                return Err(PersistenceError::InvalidField {
                    field: type_key,
                    expected: "resource type code 0 or 1",
                })
            }
        };
        let id = data
            .find(kind, name)
            .ok_or_else(|| PersistenceError::UnknownReference {
                kind: kind.typename(),
                name: name.to_string(),
            })?;
        let selection_key = key("selectionRule");
        let selection = SelectionRule::from_code(record.enum_or(&selection_key, 0)?).ok_or(
            PersistenceError::InvalidField {
                field: selection_key,
                expected: "selection rule code 0..=2",
            },
        )?;
        Ok(Self {
            target: build(id),
            quantity: record.text_or(&key("quantityExpression"), "1")?.to_string(),
            selection,
            member_index: record.text_or(&key("memberIndex"), "0")?.to_string(),
            save_attribute: record.text_or(&key("saveAttribute"), "")?.to_string(),
        })
    }
}

/// Write a whole request list (`requests` holds the count)
pub fn save_items(items: &[SeizableItem], record: &mut PersistenceRecord, save_defaults: bool, data: &DataManager) {
    record.insert("requests", items.len());
    for (i, item) in items.iter().enumerate() {
        item.save(record, i, save_defaults, data);
    }
}

pub fn load_items(record: &PersistenceRecord, data: &DataManager) -> Result<Vec<SeizableItem>, PersistenceError> {
    let count = record.int_or("requests", 0)?;
    (0..count.max(0) as usize)
        .map(|i| SeizableItem::load(record, i, data))
        .collect()
}

/// A request resolved for one entity
///
/// Quantity and member index are fixed when the entity arrives; which set
/// member serves a `LargestRemainingCapacity` or `PreferredOrder` request
/// is decided at allocation time.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRequest {
    pub target: SeizableTarget,
    pub quantity: u32,
    pub selection: SelectionRule,
    pub member: usize,
    pub save_attribute: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataDefinition, Resource, ResourceSet};

    #[test]
    fn test_item_record_round_trip() {
        let mut data = DataManager::new();
        let m1 = data
            .insert(DataDefinition::Resource(Resource::new("M1", 2)))
            .unwrap();
        let set = data
            .insert(DataDefinition::Set(ResourceSet::new("Machines", vec![m1])))
            .unwrap();
        let items = vec![
            SeizableItem::resource(m1).with_quantity("2"),
            SeizableItem::set(set, SelectionRule::LargestRemainingCapacity).with_save_attribute("machine"),
        ];

        let mut record = PersistenceRecord::new();
        save_items(&items, &mut record, false, &data);
        assert!(!record.contains("quantityExpression1"));
        assert_eq!(record.text("resourceName1").unwrap(), "Machines");

        assert_eq!(load_items(&record, &data).unwrap(), items);
    }

    #[test]
    fn test_load_rejects_unknown_resource() {
        let data = DataManager::new();
        let mut record = PersistenceRecord::new();
        record.insert("requests", 1usize);
        record.insert("resourceName", "Ghost");
        assert_eq!(
            load_items(&record, &data),
            Err(PersistenceError::UnknownReference {
                kind: "Resource",
                name: "Ghost".to_string()
            })
        );
    }
}
