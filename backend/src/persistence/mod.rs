//! Persistence boundary
//!
//! Components and data definitions save themselves into a flat
//! [`PersistenceRecord`]: an ordered map from field name to a small tagged
//! [`FieldValue`]. Records are what the file layer stores; this module does
//! not know about files.
//!
//! Numbered fields use a suffix: `nextId`, `nextId1`, `nextId2`, ... and
//! `resourceName`, `resourceName1`, ... for request lists.

use crate::core::time::TimeUnit;
use crate::orchestrator::config::SimulationConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Field names shared by every component record
pub mod keys {
    pub const ID: &str = "id";
    pub const TYPENAME: &str = "typename";
    pub const NAME: &str = "name";
    pub const CAPTION: &str = "caption";
    pub const REPORT_STATISTICS: &str = "reportStatistics";
    pub const NEXTS: &str = "nexts";
    pub const NEXT_ID: &str = "nextId";
    pub const NEXT_PORT: &str = "nextPort";

    /// Identity fields dropped when a composite folds a part's record into
    /// its own
    pub const PART_IDENTITY: [&str; 7] = [ID, TYPENAME, NAME, NEXTS, NEXT_ID, CAPTION, REPORT_STATISTICS];

    /// `base` for index 0, `base{index}` after that
    pub fn numbered(base: &str, index: usize) -> String {
        if index == 0 {
            base.to_string()
        } else {
            format!("{base}{index}")
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Missing field '{0}'")]
    MissingField(String),

    #[error("Field '{field}' should be a {expected}")]
    InvalidField { field: String, expected: &'static str },

    #[error("Unknown typename '{0}'")]
    UnknownTypename(String),

    #[error("Unknown {kind} '{name}'")]
    UnknownReference { kind: &'static str, name: String },

    #[error("Unknown component id {0}")]
    UnknownComponentId(i64),
}

/// One primitive field value
///
/// Enumerations are stored as their integer code, so an `Enum` reads back
/// from JSON as an `Int`; the two compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
    Enum(i64),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        use FieldValue::*;
        match (self, other) {
            (Int(a) | Enum(a), Int(b) | Enum(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            _ => false,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value as i64)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(value as i64)
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        FieldValue::Int(value as i64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Int(value as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<TimeUnit> for FieldValue {
    fn from(value: TimeUnit) -> Self {
        FieldValue::Enum(value.code())
    }
}

/// Ordered field-name to value mapping
///
/// # Example
/// ```
/// use simkernel_core::persistence::PersistenceRecord;
///
/// let mut record = PersistenceRecord::new();
/// record.save_field("capacity", 1u32, 1u32, false);
/// record.save_field("name", "M1", "", false);
/// assert!(!record.contains("capacity"));
/// assert_eq!(record.int_or("capacity", 1).unwrap(), 1);
/// assert_eq!(record.text("name").unwrap(), "M1");
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistenceRecord(BTreeMap<String, FieldValue>);

impl PersistenceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Store `value` unless it equals `default` and defaults are not saved
    pub fn save_field(
        &mut self,
        key: &str,
        value: impl Into<FieldValue>,
        default: impl Into<FieldValue>,
        save_defaults: bool,
    ) {
        let value = value.into();
        if save_defaults || value != default.into() {
            self.0.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    /// Required text field
    pub fn text(&self, key: &str) -> Result<&str, PersistenceError> {
        match self.0.get(key) {
            Some(FieldValue::Text(s)) => Ok(s),
            Some(_) => Err(PersistenceError::InvalidField {
                field: key.to_string(),
                expected: "string",
            }),
            None => Err(PersistenceError::MissingField(key.to_string())),
        }
    }

    pub fn text_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str, PersistenceError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(_) => self.text(key),
        }
    }

    /// Required integer field
    pub fn int(&self, key: &str) -> Result<i64, PersistenceError> {
        match self.0.get(key) {
            Some(FieldValue::Int(v)) | Some(FieldValue::Enum(v)) => Ok(*v),
            Some(FieldValue::Float(v)) if v.fract() == 0.0 => Ok(*v as i64),
            Some(_) => Err(PersistenceError::InvalidField {
                field: key.to_string(),
                expected: "integer",
            }),
            None => Err(PersistenceError::MissingField(key.to_string())),
        }
    }

    pub fn int_or(&self, key: &str, default: i64) -> Result<i64, PersistenceError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(_) => self.int(key),
        }
    }

    /// Enumerated field; integer codes are accepted either way
    pub fn enum_or(&self, key: &str, default: i64) -> Result<i64, PersistenceError> {
        self.int_or(key, default)
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, PersistenceError> {
        Ok(self.int_or(key, default as i64)? != 0)
    }

    pub fn float_or(&self, key: &str, default: f64) -> Result<f64, PersistenceError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(FieldValue::Float(v)) => Ok(*v),
            Some(FieldValue::Int(v)) | Some(FieldValue::Enum(v)) => Ok(*v as f64),
            Some(FieldValue::Text(_)) => Err(PersistenceError::InvalidField {
                field: key.to_string(),
                expected: "number",
            }),
        }
    }

    pub fn time_unit_or(&self, key: &str, default: TimeUnit) -> Result<TimeUnit, PersistenceError> {
        let code = self.enum_or(key, default.code())?;
        TimeUnit::from_code(code).ok_or_else(|| PersistenceError::InvalidField {
            field: key.to_string(),
            expected: "time unit code",
        })
    }

    /// Remove every listed field
    pub fn erase(&mut self, keys: &[&str]) {
        for key in keys {
            self.0.remove(*key);
        }
    }

    /// Copy every field of `other` in, overwriting on collision
    pub fn merge(&mut self, other: PersistenceRecord) {
        self.0.extend(other.0);
    }
}

/// A whole model as plain records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub name: String,
    #[serde(default)]
    pub config: SimulationConfig,
    /// Data definitions in dependency order (resources before sets)
    #[serde(default)]
    pub data: Vec<PersistenceRecord>,
    #[serde(default)]
    pub components: Vec<PersistenceRecord>,
}

impl ModelRecord {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
