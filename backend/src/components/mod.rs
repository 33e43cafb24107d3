//! Model components and the dispatch protocol
//!
//! Components live in a [`ComponentArena`] and refer to each other through
//! [`ComponentId`] handles. Each one exposes a single entry point,
//! [`ModelComponent::on_dispatch`], called with the entity and the input
//! port it arrived on. A component either forwards the entity along one of
//! its connections (synchronously, through the dispatch context) or parks
//! it by scheduling a future event or queueing it.
//!
//! The component set is closed: [`Component`] is an enum and dispatch is a
//! `match`, the same way the data definitions are modelled.

pub mod create;
pub mod decide;
pub mod delay;
pub mod dispose;
pub mod process;
pub mod record;
pub mod release;
pub mod seize;

pub use create::Create;
pub use decide::{Decide, DecideMode};
pub use delay::Delay;
pub use dispose::Dispose;
pub use process::Process;
pub use record::Record;
pub use release::Release;
pub use seize::{QueueFullAction, Seize};

use crate::data::{DataManager, DefinitionId, DefinitionKind};
use crate::error::{SimResult, SimulationError};
use crate::expression::ExpressionEvaluator;
use crate::model::{CheckIssue, CheckReport};
use crate::models::entity::EntityId;
use crate::orchestrator::context::DispatchContext;
use crate::persistence::{keys, PersistenceError, PersistenceRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable handle of a component in its arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(usize);

impl ComponentId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component.{}", self.0)
    }
}

// ============================================================================
// Connections
// ============================================================================

/// Outgoing link: target component and the input port it is entered on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub target: ComponentId,
    pub port: u32,
}

/// Ordered outgoing connections of one component
///
/// The i-th connection keeps routing to the same target and port for the
/// whole run; connections only change while the model is being assembled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionManager {
    connections: Vec<Connection>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: ComponentId) {
        self.insert_port(target, 0);
    }

    pub fn insert_port(&mut self, target: ComponentId, port: u32) {
        self.connections.push(Connection { target, port });
    }

    pub fn get(&self, index: usize) -> Option<Connection> {
        self.connections.get(index).copied()
    }

    /// First connection (the default route)
    pub fn front(&self) -> Option<Connection> {
        self.get(0)
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn clear(&mut self) {
        self.connections.clear();
    }

    /// `nexts` = count, `nextId{i}` = target index, `nextPort{i}` only for
    /// non-zero ports
    pub fn save(&self, record: &mut PersistenceRecord) {
        record.insert(keys::NEXTS, self.connections.len());
        for (i, connection) in self.connections.iter().enumerate() {
            record.insert(keys::numbered(keys::NEXT_ID, i), connection.target.index());
            if connection.port != 0 {
                record.insert(keys::numbered(keys::NEXT_PORT, i), connection.port);
            }
        }
    }

    /// Rebuild from a record; saved ids are mapped through `ids`
    pub fn load(record: &PersistenceRecord, ids: &BTreeMap<i64, ComponentId>) -> Result<Self, PersistenceError> {
        let mut manager = Self::new();
        let count = record.int_or(keys::NEXTS, 0)?;
        for i in 0..count.max(0) as usize {
            let saved = record.int(&keys::numbered(keys::NEXT_ID, i))?;
            let target = ids
                .get(&saved)
                .copied()
                .ok_or(PersistenceError::UnknownComponentId(saved))?;
            let port = record.int_or(&keys::numbered(keys::NEXT_PORT, i), 0)?;
            let port = u32::try_from(port).map_err(|_| PersistenceError::InvalidField {
                field: keys::numbered(keys::NEXT_PORT, i),
                expected: "non-negative integer",
            })?;
            manager.insert_port(target, port);
        }
        Ok(manager)
    }
}

// ============================================================================
// Component trait and scopes
// ============================================================================

/// Behaviour every graph node implements
pub trait ModelComponent {
    /// Persistence typename
    fn typename(&self) -> &'static str;

    /// Entity `entity` enters this component on input `port`
    fn on_dispatch(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: ComponentId,
        entity: EntityId,
        port: u32,
    ) -> SimResult<()>;

    /// Report structural problems; never fails fast
    fn check(&self, id: ComponentId, scope: &mut CheckScope<'_>);

    /// Write component-specific fields (identity and connections are
    /// written by the arena)
    fn save_instance(&self, record: &mut PersistenceRecord, scope: &SaveScope<'_>);

    fn load_instance(&mut self, record: &PersistenceRecord, scope: &LoadScope<'_>) -> Result<(), PersistenceError>;
}

/// Collects check findings for one model
pub struct CheckScope<'a> {
    pub components: &'a ComponentArena,
    pub data: &'a DataManager,
    pub evaluator: &'a mut dyn ExpressionEvaluator,
    report: &'a mut CheckReport,
}

impl<'a> CheckScope<'a> {
    pub fn new(
        components: &'a ComponentArena,
        data: &'a DataManager,
        evaluator: &'a mut dyn ExpressionEvaluator,
        report: &'a mut CheckReport,
    ) -> Self {
        Self {
            components,
            data,
            evaluator,
            report,
        }
    }

    fn issue(&self, id: ComponentId, message: String) -> CheckIssue {
        CheckIssue {
            component: self.components.name_of(id).to_string(),
            message,
        }
    }

    pub fn error(&mut self, id: ComponentId, message: impl Into<String>) {
        let issue = self.issue(id, message.into());
        self.report.errors.push(issue);
    }

    pub fn warning(&mut self, id: ComponentId, message: impl Into<String>) {
        let issue = self.issue(id, message.into());
        self.report.warnings.push(issue);
    }

    /// Syntax check of an expression field
    pub fn expression(&mut self, id: ComponentId, field: &str, expression: &str) {
        if let Err(e) = self.evaluator.check(expression) {
            self.error(id, format!("{field} '{expression}': {e}"));
        }
    }

    /// True when `definition` exists and is a `kind`; reports otherwise
    pub fn definition(&mut self, id: ComponentId, definition: DefinitionId, kind: DefinitionKind) -> bool {
        match self.data.get(definition) {
            Some(d) if d.kind() == kind => true,
            Some(d) => {
                let message = format!("'{}' is a {}, not a {}", d.name(), d.kind().typename(), kind.typename());
                self.error(id, message);
                false
            }
            None => {
                self.error(id, format!("{} {definition} does not exist", kind.typename()));
                false
            }
        }
    }
}

pub struct SaveScope<'a> {
    pub components: &'a ComponentArena,
    pub data: &'a DataManager,
    pub save_defaults: bool,
}

pub struct LoadScope<'a> {
    pub data: &'a DataManager,
}

// ============================================================================
// Component enum
// ============================================================================

#[derive(Debug, Clone)]
pub enum Component {
    Create(Create),
    Delay(Delay),
    Seize(Seize),
    Release(Release),
    Process(Process),
    Decide(Decide),
    Record(Record),
    Dispose(Dispose),
}

impl Component {
    /// Default-configured component for a persistence typename
    pub fn from_typename(typename: &str) -> Option<Component> {
        let component = match typename {
            "Create" => Component::Create(Create::default()),
            "Delay" => Component::Delay(Delay::default()),
            "Seize" => Component::Seize(Seize::default()),
            "Release" => Component::Release(Release::default()),
            "Process" => Component::Process(Process::new(Seize::default(), Delay::default())),
            "Decide" => Component::Decide(Decide::default()),
            "Record" => Component::Record(Record::default()),
            "Dispose" => Component::Dispose(Dispose),
            _ => return None,
        };
        Some(component)
    }

    fn inner(&self) -> &dyn ModelComponent {
        match self {
            Component::Create(c) => c,
            Component::Delay(c) => c,
            Component::Seize(c) => c,
            Component::Release(c) => c,
            Component::Process(c) => c,
            Component::Decide(c) => c,
            Component::Record(c) => c,
            Component::Dispose(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn ModelComponent {
        match self {
            Component::Create(c) => c,
            Component::Delay(c) => c,
            Component::Seize(c) => c,
            Component::Release(c) => c,
            Component::Process(c) => c,
            Component::Decide(c) => c,
            Component::Record(c) => c,
            Component::Dispose(c) => c,
        }
    }

    /// Terminal components are expected to have no connections
    pub fn is_terminal(&self) -> bool {
        matches!(self, Component::Dispose(_))
    }
}

impl ModelComponent for Component {
    fn typename(&self) -> &'static str {
        self.inner().typename()
    }

    fn on_dispatch(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: ComponentId,
        entity: EntityId,
        port: u32,
    ) -> SimResult<()> {
        self.inner().on_dispatch(ctx, id, entity, port)
    }

    fn check(&self, id: ComponentId, scope: &mut CheckScope<'_>) {
        self.inner().check(id, scope)
    }

    fn save_instance(&self, record: &mut PersistenceRecord, scope: &SaveScope<'_>) {
        self.inner().save_instance(record, scope)
    }

    fn load_instance(&mut self, record: &PersistenceRecord, scope: &LoadScope<'_>) -> Result<(), PersistenceError> {
        self.inner_mut().load_instance(record, scope)
    }
}

// ============================================================================
// Arena
// ============================================================================

/// A component plus what every graph node carries
#[derive(Debug, Clone)]
pub struct ComponentNode {
    pub name: String,
    pub caption: String,
    pub connections: ConnectionManager,
    pub report_statistics: bool,
    /// Composite that created this node, if it is an internal part
    pub owner: Option<ComponentId>,
    /// "entities in" counter, created by model check
    pub number_in: Option<DefinitionId>,
    pub kind: Component,
}

impl ComponentNode {
    pub fn new(name: impl Into<String>, kind: Component) -> Self {
        Self {
            name: name.into(),
            caption: String::new(),
            connections: ConnectionManager::new(),
            report_statistics: true,
            owner: None,
            number_in: None,
            kind,
        }
    }

    /// Full record: identity, connections, then the component's own fields
    pub fn save(&self, id: ComponentId, scope: &SaveScope<'_>) -> PersistenceRecord {
        let mut record = PersistenceRecord::new();
        record.insert(keys::ID, id.index());
        record.insert(keys::TYPENAME, self.kind.typename());
        record.insert(keys::NAME, self.name.as_str());
        record.save_field(keys::CAPTION, self.caption.as_str(), "", scope.save_defaults);
        record.save_field(
            keys::REPORT_STATISTICS,
            self.report_statistics,
            true,
            scope.save_defaults,
        );
        self.connections.save(&mut record);
        self.kind.save_instance(&mut record, scope);
        record
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComponentArena {
    nodes: Vec<ComponentNode>,
}

impl ComponentArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: ComponentNode) -> ComponentId {
        self.nodes.push(node);
        ComponentId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: ComponentId) -> Option<&ComponentNode> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: ComponentId) -> Option<&mut ComponentNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn node(&self, id: ComponentId) -> SimResult<&ComponentNode> {
        self.get(id)
            .ok_or_else(|| SimulationError::ComponentNotFound(id.to_string()))
    }

    pub fn node_mut(&mut self, id: ComponentId) -> SimResult<&mut ComponentNode> {
        self.get_mut(id)
            .ok_or_else(|| SimulationError::ComponentNotFound(id.to_string()))
    }

    pub fn find(&self, name: &str) -> Option<ComponentId> {
        self.nodes.iter().position(|n| n.name == name).map(ComponentId)
    }

    /// Component name, or empty when the id is unknown
    pub fn name_of(&self, id: ComponentId) -> &str {
        self.get(id).map(|n| n.name.as_str()).unwrap_or("")
    }

    /// The Seize behind `id`, if it is one
    pub fn seize(&self, id: ComponentId) -> Option<&Seize> {
        match self.get(id).map(|n| &n.kind) {
            Some(Component::Seize(seize)) => Some(seize),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ComponentId> {
        (0..self.nodes.len()).map(ComponentId)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ComponentId, &ComponentNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (ComponentId(i), n))
    }
}
