//! Model assembly, validation and persistence
//!
//! A [`Model`] owns the component arena, the data definitions and the
//! expression evaluator. Handles returned by the builder methods stay valid
//! for the model's lifetime.

use crate::components::{
    CheckScope, Component, ComponentArena, ComponentId, ComponentNode, ConnectionManager, LoadScope, ModelComponent,
    Process, Release, SaveScope, Seize,
};
use crate::data::{
    CounterDefinition, DataDefinition, DataManager, DefinitionId, OrderRule, Queue, Resource, ResourceSet,
    StatisticsDefinition, Variable,
};
use crate::error::{SimResult, SimulationError};
use crate::expression::{DefaultEvaluator, ExpressionEvaluator};
use crate::orchestrator::config::SimulationConfig;
use crate::persistence::{keys, ModelRecord, PersistenceError, PersistenceRecord};
use crate::stats::{Counter, StatisticsCollector};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

// ============================================================================
// Check report
// ============================================================================

/// One structural problem found by [`Model::check`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckIssue {
    /// Component (or model) the problem belongs to
    pub component: String,
    pub message: String,
}

impl fmt::Display for CheckIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.component, self.message)
    }
}

/// Every problem found in one check pass
///
/// Errors prevent a run from starting; warnings do not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub errors: Vec<CheckIssue>,
    pub warnings: Vec<CheckIssue>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors mentioning `component`
    pub fn errors_for(&self, component: &str) -> Vec<&CheckIssue> {
        self.errors.iter().filter(|i| i.component == component).collect()
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in &self.errors {
            writeln!(f, "error: {issue}")?;
        }
        for issue in &self.warnings {
            writeln!(f, "warning: {issue}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Model
// ============================================================================

pub struct Model {
    pub name: String,
    pub config: SimulationConfig,
    pub(crate) components: ComponentArena,
    pub(crate) data: DataManager,
    pub(crate) evaluator: Box<dyn ExpressionEvaluator>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("components", &self.components.len())
            .field("data", &self.data.len())
            .finish()
    }
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: SimulationConfig::default(),
            components: ComponentArena::new(),
            data: DataManager::new(),
            evaluator: Box::new(DefaultEvaluator::new()),
        }
    }

    /// Replace the expression evaluator
    pub fn with_evaluator(mut self, evaluator: Box<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn components(&self) -> &ComponentArena {
        &self.components
    }

    pub fn data(&self) -> &DataManager {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut DataManager {
        &mut self.data
    }

    // ------------------------------------------------------------------------
    // Data definitions
    // ------------------------------------------------------------------------

    pub fn define(&mut self, definition: DataDefinition) -> SimResult<DefinitionId> {
        self.data.insert(definition)
    }

    pub fn new_resource(&mut self, name: impl Into<String>, capacity: u32) -> SimResult<DefinitionId> {
        self.define(DataDefinition::Resource(Resource::new(name, capacity)))
    }

    pub fn new_queue(&mut self, name: impl Into<String>, order: OrderRule) -> SimResult<DefinitionId> {
        self.define(DataDefinition::Queue(Queue::new(name, order)))
    }

    /// Members are tried in the order given
    pub fn new_set(&mut self, name: impl Into<String>, members: Vec<DefinitionId>) -> SimResult<DefinitionId> {
        self.define(DataDefinition::Set(ResourceSet::new(name, members)))
    }

    pub fn new_variable(&mut self, name: impl Into<String>, initial: f64) -> SimResult<DefinitionId> {
        self.define(DataDefinition::Variable(Variable::new(name, initial)))
    }

    pub fn new_statistics(&mut self, name: impl Into<String>) -> SimResult<DefinitionId> {
        let collector = StatisticsCollector::with_confidence(self.data.confidence_level());
        self.define(DataDefinition::Statistics(StatisticsDefinition {
            name: name.into(),
            collector,
            internal: false,
        }))
    }

    pub fn new_counter(&mut self, name: impl Into<String>) -> SimResult<DefinitionId> {
        self.define(DataDefinition::Counter(CounterDefinition {
            name: name.into(),
            counter: Counter::new(),
            internal: false,
        }))
    }

    // ------------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------------

    /// Add a component under a unique name
    ///
    /// A Seize (or Process) without a queue gets `<name>.Queue`. A Process
    /// is split into its internal Seize, Delay and Release here.
    pub fn insert_component(&mut self, name: impl Into<String>, component: Component) -> SimResult<ComponentId> {
        let name = name.into();
        let mut component = component;

        let parts = match &mut component {
            Component::Process(process) => process.take_detached(),
            _ => None,
        };
        let mut names = vec![name.clone()];
        if parts.is_some() {
            names.extend(["Seize", "Delay", "Release"].map(|part| format!("{name}.{part}")));
        }
        for candidate in &names {
            if self.components.find(candidate).is_some() {
                return Err(SimulationError::DuplicateName {
                    kind: "component",
                    name: candidate.clone(),
                });
            }
        }

        if let Component::Seize(seize) = &mut component {
            if seize.queue.is_none() {
                seize.queue = Some(self.default_queue(&name)?);
            }
        }
        let id = self.components.push(ComponentNode::new(name.clone(), component));

        if let Some((mut seize, delay)) = parts {
            if seize.queue.is_none() {
                seize.queue = Some(self.default_queue(&name)?);
            }
            let release = Release {
                requests: Process::mirrored_release_items(&seize.requests),
                priority: seize.priority,
                release_held: true,
            };
            let seize_id = self.push_part(id, format!("{name}.Seize"), Component::Seize(seize));
            let delay_id = self.push_part(id, format!("{name}.Delay"), Component::Delay(delay));
            let release_id = self.push_part(id, format!("{name}.Release"), Component::Release(release));
            self.components.node_mut(seize_id)?.connections.insert(delay_id);
            self.components.node_mut(delay_id)?.connections.insert(release_id);
            if let Component::Process(process) = &mut self.components.node_mut(id)?.kind {
                process.attach(seize_id, delay_id, release_id);
            }
        }
        debug!(component = %name, id = %id, "component inserted");
        Ok(id)
    }

    fn push_part(&mut self, owner: ComponentId, name: String, kind: Component) -> ComponentId {
        let mut node = ComponentNode::new(name, kind);
        node.owner = Some(owner);
        node.report_statistics = false;
        self.components.push(node)
    }

    fn default_queue(&mut self, component: &str) -> SimResult<DefinitionId> {
        let name = format!("{component}.Queue");
        match self.data.find(crate::data::DefinitionKind::Queue, &name) {
            Some(id) => Ok(id),
            None => self.new_queue(name, OrderRule::Fifo),
        }
    }

    /// Route `from`'s next connection to `to`, input port 0
    pub fn connect(&mut self, from: ComponentId, to: ComponentId) -> SimResult<()> {
        self.connect_port(from, to, 0)
    }

    pub fn connect_port(&mut self, from: ComponentId, to: ComponentId, port: u32) -> SimResult<()> {
        self.components.node(to)?;
        self.components.node_mut(from)?.connections.insert_port(to, port);
        Ok(())
    }

    pub fn find_component(&self, name: &str) -> Option<ComponentId> {
        self.components.find(name)
    }

    pub fn component(&self, id: ComponentId) -> SimResult<&ComponentNode> {
        self.components.node(id)
    }

    /// Mutable access for configuration between runs
    pub fn component_mut(&mut self, id: ComponentId) -> SimResult<&mut ComponentNode> {
        self.components.node_mut(id)
    }

    /// The Seize behind `id`, or the internal Seize of a Process
    pub fn seize_mut(&mut self, id: ComponentId) -> SimResult<&mut Seize> {
        let target = match &self.components.node(id)?.kind {
            Component::Process(process) => process.internal().map(|(seize, _, _)| seize).unwrap_or(id),
            _ => id,
        };
        let name = self.components.name_of(id).to_string();
        match &mut self.components.node_mut(target)?.kind {
            Component::Seize(seize) => Ok(seize),
            _ => Err(SimulationError::ComponentNotFound(format!("'{name}' is not a Seize"))),
        }
    }

    // ------------------------------------------------------------------------
    // Check
    // ------------------------------------------------------------------------

    /// Refresh derived wiring, then collect every structural problem
    pub fn check(&mut self) -> CheckReport {
        self.adjust();

        let mut report = CheckReport::default();
        let mut scope = CheckScope::new(&self.components, &self.data, self.evaluator.as_mut(), &mut report);
        for (id, node) in self.components.iter() {
            node.kind.check(id, &mut scope);
            for connection in node.connections.connections() {
                if self.components.get(connection.target).is_none() {
                    scope.error(id, format!("connection to unknown {}", connection.target));
                }
            }
            let sourced = matches!(node.kind, Component::Create(_));
            if node.connections.is_empty() && node.owner.is_none() && !node.kind.is_terminal() && !sourced {
                scope.warning(id, "no outgoing connection, entities leaving it are absorbed");
            }
        }

        if let Some(condition) = &self.config.termination_condition {
            if let Err(e) = self.evaluator.check(condition) {
                report.errors.push(CheckIssue {
                    component: self.name.clone(),
                    message: format!("termination condition '{condition}': {e}"),
                });
            }
        }
        debug!(
            model = %self.name,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "model checked"
        );
        report
    }

    /// [`Model::check`], failing on any error
    pub fn validate(&mut self) -> SimResult<CheckReport> {
        let report = self.check();
        if report.is_ok() {
            Ok(report)
        } else {
            Err(SimulationError::InvalidModel(report))
        }
    }

    fn adjust(&mut self) {
        self.data.set_confidence_level(self.config.confidence_level);

        // STEP 1: PROCESS WIRING
        // The internal Release leaves through the Process's connections and
        // gives back what the internal Seize recorded
        let processes: Vec<(ComponentId, String, ComponentId, ComponentId)> = self
            .components
            .iter()
            .filter_map(|(id, node)| match &node.kind {
                Component::Process(process) => process
                    .internal()
                    .map(|(seize, _, release)| (id, node.name.clone(), seize, release)),
                _ => None,
            })
            .collect();
        for (process_id, name, seize_id, release_id) in processes {
            let Some(connections) = self.components.get(process_id).map(|n| n.connections.clone()) else {
                continue;
            };
            let items = match self.components.get_mut(seize_id).map(|n| &mut n.kind) {
                Some(Component::Seize(seize)) => {
                    Process::assign_save_attributes(&name, &mut seize.requests, &self.data);
                    Process::mirrored_release_items(&seize.requests)
                }
                _ => continue,
            };
            if let Some(node) = self.components.get_mut(release_id) {
                node.connections = connections;
                if let Component::Release(release) = &mut node.kind {
                    release.requests = items;
                    release.release_held = true;
                }
            }
        }

        // STEP 2: SEIZE SUBSCRIPTIONS
        let ids: Vec<DefinitionId> = self.data.iter().map(|(id, _)| id).collect();
        for id in &ids {
            if let Ok(resource) = self.data.resource_mut(*id) {
                resource.clear_subscribers();
            }
        }
        let mut subscriptions = Vec::new();
        for (id, node) in self.components.iter() {
            if let Component::Seize(seize) = &node.kind {
                for resource in seize.resources(&self.data) {
                    subscriptions.push((resource, id, seize.priority));
                }
            }
        }
        for (resource, seize, priority) in subscriptions {
            if let Ok(resource) = self.data.resource_mut(resource) {
                resource.subscribe(seize, priority);
            }
        }

        // STEP 3: ENTITIES-IN COUNTERS
        let reporting: Vec<(ComponentId, Option<String>)> = self
            .components
            .iter()
            .map(|(id, node)| (id, node.report_statistics.then(|| format!("{}.NumberIn", node.name))))
            .collect();
        for (id, counter) in reporting {
            let counter = counter.map(|name| self.data.internal_counter(&name));
            if let Some(node) = self.components.get_mut(id) {
                node.number_in = counter;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Model as plain records; internal definitions and Process parts are
    /// left out (they are rebuilt on load)
    pub fn save(&self, save_defaults: bool) -> ModelRecord {
        let data = self
            .data
            .iter()
            .filter(|(_, definition)| !definition.is_internal())
            .map(|(_, definition)| {
                let mut record = PersistenceRecord::new();
                definition.save_instance(&mut record, save_defaults, &self.data);
                record
            })
            .collect();

        let scope = SaveScope {
            components: &self.components,
            data: &self.data,
            save_defaults,
        };
        let components = self
            .components
            .iter()
            .filter(|(_, node)| node.owner.is_none())
            .map(|(id, node)| node.save(id, &scope))
            .collect();

        ModelRecord {
            name: self.name.clone(),
            config: self.config.clone(),
            data,
            components,
        }
    }

    /// Rebuild a model: definitions first, then components, then
    /// connections (saved ids may refer forward)
    pub fn load(record: &ModelRecord) -> SimResult<Model> {
        let mut model = Model::new(record.name.clone()).with_config(record.config.clone());
        model.data.set_confidence_level(record.config.confidence_level);

        for definition in &record.data {
            let definition = DataDefinition::load_instance(definition, &model.data)?;
            model.data.insert(definition)?;
        }

        let mut ids: BTreeMap<i64, ComponentId> = BTreeMap::new();
        let mut loaded = Vec::with_capacity(record.components.len());
        for fields in &record.components {
            let typename = fields.text(keys::TYPENAME)?;
            let mut kind = Component::from_typename(typename)
                .ok_or_else(|| PersistenceError::UnknownTypename(typename.to_string()))?;
            kind.load_instance(fields, &LoadScope { data: &model.data })?;

            let id = model.insert_component(fields.text(keys::NAME)?, kind)?;
            let node = model.components.node_mut(id)?;
            node.caption = fields.text_or(keys::CAPTION, "")?.to_string();
            node.report_statistics = fields.bool_or(keys::REPORT_STATISTICS, true)?;
            ids.insert(fields.int(keys::ID)?, id);
            loaded.push((id, fields));
        }

        for (id, fields) in loaded {
            let connections = ConnectionManager::load(fields, &ids)?;
            model.components.node_mut(id)?.connections = connections;
        }
        debug!(model = %model.name, components = model.components.len(), "model loaded");
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::SeizableItem;
    use crate::components::{Create, Delay, Dispose};
    use crate::core::time::TimeUnit;

    fn process_model() -> (Model, ComponentId, DefinitionId) {
        let mut model = Model::new("shop");
        let m1 = model.new_resource("M1", 1).unwrap();
        let create = model
            .insert_component("Create_1", Component::Create(Create::new("Part", "5", TimeUnit::Second)))
            .unwrap();
        let process = Process::new(
            Seize::new(vec![SeizableItem::resource(m1)]),
            Delay::new("3", TimeUnit::Second),
        );
        let process = model.insert_component("Process_1", Component::Process(process)).unwrap();
        let dispose = model.insert_component("Dispose_1", Component::Dispose(Dispose)).unwrap();
        model.connect(create, process).unwrap();
        model.connect(process, dispose).unwrap();
        (model, process, m1)
    }

    #[test]
    fn test_process_is_split_into_owned_parts() {
        let (model, process, _) = process_model();
        let seize = model.find_component("Process_1.Seize").unwrap();
        let delay = model.find_component("Process_1.Delay").unwrap();
        let release = model.find_component("Process_1.Release").unwrap();
        for part in [seize, delay, release] {
            assert_eq!(model.component(part).unwrap().owner, Some(process));
            assert!(!model.component(part).unwrap().report_statistics);
        }
        assert_eq!(model.component(seize).unwrap().connections.front().unwrap().target, delay);
        assert_eq!(model.component(delay).unwrap().connections.front().unwrap().target, release);
        assert!(model
            .data()
            .find(crate::data::DefinitionKind::Queue, "Process_1.Queue")
            .is_some());
    }

    #[test]
    fn test_check_wires_release_and_subscribes() {
        let (mut model, _, m1) = process_model();
        let report = model.check();
        assert!(report.is_ok(), "{report}");

        let release = model.find_component("Process_1.Release").unwrap();
        let node = model.component(release).unwrap();
        let dispose = model.find_component("Dispose_1").unwrap();
        assert_eq!(node.connections.front().unwrap().target, dispose);
        let Component::Release(release) = &node.kind else {
            panic!("internal release expected");
        };
        assert!(release.release_held);
        assert_eq!(release.requests[0].save_attribute, "Entity.Process_1.M1SaveAttribute");

        let seize = model.find_component("Process_1.Seize").unwrap();
        let subscribers = model.data().resource(m1).unwrap().subscribers();
        assert_eq!(subscribers.len(), 1);
        assert_eq!(subscribers[0].seize, seize);
    }

    #[test]
    fn test_duplicate_component_name() {
        let (mut model, _, _) = process_model();
        let err = model
            .insert_component("Process_1.Delay", Component::Dispose(Dispose))
            .unwrap_err();
        assert!(matches!(err, SimulationError::DuplicateName { .. }));
    }

    #[test]
    fn test_check_aggregates_errors() {
        let mut model = Model::new("broken");
        model
            .insert_component("Create_1", Component::Create(Create::new("Part", "expo(", TimeUnit::Second)))
            .unwrap();
        let tiny = model.new_resource("Tiny", 1).unwrap();
        let seize = Seize::new(vec![SeizableItem::resource(tiny).with_quantity("2")]);
        model.insert_component("Seize_1", Component::Seize(seize)).unwrap();
        let report = model.check();
        assert!(!report.is_ok());
        // bad interval, missing connection, oversize request
        assert!(report.errors_for("Create_1").len() >= 2, "{report}");
        assert_eq!(report.errors_for("Seize_1").len(), 1, "{report}");
        assert!(model.validate().is_err());
    }
}
