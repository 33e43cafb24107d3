//! Simulation engine: replication controller and event loop
//!
//! # Architecture
//!
//! ```text
//! For each replication r in 1..=N:
//! 1. Reset state (calendar, RNG stream, entities, queues, resources, collectors)
//! 2. Prime the calendar (first creations, end of warm-up)
//! 3. Until a termination condition holds:
//!    a. Pop the earliest event (time, then priority, then insertion order)
//!    b. Dispatch it; components forward synchronously until they park
//!       the entity (delay, queue) or it leaves the system
//! 4. Summarise every collector into the report
//! ```
//!
//! A replication ends when the next event lies past the replication length
//! (events at exactly the length are still processed), when the termination
//! condition evaluates true between events, or when the calendar runs dry.
//!
//! # Example
//!
//! ```rust
//! use simkernel_core::{Component, Create, Delay, Dispose, Model, Process, Seize, SeizableItem, Simulation, TimeUnit};
//!
//! let mut model = Model::new("shop");
//! model.config.replication_length = 100.0;
//! let m1 = model.new_resource("M1", 1).unwrap();
//! let create = model
//!     .insert_component("Arrivals", Component::Create(Create::new("Part", "expo(5)", TimeUnit::Second)))
//!     .unwrap();
//! let process = Process::new(Seize::new(vec![SeizableItem::resource(m1)]), Delay::new("unif(2,4)", TimeUnit::Second));
//! let process = model.insert_component("Machining", Component::Process(process)).unwrap();
//! let dispose = model.insert_component("Exit", Component::Dispose(Dispose)).unwrap();
//! model.connect(create, process).unwrap();
//! model.connect(process, dispose).unwrap();
//!
//! let mut simulation = Simulation::new(model).unwrap();
//! let report = simulation.start().unwrap();
//! assert_eq!(report.replications().len(), 1);
//! ```

use crate::allocation::{protocol, Holdings};
use crate::components::{Component, ComponentId};
use crate::core::time::SimTime;
use crate::data::{DataDefinition, DefinitionId, DefinitionKind};
use crate::error::{SimResult, SimulationError};
use crate::events::{Calendar, Event, EventId, EventKind};
use crate::model::{CheckReport, Model};
use crate::models::entity::{EntityId, EntityStore};
use crate::models::event::{EventLog, SimEvent};
use crate::orchestrator::config::SimulationConfig;
use crate::orchestrator::context::{DispatchContext, RunState};
use crate::orchestrator::report::{EndReason, ReplicationSummary, SimulationReport};
use crate::rng::RngManager;
use crate::trace::{TraceSink, Tracer};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

// ============================================================================
// Run phases
// ============================================================================

/// Replication controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Next step starts a replication
    Initializing,
    /// Replication running, observations still discarded at warm-up end
    WarmUp,
    Running,
    /// Replication over, summary being taken
    Terminating,
    Finished,
}

/// What one call to [`Simulation::step`] did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// One calendar event was dispatched
    Dispatched { time: f64, event: EventId },
    /// The current replication ended instead
    ReplicationEnded { replication: u32, reason: EndReason },
}

// ============================================================================
// Simulation
// ============================================================================

/// Runs replications of a checked model
///
/// The Simulation owns the model for the duration of the run. Components
/// are never mutated while it runs; resources, queues, collectors and
/// variables live in the model's data definitions and are reset at the
/// start of every replication.
///
/// # Determinism
///
/// Every replication draws from its own xorshift64* stream derived from
/// `rng_seed` and the replication number, and calendar ties are broken by
/// priority then insertion order. Same model + same seed = identical
/// dispatch sequence.
pub struct Simulation {
    /// Model under simulation
    model: Model,

    /// Calendar, entities, RNG stream and holdings of the replication
    run: RunState,

    /// Trace level filter and sinks
    tracer: Tracer,

    /// Replication controller state
    phase: Phase,

    /// True after `step()`, false while `start()` drives the loop
    paused: bool,

    /// Findings of the model check done at construction
    check: CheckReport,

    /// Summaries of finished replications
    report: SimulationReport,
}

impl Simulation {
    /// Validate the configuration and check the model
    ///
    /// # Errors
    ///
    /// * `InvalidConfig` - configuration out of range
    /// * `InvalidModel` - model check found errors (the report lists all)
    pub fn new(mut model: Model) -> SimResult<Self> {
        model.config.validate()?;
        let check = model.validate()?;
        for warning in &check.warnings {
            warn!(component = %warning.component, "{}", warning.message);
        }

        let config = &model.config;
        let run = RunState::new(config.rng_seed, config.time_unit);
        let tracer = Tracer::new(config.trace_level);
        let report = SimulationReport::new(model.name.clone(), config.confidence_level);
        info!(
            model = %model.name,
            replications = config.number_of_replications,
            length = config.replication_length,
            warm_up = config.warm_up_period,
            "simulation created"
        );

        Ok(Self {
            model,
            run,
            tracer,
            phase: Phase::Initializing,
            paused: false,
            check,
            report,
        })
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.model.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True between `step()` calls (not an error state)
    pub fn is_paused(&self) -> bool {
        self.paused && self.is_running()
    }

    /// True once a replication has started and until the run finishes
    pub fn is_running(&self) -> bool {
        self.run.replication > 0 && self.phase != Phase::Finished
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    /// Current replication (1-based; 0 before the first starts)
    pub fn replication(&self) -> u32 {
        self.run.replication
    }

    pub fn now(&self) -> f64 {
        self.run.calendar.now().value()
    }

    pub fn calendar(&self) -> &Calendar {
        &self.run.calendar
    }

    pub fn entities(&self) -> &EntityStore {
        &self.run.entities
    }

    pub fn holdings(&self) -> &Holdings {
        &self.run.holdings
    }

    pub fn check_report(&self) -> &CheckReport {
        &self.check
    }

    pub fn report(&self) -> &SimulationReport {
        &self.report
    }

    pub fn into_report(self) -> SimulationReport {
        self.report
    }

    // ------------------------------------------------------------------------
    // Tracing
    // ------------------------------------------------------------------------

    pub fn add_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.tracer.add_sink(sink);
    }

    /// Keep every trace record (all levels) in memory
    pub fn enable_event_log(&mut self) {
        self.tracer.enable_log();
    }

    pub fn event_log(&self) -> Option<&EventLog> {
        self.tracer.log()
    }

    pub fn take_event_log(&mut self) -> Option<EventLog> {
        self.tracer.take_log()
    }

    // ------------------------------------------------------------------------
    // Run control
    // ------------------------------------------------------------------------

    /// Withdraw a pending event; unknown or already fired ids are a no-op
    pub fn cancel_event(&mut self, event: EventId) -> bool {
        self.run.calendar.cancel(event)
    }

    /// Run every remaining replication to completion
    pub fn start(&mut self) -> SimResult<&SimulationReport> {
        if self.phase == Phase::Finished {
            return Err(SimulationError::AlreadyFinished);
        }
        self.paused = false;
        while self.phase != Phase::Finished {
            self.advance_or_abort()?;
        }
        Ok(&self.report)
    }

    /// Advance by one event and pause
    ///
    /// Starts the next replication first when none is in progress. When the
    /// current replication is over, the step ends it instead of dispatching.
    pub fn step(&mut self) -> SimResult<StepOutcome> {
        if self.phase == Phase::Finished {
            return Err(SimulationError::AlreadyFinished);
        }
        self.paused = true;
        self.advance_or_abort()
    }

    fn advance_or_abort(&mut self) -> SimResult<StepOutcome> {
        match self.advance() {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.abort(&e);
                Err(e)
            }
        }
    }

    fn advance(&mut self) -> SimResult<StepOutcome> {
        // STEP 1: REPLICATION START
        if self.phase == Phase::Initializing {
            self.begin_replication()?;
        }

        // STEP 2: TERMINATION
        if let Some(reason) = self.termination()? {
            return Ok(self.end_replication(reason));
        }

        // STEP 3: DISPATCH
        let Some(event) = self.run.calendar.advance() else {
            return Ok(self.end_replication(EndReason::CalendarEmpty));
        };
        self.dispatch(event)?;
        Ok(StepOutcome::Dispatched {
            time: event.time.value(),
            event: event.id,
        })
    }

    fn context(&mut self) -> DispatchContext<'_> {
        DispatchContext {
            components: &self.model.components,
            data: &mut self.model.data,
            evaluator: self.model.evaluator.as_mut(),
            run: &mut self.run,
            tracer: &mut self.tracer,
        }
    }

    // ------------------------------------------------------------------------
    // Replication boundaries
    // ------------------------------------------------------------------------

    fn begin_replication(&mut self) -> SimResult<()> {
        let replication = self.run.replication + 1;
        let config = self.model.config.clone();

        // STEP 1: CLOCK AND RANDOM STREAM
        self.run.calendar.reset();
        self.run.rng = RngManager::for_replication(config.rng_seed, replication);
        self.run.replication = replication;
        self.run.base_unit = config.time_unit;
        self.run.creations.clear();

        // STEP 2: ENTITIES
        // Only entities waiting in persistent queues carry over
        let retained = self.retained_entities();
        self.run.entities.retain(|id| retained.contains(&id));
        self.run.holdings.retain(|id| retained.contains(&id));

        // STEP 3: DATA DEFINITIONS
        let held = self.run.holdings.totals();
        let dropped = self.model.data.reset_for_replication(0.0, &held);
        debug_assert!(dropped.iter().all(|e| !retained.contains(e)));

        // STEP 4: PRIME THE CALENDAR
        let sources: Vec<(ComponentId, f64)> = self
            .model
            .components
            .iter()
            .filter_map(|(id, node)| match &node.kind {
                Component::Create(create) if create.max_creations != Some(0) => {
                    Some((id, create.first_time(config.time_unit)))
                }
                _ => None,
            })
            .collect();
        for (source, time) in sources {
            self.run
                .calendar
                .schedule(SimTime::new(time), 0, EventKind::Creation { source })?;
        }
        self.phase = if config.has_warm_up() {
            self.run
                .calendar
                .schedule(SimTime::new(config.warm_up_period), i32::MAX, EventKind::WarmUpEnd)?;
            Phase::WarmUp
        } else {
            Phase::Running
        };

        self.tracer.emit(SimEvent::ReplicationStarted { time: 0.0, replication });
        info!(replication, of = config.number_of_replications, "replication started");

        // STEP 5: CARRIED-OVER QUEUES
        // Entries kept by persistent queues get a first chance at the fresh
        // capacity before any event fires
        if !retained.is_empty() {
            let resources: Vec<DefinitionId> = self
                .model
                .data
                .iter()
                .filter(|(_, d)| d.kind() == DefinitionKind::Resource)
                .map(|(id, _)| id)
                .collect();
            let mut ctx = self.context();
            let granted = protocol::rescan(&mut ctx, &resources)?;
            for resource in &resources {
                ctx.data.resource_mut(*resource)?.settle(0.0);
            }
            for (entity, seize) in granted {
                ctx.forward(seize, entity)?;
            }
        }
        Ok(())
    }

    fn retained_entities(&self) -> BTreeSet<EntityId> {
        self.model
            .data
            .iter()
            .filter_map(|(_, definition)| match definition {
                DataDefinition::Queue(queue) if queue.is_persistent() => Some(queue),
                _ => None,
            })
            .flat_map(|queue| queue.entries().iter().chain(queue.blocked()).map(|w| w.entity))
            .collect()
    }

    /// Why the current replication must end before the next event, if it must
    fn termination(&mut self) -> SimResult<Option<EndReason>> {
        let length = self.model.config.replication_length;
        if let Some(condition) = self.model.config.termination_condition.clone() {
            if self.context().evaluate(&condition, None)? != 0.0 {
                return Ok(Some(EndReason::TerminationCondition));
            }
        }
        match self.run.calendar.peek_time() {
            None => Ok(Some(EndReason::CalendarEmpty)),
            Some(next) if next.value() > length => {
                self.run.calendar.advance_clock_to(SimTime::new(length));
                Ok(Some(EndReason::LengthReached))
            }
            Some(_) => Ok(None),
        }
    }

    fn end_replication(&mut self, reason: EndReason) -> StepOutcome {
        self.phase = Phase::Terminating;
        let replication = self.run.replication;
        let now = self.now();

        let (statistics, counters) = self.model.data.summaries(now);
        self.report.add(ReplicationSummary {
            replication,
            end_time: now,
            reason,
            statistics,
            counters,
        });
        self.tracer.emit(SimEvent::ReplicationEnded {
            time: now,
            replication,
            reason: reason.to_string(),
        });
        info!(replication, time = now, %reason, entities = self.run.entities.len(), "replication ended");

        self.phase = if replication < self.model.config.number_of_replications {
            Phase::Initializing
        } else {
            info!(model = %self.model.name, "simulation finished");
            Phase::Finished
        };
        StepOutcome::ReplicationEnded { replication, reason }
    }

    fn abort(&mut self, e: &SimulationError) {
        let time = self.now();
        error!(time, error = %e, "simulation aborted");
        self.tracer.emit(SimEvent::Fatal {
            time,
            message: e.to_string(),
        });
        self.phase = Phase::Finished;
    }

    // ------------------------------------------------------------------------
    // Event dispatch
    // ------------------------------------------------------------------------

    fn dispatch(&mut self, event: Event) -> SimResult<()> {
        match event.kind {
            EventKind::Arrival { entity, target, port } => self.context().dispatch(target, entity, port),
            EventKind::Creation { source } => {
                let mut ctx = self.context();
                let components = ctx.components;
                match &components.node(source)?.kind {
                    Component::Create(create) => create.create(&mut ctx, source),
                    _ => Err(SimulationError::ComponentNotFound(format!(
                        "'{}' is not a Create",
                        components.name_of(source)
                    ))),
                }
            }
            EventKind::WarmUpEnd => {
                let now = self.now();
                self.model.data.clear_statistics(now);
                self.phase = Phase::Running;
                self.tracer.emit(SimEvent::WarmUpEnded { time: now });
                debug!(time = now, "warm-up ended, statistics cleared");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::SeizableItem;
    use crate::components::{Create, Delay, Dispose, Process, Seize};
    use crate::core::time::TimeUnit;

    fn single_server(length: f64, replications: u32) -> Model {
        let mut model = Model::new("single");
        model.config.replication_length = length;
        model.config.number_of_replications = replications;
        let m1 = model.new_resource("M1", 1).unwrap();
        let create = model
            .insert_component("Create_1", Component::Create(Create::new("Part", "4", TimeUnit::Second)))
            .unwrap();
        let process = Process::new(Seize::new(vec![SeizableItem::resource(m1)]), Delay::new("3", TimeUnit::Second));
        let process = model.insert_component("Process_1", Component::Process(process)).unwrap();
        let dispose = model.insert_component("Dispose_1", Component::Dispose(Dispose)).unwrap();
        model.connect(create, process).unwrap();
        model.connect(process, dispose).unwrap();
        model
    }

    #[test]
    fn test_step_pauses_and_start_finishes() {
        let mut simulation = Simulation::new(single_server(20.0, 2)).unwrap();
        assert!(!simulation.is_running());
        let outcome = simulation.step().unwrap();
        assert!(matches!(outcome, StepOutcome::Dispatched { time, .. } if time == 0.0));
        assert!(simulation.is_paused());
        assert_eq!(simulation.phase(), Phase::Running);

        let report = simulation.start().unwrap();
        assert_eq!(report.replications().len(), 2);
        assert!(simulation.is_finished());
        assert!(!simulation.is_paused());
        assert!(matches!(simulation.step(), Err(SimulationError::AlreadyFinished)));
    }

    #[test]
    fn test_length_reached_moves_clock_to_length() {
        let mut simulation = Simulation::new(single_server(10.0, 1)).unwrap();
        simulation.start().unwrap();
        let summary = &simulation.report().replications()[0];
        assert_eq!(summary.reason, EndReason::LengthReached);
        assert_eq!(summary.end_time, 10.0);
        // arrivals at 0, 4, 8 each need 3s of M1; none waits
        assert_eq!(summary.counters["M1.SeizedUnits"], 3);
        assert_eq!(summary.counters["Process_1.NumberIn"], 3);
    }

    #[test]
    fn test_calendar_empty_ends_replication() {
        let mut model = single_server(100.0, 1);
        let create = model.find_component("Create_1").unwrap();
        if let Component::Create(c) = &mut model.component_mut(create).unwrap().kind {
            c.max_creations = Some(2);
        }
        let mut simulation = Simulation::new(model).unwrap();
        simulation.start().unwrap();
        let summary = &simulation.report().replications()[0];
        assert_eq!(summary.reason, EndReason::CalendarEmpty);
        assert_eq!(summary.end_time, 7.0);
    }

    #[test]
    fn test_termination_condition() {
        let mut model = single_server(100.0, 1);
        model.config.termination_condition = Some("tnow >= 9".to_string());
        let mut simulation = Simulation::new(model).unwrap();
        simulation.start().unwrap();
        let summary = &simulation.report().replications()[0];
        assert_eq!(summary.reason, EndReason::TerminationCondition);
        assert!(summary.end_time >= 9.0 && summary.end_time < 12.0);
    }

    #[test]
    fn test_negative_delay_is_fatal() {
        let mut model = Model::new("bad delay");
        let create = model
            .insert_component(
                "Create_1",
                Component::Create(Create::new("Part", "1", TimeUnit::Second).with_max_creations(1)),
            )
            .unwrap();
        let delay = model
            .insert_component("Delay_1", Component::Delay(Delay::new("0 - 5", TimeUnit::Second)))
            .unwrap();
        let dispose = model.insert_component("Dispose_1", Component::Dispose(Dispose)).unwrap();
        model.connect(create, delay).unwrap();
        model.connect(delay, dispose).unwrap();

        let mut simulation = Simulation::new(model).unwrap();
        simulation.enable_event_log();
        let err = simulation.start().unwrap_err();
        assert!(matches!(err, SimulationError::InvalidTime { .. }));
        assert!(simulation.is_finished());
        let log = simulation.event_log().unwrap();
        assert_eq!(log.events_of_type("Fatal").len(), 1);
    }

    #[test]
    fn test_invalid_model_is_rejected() {
        let mut model = Model::new("no exit");
        model
            .insert_component("Create_1", Component::Create(Create::default()))
            .unwrap();
        assert!(matches!(
            Simulation::new(model),
            Err(SimulationError::InvalidModel(_))
        ));
    }
}
