//! Decide: route an entity to one of several connections
//!
//! With N conditions (or N percentages) the component expects N + 1
//! connections; the last one is the else branch.

use crate::components::{CheckScope, ComponentId, LoadScope, ModelComponent, SaveScope};
use crate::error::SimResult;
use crate::models::entity::EntityId;
use crate::models::event::SimEvent;
use crate::orchestrator::context::DispatchContext;
use crate::persistence::{keys, FieldValue, PersistenceError, PersistenceRecord};

#[derive(Debug, Clone, PartialEq)]
pub enum DecideMode {
    /// First condition that evaluates true wins
    Condition(Vec<String>),
    /// Percent chance per branch, drawn from the replication's stream
    Chance(Vec<f64>),
}

impl Default for DecideMode {
    fn default() -> Self {
        DecideMode::Condition(Vec::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decide {
    pub mode: DecideMode,
}

impl Decide {
    pub fn by_condition(conditions: Vec<String>) -> Self {
        Self {
            mode: DecideMode::Condition(conditions),
        }
    }

    pub fn by_chance(percentages: Vec<f64>) -> Self {
        Self {
            mode: DecideMode::Chance(percentages),
        }
    }

    fn branches(&self) -> usize {
        match &self.mode {
            DecideMode::Condition(c) => c.len(),
            DecideMode::Chance(p) => p.len(),
        }
    }

    fn choose(&self, ctx: &mut DispatchContext<'_>, entity: EntityId) -> SimResult<usize> {
        match &self.mode {
            DecideMode::Condition(conditions) => {
                for (i, condition) in conditions.iter().enumerate() {
                    if ctx.evaluate(condition, Some(entity))? != 0.0 {
                        return Ok(i);
                    }
                }
                Ok(conditions.len())
            }
            DecideMode::Chance(percentages) => {
                let draw = ctx.run.rng.next_f64() * 100.0;
                let mut cumulative = 0.0;
                for (i, percent) in percentages.iter().enumerate() {
                    cumulative += percent;
                    if draw < cumulative {
                        return Ok(i);
                    }
                }
                Ok(percentages.len())
            }
        }
    }
}

impl ModelComponent for Decide {
    fn typename(&self) -> &'static str {
        "Decide"
    }

    fn on_dispatch(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: ComponentId,
        entity: EntityId,
        _port: u32,
    ) -> SimResult<()> {
        let branch = self.choose(ctx, entity)?;
        ctx.trace(SimEvent::Branched {
            time: ctx.now(),
            component: ctx.component_name(id).to_string(),
            entity,
            branch,
        });
        ctx.forward_to(id, entity, branch)
    }

    fn check(&self, id: ComponentId, scope: &mut CheckScope<'_>) {
        match &self.mode {
            DecideMode::Condition(conditions) => {
                for (i, condition) in conditions.iter().enumerate() {
                    scope.expression(id, &format!("condition {i}"), condition);
                }
            }
            DecideMode::Chance(percentages) => {
                let total: f64 = percentages.iter().sum();
                if percentages.iter().any(|p| *p < 0.0) || total > 100.0 {
                    scope.error(id, format!("branch percentages must be non-negative and sum to at most 100 (got {total})"));
                }
            }
        }
        let connections = scope.components.node(id).map(|n| n.connections.len()).unwrap_or(0);
        if connections < self.branches() + 1 {
            scope.warning(
                id,
                format!("{} branch(es) plus else, but {connections} connection(s)", self.branches()),
            );
        }
    }

    fn save_instance(&self, record: &mut PersistenceRecord, scope: &SaveScope<'_>) {
        let (mode, count) = match &self.mode {
            DecideMode::Condition(c) => (0, c.len()),
            DecideMode::Chance(p) => (1, p.len()),
        };
        record.save_field("decideMode", FieldValue::Enum(mode), FieldValue::Enum(0), scope.save_defaults);
        record.insert("branches", count);
        match &self.mode {
            DecideMode::Condition(conditions) => {
                for (i, condition) in conditions.iter().enumerate() {
                    record.insert(keys::numbered("condition", i), condition.as_str());
                }
            }
            DecideMode::Chance(percentages) => {
                for (i, percent) in percentages.iter().enumerate() {
                    record.insert(keys::numbered("percentage", i), *percent);
                }
            }
        }
    }

    fn load_instance(&mut self, record: &PersistenceRecord, _scope: &LoadScope<'_>) -> Result<(), PersistenceError> {
        let count = record.int_or("branches", 0)?.max(0) as usize;
        self.mode = match record.enum_or("decideMode", 0)? {
            0 => DecideMode::Condition(
                (0..count)
                    .map(|i| record.text(&keys::numbered("condition", i)).map(str::to_string))
                    .collect::<Result<_, _>>()?,
            ),
            1 => DecideMode::Chance(
                (0..count)
                    .map(|i| record.float_or(&keys::numbered("percentage", i), 0.0))
                    .collect::<Result<_, _>>()?,
            ),
            _ => {
                return Err(PersistenceError::InvalidField {
                    field: "decideMode".to_string(),
                    expected: "decide mode code 0 or 1",
                })
            }
        };
        Ok(())
    }
}
