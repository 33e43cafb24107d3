//! Record: collect an expression's value into a Statistics definition

use crate::components::{CheckScope, ComponentId, LoadScope, ModelComponent, SaveScope};
use crate::data::{DefinitionId, DefinitionKind};
use crate::error::SimResult;
use crate::models::entity::EntityId;
use crate::orchestrator::context::DispatchContext;
use crate::persistence::{PersistenceError, PersistenceRecord};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub expression: String,
    pub statistics: Option<DefinitionId>,
}

impl Record {
    pub fn new(expression: impl Into<String>, statistics: DefinitionId) -> Self {
        Self {
            expression: expression.into(),
            statistics: Some(statistics),
        }
    }
}

impl ModelComponent for Record {
    fn typename(&self) -> &'static str {
        "Record"
    }

    fn on_dispatch(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: ComponentId,
        entity: EntityId,
        _port: u32,
    ) -> SimResult<()> {
        let value = ctx.evaluate(&self.expression, Some(entity))?;
        if let Some(statistics) = self.statistics {
            ctx.data.collect(statistics, value)?;
        }
        ctx.forward(id, entity)
    }

    fn check(&self, id: ComponentId, scope: &mut CheckScope<'_>) {
        scope.expression(id, "expression", &self.expression);
        match self.statistics {
            Some(statistics) => {
                scope.definition(id, statistics, DefinitionKind::Statistics);
            }
            None => scope.error(id, "no statistics to record into"),
        }
    }

    fn save_instance(&self, record: &mut PersistenceRecord, scope: &SaveScope<'_>) {
        record.insert("expression", self.expression.as_str());
        if let Some(statistics) = self.statistics {
            record.insert("statisticsName", scope.data.name_of(statistics));
        }
    }

    fn load_instance(&mut self, record: &PersistenceRecord, scope: &LoadScope<'_>) -> Result<(), PersistenceError> {
        self.expression = record.text("expression")?.to_string();
        self.statistics = match record.text_or("statisticsName", "")? {
            "" => None,
            name => Some(
                scope
                    .data
                    .find(DefinitionKind::Statistics, name)
                    .ok_or_else(|| PersistenceError::UnknownReference {
                        kind: "Statistics",
                        name: name.to_string(),
                    })?,
            ),
        };
        Ok(())
    }
}
