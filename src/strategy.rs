use crate::schema::Strategy;
use std::collections::BTreeMap;

/// Declarative entity → strategy mapping. Unlisted entities are modeled daily.
#[derive(Debug, Clone, Default)]
pub struct StrategySelector {
    overrides: BTreeMap<String, Strategy>,
}

impl StrategySelector {
    pub fn new(overrides: BTreeMap<String, Strategy>) -> Self {
        Self { overrides }
    }

    pub fn select_strategy(&self, entity: &str) -> Strategy {
        self.overrides.get(entity).copied().unwrap_or_default()
    }

    pub fn with(mut self, entity: impl Into<String>, strategy: Strategy) -> Self {
        self.overrides.insert(entity.into(), strategy);
        self
    }
}
