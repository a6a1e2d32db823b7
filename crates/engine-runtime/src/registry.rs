use engine_core::checker::{Checker, CheckerCapabilities};
use std::{collections::HashMap, sync::Arc};

/// Checker implementations available to one pipeline, keyed by the name
/// specs refer to them by.
#[derive(Clone, Default)]
pub struct CheckerRegistry {
    checkers: HashMap<String, Arc<dyn Checker>>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `checker` under its capability name.
    pub fn with(mut self, checker: impl Checker) -> Self {
        self.register(checker);
        self
    }

    pub fn register(&mut self, checker: impl Checker) -> Option<Arc<dyn Checker>> {
        let name = checker.capabilities().name;
        self.insert(name, Arc::new(checker))
    }

    /// Registers under an explicit key, replacing any previous entry.
    pub fn insert(&mut self, key: impl Into<String>, checker: Arc<dyn Checker>) -> Option<Arc<dyn Checker>> {
        self.checkers.insert(key.into(), checker)
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Checker>> {
        self.checkers.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.checkers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    /// Capabilities of every registered checker, sorted by key.
    pub fn capabilities(&self) -> Vec<(String, CheckerCapabilities)> {
        let mut caps: Vec<_> = self
            .checkers
            .iter()
            .map(|(key, checker)| (key.clone(), checker.capabilities()))
            .collect();
        caps.sort_by(|a, b| a.0.cmp(&b.0));
        caps
    }
}

impl std::fmt::Debug for CheckerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.checkers.keys().collect();
        keys.sort();
        f.debug_struct("CheckerRegistry").field("checkers", &keys).finish()
    }
}
