//! Backend registry: dialect identifier to adapter lookup.
//!
//! Resolved once at mutator/evolver construction time rather than through
//! any dynamic probing.

use crate::postgres::postgres_backend;
use evodb_core::backend::EvolutionBackend;
use std::sync::Arc;

///
/// BackendRegistry
///

#[derive(Clone, Default)]
pub struct BackendRegistry {
    entries: Vec<(&'static str, Arc<dyn EvolutionBackend>)>,
}

impl BackendRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A registry with every built-in dialect registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(postgres_backend()));

        registry
    }

    /// Register a backend under its declared dialect identifier. A
    /// re-registration replaces the previous adapter.
    pub fn register(&mut self, backend: Arc<dyn EvolutionBackend>) {
        let name = backend.name();

        match self.entries.iter_mut().find(|(entry_name, _)| *entry_name == name) {
            Some(entry) => entry.1 = backend,
            None => self.entries.push((name, backend)),
        }
    }

    #[must_use]
    pub fn get(&self, dialect: &str) -> Option<Arc<dyn EvolutionBackend>> {
        self.entries
            .iter()
            .find(|(name, _)| *name == dialect)
            .map(|(_, backend)| Arc::clone(backend))
    }

    pub fn dialects(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_resolves_postgres() {
        let registry = BackendRegistry::with_defaults();

        assert!(registry.get("postgres").is_some());
        assert!(registry.get("oracle").is_none());
    }
}
