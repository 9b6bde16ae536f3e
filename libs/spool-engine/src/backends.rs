use std::collections::HashMap;
use std::sync::Arc;

use spool_api::storage::{OpenMode, StorageBackend, StorageDescriptor, StorageFactory};

use crate::error::EngineError;

/// Backend id → factory.
///
/// The engine never knows which backends exist; callers register them here
/// (built-in crates or `.so` plugins loaded through `plugin_host`).
#[derive(Default)]
pub struct BackendRegistry {
    factories: HashMap<String, Arc<dyn StorageFactory>>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.ids())
            .finish()
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its own id. A later registration with the
    /// same id replaces the earlier one.
    pub fn register(&mut self, factory: Arc<dyn StorageFactory>) {
        let id = factory.id().to_string();
        self.register_as(id, factory);
    }

    /// Register a factory under a configured id instead of its own.
    pub fn register_as(&mut self, id: impl Into<String>, factory: Arc<dyn StorageFactory>) {
        let id = id.into();
        if self.factories.insert(id.clone(), factory).is_some() {
            tracing::warn!(backend = %id, "replacing previously registered backend");
        } else {
            tracing::debug!(backend = %id, "registered backend");
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn StorageFactory>> {
        self.factories.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resolve `descriptor.backend_id` and open its `uri` in `mode`.
    pub fn open(
        &self,
        descriptor: &StorageDescriptor,
        mode: OpenMode,
    ) -> Result<Box<dyn StorageBackend>, EngineError> {
        let factory = self.factories.get(&descriptor.backend_id).ok_or_else(|| {
            EngineError::StorageOpen(format!("unknown backend '{}'", descriptor.backend_id))
        })?;
        factory
            .open(&descriptor.uri, mode)
            .map_err(|e| EngineError::from(e).with_context(format!("{} ({mode})", descriptor.uri)))
    }
}
