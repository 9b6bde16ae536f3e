use std::sync::Arc;

use spool_api::config::{ConfigParam, ConfigValues};
use spool_api::error::PluginError;
use spool_api::storage::StorageFactory;

use crate::backends::BackendRegistry;
use crate::config::SpoolConfig;
use crate::error::EngineError;
use crate::plugin_host;

/// A backend linked into the binary rather than loaded from a `.so`.
#[derive(Clone, Copy)]
pub struct BuiltinBackend {
    pub id: &'static str,
    pub params: fn() -> Vec<ConfigParam>,
    pub create: fn(&ConfigValues) -> Result<Arc<dyn StorageFactory>, PluginError>,
}

impl std::fmt::Debug for BuiltinBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinBackend").field("id", &self.id).finish()
    }
}

/// Build the backend registry a process works with.
///
/// 1. Every built-in is created, with its `[[backends]]` config if present.
/// 2. Every `[[backends]]` entry with `plugin` is loaded and registered
///    under the entry's id (replacing a built-in of the same id).
/// 3. An entry without `plugin` must name a built-in.
/// 4. `storage.backend` must resolve.
pub fn build_backends(
    config: &SpoolConfig,
    builtins: &[BuiltinBackend],
) -> Result<BackendRegistry, EngineError> {
    let mut registry = BackendRegistry::new();

    for builtin in builtins {
        let entry = config.backend(builtin.id).filter(|b| b.plugin.is_none());
        let raw = entry.map(|b| b.config_json()).transpose()?.flatten();
        let ctx = format!("backend '{}'", builtin.id);

        let values = plugin_host::build_config(raw.as_ref(), &(builtin.params)())
            .map_err(|e| e.with_context(&ctx))?;
        let factory = (builtin.create)(&values)
            .map_err(|e| EngineError::from(e).with_context(&ctx))?;
        registry.register_as(builtin.id, factory);
    }

    for entry in &config.backends {
        let ctx = format!("backend '{}'", entry.id);
        match &entry.plugin {
            Some(path) => {
                let raw = entry.config_json()?;
                let factory = plugin_host::load_storage_factory(path, raw.as_ref())
                    .map_err(|e| e.with_context(&ctx))?;
                registry.register_as(entry.id.clone(), factory);
            }
            None if builtins.iter().any(|b| b.id == entry.id) => {}
            None => {
                return Err(EngineError::Config(format!(
                    "{ctx}: not built in and no plugin path given"
                )));
            }
        }
    }

    if !registry.contains(&config.storage.backend) {
        return Err(EngineError::Config(format!(
            "storage.backend '{}' is not registered (available: {})",
            config.storage.backend,
            registry.ids().join(", ")
        )));
    }

    tracing::info!(backends = ?registry.ids(), "backends ready");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use spool_storage_memory::MemoryStorageFactory;

    use super::*;

    fn memory() -> BuiltinBackend {
        BuiltinBackend {
            id: "memory",
            params: MemoryStorageFactory::config_params,
            create: |values| Ok(Arc::new(MemoryStorageFactory::from_config(values)?)),
        }
    }

    #[test]
    fn builtins_receive_their_config() {
        let config = SpoolConfig::parse(
            r#"
            [storage]
            backend = "memory"

            [[backends]]
            id = "memory"
            config = { max_records = 2 }
            "#,
        )
        .unwrap();
        let registry = build_backends(&config, &[memory()]).unwrap();
        assert_eq!(registry.ids(), ["memory"]);
    }

    #[test]
    fn bad_builtin_config_is_rejected() {
        let config = SpoolConfig::parse(
            r#"
            [storage]
            backend = "memory"

            [[backends]]
            id = "memory"
            config = { capacity = 2 }
            "#,
        )
        .unwrap();
        let err = build_backends(&config, &[memory()]).unwrap_err();
        assert!(err.to_string().contains("backend 'memory'"));
        assert!(err.to_string().contains("unknown parameter 'capacity'"));
    }

    #[test]
    fn unknown_entries_and_default_backend_fail() {
        let config = SpoolConfig::parse("[[backends]]\nid = \"s3\"").unwrap();
        assert!(matches!(
            build_backends(&config, &[memory()]),
            Err(EngineError::Config(_))
        ));

        // Default backend is "file", which is not among the builtins here.
        let config = SpoolConfig::parse("").unwrap();
        let err = build_backends(&config, &[memory()]).unwrap_err();
        assert!(err.to_string().contains("storage.backend 'file'"));
    }
}
