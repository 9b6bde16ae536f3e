use std::path::PathBuf;

use serde::Deserialize;

use crate::error::EngineError;
use crate::split::SplitPolicy;

/// Root configuration, parsed from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpoolConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    /// Backend definitions. Built-in backends need an entry only to pass
    /// config; plugin backends need `plugin`.
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Backend used when none is given on the command line.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Split thresholds. `0` disables a threshold.
    #[serde(default)]
    pub max_records: u64,
    #[serde(default)]
    pub max_bytes: u64,
    /// Nanoseconds.
    #[serde(default)]
    pub max_duration: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            max_records: 0,
            max_bytes: 0,
            max_duration: 0,
        }
    }
}

fn default_backend() -> String {
    "file".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub id: String,
    /// Path to a backend `.so`. Absent for built-in backends.
    #[serde(default)]
    pub plugin: Option<PathBuf>,
    #[serde(default)]
    pub config: Option<toml::Value>,
}

impl BackendConfig {
    /// The `config` table in the format-independent shape plugin validation expects.
    pub fn config_json(&self) -> Result<Option<serde_json::Value>, EngineError> {
        self.config
            .as_ref()
            .map(|v| {
                serde_json::to_value(v)
                    .map_err(|e| EngineError::Config(format!("backend '{}': {e}", self.id)))
            })
            .transpose()
    }
}

impl SpoolConfig {
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content)
    }

    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        let config: SpoolConfig =
            toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.storage.max_duration < 0 {
            return Err(EngineError::Config(format!(
                "storage.max_duration must be non-negative, got {}",
                self.storage.max_duration
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.id.as_str()) {
                return Err(EngineError::Config(format!(
                    "duplicate backend id '{}'",
                    backend.id
                )));
            }
        }
        Ok(())
    }

    pub fn backend(&self, id: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.id == id)
    }

    pub fn split_policy(&self) -> SplitPolicy {
        let nonzero_u64 = |v: u64| (v > 0).then_some(v);
        SplitPolicy {
            max_records: nonzero_u64(self.storage.max_records),
            max_bytes: nonzero_u64(self.storage.max_bytes),
            max_duration: (self.storage.max_duration > 0).then_some(self.storage.max_duration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = SpoolConfig::parse("").unwrap();
        assert_eq!(config.storage.backend, "file");
        assert!(config.backends.is_empty());
        assert!(config.split_policy().is_disabled());
    }

    #[test]
    fn full_config() {
        let config = SpoolConfig::parse(
            r#"
            [storage]
            backend = "memory"
            max_records = 1000
            max_duration = 60000000000

            [[backends]]
            id = "file"
            config = { sync_on_write = true }

            [[backends]]
            id = "remote"
            plugin = "/opt/spool/libspool_storage_remote.so"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, "memory");
        assert_eq!(
            config.split_policy(),
            SplitPolicy {
                max_records: Some(1000),
                max_bytes: None,
                max_duration: Some(60_000_000_000),
            }
        );

        let file = config.backend("file").unwrap();
        assert!(file.plugin.is_none());
        assert_eq!(
            file.config_json().unwrap(),
            Some(serde_json::json!({ "sync_on_write": true }))
        );
        assert_eq!(
            config.backend("remote").unwrap().plugin.as_deref(),
            Some(std::path::Path::new("/opt/spool/libspool_storage_remote.so"))
        );
    }

    #[test]
    fn rejects_bad_config() {
        assert!(SpoolConfig::parse("[storage]\nmax_duration = -1").is_err());
        assert!(SpoolConfig::parse("[storage]\nbackend = 3").is_err());
        assert!(SpoolConfig::parse("[storage]\nmax_files = 3").is_err());
        assert!(
            SpoolConfig::parse("[[backends]]\nid = \"a\"\n[[backends]]\nid = \"a\"").is_err()
        );
    }
}
