use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use spool_api::config::{ConfigParam, ConfigValues, ParamType, ParamValue};
use spool_api::error::PluginError;
use spool_api::metadata::TopicMetadata;
use spool_api::record::TopicRecord;
use spool_api::storage::{OpenMode, StorageBackend, StorageFactory};

pub const BACKEND_ID: &str = "memory";

// ═══════════════════════════════════════════════════════════════
//  Shared container map
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct Container {
    topics: Vec<TopicMetadata>,
    records: Vec<TopicRecord>,
    payload_bytes: u64,
    /// Held by an open writer.
    writing: bool,
}

type Containers = Arc<Mutex<HashMap<String, Container>>>;

fn lock(containers: &Containers) -> MutexGuard<'_, HashMap<String, Container>> {
    containers.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("memory container map lock poisoned, continuing");
        poisoned.into_inner()
    })
}

// ═══════════════════════════════════════════════════════════════
//  MemoryStorageFactory
// ═══════════════════════════════════════════════════════════════

/// Containers that live as long as the factory, keyed by URI.
///
/// Every backend opened from one factory (or a clone of it) sees the same
/// containers, so a recording written here can be read back in-process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorageFactory {
    containers: Containers,
    /// Per-container record limit. `0` = unlimited.
    max_records: u64,
}

impl MemoryStorageFactory {
    pub fn with_max_records(max_records: u64) -> Self {
        Self {
            max_records,
            ..Default::default()
        }
    }

    pub fn config_params() -> Vec<ConfigParam> {
        vec![ConfigParam::optional(
            "max_records",
            ParamType::U64,
            ParamValue::U64(0),
            "records per container before writes fail (0 = unlimited)",
        )]
    }

    pub fn from_config(config: &ConfigValues) -> Result<Self, PluginError> {
        let max_records = config.get_u64("max_records").unwrap_or(0);
        Ok(Self::with_max_records(max_records))
    }

    pub fn contains(&self, uri: &str) -> bool {
        lock(&self.containers).contains_key(uri)
    }

    pub fn record_count(&self, uri: &str) -> Option<u64> {
        lock(&self.containers)
            .get(uri)
            .map(|c| c.records.len() as u64)
    }

    /// All container URIs, sorted.
    pub fn uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = lock(&self.containers).keys().cloned().collect();
        uris.sort();
        uris
    }

    /// Drop a finished container. Fails while a writer holds it.
    pub fn remove(&self, uri: &str) -> Result<(), PluginError> {
        let mut containers = lock(&self.containers);
        match containers.get(uri) {
            None => Err(PluginError::not_found(format!("no container '{uri}'"))),
            Some(c) if c.writing => Err(PluginError::open(format!("'{uri}' is being written"))),
            Some(_) => {
                containers.remove(uri);
                Ok(())
            }
        }
    }
}

impl StorageFactory for MemoryStorageFactory {
    fn id(&self) -> &str {
        BACKEND_ID
    }

    fn open(&self, uri: &str, mode: OpenMode) -> Result<Box<dyn StorageBackend>, PluginError> {
        if uri.is_empty() {
            return Err(PluginError::open("empty container uri"));
        }

        let mut containers = lock(&self.containers);
        match (mode, containers.get_mut(uri)) {
            (OpenMode::Write, Some(_)) => {
                return Err(PluginError::open(format!("container '{uri}' already exists")));
            }
            (OpenMode::Write, None) => {
                containers.insert(
                    uri.to_string(),
                    Container {
                        writing: true,
                        ..Default::default()
                    },
                );
            }
            (OpenMode::Read | OpenMode::Append, None) => {
                return Err(PluginError::not_found(format!("no container '{uri}'")));
            }
            (_, Some(container)) if container.writing => {
                return Err(PluginError::open(format!(
                    "container '{uri}' is held by another writer"
                )));
            }
            (OpenMode::Append, Some(container)) => container.writing = true,
            (OpenMode::Read, Some(_)) => {}
        }
        drop(containers);

        Ok(Box::new(MemoryStorage {
            uri: uri.to_string(),
            mode,
            containers: self.containers.clone(),
            max_records: self.max_records,
            cursor: 0,
            closed: false,
        }))
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryStorage
// ═══════════════════════════════════════════════════════════════

pub struct MemoryStorage {
    uri: String,
    mode: OpenMode,
    containers: Containers,
    max_records: u64,
    /// Next record index for reads.
    cursor: usize,
    closed: bool,
}

impl MemoryStorage {
    fn with_container<T>(
        &self,
        f: impl FnOnce(&mut Container) -> Result<T, PluginError>,
    ) -> Result<T, PluginError> {
        if self.closed {
            return Err(PluginError::logic(format!("container '{}' is closed", self.uri)));
        }
        let mut containers = lock(&self.containers);
        let container = containers
            .get_mut(&self.uri)
            .ok_or_else(|| PluginError::not_found(format!("container '{}' was removed", self.uri)))?;
        f(container)
    }

    fn ensure_writable(&self) -> Result<(), PluginError> {
        if self.mode == OpenMode::Read {
            return Err(PluginError::logic(format!("'{}' is open for reading", self.uri)));
        }
        Ok(())
    }
}

impl StorageBackend for MemoryStorage {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }

    fn write_metadata(&mut self, metadata: &TopicMetadata) -> Result<(), PluginError> {
        self.ensure_writable()?;
        self.with_container(|c| {
            match c.topics.iter().find(|t| t.name == metadata.name) {
                Some(existing) if existing.conflicts_with(metadata) => {
                    Err(PluginError::conflict(format!(
                        "topic '{}' already stored as {} ({})",
                        existing.name, existing.message_type, existing.serialization_format
                    )))
                }
                Some(_) => Ok(()),
                None => {
                    c.topics.push(metadata.clone());
                    Ok(())
                }
            }
        })
    }

    fn write_record(&mut self, record: &TopicRecord) -> Result<(), PluginError> {
        self.ensure_writable()?;
        let max_records = self.max_records;
        self.with_container(|c| {
            if !c.topics.iter().any(|t| t.name == record.topic_name) {
                return Err(PluginError::topic_not_found(&record.topic_name));
            }
            if max_records > 0 && c.records.len() as u64 >= max_records {
                return Err(PluginError::io(format!(
                    "container capacity of {max_records} records reached"
                )));
            }
            c.payload_bytes += record.data.len() as u64;
            c.records.push(record.clone());
            Ok(())
        })
    }

    fn has_next(&mut self) -> Result<bool, PluginError> {
        let cursor = self.cursor;
        self.with_container(|c| Ok(cursor < c.records.len()))
    }

    fn read_next(&mut self) -> Result<TopicRecord, PluginError> {
        let cursor = self.cursor;
        let record = self.with_container(|c| {
            c.records
                .get(cursor)
                .cloned()
                .ok_or_else(PluginError::end_of_storage)
        })?;
        self.cursor += 1;
        Ok(record)
    }

    fn topics(&self) -> Vec<TopicMetadata> {
        self.with_container(|c| Ok(c.topics.clone()))
            .unwrap_or_default()
    }

    fn size_bytes(&self) -> u64 {
        self.with_container(|c| Ok(c.payload_bytes)).unwrap_or(0)
    }

    fn close(&mut self) -> Result<(), PluginError> {
        if self.closed {
            return Ok(());
        }
        if self.mode != OpenMode::Read {
            if let Some(container) = lock(&self.containers).get_mut(&self.uri) {
                container.writing = false;
            }
        }
        self.closed = true;
        Ok(())
    }
}

impl Drop for MemoryStorage {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// ---------------------------------------------------------------------------
// FFI exports for dynamic (.so) loading
// ---------------------------------------------------------------------------

#[cfg(feature = "plugin")]
mod ffi {
    use spool_api::storage::StorageFactory;

    use super::MemoryStorageFactory;

    spool_api::qs_abi_version_fn!();
    spool_api::qs_config_params_fn!(MemoryStorageFactory::config_params());
    spool_api::qs_destroy_fn!(qs_destroy_storage_factory, spool_api::storage::StorageFactory);

    /// # Safety
    ///
    /// `config_ptr` must point to a valid `ConfigValues` owned by the engine.
    #[unsafe(no_mangle)]
    pub unsafe extern "C" fn qs_create_storage_factory(
        config_ptr: *const (),
    ) -> spool_api::ffi::PluginCreateResult {
        let config = unsafe { spool_api::ffi::config_from_ptr(config_ptr) };
        match MemoryStorageFactory::from_config(config) {
            Ok(factory) => spool_api::ffi::plugin_ok(Box::new(
                Box::new(factory) as Box<dyn StorageFactory>
            )),
            Err(e) => spool_api::ffi::plugin_err(&e.to_string()),
        }
    }
}
