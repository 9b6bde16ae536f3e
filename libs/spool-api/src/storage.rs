use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PluginError;
use crate::metadata::TopicMetadata;
use crate::record::TopicRecord;

/// How a container is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Sequential replay of a finished container.
    Read,
    /// Create a new container. Fails if the location already holds one.
    Write,
    /// Continue writing an existing container.
    Append,
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::Read => f.write_str("read"),
            OpenMode::Write => f.write_str("write"),
            OpenMode::Append => f.write_str("append"),
        }
    }
}

/// Which backend to instantiate and where it should operate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDescriptor {
    /// Selects the `StorageFactory` registered under this id.
    pub backend_id: String,
    /// Location interpreted by the backend. The engine never parses it.
    pub uri: String,
}

impl StorageDescriptor {
    pub fn new(backend_id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            uri: uri.into(),
        }
    }
}

/// One open container.
///
/// The engine doesn't enumerate or know concrete implementations.
/// For the engine, a container is just this trait. Each instance is owned
/// exclusively by one writer or reader; implementations must release the
/// location on `close()` and again (if still held) on drop.
pub trait StorageBackend: Send {
    fn uri(&self) -> &str;

    fn mode(&self) -> OpenMode;

    /// Persist a topic definition. Identical re-definition is a no-op;
    /// a different type/format for an existing name is `ErrorKind::Conflict`.
    fn write_metadata(&mut self, metadata: &TopicMetadata) -> Result<(), PluginError>;

    /// Append one record. Returns only after the record has been handed to
    /// the backend's flush policy.
    ///
    /// `ErrorKind::TopicNotFound` if the topic has no metadata here,
    /// `ErrorKind::Io` on write failure (not retried).
    fn write_record(&mut self, record: &TopicRecord) -> Result<(), PluginError>;

    /// True if at least one more record remains to be read.
    fn has_next(&mut self) -> Result<bool, PluginError>;

    /// Next record in recording order.
    ///
    /// `ErrorKind::EndOfStorage` when exhausted, `ErrorKind::Corrupt` when the
    /// stored bytes cannot be parsed. Corrupt records are never skipped.
    fn read_next(&mut self) -> Result<TopicRecord, PluginError>;

    /// All topics defined in this container, in creation order.
    fn topics(&self) -> Vec<TopicMetadata>;

    /// Bytes persisted so far. Drives size-based splitting.
    fn size_bytes(&self) -> u64;

    /// Release all resources. Idempotent.
    fn close(&mut self) -> Result<(), PluginError>;
}

/// Creates backend instances for one container format.
///
/// Registered in the engine's backend registry under `id()`.
pub trait StorageFactory: Send + Sync {
    fn id(&self) -> &str;

    /// Acquire exclusive access to `uri`.
    ///
    /// `ErrorKind::Open` if the location is held, malformed, or (for
    /// `OpenMode::Write`) already exists; `ErrorKind::NotFound` if a location
    /// opened for read/append does not exist.
    fn open(&self, uri: &str, mode: OpenMode) -> Result<Box<dyn StorageBackend>, PluginError>;
}
