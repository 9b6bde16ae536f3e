#![allow(dead_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use spool_api::codec::Message;
use spool_api::storage::StorageDescriptor;
use spool_engine::{BackendRegistry, SequentialReader, SequentialWriter};
use spool_format_json::JsonCodec;
use spool_storage_file::FileStorageFactory;
use spool_storage_memory::MemoryStorageFactory;

/// Every reference backend; scenarios run once per id.
pub const TESTED_BACKENDS: [&str; 2] = ["memory", "file"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicTypes {
    pub bool_value: bool,
    pub int32_value: i32,
    pub float64_value: f64,
    pub string_value: String,
}

impl Message for BasicTypes {
    const TYPE_NAME: &'static str = "test_msgs/msg/BasicTypes";
}

impl Default for BasicTypes {
    fn default() -> Self {
        Self {
            bool_value: false,
            int32_value: 0,
            float64_value: 12345.6789,
            string_value: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strings {
    pub data: String,
}

impl Message for Strings {
    const TYPE_NAME: &'static str = "test_msgs/msg/Strings";
}

/// Backends plus a scratch area for one scenario run.
pub struct Harness {
    pub backend: &'static str,
    pub backends: Arc<BackendRegistry>,
    pub memory: Arc<MemoryStorageFactory>,
    tmp: TempDir,
}

impl Harness {
    pub fn new(backend: &'static str) -> Self {
        let memory = Arc::new(MemoryStorageFactory::default());
        let mut backends = BackendRegistry::new();
        backends.register(memory.clone());
        backends.register(Arc::new(FileStorageFactory::default()));
        Self {
            backend,
            backends: Arc::new(backends),
            memory,
            tmp: tempfile::tempdir().expect("tempdir"),
        }
    }

    /// Location for a container named `name` on this harness's backend.
    pub fn uri(&self, name: &str) -> String {
        match self.backend {
            "file" => self.tmp.path().join(name).to_string_lossy().into_owned(),
            _ => name.to_string(),
        }
    }

    pub fn descriptor(&self, name: &str) -> StorageDescriptor {
        StorageDescriptor::new(self.backend, self.uri(name))
    }

    pub fn writer(&self) -> SequentialWriter<JsonCodec> {
        SequentialWriter::new(self.backends.clone(), JsonCodec)
    }

    pub fn reader(&self, name: &str) -> SequentialReader<JsonCodec> {
        let mut reader = SequentialReader::new(self.backends.clone(), JsonCodec);
        reader.open(self.descriptor(name)).expect("open reader");
        reader
    }

    /// (topic, timestamp) of every remaining record.
    pub fn drain(reader: &mut SequentialReader<JsonCodec>) -> Vec<(String, i64)> {
        reader
            .records()
            .map(|r| r.expect("read record"))
            .map(|r| (r.topic_name, r.recv_timestamp))
            .collect()
    }
}

/// Run `scenario` once against each reference backend.
pub fn for_each_backend(scenario: impl Fn(&Harness)) {
    for backend in TESTED_BACKENDS {
        let harness = Harness::new(backend);
        scenario(&harness);
    }
}
