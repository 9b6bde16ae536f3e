use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use spool_api::config::{ConfigParam, ConfigValues, ParamType, ParamValue};
use spool_api::error::PluginError;
use spool_api::record::TopicRecord;

// ════════════════════════════════════════════════════════════════
//  Configuration
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStorageConfig {
    /// fsync after every record and topic line instead of only on close.
    pub sync_on_write: bool,
}

impl FileStorageConfig {
    pub fn params() -> Vec<ConfigParam> {
        vec![ConfigParam::optional(
            "sync_on_write",
            ParamType::Bool,
            ParamValue::Bool(false),
            "fsync after every write",
        )]
    }

    pub fn from_values(values: &ConfigValues) -> Result<Self, PluginError> {
        Ok(Self {
            sync_on_write: values.get_bool("sync_on_write").unwrap_or(false),
        })
    }
}

// ════════════════════════════════════════════════════════════════
//  On-disk layout
// ════════════════════════════════════════════════════════════════

pub(crate) const TOPICS_FILE: &str = "topics.jsonl";
pub(crate) const RECORDS_FILE: &str = "records.jsonl";
pub(crate) const LOCK_FILE: &str = ".lock";

/// One line of `records.jsonl`. Payload bytes are base64 so any codec's
/// output survives the JSON round trip.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DiskRecord {
    pub topic: String,
    pub recv_timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_timestamp: Option<i64>,
    #[serde(serialize_with = "to_base64", deserialize_with = "from_base64")]
    pub data: Bytes,
}

impl From<&TopicRecord> for DiskRecord {
    fn from(record: &TopicRecord) -> Self {
        Self {
            topic: record.topic_name.clone(),
            recv_timestamp: record.recv_timestamp,
            send_timestamp: record.send_timestamp,
            data: record.data.clone(),
        }
    }
}

impl From<DiskRecord> for TopicRecord {
    fn from(disk: DiskRecord) -> Self {
        TopicRecord {
            topic_name: disk.topic,
            data: disk.data,
            recv_timestamp: disk.recv_timestamp,
            send_timestamp: disk.send_timestamp,
        }
    }
}

fn to_base64<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map(Bytes::from)
        .map_err(serde::de::Error::custom)
}
