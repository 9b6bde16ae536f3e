use spool_api::codec::MessageCodec;
use spool_api::metadata::TopicMetadata;

use crate::error::EngineError;
use crate::reader::SequentialReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSummary {
    pub metadata: TopicMetadata,
    pub message_count: u64,
}

/// What a container holds, gathered by reading it to the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub uri: String,
    pub message_count: u64,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    /// In container topic order, including topics without records.
    pub topics: Vec<TopicSummary>,
}

impl ContainerSummary {
    /// Drain `reader`. Fails on the first record that cannot be read.
    pub fn collect<C: MessageCodec>(reader: &mut SequentialReader<C>) -> Result<Self, EngineError> {
        let uri = reader.uri().ok_or(EngineError::NotOpen)?.to_string();
        let mut topics: Vec<TopicSummary> = reader
            .topics()?
            .into_iter()
            .map(|metadata| TopicSummary {
                metadata,
                message_count: 0,
            })
            .collect();

        let mut summary = ContainerSummary {
            uri,
            message_count: 0,
            start_time: None,
            end_time: None,
            topics: Vec::new(),
        };

        for record in reader.records() {
            let record = record?;
            summary.message_count += 1;
            let ts = record.recv_timestamp;
            summary.start_time = Some(summary.start_time.map_or(ts, |t| t.min(ts)));
            summary.end_time = Some(summary.end_time.map_or(ts, |t| t.max(ts)));

            match topics.iter_mut().find(|t| t.metadata.name == record.topic_name) {
                Some(topic) => topic.message_count += 1,
                None => tracing::warn!(
                    topic = %record.topic_name,
                    "record references a topic without metadata"
                ),
            }
        }

        summary.topics = topics;
        Ok(summary)
    }

    /// Nanoseconds between the first and last record.
    pub fn duration(&self) -> i64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use spool_api::record::TopicRecord;
    use spool_api::storage::StorageDescriptor;
    use spool_format_json::JsonCodec;
    use spool_storage_memory::MemoryStorageFactory;

    use super::*;
    use crate::backends::BackendRegistry;
    use crate::writer::SequentialWriter;

    #[test]
    fn counts_per_topic_and_time_span() {
        let mut backends = BackendRegistry::new();
        backends.register(Arc::new(MemoryStorageFactory::default()));
        let backends = Arc::new(backends);

        let mut writer = SequentialWriter::new(backends.clone(), JsonCodec);
        writer.open(StorageDescriptor::new("memory", "bag")).unwrap();
        for name in ["/a", "/b", "/idle"] {
            writer
                .create_topic(TopicMetadata::new(name, "Raw", "json"))
                .unwrap();
        }
        for (topic, ts) in [("/a", 30), ("/b", 10), ("/a", 50)] {
            writer.write(TopicRecord::new(topic, b"{}".to_vec(), ts)).unwrap();
        }
        writer.close().unwrap();

        let mut reader = crate::reader::SequentialReader::new(backends, JsonCodec);
        reader.open(StorageDescriptor::new("memory", "bag")).unwrap();
        let summary = ContainerSummary::collect(&mut reader).unwrap();

        assert_eq!(summary.uri, "bag");
        assert_eq!(summary.message_count, 3);
        assert_eq!(summary.start_time, Some(10));
        assert_eq!(summary.end_time, Some(50));
        assert_eq!(summary.duration(), 40);
        let counts: Vec<(&str, u64)> = summary
            .topics
            .iter()
            .map(|t| (t.metadata.name.as_str(), t.message_count))
            .collect();
        assert_eq!(counts, [("/a", 2), ("/b", 1), ("/idle", 0)]);
    }
}
