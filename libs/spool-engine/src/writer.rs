use std::sync::Arc;

use bytes::Bytes;

use spool_api::codec::{Message, MessageCodec};
use spool_api::metadata::TopicMetadata;
use spool_api::record::TopicRecord;
use spool_api::storage::{OpenMode, StorageBackend, StorageDescriptor};

use crate::backends::BackendRegistry;
use crate::error::EngineError;
use crate::registry::{Registration, TopicRegistry, conflict_error};
use crate::split::{ContainerStats, SplitEvent, SplitPolicy, split_uri};

type SplitCallback = Box<dyn FnMut(&SplitEvent) + Send>;

/// The container a writer currently holds.
struct OpenContainer {
    backend: Box<dyn StorageBackend>,
    descriptor: StorageDescriptor,
    stats: ContainerStats,
}

/// Appends records to one container at a time.
///
/// `Closed → Open → Closed`, re-enterable. Every data operation on a closed
/// writer fails with `EngineError::NotOpen`.
///
/// Two ways to move to another container:
/// - `open_uri` while open: rollover to an unrelated container. The topic
///   registry starts empty; topics must be created again.
/// - split (automatic via `SplitPolicy`, or `split()`): the next container of
///   the same recording. Every registered topic is re-created there.
pub struct SequentialWriter<C: MessageCodec> {
    backends: Arc<BackendRegistry>,
    codec: C,
    registry: TopicRegistry,
    container: Option<OpenContainer>,
    /// Backend of the most recent `open`, reused by `open_uri` on a closed writer.
    last_backend: Option<String>,
    split_policy: SplitPolicy,
    /// URI passed to `open`; split containers are named after it.
    base_uri: String,
    split_index: u32,
    on_split: Option<SplitCallback>,
    /// Set when the backend reported an I/O failure. Writes are refused until
    /// the container is closed.
    failure: Option<String>,
}

impl<C: MessageCodec> std::fmt::Debug for SequentialWriter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequentialWriter")
            .field("uri", &self.uri())
            .field("topics", &self.registry.len())
            .field("split_policy", &self.split_policy)
            .finish()
    }
}

impl<C: MessageCodec> SequentialWriter<C> {
    pub fn new(backends: Arc<BackendRegistry>, codec: C) -> Self {
        Self {
            backends,
            codec,
            registry: TopicRegistry::new(),
            container: None,
            last_backend: None,
            split_policy: SplitPolicy::never(),
            base_uri: String::new(),
            split_index: 0,
            on_split: None,
            failure: None,
        }
    }

    pub fn with_split_policy(mut self, policy: SplitPolicy) -> Self {
        self.split_policy = policy;
        self
    }

    pub fn set_split_policy(&mut self, policy: SplitPolicy) {
        self.split_policy = policy;
    }

    /// Called after every split, automatic or manual.
    pub fn on_split(&mut self, callback: impl FnMut(&SplitEvent) + Send + 'static) {
        self.on_split = Some(Box::new(callback));
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn is_open(&self) -> bool {
        self.container.is_some()
    }

    pub fn uri(&self) -> Option<&str> {
        self.container.as_ref().map(|c| c.descriptor.uri.as_str())
    }

    /// Topics of the current container, in creation order.
    pub fn topics(&self) -> Vec<TopicMetadata> {
        self.registry.topics()
    }

    pub fn stats(&self) -> Option<&ContainerStats> {
        self.container.as_ref().map(|c| &c.stats)
    }

    // ── Open / close ──

    /// Create a new container. Fails with `AlreadyOpen` if one is held.
    pub fn open(&mut self, descriptor: StorageDescriptor) -> Result<(), EngineError> {
        self.ensure_closed()?;
        self.registry.clear();
        self.attach(descriptor.clone(), OpenMode::Write)?;
        self.base_uri = descriptor.uri;
        self.split_index = 0;
        Ok(())
    }

    /// Continue an existing container. Its topics are loaded into the registry,
    /// so writes must stay consistent with what is already stored.
    pub fn open_append(&mut self, descriptor: StorageDescriptor) -> Result<(), EngineError> {
        self.ensure_closed()?;
        self.registry.clear();
        self.attach(descriptor.clone(), OpenMode::Append)?;

        let existing = self
            .container
            .as_ref()
            .map(|c| c.backend.topics())
            .unwrap_or_default();
        for metadata in existing {
            self.registry.register(metadata)?;
        }

        self.base_uri = descriptor.uri;
        self.split_index = 0;
        Ok(())
    }

    /// Open `uri` with the current (or most recent) backend.
    ///
    /// While open this is a rollover: the current container is finalized and
    /// the new one starts with an empty topic registry.
    pub fn open_uri(&mut self, uri: &str) -> Result<(), EngineError> {
        let backend_id = match &self.container {
            Some(current) => current.descriptor.backend_id.clone(),
            None => self.last_backend.clone().ok_or_else(|| {
                EngineError::StorageOpen(format!(
                    "{uri}: no backend selected, open with a full descriptor first"
                ))
            })?,
        };

        if let Some(previous) = self.uri().map(str::to_string) {
            self.close()?;
            tracing::info!(from = %previous, to = %uri, "rolling over to new container");
        }

        self.open(StorageDescriptor::new(backend_id, uri))
    }

    /// Finalize the current container. Valid from any state; closing twice is
    /// a no-op.
    ///
    /// The writer is closed afterwards even when the backend reports an error;
    /// that error is returned to the caller.
    pub fn close(&mut self) -> Result<(), EngineError> {
        let Some(mut container) = self.container.take() else {
            return Ok(());
        };
        self.registry.clear();
        self.failure = None;

        let uri = container.descriptor.uri.clone();
        let result = container.backend.close();
        drop(container);

        match result {
            Ok(()) => {
                tracing::info!(uri = %uri, "closed container");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(uri = %uri, error = %e, "container closed with error");
                Err(EngineError::from(e).with_context(&uri))
            }
        }
    }

    // ── Topics ──

    /// Define a topic in the current container.
    ///
    /// Identical re-definition is a no-op; a different type or format for an
    /// existing name fails with `MetadataConflict`.
    pub fn create_topic(&mut self, metadata: TopicMetadata) -> Result<(), EngineError> {
        self.ensure_writable()?;
        self.define_topic(metadata)
    }

    // ── Writes ──

    /// Low-level path for already-encoded payloads.
    ///
    /// The record's topic must have been created in this container.
    pub fn write(&mut self, record: TopicRecord) -> Result<(), EngineError> {
        self.ensure_writable()?;
        if !self.registry.contains(&record.topic_name) {
            return Err(EngineError::TopicNotFound(record.topic_name));
        }
        self.append(&record)
    }

    /// Write `record` under an explicit topic and type.
    ///
    /// The record must already carry `topic_name` (`TopicMismatch` otherwise).
    /// A new topic is created with the codec's format. An existing topic is
    /// matched on its type only, so a topic created earlier with another
    /// format accepts the write; a different type fails with
    /// `MetadataConflict` and nothing is written.
    pub fn write_as(
        &mut self,
        record: TopicRecord,
        topic_name: &str,
        type_name: &str,
    ) -> Result<(), EngineError> {
        self.ensure_writable()?;
        if record.topic_name != topic_name {
            return Err(EngineError::TopicMismatch {
                record: record.topic_name,
                requested: topic_name.to_string(),
            });
        }

        let metadata = TopicMetadata::new(topic_name, type_name, self.codec.format());
        match self.registry.resolve(topic_name) {
            Some(existing) if existing.message_type != type_name => {
                return Err(conflict_error(existing, metadata));
            }
            Some(_) => {}
            None => self.define_topic(metadata)?,
        }
        self.append(&record)
    }

    /// Write already-encoded bytes under an explicit topic and type.
    pub fn write_serialized(
        &mut self,
        data: impl Into<Bytes>,
        topic_name: &str,
        type_name: &str,
        recv_timestamp: i64,
    ) -> Result<(), EngineError> {
        let record = TopicRecord::new(topic_name, data, recv_timestamp);
        self.write_as(record, topic_name, type_name)
    }

    /// Encode `message` with the writer's codec and write it to `topic_name`.
    ///
    /// The topic is created from the encoded type name and format if new.
    pub fn write_message<M: Message>(
        &mut self,
        message: &M,
        topic_name: &str,
        recv_timestamp: i64,
    ) -> Result<(), EngineError> {
        self.ensure_writable()?;

        let encoded = self
            .codec
            .encode(message)
            .map_err(|e| EngineError::Encode(e.with_context(topic_name)))?;

        let metadata = TopicMetadata::new(topic_name, encoded.type_name, encoded.format);
        self.define_topic(metadata)?;
        self.append(&TopicRecord::new(topic_name, encoded.data, recv_timestamp))
    }

    /// Move to the next container of this recording now, regardless of the
    /// split policy.
    pub fn split(&mut self) -> Result<(), EngineError> {
        self.ensure_writable()?;
        self.split_container()
    }

    // ── Internals ──

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.container.is_none() {
            return Err(EngineError::NotOpen);
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<(), EngineError> {
        self.ensure_open()?;
        match &self.failure {
            Some(reason) => Err(EngineError::Io(format!(
                "write session failed, close the writer first: {reason}"
            ))),
            None => Ok(()),
        }
    }

    /// Marks the session failed on `Io`; writes are refused until `close`.
    fn track_failure(&mut self, err: EngineError) -> EngineError {
        if let EngineError::Io(reason) = &err {
            tracing::error!(uri = ?self.uri(), error = %reason, "write session failed");
            self.failure = Some(reason.clone());
        }
        err
    }

    fn ensure_closed(&self) -> Result<(), EngineError> {
        match self.uri() {
            Some(uri) => Err(EngineError::AlreadyOpen(uri.to_string())),
            None => Ok(()),
        }
    }

    fn attach(&mut self, descriptor: StorageDescriptor, mode: OpenMode) -> Result<(), EngineError> {
        let backend = self.backends.open(&descriptor, mode)?;
        tracing::info!(
            uri = %descriptor.uri,
            backend = %descriptor.backend_id,
            mode = %mode,
            "opened container for writing"
        );
        self.last_backend = Some(descriptor.backend_id.clone());
        self.container = Some(OpenContainer {
            backend,
            descriptor,
            stats: ContainerStats::default(),
        });
        Ok(())
    }

    /// Registry first for validation, backend second, registry insert last:
    /// the registry never holds a topic the backend refused.
    fn define_topic(&mut self, metadata: TopicMetadata) -> Result<(), EngineError> {
        if self.registry.check(&metadata)? == Registration::AlreadyPresent {
            return Ok(());
        }
        let container = self.container.as_mut().ok_or(EngineError::NotOpen)?;
        if let Err(e) = container.backend.write_metadata(&metadata) {
            return Err(self.track_failure(e.into()));
        }
        let container = self.container.as_ref().ok_or(EngineError::NotOpen)?;
        tracing::info!(
            uri = %container.descriptor.uri,
            topic = %metadata.name,
            message_type = %metadata.message_type,
            format = %metadata.serialization_format,
            "created topic"
        );
        self.registry.register(metadata)?;
        Ok(())
    }

    /// Splits first when the current container has reached a threshold, so a
    /// split container is only created for a record that goes into it.
    fn append(&mut self, record: &TopicRecord) -> Result<(), EngineError> {
        let container = self.container.as_ref().ok_or(EngineError::NotOpen)?;
        if container.stats.records > 0
            && self
                .split_policy
                .should_split(&container.stats, container.backend.size_bytes())
        {
            self.split_container()?;
        }

        let container = self.container.as_mut().ok_or(EngineError::NotOpen)?;
        if let Err(e) = container.backend.write_record(record) {
            return Err(self.track_failure(e.into()));
        }
        container.stats.observe(record);
        tracing::debug!(
            topic = %record.topic_name,
            bytes = record.data.len(),
            recv_timestamp = record.recv_timestamp,
            "wrote record"
        );
        Ok(())
    }

    fn split_container(&mut self) -> Result<(), EngineError> {
        let (backend_id, closed_uri, records) = match &self.container {
            Some(c) => (
                c.descriptor.backend_id.clone(),
                c.descriptor.uri.clone(),
                c.stats.records,
            ),
            None => return Err(EngineError::NotOpen),
        };
        let topics = self.registry.topics();

        // close() clears the registry; the split container gets the same topics back.
        self.close()?;
        self.split_index += 1;
        let opened_uri = split_uri(&self.base_uri, self.split_index);
        self.attach(StorageDescriptor::new(backend_id, opened_uri.clone()), OpenMode::Write)?;
        for metadata in topics {
            self.define_topic(metadata)?;
        }

        tracing::info!(
            closed = %closed_uri,
            opened = %opened_uri,
            records,
            "split container"
        );
        let event = SplitEvent {
            closed_uri,
            opened_uri,
            records,
        };
        if let Some(callback) = self.on_split.as_mut() {
            callback(&event);
        }
        Ok(())
    }
}

impl<C: MessageCodec> Drop for SequentialWriter<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close writer on drop");
        }
    }
}
