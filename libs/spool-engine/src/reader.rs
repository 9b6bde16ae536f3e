use std::sync::Arc;

use spool_api::codec::{Message, MessageCodec};
use spool_api::error::PluginError;
use spool_api::metadata::TopicMetadata;
use spool_api::record::TopicRecord;
use spool_api::storage::{OpenMode, StorageBackend, StorageDescriptor};

use crate::backends::BackendRegistry;
use crate::error::EngineError;

/// Replays one container in recording order.
pub struct SequentialReader<C: MessageCodec> {
    backends: Arc<BackendRegistry>,
    codec: C,
    backend: Option<Box<dyn StorageBackend>>,
}

impl<C: MessageCodec> std::fmt::Debug for SequentialReader<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequentialReader")
            .field("uri", &self.uri())
            .finish()
    }
}

impl<C: MessageCodec> SequentialReader<C> {
    pub fn new(backends: Arc<BackendRegistry>, codec: C) -> Self {
        Self {
            backends,
            codec,
            backend: None,
        }
    }

    pub fn open(&mut self, descriptor: StorageDescriptor) -> Result<(), EngineError> {
        if let Some(uri) = self.uri() {
            return Err(EngineError::AlreadyOpen(uri.to_string()));
        }
        let backend = self.backends.open(&descriptor, OpenMode::Read)?;
        tracing::info!(
            uri = %descriptor.uri,
            backend = %descriptor.backend_id,
            topics = backend.topics().len(),
            "opened container for reading"
        );
        self.backend = Some(backend);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    pub fn uri(&self) -> Option<&str> {
        self.backend.as_ref().map(|b| b.uri())
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn topics(&self) -> Result<Vec<TopicMetadata>, EngineError> {
        Ok(self.backend()?.topics())
    }

    pub fn has_next(&mut self) -> Result<bool, EngineError> {
        Ok(self.backend_mut()?.has_next()?)
    }

    /// Next record; `EndOfStorage` once the container is exhausted.
    pub fn read_next(&mut self) -> Result<TopicRecord, EngineError> {
        let backend = self.backend_mut()?;
        backend
            .read_next()
            .map_err(|e| EngineError::from(e).with_context(backend.uri()))
    }

    /// Read the next record and decode it as `M`.
    ///
    /// The stored topic metadata must name `M::TYPE_NAME` and this reader's
    /// codec format, otherwise `Decode`. The record is consumed either way.
    pub fn read_message<M: Message>(&mut self) -> Result<(TopicRecord, M), EngineError> {
        let record = self.read_next()?;
        let metadata = self
            .backend()?
            .topics()
            .into_iter()
            .find(|t| t.name == record.topic_name)
            .ok_or_else(|| EngineError::TopicNotFound(record.topic_name.clone()))?;

        if metadata.serialization_format != self.codec.format() {
            return Err(EngineError::Decode(PluginError::format(format!(
                "topic '{}' is stored as '{}', reader decodes '{}'",
                metadata.name,
                metadata.serialization_format,
                self.codec.format()
            ))));
        }

        let message = self
            .codec
            .decode::<M>(&record.data, &metadata.message_type)
            .map_err(|e| EngineError::Decode(e.with_context(&metadata.name)))?;
        Ok((record, message))
    }

    /// Iterate remaining records. Stops after the first error.
    pub fn records(&mut self) -> Records<'_, C> {
        Records {
            reader: self,
            done: false,
        }
    }

    /// Idempotent. The reader is closed afterwards even if the backend fails.
    pub fn close(&mut self) -> Result<(), EngineError> {
        let Some(mut backend) = self.backend.take() else {
            return Ok(());
        };
        let uri = backend.uri().to_string();
        backend
            .close()
            .map_err(|e| EngineError::from(e).with_context(&uri))?;
        tracing::debug!(uri = %uri, "closed reader");
        Ok(())
    }

    fn backend(&self) -> Result<&dyn StorageBackend, EngineError> {
        self.backend.as_deref().ok_or(EngineError::NotOpen)
    }

    fn backend_mut(&mut self) -> Result<&mut Box<dyn StorageBackend>, EngineError> {
        self.backend.as_mut().ok_or(EngineError::NotOpen)
    }
}

impl<C: MessageCodec> Drop for SequentialReader<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close reader on drop");
        }
    }
}

/// Iterator returned by `SequentialReader::records`.
pub struct Records<'a, C: MessageCodec> {
    reader: &'a mut SequentialReader<C>,
    done: bool,
}

impl<C: MessageCodec> Iterator for Records<'_, C> {
    type Item = Result<TopicRecord, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.reader.has_next() {
            Ok(true) => self.reader.read_next(),
            Ok(false) => {
                self.done = true;
                return None;
            }
            Err(e) => Err(e),
        };
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}

impl<C: MessageCodec> std::iter::FusedIterator for Records<'_, C> {}
