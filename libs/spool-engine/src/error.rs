use spool_api::error::{ErrorKind, PluginError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("already open: {0}")]
    AlreadyOpen(String),

    #[error("not open")]
    NotOpen,

    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("cannot open storage: {0}")]
    StorageOpen(String),

    #[error(
        "topic '{topic}' is registered as {registered_type} ({registered_format}), \
         got {requested_type} ({requested_format})"
    )]
    MetadataConflict {
        topic: String,
        registered_type: String,
        registered_format: String,
        requested_type: String,
        requested_format: String,
    },

    /// Conflict reported by the backend against metadata already stored in
    /// the container.
    #[error("metadata conflict: {0}")]
    StoredMetadataConflict(String),

    #[error("record topic '{record}' does not match requested topic '{requested}'")]
    TopicMismatch { record: String, requested: String },

    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("end of storage")]
    EndOfStorage,

    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    #[error("encode error: {0}")]
    Encode(PluginError),

    #[error("decode error: {0}")]
    Decode(PluginError),

    #[error("io error: {0}")]
    Io(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(PluginError),
}

impl From<PluginError> for EngineError {
    fn from(e: PluginError) -> Self {
        match e.kind() {
            ErrorKind::Open => EngineError::StorageOpen(e.message),
            ErrorKind::NotFound => EngineError::ContainerNotFound(e.message),
            ErrorKind::TopicNotFound => EngineError::TopicNotFound(e.message),
            ErrorKind::EndOfStorage => EngineError::EndOfStorage,
            ErrorKind::Corrupt => EngineError::CorruptRecord(e.message),
            ErrorKind::Io => EngineError::Io(e.message),
            ErrorKind::Config => EngineError::Config(e.message),
            ErrorKind::Conflict => EngineError::StoredMetadataConflict(e.message),
            ErrorKind::Format | ErrorKind::Logic => EngineError::Storage(e),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

impl EngineError {
    /// Add context to the error.
    ///
    /// For plugin-carrying variants, context is added to the inner `PluginError`.
    /// For message variants, context is prepended to the message.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Storage(e) => EngineError::Storage(e.with_context(ctx)),
            EngineError::Encode(e) => EngineError::Encode(e.with_context(ctx)),
            EngineError::Decode(e) => EngineError::Decode(e.with_context(ctx)),
            EngineError::StorageOpen(msg) => EngineError::StorageOpen(format!("{ctx}: {msg}")),
            EngineError::ContainerNotFound(msg) => {
                EngineError::ContainerNotFound(format!("{ctx}: {msg}"))
            }
            EngineError::CorruptRecord(msg) => EngineError::CorruptRecord(format!("{ctx}: {msg}")),
            EngineError::StoredMetadataConflict(msg) => {
                EngineError::StoredMetadataConflict(format!("{ctx}: {msg}"))
            }
            EngineError::Io(msg) => EngineError::Io(format!("{ctx}: {msg}")),
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}
