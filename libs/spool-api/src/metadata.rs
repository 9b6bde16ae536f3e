use serde::{Deserialize, Serialize};

/// Definition of a named data stream inside one container.
///
/// `name` is the unique key. Once registered in a container the definition is
/// immutable: the same name with a different `message_type` or
/// `serialization_format` is a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicMetadata {
    pub name: String,
    /// Type identifier understood by the codec (e.g. `"test_msgs/msg/BasicTypes"`).
    pub message_type: String,
    /// Codec format the payloads were written with (e.g. `"json"`).
    pub serialization_format: String,
}

impl TopicMetadata {
    pub fn new(
        name: impl Into<String>,
        message_type: impl Into<String>,
        serialization_format: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            message_type: message_type.into(),
            serialization_format: serialization_format.into(),
        }
    }

    /// Same name but different type or format.
    pub fn conflicts_with(&self, other: &TopicMetadata) -> bool {
        self.name == other.name
            && (self.message_type != other.message_type
                || self.serialization_format != other.serialization_format)
    }
}
