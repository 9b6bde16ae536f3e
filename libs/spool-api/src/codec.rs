use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::PluginError;

/// A typed message that can travel through a codec.
///
/// `TYPE_NAME` is what ends up in `TopicMetadata::message_type`; decoding
/// checks the stored name against it.
pub trait Message: Serialize + DeserializeOwned {
    const TYPE_NAME: &'static str;
}

/// Output of `MessageCodec::encode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMessage {
    pub data: Bytes,
    pub type_name: String,
    pub format: String,
}

/// Encode adapter: `typed value ↔ bytes`.
///
/// The engine calls it but never implements it. One codec produces exactly
/// one serialization format, reported by `format()`.
pub trait MessageCodec: Send + Sync {
    /// Serialization format name stored in topic metadata.
    fn format(&self) -> &str;

    fn encode<M: Message>(&self, message: &M) -> Result<EncodedMessage, PluginError>;

    /// Reconstruct `M` from bytes written under `type_name`.
    ///
    /// A `type_name` that is not `M::TYPE_NAME` is an error, never a cast.
    fn decode<M: Message>(&self, data: &[u8], type_name: &str) -> Result<M, PluginError>;
}
