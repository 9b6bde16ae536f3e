use spool_api::codec::{EncodedMessage, Message, MessageCodec};
use spool_api::error::PluginError;

pub const FORMAT: &str = "json";

/// Messages as compact JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn format(&self) -> &str {
        FORMAT
    }

    fn encode<M: Message>(&self, message: &M) -> Result<EncodedMessage, PluginError> {
        let data = serde_json::to_vec(message)
            .map_err(|e| PluginError::format(format!("json encode {}: {e}", M::TYPE_NAME)))?;
        Ok(EncodedMessage {
            data: data.into(),
            type_name: M::TYPE_NAME.to_string(),
            format: FORMAT.to_string(),
        })
    }

    fn decode<M: Message>(&self, data: &[u8], type_name: &str) -> Result<M, PluginError> {
        if type_name != M::TYPE_NAME {
            return Err(PluginError::format(format!(
                "stored type '{type_name}' cannot be decoded as '{}'",
                M::TYPE_NAME
            )));
        }
        serde_json::from_slice(data)
            .map_err(|e| PluginError::format(format!("json decode {type_name}: {e}")))
    }
}
