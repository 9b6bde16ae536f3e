use bytes::Bytes;

/// One recorded message. The engine only knows the topic and timestamps;
/// `data` is opaque bytes. Neither the engine nor the backend interpret them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRecord {
    /// Must name a topic registered in the same container at write time.
    pub topic_name: String,
    pub data: Bytes,
    /// Receive time in nanoseconds since Unix epoch. Supplied by the caller.
    pub recv_timestamp: i64,
    /// Publish time in nanoseconds, when the producer knows it.
    pub send_timestamp: Option<i64>,
}

impl TopicRecord {
    pub fn new(topic_name: impl Into<String>, data: impl Into<Bytes>, recv_timestamp: i64) -> Self {
        Self {
            topic_name: topic_name.into(),
            data: data.into(),
            recv_timestamp,
            send_timestamp: None,
        }
    }

    pub fn with_send_timestamp(mut self, send_timestamp: i64) -> Self {
        self.send_timestamp = Some(send_timestamp);
        self
    }
}
