use base64::Engine;
use clap::Args;
use serde::Serialize;

use spool_api::record::TopicRecord;
use spool_engine::EngineError;

use super::open_reader;
use crate::Context;

#[derive(Args)]
pub struct DumpArgs {
    /// Container location.
    pub uri: String,

    /// Only records of these topics. Repeatable.
    #[arg(long = "topic")]
    pub topics: Vec<String>,

    /// Stop after this many printed records.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Serialize)]
struct DumpLine<'a> {
    topic: &'a str,
    recv_timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    send_timestamp: Option<i64>,
    /// Inline JSON when the payload parses as JSON, base64 otherwise.
    data: serde_json::Value,
}

impl<'a> From<&'a TopicRecord> for DumpLine<'a> {
    fn from(record: &'a TopicRecord) -> Self {
        let data = serde_json::from_slice(&record.data).unwrap_or_else(|_| {
            serde_json::Value::String(
                base64::engine::general_purpose::STANDARD.encode(&record.data),
            )
        });
        Self {
            topic: &record.topic_name,
            recv_timestamp: record.recv_timestamp,
            send_timestamp: record.send_timestamp,
            data,
        }
    }
}

pub fn run(ctx: &Context, args: &DumpArgs) -> Result<(), EngineError> {
    let mut reader = open_reader(ctx, &args.uri)?;
    let mut printed = 0usize;

    for record in reader.records() {
        if args.limit.is_some_and(|limit| printed >= limit) {
            break;
        }
        let record = record?;
        if !args.topics.is_empty() && !args.topics.contains(&record.topic_name) {
            continue;
        }
        let line = serde_json::to_string(&DumpLine::from(&record))
            .map_err(|e| EngineError::Io(e.to_string()))?;
        println!("{line}");
        printed += 1;
    }

    tracing::debug!(uri = %args.uri, printed, "dump finished");
    reader.close()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_payload_is_inlined() {
        let record = TopicRecord::new("/t", br#"{"value":1}"#.to_vec(), 5);
        let line = serde_json::to_string(&DumpLine::from(&record)).unwrap();
        assert_eq!(line, r#"{"topic":"/t","recv_timestamp":5,"data":{"value":1}}"#);
    }

    #[test]
    fn binary_payload_is_base64() {
        let record = TopicRecord::new("/t", vec![0xff, 0x00], 5).with_send_timestamp(4);
        let line = serde_json::to_string(&DumpLine::from(&record)).unwrap();
        assert_eq!(
            line,
            r#"{"topic":"/t","recv_timestamp":5,"send_timestamp":4,"data":"/wA="}"#
        );
    }
}
