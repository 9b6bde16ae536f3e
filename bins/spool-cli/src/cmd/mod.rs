pub mod convert;
pub mod dump;
pub mod info;

use spool_api::storage::StorageDescriptor;
use spool_engine::{EngineError, SequentialReader};
use spool_format_json::JsonCodec;

use crate::Context;

/// Open `uri` on the input backend.
pub(crate) fn open_reader(ctx: &Context, uri: &str) -> Result<SequentialReader<JsonCodec>, EngineError> {
    let mut reader = SequentialReader::new(ctx.backends.clone(), JsonCodec);
    reader.open(StorageDescriptor::new(ctx.backend.clone(), uri))?;
    Ok(reader)
}

/// Nanoseconds as seconds with millisecond precision.
pub(crate) fn format_nanos(nanos: i64) -> String {
    format!("{:.3}s", nanos as f64 / 1e9)
}
