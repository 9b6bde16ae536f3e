use clap::Args;

use spool_api::storage::StorageDescriptor;
use spool_engine::{EngineError, SequentialWriter};
use spool_format_json::JsonCodec;

use super::open_reader;
use crate::Context;

#[derive(Args)]
pub struct ConvertArgs {
    /// Input container location (read with `--backend`).
    pub input: String,

    /// Output container location.
    pub output: String,

    /// Backend for the output container. Defaults to the input backend.
    #[arg(long)]
    pub to_backend: Option<String>,
}

/// Copy every topic and record. The output is split according to the
/// `[storage]` thresholds.
pub fn run(ctx: &Context, args: &ConvertArgs) -> Result<(), EngineError> {
    let to_backend = args.to_backend.clone().unwrap_or_else(|| ctx.backend.clone());

    let mut reader = open_reader(ctx, &args.input)?;
    let mut writer = SequentialWriter::new(ctx.backends.clone(), JsonCodec)
        .with_split_policy(ctx.config.split_policy());
    writer.on_split(|event| {
        tracing::info!(
            closed = %event.closed_uri,
            opened = %event.opened_uri,
            records = event.records,
            "output split"
        );
    });
    writer.open(StorageDescriptor::new(to_backend.clone(), args.output.clone()))?;

    for topic in reader.topics()? {
        writer.create_topic(topic)?;
    }

    let mut copied = 0u64;
    for record in reader.records() {
        writer.write(record?)?;
        copied += 1;
    }

    reader.close()?;
    writer.close()?;
    tracing::info!(
        input = %args.input,
        output = %args.output,
        backend = %to_backend,
        records = copied,
        "conversion finished"
    );
    Ok(())
}
