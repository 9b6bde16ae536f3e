use clap::Args;

use spool_engine::{ContainerSummary, EngineError};

use super::{format_nanos, open_reader};
use crate::Context;

#[derive(Args)]
pub struct InfoArgs {
    /// Container location.
    pub uri: String,
}

pub fn run(ctx: &Context, args: &InfoArgs) -> Result<(), EngineError> {
    let mut reader = open_reader(ctx, &args.uri)?;
    let summary = ContainerSummary::collect(&mut reader)?;
    reader.close()?;

    println!("container: {} ({})", summary.uri, ctx.backend);
    println!("messages:  {}", summary.message_count);
    if let (Some(start), Some(end)) = (summary.start_time, summary.end_time) {
        println!("start:     {start}");
        println!("end:       {end}");
        println!("duration:  {}", format_nanos(summary.duration()));
    }
    println!("topics:    {}", summary.topics.len());
    for topic in &summary.topics {
        println!(
            "  {:<32} {:>8} msgs  {} [{}]",
            topic.metadata.name,
            topic.message_count,
            topic.metadata.message_type,
            topic.metadata.serialization_format
        );
    }
    Ok(())
}
