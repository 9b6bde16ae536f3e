mod cmd;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use spool_engine::bootstrap::{BuiltinBackend, build_backends};
use spool_engine::config::SpoolConfig;
use spool_engine::{BackendRegistry, EngineError};
use spool_storage_file::{FileStorageConfig, FileStorageFactory};
use spool_storage_memory::MemoryStorageFactory;

#[derive(Parser)]
#[command(name = "spool", about = "Inspect and convert recorded topic containers")]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(long, env = "SPOOL_CONFIG")]
    config: Option<String>,

    /// Backend for input containers. Defaults to `storage.backend`.
    #[arg(long, global = true)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print topics, message counts and time span of a container.
    Info(cmd::info::InfoArgs),
    /// Print every record as one JSON line.
    Dump(cmd::dump::DumpArgs),
    /// Copy a container to another location or backend.
    Convert(cmd::convert::ConvertArgs),
}

/// What every subcommand works with.
pub struct Context {
    pub config: SpoolConfig,
    pub backends: Arc<BackendRegistry>,
    /// Backend for the input container.
    pub backend: String,
}

fn builtins() -> [BuiltinBackend; 2] {
    [
        BuiltinBackend {
            id: spool_storage_file::BACKEND_ID,
            params: FileStorageConfig::params,
            create: |values| {
                let config = FileStorageConfig::from_values(values)?;
                Ok(Arc::new(FileStorageFactory::new(config)))
            },
        },
        BuiltinBackend {
            id: spool_storage_memory::BACKEND_ID,
            params: MemoryStorageFactory::config_params,
            create: |values| Ok(Arc::new(MemoryStorageFactory::from_config(values)?)),
        },
    ]
}

fn context(cli: &Cli) -> Result<Context, EngineError> {
    let config = match &cli.config {
        Some(path) => {
            tracing::info!(config = %path, "loading configuration");
            SpoolConfig::load(path)?
        }
        None => SpoolConfig::default(),
    };
    let backends = build_backends(&config, &builtins())?;
    let backend = cli
        .backend
        .clone()
        .unwrap_or_else(|| config.storage.backend.clone());
    if !backends.contains(&backend) {
        return Err(EngineError::Config(format!(
            "unknown backend '{backend}' (available: {})",
            backends.ids().join(", ")
        )));
    }

    Ok(Context {
        config,
        backends: Arc::new(backends),
        backend,
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let ctx = match context(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!(error = %e, "failed to set up backends");
            std::process::exit(1);
        }
    };

    let result = match &cli.command {
        Command::Info(args) => cmd::info::run(&ctx, args),
        Command::Dump(args) => cmd::dump::run(&ctx, args),
        Command::Convert(args) => cmd::convert::run(&ctx, args),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        std::process::exit(1);
    }
}
