//! medo CLI
//!
//! Loads a sources configuration file, registers every provider, and exposes
//! the registry and session routing from the command line.

mod commands;
mod context;

use clap::{Parser, Subcommand};
use commands::{InstructionsCommand, QueryCommand, SourcesCommand, ValidateCommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Sources configuration file (.yaml, .yml or .json)
    #[arg(long, default_value = "medo.yaml", env = "MEDO_CONFIG", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MEDO_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "MEDO_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered sources and their capabilities
    Sources(SourcesCommand),
    /// Check connectivity of every source
    Validate(ValidateCommand),
    /// Route a statement to a source within a session
    Query(QueryCommand),
    /// Print the data-source instructions for the default active sources
    Instructions(InstructionsCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes full control when set
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "medo={level},\
             medo_sources={level},\
             medo_sources_postgres={level},\
             tokio_postgres=warn",
            level = cli.log_level
        ))
    });

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Sources(cmd) => cmd.execute(&cli.config),
        Commands::Validate(cmd) => cmd.execute(&cli.config),
        Commands::Query(cmd) => cmd.execute(&cli.config),
        Commands::Instructions(cmd) => cmd.execute(&cli.config),
    }
}
