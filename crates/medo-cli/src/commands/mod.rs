pub mod instructions;
pub mod query;
pub mod sources;
pub mod validate;

pub use instructions::InstructionsCommand;
pub use query::QueryCommand;
pub use sources::SourcesCommand;
pub use validate::ValidateCommand;

/// Output format for listing commands
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors and formatting
    #[default]
    Text,
    /// JSON output for automation and scripting
    Json,
}
