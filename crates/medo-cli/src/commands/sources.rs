//! Lists registered sources with their capabilities

use super::OutputFormat;
use crate::context::{runtime, SourceContext};
use clap::Args;
use colored::Colorize;
use medo_sources::{CapabilityRecord, Provider};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

#[derive(Args)]
pub struct SourcesCommand {
    /// Output format: text (human-readable) or json (machine-readable)
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,
}

#[derive(Serialize)]
struct SourceSummary<'a> {
    name: &'a str,
    active_by_default: bool,
    capabilities: &'a [CapabilityRecord],
    schema: &'a str,
}

impl SourcesCommand {
    pub fn execute(self, config: &Path) -> anyhow::Result<()> {
        let rt = runtime()?;
        let (providers, defaults) = rt.block_on(async {
            let ctx = SourceContext::load(config).await?;
            let providers = ctx.registry.get_all_sources().await;
            anyhow::Ok((providers, ctx.config.default_active_sources()))
        })?;

        match self.output_format {
            OutputFormat::Json => print_json(&providers, &defaults),
            OutputFormat::Text => {
                print_text(&providers, &defaults);
                Ok(())
            }
        }
    }
}

fn print_json(providers: &[Arc<dyn Provider>], defaults: &[String]) -> anyhow::Result<()> {
    let summaries: Vec<SourceSummary<'_>> = providers
        .iter()
        .map(|p| SourceSummary {
            name: p.name(),
            active_by_default: defaults.iter().any(|d| d == p.name()),
            capabilities: p.capabilities(),
            schema: p.schema(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}

fn print_text(providers: &[Arc<dyn Provider>], defaults: &[String]) {
    if providers.is_empty() {
        println!("{}", "No sources configured".yellow());
        return;
    }

    for provider in providers {
        let marker = if defaults.iter().any(|d| d == provider.name()) {
            " (active by default)".green().to_string()
        } else {
            String::new()
        };
        println!("{}{}", provider.name().bold(), marker);

        for capability in provider.capabilities() {
            println!(
                "  {} {} {}",
                capability.label.cyan(),
                format!("[{}]", capability.tool_name).dimmed(),
                capability.description
            );
        }
    }
}
