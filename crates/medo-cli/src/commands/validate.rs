use crate::context::{runtime, SourceContext};
use clap::Args;
use colored::Colorize;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Args)]
pub struct ValidateCommand {}

impl ValidateCommand {
    pub fn execute(self, config: &Path) -> anyhow::Result<()> {
        let rt = runtime()?;
        let checks = rt.block_on(async {
            let ctx = SourceContext::load(config).await?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted, cancelling connection checks");
                    on_interrupt.cancel();
                }
            });

            anyhow::Ok(ctx.router.validate_all(&cancel).await)
        })?;

        let mut failed = Vec::new();
        for (name, ok) in &checks {
            if *ok {
                println!("{} {}", "✓".green(), name);
            } else {
                println!("{} {}", "✗".red(), name);
                failed.push(name.as_str());
            }
        }

        if !failed.is_empty() {
            anyhow::bail!("Unreachable sources: {}", failed.join(", "));
        }
        Ok(())
    }
}
