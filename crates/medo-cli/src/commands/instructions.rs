use crate::context::{runtime, SourceContext};
use clap::Args;
use std::path::Path;

#[derive(Args)]
pub struct InstructionsCommand {
    /// Session id used to resolve the active sources
    #[arg(long, default_value = "instructions")]
    pub session: String,
}

impl InstructionsCommand {
    pub fn execute(self, config: &Path) -> anyhow::Result<()> {
        let rt = runtime()?;
        let text = rt.block_on(async {
            let ctx = SourceContext::load(config).await?;
            let session = ctx.session(&self.session).await?;
            let text = ctx.instructions().build(session.as_ref()).await?;
            anyhow::Ok(text)
        })?;

        println!("{}", text);
        Ok(())
    }
}
