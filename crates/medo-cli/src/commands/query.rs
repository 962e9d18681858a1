//! Routes one statement through a session, like a single tool call

use crate::context::{runtime, SourceContext};
use anyhow::Context;
use clap::Args;
use medo_sources::QueryRequest;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Args)]
pub struct QueryCommand {
    /// Source to route to; defaults to the session's active source
    #[arg(long)]
    pub source: Option<String>,

    /// Session id (a new one is generated when omitted)
    #[arg(long)]
    pub session: Option<String>,

    /// Maximum rows to return
    #[arg(long)]
    pub limit: Option<usize>,

    /// Statement handed to the source (e.g. SQL)
    pub statement: String,
}

impl QueryCommand {
    pub fn execute(self, config: &Path) -> anyhow::Result<()> {
        let rt = runtime()?;
        rt.block_on(self.run(config))
    }

    async fn run(self, config: &Path) -> anyhow::Result<()> {
        let ctx = SourceContext::load(config).await?;
        let session_id = self
            .session
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let session = ctx.session(&session_id).await?;

        let mut request = QueryRequest::new(&self.statement);
        if let Some(limit) = self.limit {
            request = request.with_limit(limit);
        }

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, cancelling query");
                on_interrupt.cancel();
            }
        });

        debug!("Running query in session {}", session_id);

        let result = match &self.source {
            Some(source) => {
                ctx.router
                    .route(session.as_ref(), &request, source, &cancel)
                    .await
            }
            None => {
                ctx.router
                    .route_active(session.as_ref(), &request, &cancel)
                    .await
            }
        }
        .context("Query failed")?;

        println!("{}", serde_json::to_string_pretty(&result)?);
        Ok(())
    }
}
