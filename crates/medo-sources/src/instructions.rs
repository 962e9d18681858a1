//! Renders the data-source section of the reasoning layer's instructions
//!
//! For every active provider the builder lists its capabilities as numbered
//! workflow steps, a tool usage summary, any extra reminders, and finally the
//! provider's schema.

use crate::active::ActiveSourceManager;
use crate::error::Result;
use crate::session::SessionState;
use crate::traits::Provider;
use std::fmt::Write;
use std::sync::Arc;
use tracing::warn;

const DEFAULT_USAGE_SUMMARY: &str = "Once you return the answer, provide additional explanations.";

#[derive(Clone)]
pub struct InstructionBuilder {
    active: ActiveSourceManager,
    /// Number of the first capability step
    first_step: usize,
}

impl InstructionBuilder {
    pub fn new(active: ActiveSourceManager) -> Self {
        Self {
            active,
            first_step: 2,
        }
    }

    pub fn with_first_step(mut self, step: usize) -> Self {
        self.first_step = step;
        self
    }

    /// Instruction text for the providers active in `session`
    pub async fn build(&self, session: &dyn SessionState) -> Result<String> {
        let mut providers = Vec::new();
        for name in self.active.get_active_sources(session).await? {
            match self.active.registry().get_source(&name).await {
                Ok(provider) => providers.push(provider),
                Err(_) => warn!("Leaving unregistered source {} out of instructions", name),
            }
        }

        Ok(self.render(&providers))
    }

    /// Instruction text for an explicit list of providers
    pub fn render(&self, providers: &[Arc<dyn Provider>]) -> String {
        let mut steps = String::new();
        let mut usage = String::new();
        let mut reminders = String::new();
        let mut step = self.first_step;

        for provider in providers {
            for capability in provider.capabilities() {
                let _ = writeln!(
                    steps,
                    "{}. **{} (`{}`):** {}",
                    step, capability.label, capability.tool_name, capability.description
                );
                step += 1;

                let _ = writeln!(
                    usage,
                    "* **{}:** `{}`. {}",
                    capability.label,
                    capability.tool_name,
                    capability
                        .usage_summary
                        .as_deref()
                        .unwrap_or(DEFAULT_USAGE_SUMMARY)
                );

                if let Some(reminder) = &capability.key_reminder {
                    let _ = writeln!(reminders, "* **{}**", reminder);
                }
            }
        }

        let mut out = String::new();
        if !steps.is_empty() {
            let _ = write!(out, "Data source tools:\n\n{}\n", steps);
            let _ = write!(out, "Tool usage summary:\n\n{}", usage);
        }
        if !reminders.is_empty() {
            let _ = write!(out, "\nKey reminders:\n\n{}", reminders);
        }

        for provider in providers {
            if provider.schema().trim().is_empty() {
                continue;
            }
            let _ = write!(
                out,
                "\n--------- {} Schema ---------\n{}\n",
                provider.name(),
                provider.schema().trim_end()
            );
        }

        out
    }

    /// Step number that follows the last capability step for `providers`
    pub fn next_step(&self, providers: &[Arc<dyn Provider>]) -> usize {
        self.first_step
            + providers
                .iter()
                .map(|p| p.capabilities().len())
                .sum::<usize>()
    }
}
