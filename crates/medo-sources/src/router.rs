use crate::active::ActiveSourceManager;
use crate::error::{Result, SourceError};
use crate::registry::SourceRegistry;
use crate::session::{transact_with, SessionState};
use crate::state::{result_key, ActiveSourceState};
use crate::types::{QueryRequest, QueryResult};
use futures::future::join_all;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Dispatches requests to named providers and persists their results
///
/// Choosing *which* source answers a question is the caller's job; the router
/// only validates the name, delegates, and records the outcome under
/// `<name>_result` in the session.
#[derive(Clone)]
pub struct SourceRouter {
    registry: SourceRegistry,
    active: ActiveSourceManager,
}

impl SourceRouter {
    pub fn new(registry: SourceRegistry) -> Self {
        let active = ActiveSourceManager::new(registry.clone());
        Self { registry, active }
    }

    pub fn active_sources(&self) -> &ActiveSourceManager {
        &self.active
    }

    /// Execute `request` on `source_name` and store the result in the session
    ///
    /// On failure nothing is written and the error carries the provider name.
    pub async fn route(
        &self,
        session: &dyn SessionState,
        request: &QueryRequest,
        source_name: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let provider = self.registry.get_source(source_name).await?;
        self.active.ensure_active_sources_initialized(session).await?;

        debug!(
            "Routing request for session {} to {}",
            session.id(),
            source_name
        );

        let start = Instant::now();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(SourceError::Cancelled {
                provider: source_name.to_string(),
            }),
            result = provider.execute(request, cancel) => {
                result.map_err(|e| match e {
                    SourceError::Cancelled { .. } => SourceError::Cancelled {
                        provider: source_name.to_string(),
                    },
                    other => SourceError::execution_failed(source_name, other),
                })
            }
        };

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!("Request to {} failed: {}", source_name, e);
                return Err(e);
            }
        };

        transact_with(session, |state| {
            ActiveSourceState::new(state).store_result(source_name, &result)
        })
        .await?;

        debug!(
            "Stored {} rows from {} under {} in {}ms",
            result.stats.row_count,
            source_name,
            result_key(source_name),
            start.elapsed().as_millis()
        );

        Ok(result)
    }

    /// Route to the session's current source
    pub async fn route_active(
        &self,
        session: &dyn SessionState,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let name = self
            .active
            .get_active_source(session)
            .await?
            .ok_or(SourceError::NoActiveSource)?;

        self.route(session, request, &name, cancel).await
    }

    /// Result persisted by the last successful route to `source_name`
    pub async fn last_result(
        &self,
        session: &dyn SessionState,
        source_name: &str,
    ) -> Result<Option<QueryResult>> {
        match session.get(&result_key(source_name)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Run the connectivity check of every registered provider
    ///
    /// A check still running when `cancel` fires is abandoned and reported as
    /// unreachable.
    pub async fn validate_all(&self, cancel: &CancellationToken) -> Vec<(String, bool)> {
        let providers = self.registry.get_all_sources().await;
        let checks = providers.iter().map(|provider| async move {
            let ok = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Connection check for {} cancelled", provider.name());
                    false
                }
                ok = provider.validate_connection(cancel) => ok,
            };
            if !ok {
                warn!("Connection check failed for {}", provider.name());
            }
            (provider.name().to_string(), ok)
        });

        join_all(checks).await
    }
}
