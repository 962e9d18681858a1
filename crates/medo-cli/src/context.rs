use anyhow::Context;
use medo_sources::{
    InMemorySession, InstructionBuilder, SessionState, SessionStore, SourceRegistry, SourceRouter,
    SourcesConfig,
};
use medo_sources_postgres::PostgresProviderFactory;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Registry, router and sessions built from a configuration file
pub struct SourceContext {
    pub config: SourcesConfig,
    pub registry: SourceRegistry,
    pub router: SourceRouter,
    pub sessions: SessionStore,
}

impl SourceContext {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let config = SourcesConfig::from_path(path)
            .with_context(|| format!("Failed to load sources from {}", path.display()))?;
        Self::from_config(config).await
    }

    pub async fn from_config(config: SourcesConfig) -> anyhow::Result<Self> {
        let registry = SourceRegistry::new();
        registry
            .register_factory(Arc::new(PostgresProviderFactory::new()))
            .await;

        config
            .register_all(&registry)
            .await
            .context("Failed to register sources")?;

        debug!("Registered {} sources", registry.len().await);

        Ok(Self {
            router: SourceRouter::new(registry.clone()),
            registry,
            config,
            sessions: SessionStore::new(),
        })
    }

    /// Session seeded with the sources flagged `active` in the configuration
    ///
    /// Defaults are applied only when the session is created; later calls
    /// return the session as the caller left it.
    pub async fn session(&self, id: &str) -> anyhow::Result<Arc<InMemorySession>> {
        let (session, created) = self.sessions.open(id).await;
        if created {
            self.router
                .active_sources()
                .seed_defaults(session.as_ref(), &self.config.default_active_sources())
                .await
                .with_context(|| format!("Failed to initialize session {}", session.id()))?;
        }
        Ok(session)
    }

    pub fn instructions(&self) -> InstructionBuilder {
        InstructionBuilder::new(self.router.active_sources().clone())
    }
}

/// Current-thread runtime for a single command
pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}
