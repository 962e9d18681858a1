use crate::config::SourceConfig;
use crate::error::{Result, SourceError};
use crate::traits::{Provider, ProviderFactory};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Catalog of registered providers, keyed by unique name
///
/// Cloning yields another handle to the same catalog. Registering a name that
/// already exists replaces the previous provider (last write wins).
#[derive(Clone)]
pub struct SourceRegistry {
    factories: Arc<RwLock<HashMap<String, Arc<dyn ProviderFactory>>>>,
    sources: Arc<RwLock<HashMap<String, Arc<dyn Provider>>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
            sources: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a provider under its descriptor name, replacing any previous entry
    pub async fn register(&self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        let mut sources = self.sources.write().await;

        if sources.insert(name.clone(), provider).is_some() {
            warn!("Replaced existing provider registration: {}", name);
        } else {
            debug!("Registered provider: {}", name);
        }
    }

    /// Remove a provider; sessions still naming it fail routing afterwards
    pub async fn unregister(&self, name: &str) -> Option<Arc<dyn Provider>> {
        let removed = self.sources.write().await.remove(name);

        if removed.is_some() {
            debug!("Unregistered provider: {}", name);
        }

        removed
    }

    pub async fn get_source(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.sources
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::unknown_provider(name))
    }

    /// Snapshot of all providers, ordered by name
    pub async fn get_all_sources(&self) -> Vec<Arc<dyn Provider>> {
        let sources = self.sources.read().await;
        let mut all: Vec<Arc<dyn Provider>> = sources.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub async fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.sources.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.sources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sources.read().await.is_empty()
    }

    /// Register a factory for a backend type
    pub async fn register_factory(&self, factory: Arc<dyn ProviderFactory>) {
        let backend = factory.backend_type();
        let mut factories = self.factories.write().await;

        if factories.contains_key(backend) {
            warn!("Overwriting existing factory for backend: {}", backend);
        }

        factories.insert(backend.to_string(), factory);
        debug!("Registered factory for backend: {}", backend);
    }

    /// Build a provider from configuration through its backend factory and register it
    pub async fn create_and_register(&self, config: &SourceConfig) -> Result<Arc<dyn Provider>> {
        let factory = self
            .factories
            .read()
            .await
            .get(&config.backend)
            .cloned()
            .ok_or_else(|| {
                SourceError::invalid_configuration(format!(
                    "No factory registered for backend: {}",
                    config.backend
                ))
            })?;

        debug!(
            "Creating provider {} for backend: {}",
            config.name, config.backend
        );

        let provider = factory.create_provider(config.descriptor()).await?;
        if provider.name() != config.name {
            return Err(SourceError::invalid_configuration(format!(
                "Factory for '{}' produced provider named '{}', expected '{}'",
                config.backend,
                provider.name(),
                config.name
            )));
        }

        self.register(provider.clone()).await;
        Ok(provider)
    }

    /// List registered backend types
    pub async fn list_backends(&self) -> Vec<String> {
        let mut backends: Vec<String> = self.factories.read().await.keys().cloned().collect();
        backends.sort();
        backends
    }

    pub async fn has_backend(&self, backend: &str) -> bool {
        self.factories.read().await.contains_key(backend)
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
