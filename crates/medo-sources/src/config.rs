//! Source configuration loaded at process start

use crate::error::{Result, SourceError};
use crate::registry::SourceRegistry;
use crate::traits::Provider;
use crate::types::{CapabilityRecord, ProviderDescriptor, Settings};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// One provider to build and register
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique provider name
    pub name: String,
    /// Backend type resolved through the registry's factories (e.g. "postgres")
    pub backend: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub schema: String,
    #[serde(default)]
    pub capabilities: Vec<CapabilityRecord>,
    /// Enable this source in new sessions
    #[serde(default)]
    pub active: bool,
}

impl SourceConfig {
    pub fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            name: self.name.clone(),
            settings: self.settings.clone(),
            schema: self.schema.clone(),
            capabilities: self.capabilities.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl SourcesConfig {
    /// Load from a `.yaml`/`.yml` or `.json` file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SourceError::invalid_configuration(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::from_json(&content)?
        } else {
            Self::from_yaml(&content)?
        };

        debug!(
            "Loaded {} source definitions from {}",
            config.sources.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| SourceError::Serialization(format!("Invalid YAML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| SourceError::Serialization(format!("Invalid JSON config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject empty and duplicate names
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(SourceError::invalid_configuration(
                    "Source name must not be empty",
                ));
            }
            if source.backend.trim().is_empty() {
                return Err(SourceError::invalid_configuration(format!(
                    "Source '{}' has no backend",
                    source.name
                )));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(SourceError::invalid_configuration(format!(
                    "Duplicate source name: {}",
                    source.name
                )));
            }
        }

        Ok(())
    }

    /// Names flagged `active`, in file order
    pub fn default_active_sources(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter(|s| s.active)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Build every source through its backend factory and register it
    pub async fn register_all(&self, registry: &SourceRegistry) -> Result<Vec<Arc<dyn Provider>>> {
        let mut providers = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            providers.push(registry.create_and_register(source).await?);
        }
        Ok(providers)
    }
}
