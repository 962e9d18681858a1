use crate::error::{Result, SourceError};
use crate::registry::SourceRegistry;
use crate::session::{transact_with, SessionState};
use crate::state::{
    parse_active_source, parse_active_sources, parse_settings_override, settings_override_key,
    ActiveSourceState, ACTIVE_SOURCES_KEY, ACTIVE_SOURCE_KEY,
};
use crate::types::Settings;
use serde::Serialize;
use tracing::{debug, warn};

/// Resolved settings of one active provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSettings {
    pub name: String,
    pub settings: Settings,
}

/// Settings of every active provider, in active order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AllSourceSettings {
    pub sources: Vec<SourceSettings>,
    /// Active names no longer present in the registry
    pub missing: Vec<String>,
}

impl AllSourceSettings {
    pub fn get(&self, name: &str) -> Option<&Settings> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.settings)
    }
}

/// Tracks which providers are active for a session
///
/// All reads and writes of the reserved keys go through this type; every
/// mutation is a single atomic transaction on the session's state.
#[derive(Clone)]
pub struct ActiveSourceManager {
    registry: SourceRegistry,
}

impl ActiveSourceManager {
    pub fn new(registry: SourceRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Create the empty `active_sources` list if the session has none yet
    pub async fn ensure_active_sources_initialized(&self, session: &dyn SessionState) -> Result<()> {
        let current = session.get(ACTIVE_SOURCES_KEY).await?;
        if parse_active_sources(current.as_ref())?.is_some() {
            return Ok(());
        }

        let created = transact_with(session, |state| {
            ActiveSourceState::new(state).ensure_initialized()
        })
        .await?;

        if created {
            debug!("Initialized active sources for session {}", session.id());
        }
        Ok(())
    }

    pub async fn get_active_source(&self, session: &dyn SessionState) -> Result<Option<String>> {
        let value = session.get(ACTIVE_SOURCE_KEY).await?;
        parse_active_source(value.as_ref())
    }

    pub async fn get_active_sources(&self, session: &dyn SessionState) -> Result<Vec<String>> {
        self.ensure_active_sources_initialized(session).await?;
        let value = session.get(ACTIVE_SOURCES_KEY).await?;
        Ok(parse_active_sources(value.as_ref())?.unwrap_or_default())
    }

    /// Make `name` the current source, enabling it if needed
    ///
    /// A name already in `active_sources` keeps its position.
    pub async fn set_active_source(&self, session: &dyn SessionState, name: &str) -> Result<()> {
        self.require_registered(name).await?;

        transact_with(session, |state| {
            ActiveSourceState::new(state).set_active_source(name)
        })
        .await?;

        debug!("Session {} active source set to {}", session.id(), name);
        Ok(())
    }

    /// Enable `name` for the session; no-op if already enabled
    pub async fn add_active_source(&self, session: &dyn SessionState, name: &str) -> Result<()> {
        self.require_registered(name).await?;

        let added = transact_with(session, |state| {
            ActiveSourceState::new(state).add_active_source(name)
        })
        .await?;

        if added {
            debug!("Session {} enabled source {}", session.id(), name);
        }
        Ok(())
    }

    /// Disable `name`; no-op if absent
    ///
    /// Removing the current source clears `active_source` rather than picking
    /// another one.
    pub async fn remove_active_source(&self, session: &dyn SessionState, name: &str) -> Result<()> {
        let removed = transact_with(session, |state| {
            ActiveSourceState::new(state).remove_active_source(name)
        })
        .await?;

        if removed {
            debug!("Session {} disabled source {}", session.id(), name);
        }
        Ok(())
    }

    /// Enable `names` in order and make the first current if nothing is current yet
    ///
    /// Unregistered names are skipped with a warning.
    pub async fn seed_defaults(&self, session: &dyn SessionState, names: &[String]) -> Result<()> {
        let mut registered = Vec::with_capacity(names.len());
        for name in names {
            if self.registry.contains(name).await {
                registered.push(name.clone());
            } else {
                warn!("Skipping unregistered default source: {}", name);
            }
        }

        transact_with(session, |state| {
            let mut active = ActiveSourceState::new(state);
            active.ensure_initialized()?;
            for name in &registered {
                active.add_active_source(name)?;
            }
            if active.active_source()?.is_none() {
                if let Some(first) = registered.first() {
                    active.set_active_source(first)?;
                }
            }
            Ok(())
        })
        .await
    }

    /// Store session-level settings that override the provider's defaults key by key
    pub async fn set_source_settings_override(
        &self,
        session: &dyn SessionState,
        name: &str,
        overrides: Settings,
    ) -> Result<()> {
        self.require_registered(name).await?;

        transact_with(session, |state| {
            ActiveSourceState::new(state).set_settings_override(name, overrides);
            Ok(())
        })
        .await
    }

    pub async fn clear_source_settings_override(
        &self,
        session: &dyn SessionState,
        name: &str,
    ) -> Result<()> {
        transact_with(session, |state| {
            ActiveSourceState::new(state).clear_settings_override(name);
            Ok(())
        })
        .await
    }

    /// Settings of `name` (or of the active source) with session overrides applied
    pub async fn get_source_settings(
        &self,
        session: &dyn SessionState,
        name: Option<&str>,
    ) -> Result<Settings> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self
                .get_active_source(session)
                .await?
                .ok_or(SourceError::NoActiveSource)?,
        };

        self.resolve_settings(session, &name).await
    }

    /// Resolved settings for every active source; stale names are reported, not fatal
    pub async fn get_all_db_settings(&self, session: &dyn SessionState) -> Result<AllSourceSettings> {
        let mut all = AllSourceSettings::default();

        for name in self.get_active_sources(session).await? {
            match self.resolve_settings(session, &name).await {
                Ok(settings) => all.sources.push(SourceSettings { name, settings }),
                Err(SourceError::UnknownProvider(_)) => {
                    warn!(
                        "Session {} lists unregistered source {}",
                        session.id(),
                        name
                    );
                    all.missing.push(name);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(all)
    }

    async fn resolve_settings(&self, session: &dyn SessionState, name: &str) -> Result<Settings> {
        let provider = self.registry.get_source(name).await?;
        let key = settings_override_key(name);
        let overrides = parse_settings_override(&key, session.get(&key).await?.as_ref())?;

        Ok(merge_settings(provider.settings(), &overrides))
    }

    async fn require_registered(&self, name: &str) -> Result<()> {
        if self.registry.contains(name).await {
            Ok(())
        } else {
            Err(SourceError::unknown_provider(name))
        }
    }
}

/// Provider defaults with `overrides` applied key by key
pub fn merge_settings(defaults: &Settings, overrides: &Settings) -> Settings {
    let mut merged = defaults.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
