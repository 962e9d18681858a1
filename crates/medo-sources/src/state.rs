//! Typed access to the reserved session keys
//!
//! Reserved keys:
//! - `active_source`: the current provider name (string), absent when none
//! - `active_sources`: ordered, duplicate-free list of enabled provider names
//! - `<name>_result`: last routed result for a provider
//! - `source_settings_<name>`: session-level settings overrides for a provider

use crate::error::{Result, SourceError};
use crate::session::StateMap;
use crate::types::{QueryResult, Settings};
use serde_json::Value;

pub const ACTIVE_SOURCE_KEY: &str = "active_source";
pub const ACTIVE_SOURCES_KEY: &str = "active_sources";

const RESULT_SUFFIX: &str = "_result";
const SETTINGS_OVERRIDE_PREFIX: &str = "source_settings_";

/// Session key holding the last routed result for `provider`
pub fn result_key(provider: &str) -> String {
    format!("{}{}", provider, RESULT_SUFFIX)
}

/// Session key holding settings overrides for `provider`
pub fn settings_override_key(provider: &str) -> String {
    format!("{}{}", SETTINGS_OVERRIDE_PREFIX, provider)
}

/// Whether `key` belongs to the namespace reserved by the core
pub fn is_reserved_key(key: &str) -> bool {
    key == ACTIVE_SOURCE_KEY
        || key == ACTIVE_SOURCES_KEY
        || key.ends_with(RESULT_SUFFIX)
        || key.starts_with(SETTINGS_OVERRIDE_PREFIX)
}

pub(crate) fn parse_active_source(value: Option<&Value>) -> Result<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(name)) => Ok(Some(name.clone())),
        Some(other) => Err(SourceError::invalid_state(
            ACTIVE_SOURCE_KEY,
            format!("expected a string, found {}", other),
        )),
    }
}

pub(crate) fn parse_active_sources(value: Option<&Value>) -> Result<Option<Vec<String>>> {
    let items = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(SourceError::invalid_state(
                ACTIVE_SOURCES_KEY,
                format!("expected a list of names, found {}", other),
            ))
        }
    };

    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                SourceError::invalid_state(
                    ACTIVE_SOURCES_KEY,
                    format!("expected a provider name, found {}", item),
                )
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

pub(crate) fn parse_settings_override(key: &str, value: Option<&Value>) -> Result<Settings> {
    match value {
        None | Some(Value::Null) => Ok(Settings::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(SourceError::invalid_state(
            key,
            format!("expected a settings object, found {}", other),
        )),
    }
}

/// Typed view over a session's state map for the reserved keys
///
/// Every write goes through this type so a reserved key can never hold a
/// wrong-shaped value.
pub struct ActiveSourceState<'a> {
    state: &'a mut StateMap,
}

impl<'a> ActiveSourceState<'a> {
    pub fn new(state: &'a mut StateMap) -> Self {
        Self { state }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state.get(ACTIVE_SOURCES_KEY), Some(Value::Array(_)))
    }

    /// Create an empty `active_sources` list if none exists; returns whether it did
    pub fn ensure_initialized(&mut self) -> Result<bool> {
        if parse_active_sources(self.state.get(ACTIVE_SOURCES_KEY))?.is_some() {
            return Ok(false);
        }
        self.write_active_sources(&[]);
        Ok(true)
    }

    pub fn active_source(&self) -> Result<Option<String>> {
        parse_active_source(self.state.get(ACTIVE_SOURCE_KEY))
    }

    pub fn active_sources(&self) -> Result<Vec<String>> {
        Ok(parse_active_sources(self.state.get(ACTIVE_SOURCES_KEY))?.unwrap_or_default())
    }

    /// Point `active_source` at `name`, appending it to the list if absent
    pub fn set_active_source(&mut self, name: &str) -> Result<()> {
        self.add_active_source(name)?;
        self.state
            .insert(ACTIVE_SOURCE_KEY.to_string(), Value::String(name.to_string()));
        Ok(())
    }

    pub fn clear_active_source(&mut self) {
        self.state.remove(ACTIVE_SOURCE_KEY);
    }

    /// Append `name`; returns false if it was already present
    pub fn add_active_source(&mut self, name: &str) -> Result<bool> {
        let mut sources = self.active_sources()?;
        if sources.iter().any(|s| s == name) {
            // Still materialize the list when the key was missing.
            self.ensure_initialized()?;
            return Ok(false);
        }
        sources.push(name.to_string());
        self.write_active_sources(&sources);
        Ok(true)
    }

    /// Remove `name`; clears `active_source` when it pointed at `name`
    ///
    /// Returns false if `name` was not in the list.
    pub fn remove_active_source(&mut self, name: &str) -> Result<bool> {
        let mut sources = self.active_sources()?;
        let before = sources.len();
        sources.retain(|s| s != name);
        let removed = sources.len() != before;

        if removed {
            self.write_active_sources(&sources);
        }

        if self.active_source()?.as_deref() == Some(name) {
            self.clear_active_source();
        }

        Ok(removed)
    }

    pub fn settings_override(&self, provider: &str) -> Result<Settings> {
        let key = settings_override_key(provider);
        parse_settings_override(&key, self.state.get(&key))
    }

    pub fn set_settings_override(&mut self, provider: &str, overrides: Settings) {
        self.state
            .insert(settings_override_key(provider), Value::Object(overrides));
    }

    pub fn clear_settings_override(&mut self, provider: &str) {
        self.state.remove(&settings_override_key(provider));
    }

    pub fn store_result(&mut self, provider: &str, result: &QueryResult) -> Result<()> {
        let value = serde_json::to_value(result)?;
        self.state.insert(result_key(provider), value);
        Ok(())
    }

    pub fn result(&self, provider: &str) -> Result<Option<QueryResult>> {
        self.state
            .get(&result_key(provider))
            .map(|value| serde_json::from_value(value.clone()).map_err(Into::into))
            .transpose()
    }

    fn write_active_sources(&mut self, sources: &[String]) {
        let list = sources.iter().cloned().map(Value::String).collect();
        self.state
            .insert(ACTIVE_SOURCES_KEY.to_string(), Value::Array(list));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reserved_keys() {
        assert_eq!(result_key("BigQuery"), "BigQuery_result");
        assert_eq!(settings_override_key("CSV"), "source_settings_CSV");
        assert!(is_reserved_key("active_source"));
        assert!(is_reserved_key("active_sources"));
        assert!(is_reserved_key("CSV_result"));
        assert!(!is_reserved_key("db_agent_output"));
    }

    #[test]
    fn test_ensure_initialized_is_idempotent() {
        let mut map = StateMap::new();
        let mut state = ActiveSourceState::new(&mut map);

        assert!(!state.is_initialized());
        assert!(state.ensure_initialized().unwrap());
        assert!(!state.ensure_initialized().unwrap());
        assert_eq!(map.get(ACTIVE_SOURCES_KEY), Some(&json!([])));
    }

    #[test]
    fn test_set_active_source_keeps_existing_order() {
        let mut map = StateMap::new();
        let mut state = ActiveSourceState::new(&mut map);
        state.add_active_source("A").unwrap();
        state.add_active_source("B").unwrap();
        state.set_active_source("A").unwrap();

        assert_eq!(state.active_sources().unwrap(), vec!["A", "B"]);
        assert_eq!(state.active_source().unwrap().as_deref(), Some("A"));
    }

    #[test]
    fn test_remove_non_current_keeps_pointer() {
        let mut map = StateMap::new();
        let mut state = ActiveSourceState::new(&mut map);
        state.add_active_source("A").unwrap();
        state.set_active_source("B").unwrap();

        assert!(state.remove_active_source("A").unwrap());
        assert!(!state.remove_active_source("A").unwrap());
        assert_eq!(state.active_source().unwrap().as_deref(), Some("B"));
        assert_eq!(state.active_sources().unwrap(), vec!["B"]);
    }

    #[test]
    fn test_wrong_shape_is_reported() {
        let mut map = StateMap::new();
        map.insert(ACTIVE_SOURCES_KEY.to_string(), json!("BigQuery"));
        map.insert(ACTIVE_SOURCE_KEY.to_string(), json!(42));
        let state = ActiveSourceState::new(&mut map);

        assert!(matches!(
            state.active_sources(),
            Err(SourceError::InvalidState { key, .. }) if key == ACTIVE_SOURCES_KEY
        ));
        assert!(matches!(
            state.active_source(),
            Err(SourceError::InvalidState { key, .. }) if key == ACTIVE_SOURCE_KEY
        ));
    }

    #[test]
    fn test_null_list_counts_as_uninitialized() {
        let mut map = StateMap::new();
        map.insert(ACTIVE_SOURCES_KEY.to_string(), Value::Null);
        let mut state = ActiveSourceState::new(&mut map);

        assert!(!state.is_initialized());
        assert!(state.active_sources().unwrap().is_empty());
        assert!(state.ensure_initialized().unwrap());
        assert_eq!(map.get(ACTIVE_SOURCES_KEY), Some(&json!([])));
    }

    #[test]
    fn test_list_with_non_string_entry_is_reported() {
        let mut map = StateMap::new();
        map.insert(ACTIVE_SOURCES_KEY.to_string(), json!(["CSV", 7]));
        let state = ActiveSourceState::new(&mut map);

        assert!(state.active_sources().is_err());
    }

    #[test]
    fn test_result_roundtrip_through_state() {
        let mut map = StateMap::new();
        let mut state = ActiveSourceState::new(&mut map);
        let result = QueryResult::default();

        assert!(state.result("CSV").unwrap().is_none());
        state.store_result("CSV", &result).unwrap();
        assert_eq!(state.result("CSV").unwrap(), Some(result));
    }
}
