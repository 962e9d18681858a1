//! Session state boundary
//!
//! The agent runtime owns each conversation's key-value bag; the core only
//! reads and writes it through [`SessionState`]. [`InMemorySession`] and
//! [`SessionStore`] are the in-process implementation used by the CLI and tests.

use crate::error::{Result, SourceError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Serializable key-value bag owned by one session
pub type StateMap = serde_json::Map<String, Value>;

/// Read-modify-write callback run under the session's lock
pub type StateOp<'a> = dyn FnMut(&mut StateMap) -> Result<()> + Send + 'a;

/// Per-session state accessor supplied by the agent runtime
#[async_trait]
pub trait SessionState: Send + Sync {
    fn id(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<Option<Value>>;

    /// Copy of the whole bag
    async fn snapshot(&self) -> Result<StateMap>;

    /// Run `op` atomically with respect to every other mutation of this session
    ///
    /// If `op` fails the bag must be left as it was before the call.
    async fn transact(&self, op: &mut StateOp<'_>) -> Result<()>;
}

/// Run a value-returning closure through [`SessionState::transact`]
pub async fn transact_with<S, T, F>(session: &S, f: F) -> Result<T>
where
    S: SessionState + ?Sized,
    F: FnOnce(&mut StateMap) -> Result<T> + Send,
    T: Send,
{
    let mut f = Some(f);
    let mut output = None;

    session
        .transact(&mut |state: &mut StateMap| {
            let f = f
                .take()
                .ok_or_else(|| SourceError::Internal("state operation ran twice".to_string()))?;
            output = Some(f(state)?);
            Ok(())
        })
        .await?;

    output.ok_or_else(|| SourceError::Internal("state operation did not run".to_string()))
}

/// In-process session bag guarded by a per-session lock
pub struct InMemorySession {
    id: String,
    state: Mutex<StateMap>,
    read_only: AtomicBool,
}

impl InMemorySession {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_state(id, StateMap::new())
    }

    pub fn with_state(id: impl Into<String>, state: StateMap) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(state),
            read_only: AtomicBool::new(false),
        }
    }

    /// Reject every write with `StateUnavailable`
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(SourceError::StateUnavailable(format!(
                "session '{}' is read-only",
                self.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionState for InMemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.state.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.ensure_writable()?;
        self.state.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<Value>> {
        self.ensure_writable()?;
        Ok(self.state.lock().await.remove(key))
    }

    async fn snapshot(&self) -> Result<StateMap> {
        Ok(self.state.lock().await.clone())
    }

    async fn transact(&self, op: &mut StateOp<'_>) -> Result<()> {
        self.ensure_writable()?;

        let mut state = self.state.lock().await;
        let mut working = state.clone();
        op(&mut working)?;
        *state = working;

        Ok(())
    }
}

/// Owns the in-memory sessions of a process, keyed by session id
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Arc<InMemorySession>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a session, creating an empty one on first use
    pub async fn get_or_create(&self, id: &str) -> Arc<InMemorySession> {
        self.open(id).await.0
    }

    /// Like [`Self::get_or_create`], also reporting whether this call created it
    pub async fn open(&self, id: &str) -> (Arc<InMemorySession>, bool) {
        if let Some(session) = self.sessions.read().await.get(id) {
            return (session.clone(), false);
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(id) {
            return (session.clone(), false);
        }

        debug!("Created session state: {}", id);
        let session = Arc::new(InMemorySession::new(id));
        sessions.insert(id.to_string(), session.clone());
        (session, true)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<InMemorySession>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Discard a session's state; returns whether it existed
    pub async fn end(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            debug!("Discarded session state: {}", id);
        }
        removed
    }

    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_set_remove() {
        let session = InMemorySession::new("s1");
        session.set("user_key", json!("value")).await.unwrap();

        assert_eq!(session.get("user_key").await.unwrap(), Some(json!("value")));
        assert_eq!(
            session.remove("user_key").await.unwrap(),
            Some(json!("value"))
        );
        assert_eq!(session.get("user_key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_transaction_leaves_state_untouched() {
        let session = InMemorySession::new("s1");
        session.set("counter", json!(1)).await.unwrap();

        let result = transact_with(&session, |state| -> Result<()> {
            state.insert("counter".to_string(), json!(2));
            Err(SourceError::NoActiveSource)
        })
        .await;

        assert!(matches!(result, Err(SourceError::NoActiveSource)));
        assert_eq!(session.get("counter").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_transact_with_returns_value() {
        let session = InMemorySession::new("s1");

        let len = transact_with(&session, |state| {
            state.insert("a".to_string(), json!(true));
            Ok(state.len())
        })
        .await
        .unwrap();

        assert_eq!(len, 1);
    }

    #[tokio::test]
    async fn test_read_only_session_rejects_writes() {
        let session = InMemorySession::new("s1");
        session.set_read_only(true);

        assert!(matches!(
            session.set("k", json!(1)).await,
            Err(SourceError::StateUnavailable(_))
        ));
        assert!(matches!(
            transact_with(&session, |_| Ok(())).await,
            Err(SourceError::StateUnavailable(_))
        ));
        assert!(session.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_reuses_and_ends_sessions() {
        let store = SessionStore::new();
        let first = store.get_or_create("conv-1").await;
        first.set("k", json!(1)).await.unwrap();

        let (again, created) = store.open("conv-1").await;
        assert!(!created);
        assert_eq!(again.get("k").await.unwrap(), Some(json!(1)));
        assert!(store.open("conv-2").await.1);
        assert_eq!(
            store.session_ids().await,
            vec!["conv-1".to_string(), "conv-2".to_string()]
        );

        assert!(store.end("conv-1").await);
        assert!(!store.end("conv-1").await);
        assert!(store.get("conv-1").await.is_none());
    }
}
