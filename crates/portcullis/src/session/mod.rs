//! Sessions.
//!
//! A [`Session`] is the per-request handle placed in request extensions by
//! [`SessionLayer`]. Reads and writes are synchronous and in-memory; the
//! only suspension point is [`Session::save`], which is bounded by the
//! configured timeout so that callers can rely on the data being durable
//! once it returns.

mod layer;
mod store;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::blocking::bounded;
use crate::error::Result;

pub use layer::{SessionLayer, SessionService, session_id_from_headers};
pub use store::{MemorySessionStore, SWEEP_INTERVAL, SessionStore};

/// Attribute map persisted for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData {
    attributes: BTreeMap<String, Value>,
}

impl SessionData {
    /// An empty attribute map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Set an attribute, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.attributes.insert(key.into(), value)
    }

    /// Remove an attribute.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    /// Whether the attribute is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Whether no attribute is present.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Remove every attribute.
    pub fn clear(&mut self) {
        self.attributes.clear();
    }
}

#[derive(Debug)]
struct SessionState {
    id: String,
    data: SessionData,
    // Ids the session was known under before a renewal; deleted on save.
    stale_ids: Vec<String>,
    revision: u64,
    saved_revision: u64,
    destroyed: bool,
    persisted: bool,
}

/// Handle to a session, shared by everything handling one request.
///
/// Clones share state.
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    store: Arc<dyn SessionStore>,
    timeout: Duration,
    ttl: Duration,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Session")
            .field("id", &state.id)
            .field("destroyed", &state.destroyed)
            .field("persisted", &state.persisted)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// A fresh session with a random id. Nothing is written until the
    /// session is modified and saved.
    pub fn new(store: Arc<dyn SessionStore>, timeout: Duration, ttl: Duration) -> Self {
        Self::from_state(new_session_id(), SessionData::new(), false, store, timeout, ttl)
    }

    /// Wrap data already loaded from the store.
    pub fn existing(
        id: impl Into<String>,
        data: SessionData,
        store: Arc<dyn SessionStore>,
        timeout: Duration,
        ttl: Duration,
    ) -> Self {
        Self::from_state(id.into(), data, true, store, timeout, ttl)
    }

    fn from_state(
        id: String,
        data: SessionData,
        persisted: bool,
        store: Arc<dyn SessionStore>,
        timeout: Duration,
        ttl: Duration,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                id,
                data,
                stale_ids: Vec::new(),
                revision: 0,
                saved_revision: 0,
                destroyed: false,
                persisted,
            })),
            store,
            timeout,
            ttl,
        }
    }

    /// Load a session by id, outside of any request.
    ///
    /// Returns `None` when the store has no such session.
    pub async fn load(
        id: &str,
        store: Arc<dyn SessionStore>,
        timeout: Duration,
        ttl: Duration,
    ) -> Result<Option<Self>> {
        let data = bounded("session load", timeout, store.load(id)).await?;
        Ok(data.map(|data| Self::existing(id, data, store, timeout, ttl)))
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current session id.
    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    /// Raw attribute lookup.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().data.get(key).cloned()
    }

    /// String attribute lookup.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(str::to_string))
    }

    /// Typed attribute lookup.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Whether the attribute is present.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().data.contains_key(key)
    }

    /// Set an attribute.
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let mut state = self.lock();
        state.data.insert(key, value);
        state.revision += 1;
        Ok(())
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut state = self.lock();
        let previous = state.data.remove(key);
        if previous.is_some() {
            state.revision += 1;
        }
        previous
    }

    /// Snapshot of all attributes.
    pub fn data(&self) -> SessionData {
        self.lock().data.clone()
    }

    /// Discard the session. The next save deletes it from the store.
    pub fn destroy(&self) {
        let mut state = self.lock();
        state.data.clear();
        state.destroyed = true;
        state.revision += 1;
    }

    /// Move the session to a new random id, keeping its attributes.
    ///
    /// Returns the previous id. The old entry is deleted on the next save.
    pub fn regenerate_id(&self) -> String {
        let mut state = self.lock();
        let previous = std::mem::replace(&mut state.id, new_session_id());
        if state.persisted {
            state.stale_ids.push(previous.clone());
        }
        state.revision += 1;
        previous
    }

    /// Whether [`Session::destroy`] was called.
    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    /// Whether there are changes not yet saved.
    pub fn is_dirty(&self) -> bool {
        let state = self.lock();
        state.revision != state.saved_revision
    }

    /// Whether the current id exists in the store.
    pub fn is_persisted(&self) -> bool {
        self.lock().persisted
    }

    /// Write pending changes to the store.
    ///
    /// Waits for the store to acknowledge, up to the configured timeout.
    /// A clean session is not written.
    pub async fn save(&self) -> Result<()> {
        let (id, stale, data, destroyed, revision) = {
            let mut state = self.lock();
            if state.revision == state.saved_revision {
                return Ok(());
            }
            (
                state.id.clone(),
                std::mem::take(&mut state.stale_ids),
                state.data.clone(),
                state.destroyed,
                state.revision,
            )
        };

        let store = self.store.clone();
        let ttl = self.ttl;
        let result = bounded("session save", self.timeout, async {
            for old in &stale {
                store.destroy(old).await?;
            }
            if destroyed {
                store.destroy(&id).await
            } else {
                store.store(&id, &data, ttl).await
            }
        })
        .await;

        let mut state = self.lock();
        match result {
            Ok(()) => {
                state.saved_revision = revision;
                state.persisted = !destroyed;
                log::debug!("Saved session {id} (destroyed: {destroyed})");
                Ok(())
            }
            Err(e) => {
                state.stale_ids.extend(stale);
                Err(e)
            }
        }
    }
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(1);
    const TTL: Duration = Duration::from_secs(60);

    fn store() -> Arc<MemorySessionStore> {
        Arc::new(MemorySessionStore::new())
    }

    #[test]
    fn test_new_session_is_clean() {
        let session = Session::new(store(), TIMEOUT, TTL);
        assert!(!session.is_dirty());
        assert!(!session.is_persisted());
        assert_eq!(session.id().len(), 32);
    }

    #[test]
    fn test_get_set_remove() {
        let session = Session::new(store(), TIMEOUT, TTL);
        session.set("answer", 42).unwrap();
        assert_eq!(session.get_as::<u32>("answer").unwrap(), Some(42));
        assert!(session.contains("answer"));
        assert!(session.is_dirty());
        assert_eq!(session.remove("answer"), Some(Value::from(42)));
        assert_eq!(session.get("answer"), None);
    }

    #[test]
    fn test_removing_missing_key_does_not_dirty() {
        let session = Session::new(store(), TIMEOUT, TTL);
        assert!(session.remove("missing").is_none());
        assert!(!session.is_dirty());
    }

    #[tokio::test]
    async fn test_save_persists_and_cleans() {
        let store = store();
        let session = Session::new(store.clone(), TIMEOUT, TTL);
        session.set("k", "v").unwrap();
        session.save().await.unwrap();
        assert!(!session.is_dirty());
        assert!(session.is_persisted());

        let loaded = Session::load(&session.id(), store, TIMEOUT, TTL)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.get_str("k").as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_regenerate_id_moves_data() {
        let store = store();
        let session = Session::new(store.clone(), TIMEOUT, TTL);
        session.set("k", "v").unwrap();
        session.save().await.unwrap();

        let old = session.regenerate_id();
        assert_ne!(old, session.id());
        session.save().await.unwrap();

        assert!(store.load(&old).await.unwrap().is_none());
        let moved = store.load(&session.id()).await.unwrap().unwrap();
        assert_eq!(moved.get("k"), Some(&Value::from("v")));
    }

    #[tokio::test]
    async fn test_destroy_deletes_from_store() {
        let store = store();
        let session = Session::new(store.clone(), TIMEOUT, TTL);
        session.set("k", "v").unwrap();
        session.save().await.unwrap();

        session.destroy();
        assert!(session.is_destroyed());
        session.save().await.unwrap();
        assert!(!session.is_persisted());
        assert!(store.load(&session.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_missing_session() {
        let loaded = Session::load("nope", store(), TIMEOUT, TTL).await.unwrap();
        assert!(loaded.is_none());
    }
}
