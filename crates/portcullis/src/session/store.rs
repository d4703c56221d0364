//! Session storage backends.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::SessionData;
use crate::error::Result;

/// Backing store for session data, keyed by session id.
///
/// Implementations may be remote; callers bound every call with a timeout.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Load a session. `None` when absent or expired.
    async fn load(&self, id: &str) -> Result<Option<SessionData>>;

    /// Create or replace a session, expiring after `ttl`.
    async fn store(&self, id: &str, data: &SessionData, ttl: Duration) -> Result<()>;

    /// Delete a session. Deleting an absent session is not an error.
    async fn destroy(&self, id: &str) -> Result<()>;
}

/// Minimum time between sweeps of expired entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Entry {
    data: SessionData,
    expires_at: Instant,
}

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Entry>,
    last_sweep: Instant,
}

impl Entries {
    fn purge(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        self.map.retain(|_, entry| entry.expires_at > now);
        self.last_sweep = now;
        before - self.map.len()
    }
}

/// Process-local session store.
///
/// Expired sessions are invisible to `load` and are dropped by a sweep that
/// runs on `store` at most once per [`SWEEP_INTERVAL`].
#[derive(Debug)]
pub struct MemorySessionStore {
    entries: RwLock<Entries>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Entries {
                map: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }
}

impl MemorySessionStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.map.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.map.is_empty()
    }

    /// Drop expired sessions now.
    pub async fn purge_expired(&self) -> usize {
        self.entries.write().await.purge(Instant::now())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionData>> {
        let entries = self.entries.read().await;
        Ok(entries
            .map
            .get(id)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.data.clone()))
    }

    async fn store(&self, id: &str, data: &SessionData, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if now.duration_since(entries.last_sweep) >= SWEEP_INTERVAL {
            let purged = entries.purge(now);
            if purged > 0 {
                log::debug!("Dropped {purged} expired sessions");
            }
        }
        entries.map.insert(
            id.to_string(),
            Entry {
                data: data.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        self.entries.write().await.map.remove(id);
        Ok(())
    }
}
