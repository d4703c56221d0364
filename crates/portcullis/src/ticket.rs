//! Ticket to session correlation for single logout.
//!
//! A provider ticket is recorded against the local session id at login and
//! consulted when the provider later announces a logout. The map may be
//! process-local or shared by a cluster; only single-key operations are
//! used, and the last writer wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::blocking::bounded;
use crate::error::Result;
use crate::session::SWEEP_INTERVAL;

/// Key/value store mapping tickets to session ids.
#[async_trait]
pub trait TicketStore: Send + Sync + 'static {
    /// Session id recorded for the ticket.
    async fn get(&self, ticket: &str) -> Result<Option<String>>;

    /// Record the ticket, replacing any previous mapping.
    async fn put(&self, ticket: &str, session_id: &str) -> Result<()>;

    /// Remove the ticket, returning the session id it mapped to.
    async fn remove(&self, ticket: &str) -> Result<Option<String>>;
}

#[derive(Debug)]
struct Mapping {
    session_id: String,
    expires_at: Option<Instant>,
}

impl Mapping {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Mapping>,
    last_sweep: Instant,
}

/// Process-local ticket map.
///
/// With a TTL, mappings of sessions that ended without a logout expire and
/// are swept on `put`, at most once per sweep interval.
#[derive(Debug)]
pub struct MemoryTicketStore {
    entries: RwLock<Entries>,
    ttl: Option<Duration>,
}

impl Default for MemoryTicketStore {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Entries {
                map: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            ttl: None,
        }
    }
}

impl MemoryTicketStore {
    /// An empty map whose mappings never expire.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire mappings after `ttl`. Usually the session TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Number of recorded tickets, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.map.len()
    }

    /// Whether no ticket is recorded.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.map.is_empty()
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn get(&self, ticket: &str) -> Result<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .map
            .get(ticket)
            .filter(|m| m.is_live(now))
            .map(|m| m.session_id.clone()))
    }

    async fn put(&self, ticket: &str, session_id: &str) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if now.duration_since(entries.last_sweep) >= SWEEP_INTERVAL {
            entries.map.retain(|_, m| m.is_live(now));
            entries.last_sweep = now;
        }
        entries.map.insert(
            ticket.to_string(),
            Mapping {
                session_id: session_id.to_string(),
                expires_at: self.ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }

    async fn remove(&self, ticket: &str) -> Result<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .write()
            .await
            .map
            .remove(ticket)
            .filter(|m| m.is_live(now))
            .map(|m| m.session_id))
    }
}

/// A [`TicketStore`] whose every call is bounded by a timeout.
#[derive(Clone)]
pub struct TicketRegistry {
    store: Arc<dyn TicketStore>,
    timeout: Duration,
}

impl TicketRegistry {
    /// Wrap a store.
    pub fn new(store: Arc<dyn TicketStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Session id recorded for the ticket.
    pub async fn get(&self, ticket: &str) -> Result<Option<String>> {
        bounded("ticket lookup", self.timeout, self.store.get(ticket)).await
    }

    /// Record the ticket against a session id.
    pub async fn put(&self, ticket: &str, session_id: &str) -> Result<()> {
        bounded("ticket record", self.timeout, self.store.put(ticket, session_id)).await
    }

    /// Remove the ticket, returning the session id it mapped to.
    pub async fn remove(&self, ticket: &str) -> Result<Option<String>> {
        bounded("ticket removal", self.timeout, self.store.remove(ticket)).await
    }
}
