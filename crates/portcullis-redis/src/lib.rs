//! Redis-backed stores for portcullis.
//!
//! [`RedisSessionStore`] keeps session data as JSON under a key prefix with
//! a server-side expiry. [`RedisTicketStore`] is the cluster-wide
//! ticket→session map used by single logout. Both share one
//! [`ConnectionManager`], which reconnects on its own.
//!
//! ```ignore
//! let conn = portcullis_redis::connect("redis://127.0.0.1/").await?;
//! let engine = SecurityEngine::builder(config)
//!     .session_store(Arc::new(RedisSessionStore::new(conn.clone())))
//!     .ticket_store(Arc::new(RedisTicketStore::new(conn)))
//!     .build()?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use portcullis::{Error, Result, SessionData, SessionStore, TicketStore};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Default prefix for session keys.
pub const DEFAULT_SESSION_PREFIX: &str = "portcullis:session:";

/// Default prefix for ticket keys.
pub const DEFAULT_TICKET_PREFIX: &str = "portcullis:ticket:";

/// Opens a managed connection to the Redis server at `url`.
pub async fn connect(url: &str) -> Result<ConnectionManager> {
    let client =
        redis::Client::open(url).map_err(|e| Error::store_with_source("invalid redis url", e))?;
    let conn = ConnectionManager::new(client)
        .await
        .map_err(|e| Error::store_with_source("redis connection failed", e))?;
    log::info!("Connected to redis");
    Ok(conn)
}

fn redis_error(operation: &str, e: redis::RedisError) -> Error {
    Error::store_with_source(format!("redis {operation} failed"), e)
}

/// Key under `prefix`.
pub fn prefixed_key(prefix: &str, key: &str) -> String {
    format!("{prefix}{key}")
}

/// Redis expiries are whole seconds and must be positive.
fn expiry_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Session store over Redis strings holding JSON attribute maps.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisSessionStore {
    /// Store using [`DEFAULT_SESSION_PREFIX`].
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            prefix: DEFAULT_SESSION_PREFIX.to_string(),
        }
    }

    /// Replace the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, id: &str) -> String {
        prefixed_key(&self.prefix, id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionData>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(self.key(id))
            .await
            .map_err(|e| redis_error("GET", e))?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, id: &str, data: &SessionData, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(data)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(self.key(id), json, expiry_seconds(ttl))
            .await
            .map_err(|e| redis_error("SETEX", e))
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.key(id))
            .await
            .map_err(|e| redis_error("DEL", e))
    }
}

/// Ticket map over Redis strings.
///
/// Entries carry an optional expiry so that tickets of sessions that ended
/// without a logout do not accumulate.
#[derive(Clone)]
pub struct RedisTicketStore {
    conn: ConnectionManager,
    prefix: String,
    ttl: Option<Duration>,
}

impl RedisTicketStore {
    /// Store using [`DEFAULT_TICKET_PREFIX`], without expiry.
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            prefix: DEFAULT_TICKET_PREFIX.to_string(),
            ttl: None,
        }
    }

    /// Replace the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Expire mappings after `ttl`. Usually the session TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn key(&self, ticket: &str) -> String {
        prefixed_key(&self.prefix, ticket)
    }
}

#[async_trait]
impl TicketStore for RedisTicketStore {
    async fn get(&self, ticket: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(self.key(ticket))
            .await
            .map_err(|e| redis_error("GET", e))
    }

    async fn put(&self, ticket: &str, session_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = self.key(ticket);
        match self.ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, session_id, expiry_seconds(ttl))
                .await
                .map_err(|e| redis_error("SETEX", e)),
            None => conn
                .set::<_, _, ()>(key, session_id)
                .await
                .map_err(|e| redis_error("SET", e)),
        }
    }

    async fn remove(&self, ticket: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get_del(self.key(ticket))
            .await
            .map_err(|e| redis_error("GETDEL", e))
    }
}
