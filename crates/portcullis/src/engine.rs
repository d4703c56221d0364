//! Validated runtime state shared by every flow.
//!
//! A [`SecurityEngine`] is built once from a [`SecurityConfig`] plus the
//! pluggable parts (authenticators, stores, codec, adapter). Every name the
//! configuration references is resolved at build time, so a misconfigured
//! application fails at startup instead of on the first request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use regex::Regex;

use crate::action::{DefaultHttpActionAdapter, HttpAction, HttpActionAdapter};
use crate::authorizer::{self, Authorizer};
use crate::client::{Authenticator, Client, Clients};
use crate::codec::{FramedJsonCodec, IdentityCodec};
use crate::config::SecurityConfig;
use crate::context::WebContext;
use crate::error::{Error, Result};
use crate::matcher::{self, Matcher};
use crate::profile_manager::ProfileManager;
use crate::security::{SecurityLayer, SecurityOptions, SecurityPolicy};
use crate::session::{MemorySessionStore, Session, SessionLayer, SessionStore};
use crate::single_logout::LogoutCorrelator;
use crate::ticket::{MemoryTicketStore, TicketRegistry, TicketStore};

/// Shared, cheaply cloneable security runtime.
#[derive(Clone)]
pub struct SecurityEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: SecurityConfig,
    clients: Clients,
    authorizers: HashMap<String, Arc<dyn Authorizer>>,
    matchers: HashMap<String, Arc<dyn Matcher>>,
    session_store: Arc<dyn SessionStore>,
    correlator: LogoutCorrelator,
    adapter: Arc<dyn HttpActionAdapter>,
    codec: Arc<dyn IdentityCodec>,
    logout_pattern: Regex,
    default_policy: SecurityPolicy,
}

impl SecurityEngine {
    /// Start building an engine.
    pub fn builder(config: SecurityConfig) -> SecurityEngineBuilder {
        SecurityEngineBuilder::new(config)
    }

    /// The configuration the engine was built from.
    pub fn config(&self) -> &SecurityConfig {
        &self.inner.config
    }

    /// Configured clients.
    pub fn clients(&self) -> &Clients {
        &self.inner.clients
    }

    /// Look up a named authorizer, ignoring case.
    pub fn authorizer(&self, name: &str) -> Option<Arc<dyn Authorizer>> {
        self.inner.authorizers.get(&name.to_ascii_lowercase()).cloned()
    }

    /// Look up a named matcher, ignoring case.
    pub fn matcher(&self, name: &str) -> Option<Arc<dyn Matcher>> {
        self.inner.matchers.get(&name.to_ascii_lowercase()).cloned()
    }

    /// Session store backing [`SessionLayer`].
    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        self.inner.session_store.clone()
    }

    /// Ticket correlator used by single logout.
    pub fn correlator(&self) -> &LogoutCorrelator {
        &self.inner.correlator
    }

    /// Identity codec.
    pub fn codec(&self) -> Arc<dyn IdentityCodec> {
        self.inner.codec.clone()
    }

    /// Bound on every blocking call.
    pub fn blocking_timeout(&self) -> Duration {
        self.inner.config.blocking_timeout()
    }

    /// Allow-list for caller-supplied logout targets.
    pub fn logout_pattern(&self) -> &Regex {
        &self.inner.logout_pattern
    }

    /// Profile manager over the request's session.
    pub fn profile_manager(&self, session: Option<Session>) -> ProfileManager {
        ProfileManager::new(session, self.codec())
    }

    /// Session middleware; install it outside every security layer.
    pub fn session_layer(&self) -> SessionLayer {
        SessionLayer::new(
            self.session_store(),
            self.inner.config.session.clone(),
            self.blocking_timeout(),
        )
        .with_error_body(self.inner.config.responses.error_body.clone())
    }

    /// Security middleware with the configured defaults.
    pub fn security_layer(&self) -> SecurityLayer {
        SecurityLayer::new(self.clone(), self.inner.default_policy.clone())
    }

    /// Security middleware with route-specific clients, authorizers and
    /// matchers.
    pub fn security_layer_with(&self, options: SecurityOptions) -> Result<SecurityLayer> {
        let policy = self.resolve_policy(&options)?;
        Ok(SecurityLayer::new(self.clone(), policy))
    }

    fn resolve_policy(&self, options: &SecurityOptions) -> Result<SecurityPolicy> {
        resolve_policy(
            &self.inner.clients,
            &self.inner.authorizers,
            &self.inner.matchers,
            options,
        )
    }

    /// Write an action through the configured adapter.
    pub(crate) fn respond(&self, mut ctx: WebContext, action: HttpAction) -> Response {
        match self.inner.adapter.adapt(action, &mut ctx) {
            Ok(()) => ctx.into_response(),
            Err(e) => {
                log::error!("Failed to write security response: {e}");
                self.error_response()
            }
        }
    }

    /// Log a failure that happened before a context could be built.
    pub(crate) fn fail_bare(&self, error: &Error) -> Response {
        log::error!("Security flow failed: {error}");
        self.error_response()
    }

    fn error_response(&self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            self.inner.config.responses.error_body.clone(),
        )
            .into_response()
    }

    /// Log a failed flow in full and answer with the generic 500.
    pub(crate) fn fail(&self, ctx: WebContext, error: &Error) -> Response {
        log::error!(
            "Security flow failed for {} {}: {error}",
            ctx.method(),
            ctx.path()
        );
        self.respond(ctx, HttpAction::InternalError)
    }
}

/// Builder for [`SecurityEngine`].
pub struct SecurityEngineBuilder {
    config: SecurityConfig,
    authenticators: HashMap<String, Arc<dyn Authenticator>>,
    authorizers: Vec<(String, Arc<dyn Authorizer>)>,
    matchers: Vec<(String, Arc<dyn Matcher>)>,
    session_store: Option<Arc<dyn SessionStore>>,
    ticket_store: Option<Arc<dyn TicketStore>>,
    adapter: Option<Arc<dyn HttpActionAdapter>>,
    codec: Option<Arc<dyn IdentityCodec>>,
}

impl SecurityEngineBuilder {
    fn new(config: SecurityConfig) -> Self {
        Self {
            config,
            authenticators: HashMap::new(),
            authorizers: Vec::new(),
            matchers: Vec::new(),
            session_store: None,
            ticket_store: None,
            adapter: None,
            codec: None,
        }
    }

    /// Attach the authenticator of a configured client.
    pub fn authenticator(mut self, client: &str, authenticator: impl Authenticator) -> Self {
        self.authenticators
            .insert(client.to_ascii_lowercase(), Arc::new(authenticator));
        self
    }

    /// Register a custom authorizer. Overrides a configured one of the
    /// same name.
    pub fn authorizer(mut self, name: impl Into<String>, authorizer: impl Authorizer) -> Self {
        self.authorizers.push((name.into(), Arc::new(authorizer)));
        self
    }

    /// Register a custom matcher. Overrides a configured one of the same
    /// name.
    pub fn matcher(mut self, name: impl Into<String>, matcher: impl Matcher) -> Self {
        self.matchers.push((name.into(), Arc::new(matcher)));
        self
    }

    /// Session store; defaults to [`MemorySessionStore`].
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Ticket store; defaults to a [`MemoryTicketStore`] expiring with the session TTL.
    pub fn ticket_store(mut self, store: Arc<dyn TicketStore>) -> Self {
        self.ticket_store = Some(store);
        self
    }

    /// Response adapter; defaults to [`DefaultHttpActionAdapter`].
    pub fn action_adapter(mut self, adapter: Arc<dyn HttpActionAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Identity codec; defaults to [`FramedJsonCodec`].
    pub fn codec(mut self, codec: Arc<dyn IdentityCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Validate everything and build the engine.
    pub fn build(mut self) -> Result<SecurityEngine> {
        let config = self.config;
        if config.blocking_timeout_ms == 0 {
            return Err(Error::config("blocking_timeout_ms must be greater than zero"));
        }
        validate_callback_url(&config.callback_url)?;

        if config.clients.is_empty() {
            return Err(Error::config("at least one client must be configured"));
        }
        let mut clients = Vec::with_capacity(config.clients.len());
        for client in &config.clients {
            let key = client.name.to_ascii_lowercase();
            if clients
                .iter()
                .any(|c: &Client| c.name().eq_ignore_ascii_case(&client.name))
            {
                return Err(Error::config(format!("duplicate client '{}'", client.name)));
            }
            let authenticator = self.authenticators.remove(&key).ok_or_else(|| {
                Error::config(format!("client '{}' has no authenticator", client.name))
            })?;
            clients.push(Client::new(
                client.name.clone(),
                client.settings.clone(),
                authenticator,
            ));
        }
        if let Some(orphan) = self.authenticators.keys().next() {
            return Err(Error::config(format!(
                "authenticator registered for unknown client '{orphan}'"
            )));
        }
        let clients = Clients::new(clients);

        let mut authorizers = HashMap::new();
        for entry in &config.authorizers {
            authorizers.insert(entry.name.to_ascii_lowercase(), authorizer::from_rule(&entry.rule));
        }
        for (name, custom) in self.authorizers {
            if authorizers.insert(name.to_ascii_lowercase(), custom).is_some() {
                log::debug!("Custom authorizer '{name}' replaces the configured one");
            }
        }

        let mut matchers = HashMap::new();
        for entry in &config.matchers {
            matchers.insert(entry.name.to_ascii_lowercase(), matcher::from_rule(&entry.rule)?);
        }
        for (name, custom) in self.matchers {
            if matchers.insert(name.to_ascii_lowercase(), custom).is_some() {
                log::debug!("Custom matcher '{name}' replaces the configured one");
            }
        }

        let logout_pattern = Regex::new(&format!("^(?:{})$", config.logout.logout_url_pattern))
            .map_err(|e| {
                Error::config(format!(
                    "invalid logout_url_pattern '{}': {e}",
                    config.logout.logout_url_pattern
                ))
            })?;

        let default_policy = resolve_policy(
            &clients,
            &authorizers,
            &matchers,
            &SecurityOptions::from(&config.security),
        )?;

        let timeout = config.blocking_timeout();
        let session_store = self
            .session_store
            .unwrap_or_else(|| Arc::new(MemorySessionStore::new()));
        let ticket_store = self
            .ticket_store
            .unwrap_or_else(|| Arc::new(MemoryTicketStore::new().with_ttl(config.session.ttl())));
        let codec = self.codec.unwrap_or_else(|| Arc::new(FramedJsonCodec));
        let adapter = self.adapter.unwrap_or_else(|| {
            Arc::new(DefaultHttpActionAdapter::new(config.responses.clone()))
        });
        let correlator = LogoutCorrelator::new(
            TicketRegistry::new(ticket_store, timeout),
            session_store.clone(),
            codec.clone(),
            timeout,
            config.session.ttl(),
            config.single_logout.destroy_session,
        )?;

        log::info!(
            "Security engine ready with {} client(s), {} authorizer(s), {} matcher(s)",
            clients.len(),
            authorizers.len(),
            matchers.len()
        );

        Ok(SecurityEngine {
            inner: Arc::new(EngineInner {
                config,
                clients,
                authorizers,
                matchers,
                session_store,
                correlator,
                adapter,
                codec,
                logout_pattern,
                default_policy,
            }),
        })
    }
}

fn validate_callback_url(callback_url: &str) -> Result<()> {
    if callback_url.starts_with('/') {
        return Ok(());
    }
    url::Url::parse(callback_url)
        .map(|_| ())
        .map_err(|e| Error::config(format!("invalid callback_url '{callback_url}': {e}")))
}

fn resolve_policy(
    clients: &Clients,
    authorizers: &HashMap<String, Arc<dyn Authorizer>>,
    matchers: &HashMap<String, Arc<dyn Matcher>>,
    options: &SecurityOptions,
) -> Result<SecurityPolicy> {
    let clients = clients.select(&options.clients)?;
    let authorizers = options
        .authorizers
        .iter()
        .map(|name| {
            authorizers
                .get(&name.to_ascii_lowercase())
                .cloned()
                .ok_or_else(|| Error::config(format!("unknown authorizer '{name}'")))
        })
        .collect::<Result<Vec<_>>>()?;
    let matchers = options
        .matchers
        .iter()
        .map(|name| {
            matchers
                .get(&name.to_ascii_lowercase())
                .cloned()
                .ok_or_else(|| Error::config(format!("unknown matcher '{name}'")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(SecurityPolicy {
        clients,
        authorizers,
        matchers,
        multi_profile: options.multi_profile,
        ajax_aware: options.ajax_aware,
    })
}
