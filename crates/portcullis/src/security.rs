//! Protect routes: the security state machine as Tower middleware.
//!
//! For each request the layer decides, in order:
//!
//! 1. whether security applies at all (matchers);
//! 2. which profiles are present, from the session for indirect clients or
//!    by verifying in-request credentials for direct clients;
//! 3. whether those profiles are authorized (403 otherwise);
//! 4. with no profile, how to challenge: a provider redirect for an
//!    indirect client, a 401 for a direct one.
//!
//! Granted requests reach the inner service with the [`ProfileSet`] in the
//! request extensions.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::response::IntoResponse;
use http::Request;
use tower::{Layer, Service};

use crate::action::HttpAction;
use crate::authorizer::Authorizer;
use crate::client::Client;
use crate::config::SecuritySection;
use crate::context::{WebContext, split_form};
use crate::engine::SecurityEngine;
use crate::error::{Error, Result};
use crate::matcher::Matcher;
use crate::profile::ProfileSet;
use crate::profile_manager::oauth2_state_key;

/// Route-specific selection of clients, authorizers and matchers, by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityOptions {
    /// Client names; empty means every configured client.
    pub clients: Vec<String>,
    /// Authorizer names; all must pass.
    pub authorizers: Vec<String>,
    /// Matcher names; all must match for security to apply.
    pub matchers: Vec<String>,
    /// Keep one profile per client.
    pub multi_profile: bool,
    /// Answer AJAX requests with 401 instead of a redirect.
    pub ajax_aware: bool,
}

impl From<&SecuritySection> for SecurityOptions {
    fn from(section: &SecuritySection) -> Self {
        Self {
            clients: section.clients.clone(),
            authorizers: section.authorizers.clone(),
            matchers: section.matchers.clone(),
            multi_profile: section.multi_profile,
            ajax_aware: section.ajax_aware,
        }
    }
}

/// [`SecurityOptions`] with every name resolved.
#[derive(Clone)]
pub(crate) struct SecurityPolicy {
    pub(crate) clients: Vec<Client>,
    pub(crate) authorizers: Vec<Arc<dyn Authorizer>>,
    pub(crate) matchers: Vec<Arc<dyn Matcher>>,
    pub(crate) multi_profile: bool,
    pub(crate) ajax_aware: bool,
}

/// What the state machine decided for a request.
enum Decision {
    /// Security does not apply.
    Bypass,
    /// Authenticated and authorized.
    Grant(ProfileSet),
    /// Answer without reaching the route.
    Deny(HttpAction),
}

/// Tower `Layer` protecting the services it wraps.
#[derive(Clone)]
pub struct SecurityLayer {
    engine: SecurityEngine,
    policy: Arc<SecurityPolicy>,
}

impl SecurityLayer {
    pub(crate) fn new(engine: SecurityEngine, policy: SecurityPolicy) -> Self {
        Self {
            engine,
            policy: Arc::new(policy),
        }
    }
}

impl<S> Layer<S> for SecurityLayer {
    type Service = SecurityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityService {
            inner,
            engine: self.engine.clone(),
            policy: self.policy.clone(),
        }
    }
}

/// Tower `Service` produced by [`SecurityLayer`].
#[derive(Clone)]
pub struct SecurityService<S> {
    inner: S,
    engine: SecurityEngine,
    policy: Arc<SecurityPolicy>,
}

impl<S> Service<Request<Body>> for SecurityService<S>
where
    S: Service<Request<Body>, Error = Infallible> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send,
{
    type Response = axum::response::Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let engine = self.engine.clone();
        let policy = self.policy.clone();

        Box::pin(async move {
            let (parts, form, body) = match split_form(req).await {
                Ok(split) => split,
                Err(e) => return Ok(engine.fail_bare(&e)),
            };
            let ctx = WebContext::from_parts(&parts, form.as_deref());
            let mut req = Request::from_parts(parts, body);

            match decide(&engine, &policy, &ctx).await {
                Ok(Decision::Bypass) => {}
                Ok(Decision::Grant(profiles)) => {
                    log::debug!("Authorised to view resource {}", ctx.path());
                    req.extensions_mut().insert(profiles);
                }
                Ok(Decision::Deny(action)) => return Ok(engine.respond(ctx, action)),
                Err(e) => return Ok(engine.fail(ctx, &e)),
            }

            let resp = inner
                .call(req)
                .await
                .unwrap_or_else(|infallible| match infallible {});
            Ok(resp.into_response())
        })
    }
}

async fn decide(
    engine: &SecurityEngine,
    policy: &SecurityPolicy,
    ctx: &WebContext,
) -> Result<Decision> {
    if !policy.matchers.iter().all(|m| m.matches(ctx)) {
        log::debug!("Security does not apply to {}", ctx.path());
        return Ok(Decision::Bypass);
    }

    let Some(first) = policy.clients.first() else {
        return Err(Error::config("no client available for this route"));
    };

    let mut manager = engine.profile_manager(ctx.session().cloned());
    let all_clients = engine.clients();
    manager.retain_session_clients(|name| all_clients.is_indirect(name))?;

    let load_from_session = first.is_indirect();
    let mut profiles = manager.load(load_from_session)?;

    if profiles.is_empty() {
        for client in policy.clients.iter().filter(|c| !c.is_indirect()) {
            let credentials = match client.extract_credentials(ctx) {
                Ok(Some(credentials)) => credentials,
                Ok(None) => continue,
                Err(e) => {
                    log::debug!("Client {} could not read credentials: {e}", client.name());
                    continue;
                }
            };
            match client.authenticate(&credentials).await {
                Ok(profile) => {
                    log::debug!("Client {} authenticated {}", client.name(), profile.id);
                    manager.save(false, profile, policy.multi_profile)?;
                    if !policy.multi_profile {
                        break;
                    }
                }
                Err(Error::Credentials(e)) => {
                    log::debug!("Client {} rejected {credentials:?}: {e}", client.name());
                }
                Err(e) => return Err(e),
            }
        }
        profiles = manager.load(false)?;
    }

    if !profiles.is_empty() {
        if policy
            .authorizers
            .iter()
            .all(|a| a.is_authorized(ctx, &profiles))
        {
            return Ok(Decision::Grant(profiles));
        }
        log::debug!("Profiles are not authorized for {}", ctx.path());
        return Ok(Decision::Deny(HttpAction::Forbidden));
    }

    if first.is_indirect() {
        let session = ctx.require_session()?;
        manager.set_requested_url(&ctx.full_url())?;
        if policy.ajax_aware && ctx.is_ajax() {
            log::debug!("AJAX request to {}, answering 401", ctx.path());
            return Ok(Decision::Deny(HttpAction::Unauthorized { challenge: None }));
        }
        let redirect = first.redirect(&engine.config().callback_url)?;
        if let Some(state) = &redirect.state {
            session.set(&oauth2_state_key(first.name()), state)?;
        }
        log::debug!("Redirecting to {} for client {}", redirect.location, first.name());
        return Ok(Decision::Deny(HttpAction::Redirect(redirect.location)));
    }

    Ok(Decision::Deny(HttpAction::Unauthorized {
        challenge: first.challenge(),
    }))
}
