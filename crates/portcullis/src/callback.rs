//! Completes a redirect-based login on the provider's callback URL.

use axum::body::Body;
use axum::extract::State;
use axum::response::Response;
use http::Request;

use crate::action::HttpAction;
use crate::client::{CLIENT_NAME_PARAMETER, Client, Credentials};
use crate::context::{WebContext, split_form};
use crate::engine::SecurityEngine;
use crate::error::{Error, Result};
use crate::profile_manager::oauth2_state_key;
use crate::single_logout::{LOGOUT_REQUEST_PARAMETER, process_logout_request};

/// Axum handler for the callback endpoint.
///
/// On success the profile is saved in the session, the session is written
/// to its store, and only then is the browser redirected to the URL it
/// originally requested. Credentials the provider did not confirm send the
/// browser to the default URL with the session untouched.
pub async fn callback_handler(
    State(engine): State<SecurityEngine>,
    req: Request<Body>,
) -> Response {
    let (parts, form, _) = match split_form(req).await {
        Ok(split) => split,
        Err(e) => return engine.fail_bare(&e),
    };
    let ctx = WebContext::from_parts(&parts, form.as_deref());

    if let Some(payload) = ctx.parameter(LOGOUT_REQUEST_PARAMETER).map(str::to_string) {
        return process_logout_request(&engine, ctx, &payload).await;
    }

    match complete_login(&engine, &ctx).await {
        Ok(action) => engine.respond(ctx, action),
        Err(e) => engine.fail(ctx, &e),
    }
}

async fn complete_login(engine: &SecurityEngine, ctx: &WebContext) -> Result<HttpAction> {
    let session = ctx.require_session()?.clone();
    let settings = &engine.config().callback;
    let client = resolve_client(engine, ctx)?;

    let credentials = match client.extract_credentials(ctx) {
        Ok(Some(credentials)) => credentials,
        Ok(None) => {
            log::warn!("Callback for client {} carried no credentials", client.name());
            return Ok(HttpAction::Redirect(settings.default_url.clone()));
        }
        Err(e) => {
            log::warn!("Callback for client {} failed: {e}", client.name());
            return Ok(HttpAction::Redirect(settings.default_url.clone()));
        }
    };

    let profile = match client.authenticate(&credentials).await {
        Ok(profile) => profile,
        Err(Error::Credentials(e)) => {
            log::warn!("Client {} rejected {credentials:?}: {e}", client.name());
            return Ok(HttpAction::Redirect(settings.default_url.clone()));
        }
        Err(e) => return Err(e),
    };
    log::info!("Client {} authenticated {}", client.name(), profile.id);

    let mut manager = engine.profile_manager(Some(session.clone()));
    manager.save(true, profile, settings.multi_profile)?;
    session.remove(&oauth2_state_key(client.name()));

    let correlator = engine.correlator();
    if settings.renew_session {
        let old_id = session.regenerate_id();
        correlator.renew_session(&old_id, &session).await?;
    }
    if let Credentials::Ticket(ticket) = &credentials {
        correlator.record_session(&session, ticket).await?;
    }

    let target = manager
        .take_requested_url()
        .unwrap_or_else(|| settings.default_url.clone());
    session.save().await?;
    log::debug!("Login complete, redirecting to {target}");
    Ok(HttpAction::Redirect(target))
}

fn resolve_client<'e>(engine: &'e SecurityEngine, ctx: &WebContext) -> Result<&'e Client> {
    let clients = engine.clients();
    match ctx.parameter(CLIENT_NAME_PARAMETER) {
        Some(name) => clients
            .find(name)
            .filter(|c| c.is_indirect())
            .ok_or_else(|| Error::config(format!("callback for unknown indirect client '{name}'"))),
        None => clients
            .first_indirect()
            .ok_or_else(|| Error::config("callback reached without any indirect client configured")),
    }
}
