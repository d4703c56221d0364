//! User-initiated application logout.

use axum::body::Body;
use axum::extract::State;
use axum::response::Response;
use http::Request;

use crate::action::HttpAction;
use crate::context::{WebContext, split_form};
use crate::engine::SecurityEngine;
use crate::error::Result;

/// Parameter carrying the caller's post-logout target.
pub const LOGOUT_URL_PARAMETER: &str = "url";

/// Axum handler for the logout endpoint.
///
/// Profiles are removed from the session along with its single-logout
/// ticket, and the session is destroyed when configured. The browser is
/// then sent to the `url` parameter if it fully matches the allow-list,
/// otherwise to the configured default. With neither, the answer is an
/// empty 200.
pub async fn logout_handler(State(engine): State<SecurityEngine>, req: Request<Body>) -> Response {
    let (parts, form, _) = match split_form(req).await {
        Ok(split) => split,
        Err(e) => return engine.fail_bare(&e),
    };
    let ctx = WebContext::from_parts(&parts, form.as_deref());
    match perform_logout(&engine, &ctx).await {
        Ok(action) => engine.respond(ctx, action),
        Err(e) => engine.fail(ctx, &e),
    }
}

async fn perform_logout(engine: &SecurityEngine, ctx: &WebContext) -> Result<HttpAction> {
    let settings = &engine.config().logout;

    if settings.local_logout {
        match ctx.session() {
            Some(session) => {
                engine.profile_manager(Some(session.clone())).logout();
                engine.correlator().remove_for_session(session).await?;
                if settings.destroy_session {
                    session.destroy();
                }
                session.save().await?;
                log::info!("Logged out session {}", session.id());
            }
            None => log::debug!("Logout without a session, nothing to clear"),
        }
    }

    Ok(logout_target(engine, ctx))
}

fn logout_target(engine: &SecurityEngine, ctx: &WebContext) -> HttpAction {
    let requested = ctx.parameter(LOGOUT_URL_PARAMETER);
    if let Some(url) = requested {
        if engine.logout_pattern().is_match(url) {
            return HttpAction::Redirect(url.to_string());
        }
        log::warn!("Ignoring logout target {url}: it does not match the allowed pattern");
    }
    match &engine.config().logout.default_url {
        Some(default_url) => HttpAction::Redirect(default_url.clone()),
        None => HttpAction::Ok(String::new()),
    }
}
