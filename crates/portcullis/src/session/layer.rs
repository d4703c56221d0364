//! Cookie-based session middleware.
//!
//! `SessionLayer` resolves the session named by the request's cookie (or
//! starts a fresh one), places a [`Session`] handle in the request
//! extensions, and after the inner service has answered writes back any
//! unsaved changes and issues or clears the cookie.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::response::IntoResponse;
use cookie::{Cookie, SameSite};
use http::{HeaderMap, HeaderValue, Request, StatusCode};
use tower::{Layer, Service};

use super::{Session, SessionStore};
use crate::config::{ResponseBodies, SessionSettings};

/// Tower `Layer` that attaches a [`Session`] to every request.
#[derive(Clone)]
pub struct SessionLayer {
    store: Arc<dyn SessionStore>,
    settings: SessionSettings,
    timeout: Duration,
    error_body: Arc<str>,
}

impl SessionLayer {
    /// Create a session layer over the given store.
    pub fn new(store: Arc<dyn SessionStore>, settings: SessionSettings, timeout: Duration) -> Self {
        Self {
            store,
            settings,
            timeout,
            error_body: ResponseBodies::default().error_body.into(),
        }
    }

    /// Body of the 500 answered when the store fails.
    pub fn with_error_body(mut self, body: impl Into<String>) -> Self {
        self.error_body = body.into().into();
        self
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            store: self.store.clone(),
            settings: self.settings.clone(),
            timeout: self.timeout,
            error_body: self.error_body.clone(),
        }
    }
}

/// Tower `Service` produced by [`SessionLayer`].
#[derive(Clone)]
pub struct SessionService<S> {
    inner: S,
    store: Arc<dyn SessionStore>,
    settings: SessionSettings,
    timeout: Duration,
    error_body: Arc<str>,
}

impl<S> Service<Request<Body>> for SessionService<S>
where
    S: Service<Request<Body>, Error = Infallible> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Future: Send,
{
    type Response = axum::response::Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let store = self.store.clone();
        let settings = self.settings.clone();
        let timeout = self.timeout;
        let error_body = self.error_body.clone();
        let cookie_id = session_id_from_headers(req.headers(), &settings.cookie_name);

        Box::pin(async move {
            let session = match open_session(cookie_id.as_deref(), store, timeout, &settings).await
            {
                Ok(session) => session,
                Err(e) => {
                    log::error!("Failed to load session: {e}");
                    return Ok(internal_error(&error_body));
                }
            };
            req.extensions_mut().insert(session.clone());

            let mut resp = inner
                .call(req)
                .await
                .unwrap_or_else(|infallible| match infallible {})
                .into_response();

            if let Err(e) = session.save().await {
                log::error!("Failed to save session {}: {e}", session.id());
                return Ok(internal_error(&error_body));
            }

            if let Some(cookie) = cookie_update(&session, cookie_id.as_deref(), &settings) {
                match HeaderValue::from_str(&cookie.to_string()) {
                    Ok(value) => {
                        resp.headers_mut().append(http::header::SET_COOKIE, value);
                    }
                    Err(e) => log::warn!("Could not encode session cookie: {e}"),
                }
            }
            Ok(resp)
        })
    }
}

async fn open_session(
    cookie_id: Option<&str>,
    store: Arc<dyn SessionStore>,
    timeout: Duration,
    settings: &SessionSettings,
) -> crate::error::Result<Session> {
    let ttl = settings.ttl();
    if let Some(id) = cookie_id {
        if let Some(session) = Session::load(id, store.clone(), timeout, ttl).await? {
            return Ok(session);
        }
        log::debug!("Session {id} not found, starting a new one");
    }
    Ok(Session::new(store, timeout, ttl))
}

/// Read the session id from the `Cookie` headers.
pub fn session_id_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(http::header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(|parsed| parsed.ok())
        .find(|cookie| cookie.name() == cookie_name)
        .map(|cookie| cookie.value().to_string())
}

fn cookie_update(
    session: &Session,
    cookie_id: Option<&str>,
    settings: &SessionSettings,
) -> Option<Cookie<'static>> {
    if session.is_destroyed() {
        return cookie_id.map(|_| {
            let mut cookie = Cookie::build((settings.cookie_name.clone(), ""))
                .path(settings.cookie_path.clone())
                .build();
            cookie.make_removal();
            cookie
        });
    }
    let id = session.id();
    if !session.is_persisted() || cookie_id == Some(id.as_str()) {
        return None;
    }
    Some(
        Cookie::build((settings.cookie_name.clone(), id))
            .path(settings.cookie_path.clone())
            .http_only(settings.http_only)
            .secure(settings.secure)
            .same_site(SameSite::Lax)
            .build(),
    )
}

fn internal_error(body: &str) -> axum::response::Response {
    (StatusCode::INTERNAL_SERVER_ERROR, body.to_string()).into_response()
}
