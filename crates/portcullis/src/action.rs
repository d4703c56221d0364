//! Turning flow outcomes into HTTP responses.

use http::StatusCode;
use http::header::{CONTENT_TYPE, LOCATION, WWW_AUTHENTICATE};

use crate::config::ResponseBodies;
use crate::context::WebContext;
use crate::error::Result;

/// Outcome of a flow that must be written to the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpAction {
    /// 200 with a body.
    Ok(String),
    /// 302 to the location.
    Redirect(String),
    /// 401, with an optional `WWW-Authenticate` challenge.
    Unauthorized {
        /// Challenge header value.
        challenge: Option<String>,
    },
    /// 403.
    Forbidden,
    /// 500. Detail stays in the server log.
    InternalError,
}

impl HttpAction {
    /// Status code the action maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            HttpAction::Ok(_) => StatusCode::OK,
            HttpAction::Redirect(_) => StatusCode::FOUND,
            HttpAction::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            HttpAction::Forbidden => StatusCode::FORBIDDEN,
            HttpAction::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Writes an [`HttpAction`] onto the context's response.
pub trait HttpActionAdapter: Send + Sync + 'static {
    /// Write and complete the response.
    fn adapt(&self, action: HttpAction, ctx: &mut WebContext) -> Result<()>;
}

/// Writes the configured bodies.
#[derive(Debug, Clone, Default)]
pub struct DefaultHttpActionAdapter {
    bodies: ResponseBodies,
}

impl DefaultHttpActionAdapter {
    /// Create an adapter with the given bodies.
    pub fn new(bodies: ResponseBodies) -> Self {
        Self { bodies }
    }
}

impl HttpActionAdapter for DefaultHttpActionAdapter {
    fn adapt(&self, action: HttpAction, ctx: &mut WebContext) -> Result<()> {
        let response = ctx.response_mut();
        response.set_status(action.status())?;
        match action {
            HttpAction::Ok(body) => {
                response.write_body(body)?;
            }
            HttpAction::Redirect(location) => {
                response.set_header(LOCATION, &location)?;
            }
            HttpAction::Unauthorized { challenge } => {
                if let Some(challenge) = challenge {
                    response.set_header(WWW_AUTHENTICATE, &challenge)?;
                }
                response.set_header(CONTENT_TYPE, "text/plain; charset=utf-8")?;
                response.write_body(&self.bodies.unauthorized_body)?;
            }
            HttpAction::Forbidden => {
                response.set_header(CONTENT_TYPE, "text/plain; charset=utf-8")?;
                response.write_body(&self.bodies.forbidden_body)?;
            }
            HttpAction::InternalError => {
                response.set_header(CONTENT_TYPE, "text/plain; charset=utf-8")?;
                response.write_body(&self.bodies.error_body)?;
            }
        }
        response.complete()
    }
}
