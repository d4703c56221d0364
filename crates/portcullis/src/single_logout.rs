//! Provider-initiated (single) logout.
//!
//! At login the provider ticket is recorded against the local session id.
//! When the provider later announces a logout, either through the browser
//! (front channel) or with a direct POST (back channel), the ticket is
//! pulled out of the payload, the correlated session is loaded and its
//! profiles are stripped, and the mapping is removed. Processing the same
//! ticket twice is a logged no-op.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::DeflateDecoder;
use http::{Method, Request};
use regex::Regex;

use crate::action::HttpAction;
use crate::codec::IdentityCodec;
use crate::context::{WebContext, split_form};
use crate::engine::SecurityEngine;
use crate::error::{CredentialsError, Error, Result};
use crate::profile_manager::{CAS_TICKET_KEY, ProfileManager};
use crate::session::{Session, SessionStore};
use crate::ticket::TicketRegistry;

/// Parameter carrying the provider's logout payload.
pub const LOGOUT_REQUEST_PARAMETER: &str = "logoutRequest";

// Tolerates namespace prefixes, attributes and surrounding whitespace.
const SESSION_INDEX_PATTERN: &str =
    r"<(?:[\w.-]+:)?SessionIndex(?:\s[^>]*)?>\s*([^<\s]+)\s*</(?:[\w.-]+:)?SessionIndex\s*>";

/// Correlates provider tickets with local sessions.
#[derive(Clone)]
pub struct LogoutCorrelator {
    tickets: TicketRegistry,
    sessions: Arc<dyn SessionStore>,
    codec: Arc<dyn IdentityCodec>,
    timeout: Duration,
    ttl: Duration,
    destroy_session: bool,
    session_index: Regex,
}

impl LogoutCorrelator {
    /// Create a correlator.
    pub fn new(
        tickets: TicketRegistry,
        sessions: Arc<dyn SessionStore>,
        codec: Arc<dyn IdentityCodec>,
        timeout: Duration,
        ttl: Duration,
        destroy_session: bool,
    ) -> Result<Self> {
        let session_index = Regex::new(SESSION_INDEX_PATTERN)
            .map_err(|e| Error::internal(format!("session index pattern: {e}")))?;
        Ok(Self {
            tickets,
            sessions,
            codec,
            timeout,
            ttl,
            destroy_session,
            session_index,
        })
    }

    /// Record the ticket against the session after a successful login,
    /// replacing the mapping of any ticket the session held before.
    pub async fn record_session(&self, session: &Session, ticket: &str) -> Result<()> {
        let session_id = session.id();
        if let Some(previous) = session.get_str(CAS_TICKET_KEY).filter(|p| p != ticket) {
            if self.tickets.remove(&previous).await?.is_some() {
                log::debug!("Dropped logout ticket {previous} of session {session_id}");
            }
        }
        session.set(CAS_TICKET_KEY, ticket)?;
        self.tickets.put(ticket, &session_id).await?;
        log::debug!("Recorded logout ticket {ticket} for session {session_id}");
        Ok(())
    }

    /// Move the session's ticket to its new id after a renewal.
    pub async fn renew_session(&self, old_id: &str, session: &Session) -> Result<()> {
        let Some(ticket) = session.get_str(CAS_TICKET_KEY) else {
            return Ok(());
        };
        let new_id = session.id();
        self.tickets.remove(&ticket).await?;
        self.tickets.put(&ticket, &new_id).await?;
        log::debug!("Moved logout ticket {ticket} from session {old_id} to {new_id}");
        Ok(())
    }

    /// Front-channel logout: the browser carrying `session` delivered the
    /// ticket.
    ///
    /// When the ticket belongs to another session it is handled as a
    /// back-channel logout. Returns whether a session was logged out.
    pub async fn destroy_session_front(&self, session: &Session, ticket: &str) -> Result<bool> {
        if session.get_str(CAS_TICKET_KEY).as_deref() != Some(ticket) {
            log::debug!("Logout ticket {ticket} does not belong to the current session");
            return self.destroy_session_back(ticket).await;
        }
        self.strip(session);
        session.save().await?;
        self.tickets.remove(ticket).await?;
        log::info!("Front-channel logout completed for ticket {ticket}");
        Ok(true)
    }

    /// Back-channel logout: the provider posted the ticket directly.
    ///
    /// Returns whether a mapping was found. A missing mapping (expired, or
    /// already processed) is logged and otherwise ignored.
    pub async fn destroy_session_back(&self, ticket: &str) -> Result<bool> {
        let Some(session_id) = self.tickets.get(ticket).await? else {
            log::error!("No session recorded for logout ticket {ticket}, possibly expired");
            return Ok(false);
        };
        match Session::load(&session_id, self.sessions.clone(), self.timeout, self.ttl).await? {
            Some(session) => {
                self.strip(&session);
                session.save().await?;
                log::info!("Back-channel logout completed for session {session_id}");
            }
            None => log::warn!("Session {session_id} for logout ticket {ticket} no longer exists"),
        }
        self.tickets.remove(ticket).await?;
        Ok(true)
    }

    /// Drop the mapping of a session logging out locally.
    pub async fn remove_for_session(&self, session: &Session) -> Result<()> {
        if let Some(ticket) = session.get_str(CAS_TICKET_KEY) {
            session.remove(CAS_TICKET_KEY);
            if self.tickets.remove(&ticket).await?.is_none() {
                log::debug!("Logout ticket {ticket} was already removed");
            }
        }
        Ok(())
    }

    /// Pull the ticket out of a logout payload.
    pub fn extract_ticket(&self, payload: &str) -> Option<String> {
        self.session_index
            .captures(payload)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn strip(&self, session: &Session) {
        ProfileManager::new(Some(session.clone()), self.codec.clone()).logout();
        session.remove(CAS_TICKET_KEY);
        if self.destroy_session {
            session.destroy();
        }
    }
}

/// Turn a logout payload into XML.
///
/// Back-channel payloads are raw XML. Front-channel payloads are base64
/// of raw-deflated XML; plain base64 is accepted too.
pub fn decode_logout_payload(payload: &str) -> std::result::Result<String, CredentialsError> {
    let trimmed = payload.trim();
    if trimmed.starts_with('<') {
        return Ok(trimmed.to_string());
    }
    let bytes = STANDARD
        .decode(trimmed)
        .map_err(|_| CredentialsError::Provider("logout request is neither XML nor base64".into()))?;
    let mut inflated = String::new();
    if DeflateDecoder::new(bytes.as_slice())
        .read_to_string(&mut inflated)
        .is_ok()
    {
        return Ok(inflated);
    }
    String::from_utf8(bytes)
        .map_err(|_| CredentialsError::Provider("logout request is not valid UTF-8".into()))
}

/// Handle a request carrying `logoutRequest`.
///
/// POSTs are back-channel notifications; anything else is front channel
/// and may act on the caller's own session.
pub(crate) async fn process_logout_request(
    engine: &SecurityEngine,
    ctx: WebContext,
    payload: &str,
) -> Response {
    let correlator = engine.correlator();
    let xml = match decode_logout_payload(payload) {
        Ok(xml) => xml,
        Err(e) => {
            log::warn!("Ignoring logout request: {e}");
            return engine.respond(ctx, HttpAction::Ok(String::new()));
        }
    };
    let Some(ticket) = correlator.extract_ticket(&xml) else {
        log::warn!("Ignoring logout request without a session index");
        return engine.respond(ctx, HttpAction::Ok(String::new()));
    };

    let front_session = (*ctx.method() != Method::POST)
        .then(|| ctx.session().cloned())
        .flatten();
    let outcome = match &front_session {
        Some(session) => correlator.destroy_session_front(session, &ticket).await,
        None => correlator.destroy_session_back(&ticket).await,
    };
    match outcome {
        Ok(_) => engine.respond(ctx, HttpAction::Ok(String::new())),
        Err(e) => engine.fail(ctx, &e),
    }
}

/// Axum handler for a dedicated back-channel logout endpoint.
pub async fn back_channel_logout_handler(
    State(engine): State<SecurityEngine>,
    req: Request<Body>,
) -> Response {
    let (parts, form, _) = match split_form(req).await {
        Ok(split) => split,
        Err(e) => return engine.fail_bare(&e),
    };
    let ctx = WebContext::from_parts(&parts, form.as_deref());
    match ctx.parameter(LOGOUT_REQUEST_PARAMETER).map(str::to_string) {
        Some(payload) => process_logout_request(&engine, ctx, &payload).await,
        None => {
            log::debug!("Back-channel logout called without {LOGOUT_REQUEST_PARAMETER}");
            engine.respond(ctx, HttpAction::Ok(String::new()))
        }
    }
}
