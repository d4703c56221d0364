//! Request/response view used by the security flows.
//!
//! [`WebContext`] exposes the parts of an inbound request the flows need
//! (method, absolute URL, headers, parameters, cookies, session) and
//! buffers the outbound status, headers and body until the flow completes.

use std::collections::BTreeMap;

use axum::body::{Body, Bytes};
use cookie::Cookie;
use http::header::{CONTENT_TYPE, HOST};
use http::request::Parts;
use http::uri::Authority;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};

use crate::error::{Error, Result};
use crate::session::Session;

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const REQUESTED_WITH: &str = "x-requested-with";

/// The request as seen by the security flows.
#[derive(Debug)]
pub struct WebContext {
    method: Method,
    scheme: String,
    authority: String,
    host: String,
    port: Option<u16>,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    parameters: BTreeMap<String, Vec<String>>,
    cookies: BTreeMap<String, String>,
    session: Option<Session>,
    response: ResponseBuffer,
}

impl WebContext {
    /// Build a context from request parts.
    ///
    /// `form_body` is the buffered body of a form-encoded POST; its fields
    /// are merged after the query-string parameters.
    pub fn from_parts(parts: &Parts, form_body: Option<&[u8]>) -> Self {
        let scheme = parts
            .headers
            .get(FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_ascii_lowercase())
            .or_else(|| parts.uri.scheme_str().map(str::to_string))
            .unwrap_or_else(|| "http".to_string());

        let authority = parts
            .uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get(HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "localhost".to_string());

        let (host, port) = match authority.parse::<Authority>() {
            Ok(a) => (a.host().to_string(), a.port_u16()),
            Err(_) => (authority.clone(), None),
        };

        let mut parameters: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let query = parts.uri.query().map(str::to_string);
        if let Some(q) = &query {
            collect_pairs(&mut parameters, q.as_bytes());
        }
        if let Some(body) = form_body {
            collect_pairs(&mut parameters, body);
        }

        let cookies = parts
            .headers
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(|c| c.ok())
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();

        Self {
            method: parts.method.clone(),
            scheme,
            authority,
            host,
            port,
            path: parts.uri.path().to_string(),
            query,
            headers: parts.headers.clone(),
            parameters,
            cookies,
            session: parts.extensions.get::<Session>().cloned(),
            response: ResponseBuffer::default(),
        }
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// `http` or `https`, honouring `X-Forwarded-Proto`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host name without port.
    pub fn server_name(&self) -> &str {
        &self.host
    }

    /// Explicit port, or the scheme default.
    pub fn server_port(&self) -> u16 {
        self.port
            .unwrap_or(if self.scheme == "https" { 443 } else { 80 })
    }

    /// Request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Absolute URL: scheme, host, port, path and query.
    pub fn full_url(&self) -> String {
        match &self.query {
            Some(q) => format!("{}://{}{}?{q}", self.scheme, self.authority, self.path),
            None => format!("{}://{}{}", self.scheme, self.authority, self.path),
        }
    }

    /// All request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of a header.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    /// First value of a query or form parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Every value of a query or form parameter.
    pub fn parameter_values(&self, name: &str) -> &[String] {
        self.parameters.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All parameters.
    pub fn parameters(&self) -> &BTreeMap<String, Vec<String>> {
        &self.parameters
    }

    /// Cookie value.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// All cookies.
    pub fn cookies(&self) -> &BTreeMap<String, String> {
        &self.cookies
    }

    /// Whether the request was issued by script (`X-Requested-With`).
    pub fn is_ajax(&self) -> bool {
        self.header(REQUESTED_WITH)
            .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
    }

    /// The request session, if a session layer is installed.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The request session, failing when no session layer is installed.
    pub fn require_session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or_else(|| {
            Error::session("no session on the request; install SessionLayer outside the security routes")
        })
    }

    /// Outbound response buffer.
    pub fn response_mut(&mut self) -> &mut ResponseBuffer {
        &mut self.response
    }

    /// Outbound response buffer.
    pub fn response(&self) -> &ResponseBuffer {
        &self.response
    }

    /// Consume the context into the buffered response.
    pub fn into_response(self) -> axum::response::Response {
        self.response.into_response()
    }
}

/// Whether the headers declare a urlencoded form body.
pub fn is_form_urlencoded(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            v.split(';')
                .next()
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
        })
}

/// Largest form body buffered for parameter parsing.
pub const MAX_FORM_BYTES: usize = 256 * 1024;

/// Split a request, buffering the body when it is a urlencoded form.
///
/// Returns the parts, the buffered form (if any) and a body equivalent to
/// the original, ready to be forwarded.
pub async fn split_form(req: Request<Body>) -> Result<(Parts, Option<Bytes>, Body)> {
    let (parts, body) = req.into_parts();
    if !is_form_urlencoded(&parts.headers) {
        return Ok((parts, None, body));
    }
    let bytes = axum::body::to_bytes(body, MAX_FORM_BYTES)
        .await
        .map_err(|e| Error::internal(format!("failed to read form body: {e}")))?;
    Ok((parts, Some(bytes.clone()), Body::from(bytes)))
}

fn collect_pairs(into: &mut BTreeMap<String, Vec<String>>, input: &[u8]) {
    for (key, value) in url::form_urlencoded::parse(input) {
        into.entry(key.into_owned())
            .or_default()
            .push(value.into_owned());
    }
}

/// Status, headers and body written once by a flow.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    completed: bool,
}

impl ResponseBuffer {
    fn ensure_open(&self) -> Result<()> {
        if self.completed {
            Err(Error::ResponseCommitted)
        } else {
            Ok(())
        }
    }

    /// Set the status code.
    pub fn set_status(&mut self, status: StatusCode) -> Result<()> {
        self.ensure_open()?;
        self.status = Some(status);
        Ok(())
    }

    /// Set a header, replacing previous values.
    pub fn set_header(&mut self, name: HeaderName, value: &str) -> Result<()> {
        self.ensure_open()?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::internal(format!("invalid {name} header value: {e}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Append to the body.
    pub fn write_body(&mut self, body: impl AsRef<[u8]>) -> Result<()> {
        self.ensure_open()?;
        self.body.extend_from_slice(body.as_ref());
        Ok(())
    }

    /// Seal the response. Any later write fails.
    pub fn complete(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.completed = true;
        Ok(())
    }

    /// Whether the response was sealed.
    pub fn is_complete(&self) -> bool {
        self.completed
    }

    /// Status written so far.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Headers written so far.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Build the axum response. Status defaults to 200.
    pub fn into_response(self) -> axum::response::Response {
        let mut resp = axum::response::Response::new(Body::from(self.body));
        *resp.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *resp.headers_mut() = self.headers;
        resp
    }
}
