//! Common test utilities and harness for portcullis integration tests.

use std::io::Write;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::response::Response;
use axum::routing::get;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use http::header::{COOKIE, HOST, LOCATION, SET_COOKIE};
use http::Request;
use portcullis::{
    Authenticated, CredentialsError, Credentials, FnAuthenticator, MemorySessionStore,
    MemoryTicketStore, SecurityConfig, SecurityEngine, SecurityOptions, UserProfile,
    UsernameEqualsPasswordAuthenticator, security_routes,
};
use tower::ServiceExt;

/// Configuration shared by every integration test.
pub const CONFIG: &str = r#"
callback_url = "http://localhost:8080/callback"

[logout]
default_url = "/"

[routes]
back_channel_logout_path = "/logout/back-channel"

[security]
clients = ["CasClient"]
matchers = ["excludePublic"]

[[clients]]
name = "BasicClient"
kind = "basic"
realm = "portcullis"

[[clients]]
name = "ApiKey"
kind = "header"
header_name = "X-Api-Key"

[[clients]]
name = "CasClient"
kind = "cas"
login_url = "https://cas.example.com/login"

[[clients]]
name = "OtherCas"
kind = "cas"
login_url = "https://sso.example.org/cas/login"

[[authorizers]]
name = "admin"
kind = "require_all_permissions"
permissions = ["admin"]

[[matchers]]
name = "excludePublic"
kind = "path"
exclude_paths = ["/public"]
exclude_patterns = ["/assets/.*"]
"#;

/// Test harness for integration tests.
///
/// Builds the engine from [`CONFIG`] over in-memory stores and mounts:
/// `/api/me` (Basic, stateless), `/api/all` (API key and Basic, multi
/// profile), `/private`, `/profiles` and `/public` (CAS, with the public
/// exclusions), `/admin` (CAS plus the `admin` authorizer), and the
/// security endpoints.
pub struct TestHarness {
    /// Engine under test.
    pub engine: SecurityEngine,
    /// Session store behind the session layer.
    pub sessions: Arc<MemorySessionStore>,
    /// Ticket map behind the correlator.
    pub tickets: Arc<MemoryTicketStore>,
    /// The assembled application.
    pub app: Router,
}

impl TestHarness {
    /// Creates the default harness.
    pub fn new() -> Self {
        Self::with_config(SecurityConfig::from_toml_str(CONFIG).expect("valid config"))
    }

    /// Creates a harness over a custom configuration.
    pub fn with_config(config: SecurityConfig) -> Self {
        let sessions = Arc::new(MemorySessionStore::new());
        let tickets = Arc::new(MemoryTicketStore::new());
        let engine = SecurityEngine::builder(config)
            .authenticator("BasicClient", UsernameEqualsPasswordAuthenticator)
            .authenticator("ApiKey", FnAuthenticator::new(validate_api_key))
            .authenticator("CasClient", FnAuthenticator::new(validate_ticket))
            .authenticator("OtherCas", FnAuthenticator::new(validate_ticket))
            .session_store(sessions.clone())
            .ticket_store(tickets.clone())
            .build()
            .expect("engine builds");

        let stateless = Router::new().route("/api/me", get(whoami)).layer(
            engine
                .security_layer_with(SecurityOptions {
                    clients: vec!["BasicClient".into()],
                    ..SecurityOptions::default()
                })
                .expect("basic options"),
        );
        let multi = Router::new().route("/api/all", get(client_names)).layer(
            engine
                .security_layer_with(SecurityOptions {
                    clients: vec!["ApiKey".into(), "BasicClient".into()],
                    multi_profile: true,
                    ..SecurityOptions::default()
                })
                .expect("multi-profile options"),
        );
        let stateful = Router::new()
            .route("/private", get(whoami))
            .route("/profiles", get(client_names))
            .route("/public", get(|| async { "public" }))
            .route("/assets/app.js", get(|| async { "asset" }))
            .layer(engine.security_layer());
        let admin = Router::new().route("/admin", get(whoami)).layer(
            engine
                .security_layer_with(SecurityOptions {
                    clients: vec!["CasClient".into()],
                    authorizers: vec!["admin".into()],
                    ..SecurityOptions::default()
                })
                .expect("admin options"),
        );

        let app = Router::new()
            .merge(stateless)
            .merge(multi)
            .merge(stateful)
            .merge(admin)
            .merge(security_routes(&engine))
            .layer(engine.session_layer());

        Self {
            engine,
            sessions,
            tickets,
            app,
        }
    }

    /// Sends a request through the application.
    pub async fn send(&self, req: Request<Body>) -> Response {
        self.app.clone().oneshot(req).await.expect("infallible")
    }

    /// Sends a GET, with the session cookie when given.
    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri).header(HOST, "localhost:8080");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Runs the CAS login round trip and returns the session cookie.
    pub async fn login(&self, ticket: &str) -> String {
        let challenge = self.get("/private", None).await;
        let cookie = session_cookie(&challenge).expect("challenge sets a session cookie");
        self.callback("CasClient", ticket, &cookie).await
    }

    /// Completes a login at the callback for `client` and returns the
    /// renewed session cookie.
    pub async fn callback(&self, client: &str, ticket: &str, cookie: &str) -> String {
        let callback = self
            .get(
                &format!("/callback?client_name={client}&ticket={ticket}"),
                Some(cookie),
            )
            .await;
        session_cookie(&callback).expect("callback renews the session cookie")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

async fn whoami(Authenticated(profiles): Authenticated) -> String {
    profiles
        .first()
        .map(|p| p.username().to_string())
        .unwrap_or_default()
}

/// Comma-separated client names of the granted profiles.
async fn client_names(Authenticated(profiles): Authenticated) -> String {
    profiles.client_names().collect::<Vec<_>>().join(",")
}

fn validate_api_key(credentials: &Credentials) -> portcullis::Result<UserProfile> {
    match credentials {
        Credentials::Token(key) if key == "key-1" => Ok(UserProfile::new("service")),
        _ => Err(CredentialsError::Invalid("unknown api key".into()).into()),
    }
}

fn validate_ticket(credentials: &Credentials) -> portcullis::Result<UserProfile> {
    match credentials {
        Credentials::Ticket(ticket) if ticket.starts_with("ST-ADMIN-") => Ok(UserProfile::new(
            "root",
        )
        .with_attribute("username", "root")
        .with_permission("admin")),
        Credentials::Ticket(ticket) if ticket.starts_with("ST-") => Ok(UserProfile::new("jdoe")
            .with_attribute("username", "jdoe")
            .with_permission("read")),
        _ => Err(CredentialsError::Invalid("unknown ticket".into()).into()),
    }
}

/// `name=value` pair of a non-empty session cookie set by the response.
pub fn session_cookie(resp: &Response) -> Option<String> {
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| {
            pair.split_once('=')
                .is_some_and(|(name, value)| name == "portcullis.sid" && !value.is_empty())
        })
        .map(str::to_string)
}

/// `Location` header of a redirect.
pub fn location(resp: &Response) -> String {
    resp.headers()
        .get(LOCATION)
        .expect("redirect has a location")
        .to_str()
        .unwrap()
        .to_string()
}

/// Collects the response body.
pub async fn body_string(resp: Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// `Authorization: Basic` value.
pub fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// SAML-style logout request naming the ticket.
pub fn logout_request(ticket: &str) -> String {
    format!(
        r#"<samlp:LogoutRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="LR-1" Version="2.0" IssueInstant="2026-01-01T00:00:00Z"><saml:NameID xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">@NOT_USED@</saml:NameID><samlp:SessionIndex>{ticket}</samlp:SessionIndex></samlp:LogoutRequest>"#
    )
}

/// Logout request as carried by a front-channel redirect.
pub fn deflated_logout_request(ticket: &str) -> String {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(logout_request(ticket).as_bytes())
        .unwrap();
    STANDARD.encode(encoder.finish().unwrap())
}

/// Form-encodes `logoutRequest=<payload>`.
pub fn logout_form(payload: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("logoutRequest", payload)
        .finish()
}
