//! Clients: how a user is challenged and how credentials are read.
//!
//! A [`Client`] pairs typed [`ClientSettings`] with the [`Authenticator`]
//! that verifies what the client extracts. Protocol engines stay outside
//! this crate; clients only read credentials from the request and build
//! provider redirects.

mod authenticator;

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::Method;

pub use authenticator::{
    Authenticator, BlockingAuthenticator, FnAuthenticator, UsernameEqualsPasswordAuthenticator,
};

use crate::config::ClientSettings;
use crate::context::WebContext;
use crate::error::{CredentialsError, Error, Result};
use crate::profile::UserProfile;
use crate::profile_manager::oauth2_state_key;

/// Parameter carrying the client name on the callback.
pub const CLIENT_NAME_PARAMETER: &str = "client_name";

/// Whether a client verifies in-request or through a provider redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    /// Credentials are in the request itself.
    Direct,
    /// A browser redirect to a provider and a callback are needed.
    Indirect,
}

impl ClientSettings {
    /// Kind of client these settings describe.
    pub fn kind(&self) -> ClientKind {
        match self {
            ClientSettings::Basic { .. }
            | ClientSettings::Header { .. }
            | ClientSettings::Parameter { .. } => ClientKind::Direct,
            ClientSettings::OAuth2 { .. }
            | ClientSettings::Cas { .. }
            | ClientSettings::Form { .. } => ClientKind::Indirect,
        }
    }
}

/// Credentials read from a request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Username and password (Basic, form).
    UsernamePassword {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// Opaque token (header, parameter).
    Token(String),
    /// OAuth2 authorization code.
    AuthorizationCode {
        /// Code to exchange.
        code: String,
        /// Echoed `state`.
        state: Option<String>,
    },
    /// Provider service ticket (CAS).
    Ticket(String),
}

impl Credentials {
    /// Short name of the credential type.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Credentials::UsernamePassword { .. } => "username/password",
            Credentials::Token(_) => "token",
            Credentials::AuthorizationCode { .. } => "authorization code",
            Credentials::Ticket(_) => "ticket",
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::Token(_) => f.debug_tuple("Token").field(&"***").finish(),
            Credentials::AuthorizationCode { .. } => {
                f.debug_struct("AuthorizationCode").finish_non_exhaustive()
            }
            Credentials::Ticket(ticket) => f.debug_tuple("Ticket").field(ticket).finish(),
        }
    }
}

/// Redirect issued to start an indirect login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectAction {
    /// Provider URL.
    pub location: String,
    /// OAuth2 `state` to remember in the session.
    pub state: Option<String>,
}

/// A configured client.
#[derive(Clone)]
pub struct Client {
    name: String,
    settings: ClientSettings,
    authenticator: Arc<dyn Authenticator>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client.
    pub fn new(
        name: impl Into<String>,
        settings: ClientSettings,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            name: name.into(),
            settings,
            authenticator,
        }
    }

    /// Client name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Client settings.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Direct or indirect.
    pub fn kind(&self) -> ClientKind {
        self.settings.kind()
    }

    /// Whether the client needs a provider round trip.
    pub fn is_indirect(&self) -> bool {
        self.kind() == ClientKind::Indirect
    }

    /// `WWW-Authenticate` value sent with a 401, if the scheme has one.
    pub fn challenge(&self) -> Option<String> {
        match &self.settings {
            ClientSettings::Basic { realm } => Some(format!("Basic realm=\"{realm}\"")),
            _ => None,
        }
    }

    /// Read credentials from the request.
    ///
    /// `Ok(None)` means the request carries none for this client.
    pub fn extract_credentials(
        &self,
        ctx: &WebContext,
    ) -> std::result::Result<Option<Credentials>, CredentialsError> {
        match &self.settings {
            ClientSettings::Basic { .. } => {
                match ctx.header(http::header::AUTHORIZATION.as_str()) {
                    Some(value) => parse_basic_auth(value).map(Some),
                    None => Ok(None),
                }
            }
            ClientSettings::Header {
                header_name,
                prefix,
            } => Ok(ctx
                .header(header_name)
                .and_then(|value| value.strip_prefix(prefix.as_str()))
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(|token| Credentials::Token(token.to_string()))),
            ClientSettings::Parameter {
                parameter_name,
                support_get,
                support_post,
            } => {
                let allowed = (*ctx.method() == Method::GET && *support_get)
                    || (*ctx.method() == Method::POST && *support_post);
                Ok(allowed
                    .then(|| ctx.parameter(parameter_name))
                    .flatten()
                    .filter(|token| !token.is_empty())
                    .map(|token| Credentials::Token(token.to_string())))
            }
            ClientSettings::OAuth2 { .. } => self.extract_authorization_code(ctx),
            ClientSettings::Cas { .. } => Ok(ctx
                .parameter("ticket")
                .filter(|t| !t.is_empty())
                .map(|t| Credentials::Ticket(t.to_string()))),
            ClientSettings::Form {
                username_parameter,
                password_parameter,
                ..
            } => match (
                ctx.parameter(username_parameter),
                ctx.parameter(password_parameter),
            ) {
                (Some(username), Some(password)) if !username.is_empty() => {
                    Ok(Some(Credentials::UsernamePassword {
                        username: username.to_string(),
                        password: password.to_string(),
                    }))
                }
                _ => Ok(None),
            },
        }
    }

    fn extract_authorization_code(
        &self,
        ctx: &WebContext,
    ) -> std::result::Result<Option<Credentials>, CredentialsError> {
        if let Some(error) = ctx.parameter("error") {
            let description = ctx.parameter("error_description").unwrap_or_default();
            return Err(CredentialsError::Provider(
                format!("{error} {description}").trim().to_string(),
            ));
        }
        let Some(code) = ctx.parameter("code") else {
            return Ok(None);
        };
        let state = ctx.parameter("state").map(str::to_string);
        let expected = ctx
            .session()
            .and_then(|s| s.get_str(&oauth2_state_key(&self.name)));
        match (&expected, &state) {
            (Some(expected), Some(state)) if expected == state => {}
            (None, _) => {
                return Err(CredentialsError::Provider(
                    "no pending authorization state for this session".to_string(),
                ));
            }
            _ => {
                return Err(CredentialsError::Provider(
                    "authorization state mismatch".to_string(),
                ));
            }
        }
        Ok(Some(Credentials::AuthorizationCode {
            code: code.to_string(),
            state,
        }))
    }

    /// Build the provider redirect for an indirect client.
    pub fn redirect(&self, callback_url: &str) -> Result<RedirectAction> {
        let callback = self.callback_url(callback_url);
        match &self.settings {
            ClientSettings::OAuth2 {
                authorization_url,
                client_id,
                scope,
            } => {
                let state = uuid::Uuid::new_v4().simple().to_string();
                let mut pairs = vec![
                    ("response_type", "code"),
                    ("client_id", client_id.as_str()),
                    ("redirect_uri", callback.as_str()),
                ];
                if let Some(scope) = scope {
                    pairs.push(("scope", scope.as_str()));
                }
                pairs.push(("state", state.as_str()));
                Ok(RedirectAction {
                    location: append_query(authorization_url, &pairs),
                    state: Some(state),
                })
            }
            ClientSettings::Cas {
                login_url,
                renew,
                gateway,
            } => {
                let mut pairs = vec![("service", callback.as_str())];
                if *renew {
                    pairs.push(("renew", "true"));
                }
                if *gateway {
                    pairs.push(("gateway", "true"));
                }
                Ok(RedirectAction {
                    location: append_query(login_url, &pairs),
                    state: None,
                })
            }
            ClientSettings::Form { login_url, .. } => Ok(RedirectAction {
                location: append_query(login_url, &[("callback", callback.as_str())]),
                state: None,
            }),
            _ => Err(Error::config(format!(
                "client '{}' is direct and cannot issue a redirect",
                self.name
            ))),
        }
    }

    /// Callback URL tagged with this client's name.
    pub fn callback_url(&self, callback_url: &str) -> String {
        append_query(callback_url, &[(CLIENT_NAME_PARAMETER, self.name.as_str())])
    }

    /// Verify credentials, stamping the resulting profile with this client.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<UserProfile> {
        let mut profile = self.authenticator.authenticate(credentials).await?;
        profile.client_name = self.name.clone();
        Ok(profile)
    }
}

/// Decode an `Authorization: Basic` header value.
pub fn parse_basic_auth(value: &str) -> std::result::Result<Credentials, CredentialsError> {
    let encoded = value
        .strip_prefix("Basic ")
        .ok_or_else(|| CredentialsError::Invalid("not a Basic authorization header".into()))?;
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| CredentialsError::Invalid("Basic credentials are not valid base64".into()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| CredentialsError::Invalid("Basic credentials are not UTF-8".into()))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| CredentialsError::Invalid("Basic credentials lack a ':'".into()))?;
    Ok(Credentials::UsernamePassword {
        username: username.to_string(),
        password: password.to_string(),
    })
}

fn append_query(base: &str, pairs: &[(&str, &str)]) -> String {
    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    if encoded.is_empty() {
        return base.to_string();
    }
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{encoded}")
}

/// The configured clients, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct Clients {
    clients: Vec<Client>,
}

impl Clients {
    /// Wrap a list of clients.
    pub fn new(clients: Vec<Client>) -> Self {
        Self { clients }
    }

    /// Find a client by name, ignoring case.
    pub fn find(&self, name: &str) -> Option<&Client> {
        self.clients
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Resolve client names, keeping their order. Empty selects all.
    pub fn select(&self, names: &[String]) -> Result<Vec<Client>> {
        if names.is_empty() {
            return Ok(self.clients.clone());
        }
        names
            .iter()
            .map(|name| {
                self.find(name)
                    .cloned()
                    .ok_or_else(|| Error::config(format!("unknown client '{name}'")))
            })
            .collect()
    }

    /// First indirect client.
    pub fn first_indirect(&self) -> Option<&Client> {
        self.clients.iter().find(|c| c.is_indirect())
    }

    /// Whether the named client exists and is indirect.
    pub fn is_indirect(&self, name: &str) -> bool {
        self.find(name).is_some_and(Client::is_indirect)
    }

    /// Iterate over the clients.
    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter()
    }

    /// Number of clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no client is configured.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
