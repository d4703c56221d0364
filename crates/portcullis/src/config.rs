//! Security configuration.
//!
//! Loaded from TOML. Clients, authorizers and matchers are closed tagged
//! enums selected by a `kind` key, so every supported variant has a typed
//! struct and an unknown kind is rejected at parse time.
//!
//! ```toml
//! callback_url = "https://app.example.com/callback"
//!
//! [[clients]]
//! name = "BasicClient"
//! kind = "basic"
//! realm = "app"
//!
//! [[authorizers]]
//! name = "admin"
//! kind = "require_any_role"
//! roles = ["ADMIN"]
//!
//! [security]
//! clients = ["BasicClient"]
//! authorizers = ["admin"]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Callback URL used when none is configured.
pub const DEFAULT_CALLBACK_URL: &str = "http://localhost:8080/callback";

/// Allow-list applied to caller-supplied logout targets when none is configured.
///
/// Accepts relative paths only: `/` or `/x...`, never `//host`.
pub const DEFAULT_LOGOUT_URL_PATTERN: &str = r"^(\/|\/[^\/].*)$";

/// Default bound on blocking operations.
pub const DEFAULT_BLOCKING_TIMEOUT_MS: u64 = 1000;

/// Top-level security configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Absolute URL of the callback endpoint handed to identity providers.
    pub callback_url: String,
    /// Bound, in milliseconds, on every blocking store or verification call.
    pub blocking_timeout_ms: u64,
    /// Session cookie settings.
    pub session: SessionSettings,
    /// Configured clients, in declaration order.
    pub clients: Vec<ClientConfig>,
    /// Named authorizers.
    pub authorizers: Vec<AuthorizerConfig>,
    /// Named matchers.
    pub matchers: Vec<MatcherConfig>,
    /// Defaults for protected routes.
    pub security: SecuritySection,
    /// Callback behaviour.
    pub callback: CallbackSection,
    /// Application logout behaviour.
    pub logout: LogoutSection,
    /// Provider-initiated logout behaviour.
    pub single_logout: SingleLogoutSection,
    /// Bodies written for non-OK outcomes.
    pub responses: ResponseBodies,
    /// Paths mounted by [`crate::security_routes`].
    pub routes: RouteSettings,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            callback_url: DEFAULT_CALLBACK_URL.to_string(),
            blocking_timeout_ms: DEFAULT_BLOCKING_TIMEOUT_MS,
            session: SessionSettings::default(),
            clients: Vec::new(),
            authorizers: Vec::new(),
            matchers: Vec::new(),
            security: SecuritySection::default(),
            callback: CallbackSection::default(),
            logout: LogoutSection::default(),
            single_logout: SingleLogoutSection::default(),
            responses: ResponseBodies::default(),
            routes: RouteSettings::default(),
        }
    }
}

impl SecurityConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("invalid TOML: {e}")))
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {e}", path.display()))
        })?;
        log::debug!("Loaded security config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// The blocking-operation bound as a [`Duration`].
    pub fn blocking_timeout(&self) -> Duration {
        Duration::from_millis(self.blocking_timeout_ms)
    }

    /// Add a client. Convenience for building configs in code.
    pub fn with_client(mut self, name: impl Into<String>, settings: ClientSettings) -> Self {
        self.clients.push(ClientConfig {
            name: name.into(),
            settings,
        });
        self
    }

    /// Add a named authorizer.
    pub fn with_authorizer(mut self, name: impl Into<String>, rule: AuthorizerRule) -> Self {
        self.authorizers.push(AuthorizerConfig {
            name: name.into(),
            rule,
        });
        self
    }

    /// Add a named matcher.
    pub fn with_matcher(mut self, name: impl Into<String>, rule: MatcherRule) -> Self {
        self.matchers.push(MatcherConfig {
            name: name.into(),
            rule,
        });
        self
    }
}

// ============================================================================
// Clients
// ============================================================================

/// A named client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Unique client name, echoed back on the callback as `client_name`.
    pub name: String,
    /// Kind-specific settings.
    #[serde(flatten)]
    pub settings: ClientSettings,
}

/// Supported client kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ClientSettings {
    /// HTTP Basic authentication (direct).
    #[serde(rename = "basic")]
    Basic {
        /// Realm advertised in `WWW-Authenticate`.
        #[serde(default = "default_realm")]
        realm: String,
    },
    /// Token carried in a request header (direct).
    #[serde(rename = "header")]
    Header {
        /// Header to read.
        header_name: String,
        /// Prefix stripped from the header value, e.g. `Bearer `.
        #[serde(default)]
        prefix: String,
    },
    /// Token carried in a request parameter (direct).
    #[serde(rename = "parameter")]
    Parameter {
        /// Parameter to read.
        parameter_name: String,
        /// Accept the token on GET requests.
        #[serde(default = "default_true")]
        support_get: bool,
        /// Accept the token on POST requests.
        #[serde(default)]
        support_post: bool,
    },
    /// OAuth 2.0 authorization-code flow (indirect).
    #[serde(rename = "oauth2")]
    OAuth2 {
        /// Provider authorization endpoint.
        authorization_url: String,
        /// Registered client id.
        client_id: String,
        /// Requested scope.
        #[serde(default)]
        scope: Option<String>,
    },
    /// CAS protocol (indirect).
    #[serde(rename = "cas")]
    Cas {
        /// CAS login endpoint.
        login_url: String,
        /// Force re-authentication at the CAS server.
        #[serde(default)]
        renew: bool,
        /// Do not prompt if the user has no CAS session.
        #[serde(default)]
        gateway: bool,
    },
    /// Username/password posted from a login page (indirect).
    #[serde(rename = "form")]
    Form {
        /// Login page URL.
        login_url: String,
        /// Form field holding the username.
        #[serde(default = "default_username_parameter")]
        username_parameter: String,
        /// Form field holding the password.
        #[serde(default = "default_password_parameter")]
        password_parameter: String,
    },
}

fn default_realm() -> String {
    "authentication required".to_string()
}

fn default_true() -> bool {
    true
}

fn default_username_parameter() -> String {
    "username".to_string()
}

fn default_password_parameter() -> String {
    "password".to_string()
}

// ============================================================================
// Authorizers and matchers
// ============================================================================

/// A named authorizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizerConfig {
    /// Name referenced from `security.authorizers`.
    pub name: String,
    /// Rule to evaluate.
    #[serde(flatten)]
    pub rule: AuthorizerRule,
}

/// Built-in authorization rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthorizerRule {
    /// At least one profile holds at least one of the roles.
    RequireAnyRole {
        /// Accepted roles.
        roles: Vec<String>,
    },
    /// Every profile holds every role.
    RequireAllRoles {
        /// Required roles.
        roles: Vec<String>,
    },
    /// At least one profile holds at least one of the permissions.
    RequireAnyPermission {
        /// Accepted permissions.
        permissions: Vec<String>,
    },
    /// Every profile holds every permission.
    RequireAllPermissions {
        /// Required permissions.
        permissions: Vec<String>,
    },
    /// At least one profile is present.
    IsAuthenticated,
}

/// A named matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Name referenced from `security.matchers`.
    pub name: String,
    /// Rule to evaluate.
    #[serde(flatten)]
    pub rule: MatcherRule,
}

/// Built-in matcher rules. A request that does not match skips security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatcherRule {
    /// Excludes exact paths and full-match regex patterns.
    Path {
        /// Paths excluded verbatim.
        #[serde(default)]
        exclude_paths: Vec<String>,
        /// Regular expressions excluded when they match the whole path.
        #[serde(default)]
        exclude_patterns: Vec<String>,
    },
    /// Applies only to the listed methods.
    Method {
        /// Upper-case method names.
        methods: Vec<String>,
    },
}

// ============================================================================
// Sections
// ============================================================================

/// Session cookie settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Cookie name carrying the session id.
    pub cookie_name: String,
    /// Cookie path.
    pub cookie_path: String,
    /// Mark the cookie `Secure`.
    pub secure: bool,
    /// Mark the cookie `HttpOnly`.
    pub http_only: bool,
    /// Session lifetime in the store, in seconds.
    pub ttl_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: "portcullis.sid".to_string(),
            cookie_path: "/".to_string(),
            secure: false,
            http_only: true,
            ttl_secs: 1800,
        }
    }
}

impl SessionSettings {
    /// Session lifetime as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Defaults applied to every protected route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    /// Client names; empty means every configured client.
    pub clients: Vec<String>,
    /// Authorizer names; all must pass.
    pub authorizers: Vec<String>,
    /// Matcher names; all must match for security to apply.
    pub matchers: Vec<String>,
    /// Keep one profile per client instead of a single profile.
    pub multi_profile: bool,
    /// Answer AJAX requests with 401 instead of a provider redirect.
    pub ajax_aware: bool,
}

/// Callback behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackSection {
    /// Target when no requested URL is stored, or when the login failed.
    pub default_url: String,
    /// Keep one profile per client.
    pub multi_profile: bool,
    /// Issue a fresh session id after a successful login.
    pub renew_session: bool,
}

impl Default for CallbackSection {
    fn default() -> Self {
        Self {
            default_url: "/".to_string(),
            multi_profile: false,
            renew_session: true,
        }
    }
}

/// Application logout behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogoutSection {
    /// Target when the caller supplies none, or an unacceptable one.
    pub default_url: Option<String>,
    /// Allow-list for the caller-supplied `url` parameter (full match).
    pub logout_url_pattern: String,
    /// Remove profiles from the local session.
    pub local_logout: bool,
    /// Destroy the whole session.
    pub destroy_session: bool,
}

impl Default for LogoutSection {
    fn default() -> Self {
        Self {
            default_url: None,
            logout_url_pattern: DEFAULT_LOGOUT_URL_PATTERN.to_string(),
            local_logout: true,
            destroy_session: false,
        }
    }
}

/// Provider-initiated logout behaviour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleLogoutSection {
    /// Destroy the correlated session instead of only stripping profiles.
    pub destroy_session: bool,
}

/// Bodies written for non-OK outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseBodies {
    /// Body of a 401.
    pub unauthorized_body: String,
    /// Body of a 403.
    pub forbidden_body: String,
    /// Body of a 500. Never carries diagnostic detail.
    pub error_body: String,
}

impl Default for ResponseBodies {
    fn default() -> Self {
        Self {
            unauthorized_body: "unauthorized".to_string(),
            forbidden_body: "forbidden".to_string(),
            error_body: "internal server error".to_string(),
        }
    }
}

/// Endpoint paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteSettings {
    /// Callback path.
    pub callback_path: String,
    /// Application logout path.
    pub logout_path: String,
    /// Optional back-channel logout path.
    pub back_channel_logout_path: Option<String>,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            callback_path: "/callback".to_string(),
            logout_path: "/logout".to_string(),
            back_channel_logout_path: None,
        }
    }
}
