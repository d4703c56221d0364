//! Session-aware authentication and authorization for axum.
//!
//! Provides:
//! - [`SecurityEngine`]: validated configuration, clients, authorizers,
//!   matchers and stores, built once at startup
//! - [`SecurityLayer`]: Tower middleware protecting routes (redirect,
//!   401, 403 or pass-through with the granted [`ProfileSet`])
//! - [`callback_handler`], [`logout_handler`] and
//!   [`back_channel_logout_handler`], mounted by [`security_routes`]
//! - [`SessionLayer`]: cookie sessions over a pluggable [`SessionStore`]
//! - [`LogoutCorrelator`]: provider-initiated logout through a bounded
//!   ticket→session map ([`TicketStore`])
//! - [`SecurityConfig`]: TOML configuration with tagged client variants
//!
//! ```ignore
//! let config = SecurityConfig::load("security.toml")?;
//! let engine = SecurityEngine::builder(config)
//!     .authenticator("BasicClient", UsernameEqualsPasswordAuthenticator)
//!     .build()?;
//!
//! let app = Router::new()
//!     .route("/private", get(private))
//!     .layer(engine.security_layer())
//!     .merge(security_routes(&engine))
//!     .layer(engine.session_layer());
//! ```

pub mod action;
pub mod authorizer;
pub mod blocking;
pub mod callback;
pub mod client;
pub mod codec;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod logout;
pub mod matcher;
pub mod profile;
pub mod profile_manager;
pub mod routes;
pub mod security;
pub mod session;
pub mod single_logout;
pub mod ticket;
pub mod user;

pub use action::{DefaultHttpActionAdapter, HttpAction, HttpActionAdapter};
pub use authorizer::{Authorizer, IsAuthenticated, ProfileAuthorizer};
pub use callback::callback_handler;
pub use client::{
    Authenticator, BlockingAuthenticator, Client, ClientKind, Clients, Credentials,
    FnAuthenticator, UsernameEqualsPasswordAuthenticator,
};
pub use codec::{FramedJsonCodec, IdentityCodec};
pub use config::{ClientSettings, SecurityConfig};
pub use context::WebContext;
pub use engine::{SecurityEngine, SecurityEngineBuilder};
pub use error::{CredentialsError, Error, Result};
pub use logout::logout_handler;
pub use matcher::{Matcher, MethodMatcher, PathMatcher};
pub use profile::{ProfileSet, UserProfile};
pub use profile_manager::ProfileManager;
pub use routes::security_routes;
pub use security::{SecurityLayer, SecurityOptions, SecurityService};
pub use session::{MemorySessionStore, Session, SessionData, SessionLayer, SessionStore};
pub use single_logout::{LogoutCorrelator, back_channel_logout_handler};
pub use ticket::{MemoryTicketStore, TicketRegistry, TicketStore};
pub use user::{Authenticated, is_authenticated_parts, profiles_from_parts, username_from_parts};
