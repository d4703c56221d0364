//! Authenticated identity as seen by downstream handlers.
//!
//! [`crate::SecurityLayer`] stores the granted [`ProfileSet`] in the request
//! extensions. Handlers read it with the helpers below or the
//! [`Authenticated`] extractor.

use axum::extract::FromRequestParts;
use http::StatusCode;
use http::request::Parts;

use crate::profile::{ProfileSet, UserProfile};

/// Profiles granted to this request, if a security layer ran.
pub fn profiles_from_parts(parts: &Parts) -> Option<&ProfileSet> {
    parts.extensions.get::<ProfileSet>()
}

/// Whether the request carries at least one granted profile.
pub fn is_authenticated_parts(parts: &Parts) -> bool {
    profiles_from_parts(parts).is_some_and(|p| !p.is_empty())
}

/// Username of the first granted profile, or `"anonymous"`.
pub fn username_from_parts(parts: &Parts) -> &str {
    profiles_from_parts(parts)
        .and_then(ProfileSet::first)
        .map(UserProfile::username)
        .unwrap_or("anonymous")
}

/// Extractor for handlers behind a security layer. Rejects with 401 when
/// no profile was granted.
///
/// ```ignore
/// async fn private(Authenticated(profiles): Authenticated) -> String {
///     profiles.first().map(|p| p.username().to_string()).unwrap_or_default()
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Authenticated(pub ProfileSet);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match profiles_from_parts(parts) {
            Some(profiles) if !profiles.is_empty() => Ok(Authenticated(profiles.clone())),
            _ => Err(StatusCode::UNAUTHORIZED),
        }
    }
}
