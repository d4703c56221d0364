//! Reads and writes the authenticated identity.
//!
//! Profiles live in two places: request scope (stateless flows re-derive
//! them on every request) and the session (stateful flows). In the session
//! they are stored as the base64 of the [`IdentityCodec`] frame so the
//! payload survives any JSON-based session store.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::codec::IdentityCodec;
use crate::error::{Error, Result};
use crate::profile::{ProfileSet, UserProfile};
use crate::session::Session;

/// Session attribute holding the encoded profiles.
pub const PROFILES_KEY: &str = "portcullis.profiles";
/// Session attribute holding the URL requested before a challenge.
pub const REQUESTED_URL_KEY: &str = "portcullis.requested_url";
/// Session attribute holding the single-logout ticket.
pub const CAS_TICKET_KEY: &str = "portcullis.cas_ticket";

const OAUTH2_STATE_PREFIX: &str = "portcullis.oauth2_state.";

/// Session attribute holding the pending OAuth2 `state` for a client.
pub fn oauth2_state_key(client_name: &str) -> String {
    format!("{OAUTH2_STATE_PREFIX}{client_name}")
}

/// Profile access for one request.
pub struct ProfileManager {
    session: Option<Session>,
    codec: Arc<dyn IdentityCodec>,
    request_profiles: ProfileSet,
}

impl ProfileManager {
    /// Create a manager over the request's session, if any.
    pub fn new(session: Option<Session>, codec: Arc<dyn IdentityCodec>) -> Self {
        Self {
            session,
            codec,
            request_profiles: ProfileSet::new(),
        }
    }

    /// The session this manager writes to.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Current profiles: request scope, overlaid with the session's when
    /// `read_from_session` is set.
    pub fn load(&self, read_from_session: bool) -> Result<ProfileSet> {
        let mut profiles = self.request_profiles.clone();
        if read_from_session {
            for profile in self.session_profiles()?.iter() {
                profiles.insert(profile.clone(), true);
            }
        }
        Ok(profiles)
    }

    /// Record a freshly authenticated profile.
    ///
    /// Without `multi_profile` the new profile replaces every other one.
    pub fn save(
        &mut self,
        save_in_session: bool,
        profile: UserProfile,
        multi_profile: bool,
    ) -> Result<()> {
        let mut profiles = self.load(save_in_session)?;
        profiles.insert(profile, multi_profile);
        if save_in_session {
            self.write_session_profiles(&profiles)?;
        }
        self.request_profiles = profiles;
        Ok(())
    }

    /// Forget all profiles.
    pub fn remove(&mut self, remove_from_session: bool) {
        self.request_profiles.clear();
        if remove_from_session {
            if let Some(session) = &self.session {
                session.remove(PROFILES_KEY);
            }
        }
    }

    /// Forget all profiles, in the session too.
    pub fn logout(&mut self) {
        self.remove(true);
    }

    /// Whether any profile is present.
    pub fn is_authenticated(&self) -> Result<bool> {
        Ok(!self.load(true)?.is_empty())
    }

    /// Drop session profiles whose client fails `keep`.
    ///
    /// Used to discard direct-client profiles before a security check, so
    /// that stateless credentials are verified on every request.
    pub fn retain_session_clients<F>(&self, keep: F) -> Result<()>
    where
        F: FnMut(&str) -> bool,
    {
        let mut profiles = self.session_profiles()?;
        let before = profiles.len();
        profiles.retain_clients(keep);
        if profiles.len() != before {
            log::debug!(
                "Discarding {} session profile(s) of direct clients",
                before - profiles.len()
            );
            self.write_session_profiles(&profiles)?;
        }
        Ok(())
    }

    /// Remember the URL to return to after the provider round trip.
    pub fn set_requested_url(&self, url: &str) -> Result<()> {
        self.require_session()?.set(REQUESTED_URL_KEY, url)
    }

    /// Take the stored URL, clearing it.
    pub fn take_requested_url(&self) -> Option<String> {
        self.session
            .as_ref()
            .and_then(|s| s.remove(REQUESTED_URL_KEY))
            .and_then(|v| v.as_str().map(str::to_string))
    }

    fn require_session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::session("no session on the request; install SessionLayer"))
    }

    fn session_profiles(&self) -> Result<ProfileSet> {
        let Some(encoded) = self.session.as_ref().and_then(|s| s.get_str(PROFILES_KEY)) else {
            return Ok(ProfileSet::new());
        };
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| Error::codec(format!("session profiles are not valid base64: {e}")))?;
        self.codec.decode(&bytes)
    }

    fn write_session_profiles(&self, profiles: &ProfileSet) -> Result<()> {
        let session = self.require_session()?;
        if profiles.is_empty() {
            session.remove(PROFILES_KEY);
            return Ok(());
        }
        let encoded = STANDARD.encode(self.codec.encode(profiles)?);
        session.set(PROFILES_KEY, encoded)
    }
}
