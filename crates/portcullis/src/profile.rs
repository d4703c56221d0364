//! Authenticated identities.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The identity a client established for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Identifier assigned by the client or provider.
    pub id: String,
    /// Name of the client that produced this profile.
    pub client_name: String,
    /// Free-form attributes (email, display name, ...).
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    /// Granted roles.
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Granted permissions.
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// Provider access token, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// The user asked to be remembered.
    #[serde(default)]
    pub remember_me: bool,
}

impl UserProfile {
    /// Create a bare profile. The client name is stamped by the client
    /// that authenticated it.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client_name: String::new(),
            attributes: BTreeMap::new(),
            roles: BTreeSet::new(),
            permissions: BTreeSet::new(),
            access_token: None,
            remember_me: false,
        }
    }

    /// Set the owning client.
    pub fn with_client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Add a permission.
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    /// Attach a provider access token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// String attribute lookup.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// The `username` attribute, falling back to the id.
    pub fn username(&self) -> &str {
        self.attribute_str("username").unwrap_or(&self.id)
    }

    /// Whether the profile holds the role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Whether the profile holds the permission.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Profiles of one user, at most one per client name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileSet {
    profiles: BTreeMap<String, UserProfile>,
}

impl ProfileSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a profile keyed by its client name.
    ///
    /// Without `multi_profile` the set is cleared first so that it holds a
    /// single profile. A profile for a client already present replaces it.
    pub fn insert(&mut self, profile: UserProfile, multi_profile: bool) {
        if !multi_profile {
            self.profiles.clear();
        }
        self.profiles.insert(profile.client_name.clone(), profile);
    }

    /// Profile for the given client.
    pub fn get(&self, client_name: &str) -> Option<&UserProfile> {
        self.profiles.get(client_name)
    }

    /// Remove the profile for the given client.
    pub fn remove(&mut self, client_name: &str) -> Option<UserProfile> {
        self.profiles.remove(client_name)
    }

    /// Keep only profiles whose client satisfies `keep`.
    pub fn retain_clients<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.profiles.retain(|client, _| keep(client));
    }

    /// First profile in client-name order.
    pub fn first(&self) -> Option<&UserProfile> {
        self.profiles.values().next()
    }

    /// Iterate over the profiles.
    pub fn iter(&self) -> impl Iterator<Item = &UserProfile> {
        self.profiles.values()
    }

    /// Client names present.
    pub fn client_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Number of profiles.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether no profile is present.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Remove every profile.
    pub fn clear(&mut self) {
        self.profiles.clear();
    }
}

impl FromIterator<UserProfile> for ProfileSet {
    fn from_iter<I: IntoIterator<Item = UserProfile>>(iter: I) -> Self {
        let mut set = ProfileSet::new();
        for profile in iter {
            set.insert(profile, true);
        }
        set
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn profile(id: &str, client: &str) -> UserProfile {
        UserProfile::new(id).with_client_name(client)
    }

    #[test]
    fn test_builder() {
        let p = UserProfile::new("u1")
            .with_client_name("Google")
            .with_attribute("email", "u1@example.com")
            .with_role("ADMIN")
            .with_permission("read")
            .with_access_token("tok");
        assert_eq!(p.client_name, "Google");
        assert_eq!(p.attribute_str("email"), Some("u1@example.com"));
        assert!(p.has_role("ADMIN"));
        assert!(!p.has_role("USER"));
        assert!(p.has_permission("read"));
        assert_eq!(p.access_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_username_falls_back_to_id() {
        assert_eq!(UserProfile::new("testUser").username(), "testUser");
        let p = UserProfile::new("42").with_attribute("username", "alice");
        assert_eq!(p.username(), "alice");
    }

    #[test]
    fn test_single_profile_mode_replaces() {
        let mut set = ProfileSet::new();
        set.insert(profile("a", "Basic"), false);
        set.insert(profile("b", "Google"), false);
        assert_eq!(set.len(), 1);
        assert_eq!(set.first().unwrap().id, "b");
    }

    #[test]
    fn test_multi_profile_one_per_client() {
        let mut set = ProfileSet::new();
        set.insert(profile("a", "Basic"), true);
        set.insert(profile("b", "Google"), true);
        set.insert(profile("c", "Google"), true);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("Google").unwrap().id, "c");
        assert_eq!(set.get("Basic").unwrap().id, "a");
    }

    #[test]
    fn test_retain_clients() {
        let mut set: ProfileSet = vec![profile("a", "Basic"), profile("b", "Google")]
            .into_iter()
            .collect();
        set.retain_clients(|c| c != "Basic");
        assert_eq!(set.client_names().collect::<Vec<_>>(), vec!["Google"]);
    }

    #[test]
    fn test_serde_shape_is_keyed_by_client() {
        let set: ProfileSet = vec![profile("a", "Basic")].into_iter().collect();
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["Basic"]["id"], "a");
        let back: ProfileSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }
}
