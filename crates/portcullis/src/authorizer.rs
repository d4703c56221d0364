//! Authorization checks run once a user is authenticated.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::AuthorizerRule;
use crate::context::WebContext;
use crate::profile::{ProfileSet, UserProfile};

/// Decides whether authenticated profiles may access the request.
pub trait Authorizer: Send + Sync + 'static {
    /// `true` grants access.
    fn is_authorized(&self, ctx: &WebContext, profiles: &ProfileSet) -> bool;
}

/// Which profiles must satisfy a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantifier {
    Any,
    All,
}

/// Role or permission requirement.
#[derive(Debug, Clone)]
pub struct ProfileAuthorizer {
    elements: BTreeSet<String>,
    quantifier: Quantifier,
    check_roles: bool,
}

impl ProfileAuthorizer {
    /// Some profile holds at least one of the roles.
    pub fn require_any_role<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(roles, Quantifier::Any, true)
    }

    /// Every profile holds every role.
    pub fn require_all_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(roles, Quantifier::All, true)
    }

    /// Some profile holds at least one of the permissions.
    pub fn require_any_permission<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(permissions, Quantifier::Any, false)
    }

    /// Every profile holds every permission.
    pub fn require_all_permissions<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(permissions, Quantifier::All, false)
    }

    fn build<I, S>(elements: I, quantifier: Quantifier, check_roles: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            elements: elements.into_iter().map(Into::into).collect(),
            quantifier,
            check_roles,
        }
    }

    fn granted<'p>(&self, profile: &'p UserProfile) -> &'p BTreeSet<String> {
        if self.check_roles {
            &profile.roles
        } else {
            &profile.permissions
        }
    }

    fn profile_passes(&self, profile: &UserProfile) -> bool {
        let granted = self.granted(profile);
        match self.quantifier {
            Quantifier::Any => self.elements.iter().any(|e| granted.contains(e)),
            Quantifier::All => self.elements.is_subset(granted),
        }
    }
}

impl Authorizer for ProfileAuthorizer {
    fn is_authorized(&self, _ctx: &WebContext, profiles: &ProfileSet) -> bool {
        if self.elements.is_empty() {
            return true;
        }
        if profiles.is_empty() {
            return false;
        }
        match self.quantifier {
            Quantifier::Any => profiles.iter().any(|p| self.profile_passes(p)),
            Quantifier::All => profiles.iter().all(|p| self.profile_passes(p)),
        }
    }
}

/// Passes whenever a profile is present.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsAuthenticated;

impl Authorizer for IsAuthenticated {
    fn is_authorized(&self, _ctx: &WebContext, profiles: &ProfileSet) -> bool {
        !profiles.is_empty()
    }
}

/// Instantiate a configured rule.
pub fn from_rule(rule: &AuthorizerRule) -> Arc<dyn Authorizer> {
    match rule {
        AuthorizerRule::RequireAnyRole { roles } => {
            Arc::new(ProfileAuthorizer::require_any_role(roles.iter().cloned()))
        }
        AuthorizerRule::RequireAllRoles { roles } => {
            Arc::new(ProfileAuthorizer::require_all_roles(roles.iter().cloned()))
        }
        AuthorizerRule::RequireAnyPermission { permissions } => Arc::new(
            ProfileAuthorizer::require_any_permission(permissions.iter().cloned()),
        ),
        AuthorizerRule::RequireAllPermissions { permissions } => Arc::new(
            ProfileAuthorizer::require_all_permissions(permissions.iter().cloned()),
        ),
        AuthorizerRule::IsAuthenticated => Arc::new(IsAuthenticated),
    }
}
