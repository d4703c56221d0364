//! Credential verification.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::Credentials;
use crate::blocking::run_blocking;
use crate::error::{CredentialsError, Result};
use crate::profile::UserProfile;

/// Verifies credentials and produces the user's profile.
///
/// Implement this per identity provider. Return
/// [`crate::Error::Credentials`] for credentials that do not verify; any
/// other error is treated as an infrastructure failure.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Verify the credentials.
    async fn authenticate(&self, credentials: &Credentials) -> Result<UserProfile>;
}

/// Accepts username/password pairs whose two halves are equal.
///
/// Meant for tests and demos.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsernameEqualsPasswordAuthenticator;

#[async_trait]
impl Authenticator for UsernameEqualsPasswordAuthenticator {
    async fn authenticate(&self, credentials: &Credentials) -> Result<UserProfile> {
        match credentials {
            Credentials::UsernamePassword { username, password }
                if !username.is_empty() && username == password =>
            {
                Ok(UserProfile::new(username.clone()).with_attribute("username", username.clone()))
            }
            Credentials::UsernamePassword { username, .. } => Err(CredentialsError::Invalid(
                format!("username and password do not match for '{username}'"),
            )
            .into()),
            other => Err(CredentialsError::Invalid(format!(
                "unsupported credentials: {}",
                other.kind_name()
            ))
            .into()),
        }
    }
}

/// Adapts a non-blocking closure.
pub struct FnAuthenticator<F>(F);

impl<F> FnAuthenticator<F>
where
    F: Fn(&Credentials) -> Result<UserProfile> + Send + Sync + 'static,
{
    /// Wrap the closure.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Authenticator for FnAuthenticator<F>
where
    F: Fn(&Credentials) -> Result<UserProfile> + Send + Sync + 'static,
{
    async fn authenticate(&self, credentials: &Credentials) -> Result<UserProfile> {
        (self.0)(credentials)
    }
}

/// Runs a blocking verifier (LDAP bind, JDBC-style lookup, provider SDK)
/// on the blocking pool, bounded by a timeout.
pub struct BlockingAuthenticator<F> {
    verify: Arc<F>,
    timeout: Duration,
}

impl<F> BlockingAuthenticator<F>
where
    F: Fn(&Credentials) -> Result<UserProfile> + Send + Sync + 'static,
{
    /// Wrap a blocking verifier.
    pub fn new(verify: F, timeout: Duration) -> Self {
        Self {
            verify: Arc::new(verify),
            timeout,
        }
    }
}

#[async_trait]
impl<F> Authenticator for BlockingAuthenticator<F>
where
    F: Fn(&Credentials) -> Result<UserProfile> + Send + Sync + 'static,
{
    async fn authenticate(&self, credentials: &Credentials) -> Result<UserProfile> {
        let verify = self.verify.clone();
        let credentials = credentials.clone();
        run_blocking("credential verification", self.timeout, move || {
            verify(&credentials)
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn up(username: &str, password: &str) -> Credentials {
        Credentials::UsernamePassword {
            username: username.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn test_username_equals_password() {
        let auth = UsernameEqualsPasswordAuthenticator;
        let profile = auth.authenticate(&up("testUser", "testUser")).await.unwrap();
        assert_eq!(profile.id, "testUser");
        assert_eq!(profile.username(), "testUser");
    }

    #[tokio::test]
    async fn test_username_password_mismatch() {
        let auth = UsernameEqualsPasswordAuthenticator;
        let err = auth.authenticate(&up("testUser", "other")).await.unwrap_err();
        assert!(matches!(err, Error::Credentials(CredentialsError::Invalid(_))));
        assert!(!err.is_infrastructure());
    }

    #[tokio::test]
    async fn test_empty_username_rejected() {
        let auth = UsernameEqualsPasswordAuthenticator;
        assert!(auth.authenticate(&up("", "")).await.is_err());
    }

    #[tokio::test]
    async fn test_unsupported_credentials() {
        let auth = UsernameEqualsPasswordAuthenticator;
        let err = auth
            .authenticate(&Credentials::Token("t".into()))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Credentials error: invalid credentials: unsupported credentials: token"
        );
    }

    #[tokio::test]
    async fn test_fn_authenticator() {
        let auth = FnAuthenticator::new(|creds: &Credentials| match creds {
            Credentials::Token(t) if t == "good" => Ok(UserProfile::new("api-user")),
            _ => Err(CredentialsError::Invalid("bad token".into()).into()),
        });
        let profile = auth
            .authenticate(&Credentials::Token("good".into()))
            .await
            .unwrap();
        assert_eq!(profile.id, "api-user");
        assert!(auth
            .authenticate(&Credentials::Token("bad".into()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_blocking_authenticator() {
        let auth = BlockingAuthenticator::new(
            |creds: &Credentials| match creds {
                Credentials::Ticket(t) => Ok(UserProfile::new(format!("cas-{t}"))),
                _ => Err(CredentialsError::Missing.into()),
            },
            Duration::from_secs(1),
        );
        let profile = auth
            .authenticate(&Credentials::Ticket("ST-1".into()))
            .await
            .unwrap();
        assert_eq!(profile.id, "cas-ST-1");
    }

    #[tokio::test]
    async fn test_blocking_authenticator_times_out() {
        let auth = BlockingAuthenticator::new(
            |_: &Credentials| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(UserProfile::new("late"))
            },
            Duration::from_millis(20),
        );
        let err = auth
            .authenticate(&Credentials::Ticket("ST-1".into()))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    /// Looks users up in an async directory.
    struct DirectoryAuthenticator {
        users: tokio::sync::RwLock<Vec<String>>,
    }

    #[async_trait]
    impl Authenticator for DirectoryAuthenticator {
        async fn authenticate(&self, credentials: &Credentials) -> Result<UserProfile> {
            let Credentials::Token(token) = credentials else {
                return Err(CredentialsError::Missing.into());
            };
            let users = self.users.read().await;
            match users.iter().find(|u| *u == token) {
                Some(user) => Ok(UserProfile::new(user.clone())),
                None => Err(CredentialsError::Invalid(format!("unknown user {token}")).into()),
            }
        }
    }

    #[tokio::test]
    async fn test_custom_async_authenticator_behind_trait_object() {
        let auth: Arc<dyn Authenticator> = Arc::new(DirectoryAuthenticator {
            users: tokio::sync::RwLock::new(vec!["alice".into()]),
        });
        let profile = auth
            .authenticate(&Credentials::Token("alice".into()))
            .await
            .unwrap();
        assert_eq!(profile.id, "alice");
        let err = auth
            .authenticate(&Credentials::Token("mallory".into()))
            .await
            .unwrap_err();
        assert!(!err.is_infrastructure());
    }
}
