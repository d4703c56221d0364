//! Error types for Portcullis.

use std::time::Duration;

/// Expected authentication outcomes.
///
/// These describe a user who could not be authenticated, or a provider
/// that answered with something unusable. They are converted into a 401 or
/// a failure redirect and never surface as a 500.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CredentialsError {
    /// The request carried no credentials for the client.
    #[error("no credentials present")]
    Missing,

    /// Credentials were present but did not verify.
    #[error("invalid credentials: {0}")]
    Invalid(String),

    /// The identity provider answered with a malformed or rejected response.
    #[error("identity provider error: {0}")]
    Provider(String),
}

/// Errors that can occur while securing a request.
///
/// All error variants are marked with `#[non_exhaustive]` to allow
/// adding new error types without breaking changes.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration error, raised while the engine is built or first used.
    #[error("Configuration error: {message}")]
    Config {
        /// What configuration is problematic
        message: String,
    },

    /// The request has no usable session.
    #[error("Session error: {message}")]
    Session {
        /// What went wrong
        message: String,
    },

    /// A session or ticket store failed.
    #[error("Store error: {message}")]
    Store {
        /// Human-readable error message
        message: String,
        /// Source error if available
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A bounded blocking operation exceeded its timeout.
    #[error("{operation} timed out after {millis}ms")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Configured limit in milliseconds
        millis: u64,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Identity frame could not be encoded or decoded.
    #[error("Codec error: {message}")]
    Codec {
        /// What went wrong
        message: String,
    },

    /// Expected authentication failure.
    #[error("Credentials error: {0}")]
    Credentials(#[from] CredentialsError),

    /// A response write was attempted after the response was completed.
    #[error("Response already committed")]
    ResponseCommitted,

    /// Unexpected runtime failure in adapter code.
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong
        message: String,
    },
}

/// Convenience `Result` type alias for Portcullis operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error belongs to the infrastructure class.
    ///
    /// Infrastructure errors are answered with a generic 500 body; the
    /// detail only goes to the server log.
    pub fn is_infrastructure(&self) -> bool {
        match self {
            Error::Credentials(_) => false,
            Error::Config { .. } => true,
            Error::Session { .. } => true,
            Error::Store { .. } => true,
            Error::Timeout { .. } => true,
            Error::Serialization(_) => true,
            Error::Codec { .. } => true,
            Error::ResponseCommitted => true,
            Error::Internal { .. } => true,
        }
    }

    /// Whether this error is a bounded-wait timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Creates a new session error.
    pub fn session<S: Into<String>>(message: S) -> Self {
        Error::Session {
            message: message.into(),
        }
    }

    /// Creates a new store error.
    pub fn store<S: Into<String>>(message: S) -> Self {
        Error::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new store error with a source error.
    pub fn store_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Store {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new timeout error for the named operation.
    pub fn timeout<S: Into<String>>(operation: S, limit: Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Creates a new codec error.
    pub fn codec<S: Into<String>>(message: S) -> Self {
        Error::Codec {
            message: message.into(),
        }
    }

    /// Creates a new internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }
}
