//! Error taxonomy for the session manager.
//!
//! Every failure is terminal for the operation that produced it. Callers
//! branch on [`ErrorKind::code`], the short machine-readable string that the
//! dispatch layer forwards unchanged.

use thiserror::Error;

use crate::config_store::ConfigStoreError;
use crate::platform::PlatformError;

/// Machine-readable classification of a [`BrokerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `initialize` was called without a client id.
    NoClientId,
    /// `initialize` was called with a second, different client id.
    ChangedClientId,
    /// The base template or derived configuration is unusable.
    ConfigError,
    /// The platform refused to create a client.
    ClientCreationFailed,
    /// A token operation was attempted before `initialize` succeeded.
    NoClient,
    /// A token operation was attempted without scopes.
    NoScope,
    /// No account is known to act on.
    NoAccount,
    /// The platform reported a failure.
    PlatformError,
    /// The operation could not be driven to completion.
    Internal,
}

impl ErrorKind {
    /// The outward code string for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoClientId => "NO_CLIENTID",
            Self::ChangedClientId => "CHANGED_CLIENTID",
            Self::ConfigError => "CONFIG_ERROR",
            Self::ClientCreationFailed => "CLIENT_CREATION_FAILED",
            Self::NoClient => "NO_CLIENT",
            Self::NoScope => "NO_SCOPE",
            Self::NoAccount => "NO_ACCOUNT",
            Self::PlatformError => "PLATFORM_ERROR",
            Self::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error type for every session manager operation.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// No client id was supplied.
    #[error("call must include a clientId")]
    MissingClientId,

    /// The base template is malformed or the derivation inputs are invalid.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The derived configuration could not be persisted.
    #[error("configuration store error: {0}")]
    ConfigStore(#[from] ConfigStoreError),

    /// A client bound to another identity already exists in this process.
    #[error("attempting to initialize with multiple clientIds (active: {active}, requested: {requested})")]
    ClientIdentityConflict { active: String, requested: String },

    /// The platform failed to create the client.
    #[error("client creation failed: {0}")]
    ClientCreationFailed(#[source] PlatformError),

    /// The client has not been initialized yet.
    #[error("client must be initialized before attempting to acquire a token")]
    ClientNotInitialized,

    /// The request carried no scopes.
    #[error("call must include a scope")]
    MissingScope,

    /// There is no known account to act on.
    #[error("no account is available to act on")]
    NoAccount,

    /// The platform reported a failure while serving the request.
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    /// The operation could not be driven to completion.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl BrokerError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingClientId => ErrorKind::NoClientId,
            Self::Config { .. } | Self::ConfigStore(_) => ErrorKind::ConfigError,
            Self::ClientIdentityConflict { .. } => ErrorKind::ChangedClientId,
            Self::ClientCreationFailed(_) => ErrorKind::ClientCreationFailed,
            Self::ClientNotInitialized => ErrorKind::NoClient,
            Self::MissingScope => ErrorKind::NoScope,
            Self::NoAccount => ErrorKind::NoAccount,
            Self::Platform(_) => ErrorKind::PlatformError,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// The platform's own diagnostic payload, when the failure came from it.
    pub fn platform_details(&self) -> Option<&PlatformError> {
        match self {
            Self::ClientCreationFailed(e) | Self::Platform(e) => Some(e),
            _ => None,
        }
    }
}
