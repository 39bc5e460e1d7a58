//! # Authbroker Core
//!
//! Authentication session manager for a single client of an OAuth2/OIDC
//! identity platform.
//!
//! This crate provides:
//! - Derivation and persistence of the platform client configuration
//! - A registry owning the single platform client for the process
//! - A cached, atomically refreshed list of known accounts
//! - Interactive and silent token acquisition, and logout
//! - Callback-style platform traits with an in-memory simulated platform
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use authbroker_core::{InitializeParams, SessionManager};
//!
//! async fn sign_in(session: &SessionManager) -> Result<(), authbroker_core::BrokerError> {
//!     session.initialize(InitializeParams::new("my-client-id")).await?;
//!     session.acquire_token(vec!["User.Read".to_string()]).await?;
//!     let accounts = session.load_accounts().await?;
//!     let token = session.acquire_token_silent(vec!["User.Read".to_string()]).await?;
//!     println!("{} account(s), token expires {:?}", accounts.len(), token.expires_on);
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod config;
pub mod config_store;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod platform;
pub mod registry;
pub mod secret;
pub mod session;

// Re-export commonly used types at crate root
pub use accounts::{AccountStore, select_default_account};

pub use config::{
    Audience,
    Authority,
    AuthorityType,
    ClientConfiguration,
    ConfigDeriver,
    ConfigSource,
    DEFAULT_TEMPLATE,
};

pub use config_store::{
    ConfigStore,
    ConfigStoreError,
    FileConfigStore,
};

pub use coordinator::TokenAcquisitionCoordinator;

pub use error::{BrokerError, ErrorKind};

pub use model::{
    Account,
    AuthenticationResult,
    PresentationContext,
    Prompt,
    RequestMode,
    TokenRequest,
    TokenResult,
};

pub use platform::{
    IdentityPlatform,
    PlatformClient,
    PlatformError,
    SimulatedPlatform,
};

pub use registry::{ClientRegistry, RegistryState};

pub use secret::Secret;

pub use session::{InitializeParams, SessionManager};
