//! The session manager exposed to the dispatch layer.
//!
//! [`SessionManager`] composes the configuration deriver, the client
//! registry, the account store and the token coordinator behind the five
//! outward operations. `initialize` waits its turn on the registry, which
//! then derives, persists and creates the client on a task of its own that
//! finishes even if the caller stops waiting. Every other operation is
//! spawned onto the runtime and its single result is awaited.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), authbroker_core::BrokerError> {
//! use std::sync::Arc;
//! use authbroker_core::{
//!     ConfigDeriver, FileConfigStore, InitializeParams, SessionManager, SimulatedPlatform,
//! };
//!
//! let session = SessionManager::new(
//!     Arc::new(SimulatedPlatform::new()),
//!     ConfigDeriver::with_default_template()?,
//!     Arc::new(FileConfigStore::at("/tmp/client_config.json")),
//! );
//!
//! session.initialize(InitializeParams::new("my-client-id")).await?;
//! let result = session.acquire_token(vec!["User.Read".to_string()]).await?;
//! println!("signed in as {}", result.account);
//! # Ok(())
//! # }
//! ```

use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};

use crate::accounts::AccountStore;
use crate::config::ConfigDeriver;
use crate::config_store::ConfigStore;
use crate::coordinator::TokenAcquisitionCoordinator;
use crate::error::BrokerError;
use crate::model::{Account, PresentationContext, TokenResult};
use crate::platform::IdentityPlatform;
use crate::registry::{ClientRegistry, RegistryState};

/// Arguments of `initialize`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitializeParams {
    pub client_id: Option<String>,
    pub authority: Option<String>,
    pub redirect_uri: Option<String>,
}

impl InitializeParams {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            ..Self::default()
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }
}

struct SessionInner {
    deriver: ConfigDeriver,
    config_store: Arc<dyn ConfigStore>,
    registry: Arc<ClientRegistry>,
    accounts: Arc<AccountStore>,
    coordinator: TokenAcquisitionCoordinator,
    presentation: RwLock<PresentationContext>,
}

/// Authentication session manager.
///
/// Cheap to clone; clones share the same client and account snapshot.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    /// Create a session manager. No client exists until `initialize`.
    pub fn new(
        platform: Arc<dyn IdentityPlatform>,
        deriver: ConfigDeriver,
        config_store: Arc<dyn ConfigStore>,
    ) -> Self {
        let registry = Arc::new(ClientRegistry::new(platform));
        let accounts = Arc::new(AccountStore::new());
        let coordinator = TokenAcquisitionCoordinator::new(registry.clone(), accounts.clone());

        Self {
            inner: Arc::new(SessionInner {
                deriver,
                config_store,
                registry,
                accounts,
                coordinator,
                presentation: RwLock::new(PresentationContext::default()),
            }),
        }
    }

    /// Create the platform client, or confirm the existing one.
    ///
    /// Returns `true` on success. Initializing again with the same client id
    /// is a no-op; a different client id fails with
    /// [`BrokerError::ClientIdentityConflict`].
    pub async fn initialize(&self, params: InitializeParams) -> Result<bool, BrokerError> {
        let InitializeParams {
            client_id,
            authority,
            redirect_uri,
        } = params;
        let client_id = match client_id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(BrokerError::MissingClientId),
        };
        debug!("initialize({})", client_id);

        let inner = self.inner.clone();
        let bound_id = client_id.clone();
        self.inner
            .registry
            .initialize_with(&client_id, move || {
                inner.deriver.prepare(
                    &bound_id,
                    authority.as_deref(),
                    redirect_uri.as_deref(),
                    inner.config_store.as_ref(),
                )
            })
            .await
    }

    /// Refresh and return the known accounts.
    pub async fn load_accounts(&self) -> Result<Vec<Account>, BrokerError> {
        self.dispatch("loadAccounts", |inner| async move {
            inner.accounts.refresh(&inner.registry).await
        })
        .await
    }

    /// Acquire a token through interactive login.
    pub async fn acquire_token(&self, scopes: Vec<String>) -> TokenResult {
        let context = self.inner.presentation.read().clone();
        self.dispatch("acquireToken", |inner| async move {
            inner.coordinator.acquire_interactive(scopes, context).await
        })
        .await
    }

    /// Acquire a token silently for the default account.
    pub async fn acquire_token_silent(&self, scopes: Vec<String>) -> TokenResult {
        self.dispatch("acquireTokenSilent", |inner| async move {
            inner.coordinator.acquire_silent(scopes).await
        })
        .await
    }

    /// Sign out the default account and return the remaining accounts.
    pub async fn logout(&self) -> Result<Vec<Account>, BrokerError> {
        self.dispatch("logout", |inner| async move { inner.coordinator.logout().await })
            .await
    }

    /// Use `context` for subsequent interactive logins.
    pub fn attach_presentation(&self, context: PresentationContext) {
        *self.inner.presentation.write() = context;
    }

    /// Fall back to a headless presentation context.
    pub fn detach_presentation(&self) {
        *self.inner.presentation.write() = PresentationContext::Headless;
    }

    /// Whether a client is ready.
    pub fn is_initialized(&self) -> bool {
        self.inner.registry.is_ready()
    }

    /// State of the client registry.
    pub fn state(&self) -> RegistryState {
        self.inner.registry.state()
    }

    /// The client registry.
    pub fn registry(&self) -> &ClientRegistry {
        &self.inner.registry
    }

    /// The account store.
    pub fn accounts(&self) -> &AccountStore {
        &self.inner.accounts
    }

    /// Run `op` on a runtime worker and wait for its single result.
    async fn dispatch<T, F, Fut>(&self, name: &'static str, op: F) -> Result<T, BrokerError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<SessionInner>) -> Fut,
        Fut: Future<Output = Result<T, BrokerError>> + Send + 'static,
    {
        debug!("Dispatching {}", name);
        tokio::spawn(op(self.inner.clone()))
            .await
            .map_err(|e| {
                error!("{} did not complete: {}", name, e);
                BrokerError::Internal {
                    message: format!("{} did not complete: {}", name, e),
                }
            })?
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("registry", &self.inner.registry)
            .field("accounts", &self.inner.accounts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::FileConfigStore;
    use crate::platform::{PlatformCall, SimulatedPlatform};
    use tempfile::TempDir;

    fn session(platform: &SimulatedPlatform) -> (SessionManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let session = SessionManager::new(
            Arc::new(platform.clone()),
            ConfigDeriver::with_default_template().unwrap(),
            Arc::new(FileConfigStore::in_dir(temp_dir.path())),
        );
        (session, temp_dir)
    }

    #[tokio::test]
    async fn test_missing_client_id() {
        let (session, _temp) = session(&SimulatedPlatform::new());
        let result = session.initialize(InitializeParams::default()).await;
        assert!(matches!(result, Err(BrokerError::MissingClientId)));

        let result = session.initialize(InitializeParams::new("")).await;
        assert!(matches!(result, Err(BrokerError::MissingClientId)));
        assert_eq!(session.state(), RegistryState::Uninitialized);
    }

    #[tokio::test]
    async fn test_default_initialize_does_not_persist() {
        let platform = SimulatedPlatform::new();
        let (session, temp) = session(&platform);

        assert!(session.initialize(InitializeParams::new("id1")).await.unwrap());

        assert!(!temp.path().join("client_config.json").exists());
        assert_eq!(
            platform.calls()[0],
            PlatformCall::CreateClient {
                client_id: "id1".to_string(),
                persisted: false,
            }
        );
    }

    #[tokio::test]
    async fn test_custom_initialize_persists() {
        let platform = SimulatedPlatform::new();
        let (session, temp) = session(&platform);

        let params = InitializeParams::new("id1")
            .with_authority("https://login.example.com/tenant-a")
            .with_redirect_uri("msauth://app/hash");
        session.initialize(params).await.unwrap();

        let path = temp.path().join("client_config.json");
        let persisted: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(persisted["client_id"], "id1");
        assert_eq!(persisted["redirect_uri"], "msauth://app/hash");
        assert_eq!(persisted["authorities"][0]["audience"]["tenant_id"], "tenant-a");
        assert_eq!(
            platform.calls()[0],
            PlatformCall::CreateClient {
                client_id: "id1".to_string(),
                persisted: true,
            }
        );
    }

    #[tokio::test]
    async fn test_attached_presentation_is_used() {
        let platform = SimulatedPlatform::new();
        let (session, _temp) = session(&platform);
        session.initialize(InitializeParams::new("id1")).await.unwrap();

        let context = PresentationContext::Window {
            handle: "0x42".to_string(),
        };
        session.attach_presentation(context.clone());
        session.acquire_token(vec!["user.read".to_string()]).await.unwrap();

        assert!(platform.calls().iter().any(|c| matches!(
            c,
            PlatformCall::AcquireInteractive { context: used, .. } if *used == context
        )));
    }
}
