//! Ownership of the single platform client.
//!
//! [`ClientRegistry`] moves through `Uninitialized -> Initializing -> Ready`.
//! A failed creation returns to `Uninitialized`; `Ready` is final for the
//! lifetime of the process. Creation requests are serialized, so at most one
//! is in flight and at most one client is ever stored.
//!
//! Once a caller holds the creation lock, preparing the configuration and
//! creating the client run on a spawned task that owns the lock. Dropping
//! the caller's future does not abandon a creation half way: the task still
//! settles the slot, and the next caller waits for it.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::{ClientConfiguration, ConfigSource};
use crate::error::BrokerError;
use crate::platform::{self, IdentityPlatform, PlatformClient};

/// Observable state of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryState {
    Uninitialized,
    Initializing,
    Ready,
}

impl fmt::Display for RegistryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
        };
        write!(f, "{}", s)
    }
}

enum Slot {
    Uninitialized,
    Initializing,
    Ready {
        config: ClientConfiguration,
        client: Arc<dyn PlatformClient>,
    },
}

/// Owner of the platform client.
pub struct ClientRegistry {
    platform: Arc<dyn IdentityPlatform>,
    slot: Arc<RwLock<Slot>>,
    creation: Arc<Mutex<()>>,
}

impl ClientRegistry {
    /// Create an uninitialized registry over `platform`.
    pub fn new(platform: Arc<dyn IdentityPlatform>) -> Self {
        Self {
            platform,
            slot: Arc::new(RwLock::new(Slot::Uninitialized)),
            creation: Arc::new(Mutex::new(())),
        }
    }

    /// Current state.
    pub fn state(&self) -> RegistryState {
        match &*self.slot.read() {
            Slot::Uninitialized => RegistryState::Uninitialized,
            Slot::Initializing => RegistryState::Initializing,
            Slot::Ready { .. } => RegistryState::Ready,
        }
    }

    /// Whether a client is ready.
    pub fn is_ready(&self) -> bool {
        self.state() == RegistryState::Ready
    }

    /// Client id of the ready client.
    pub fn client_id(&self) -> Option<String> {
        match &*self.slot.read() {
            Slot::Ready { config, .. } => Some(config.client_id.clone()),
            _ => None,
        }
    }

    /// Configuration the ready client was created with.
    pub fn configuration(&self) -> Option<ClientConfiguration> {
        match &*self.slot.read() {
            Slot::Ready { config, .. } => Some(config.clone()),
            _ => None,
        }
    }

    /// The ready client.
    pub fn client(&self) -> Result<Arc<dyn PlatformClient>, BrokerError> {
        match &*self.slot.read() {
            Slot::Ready { client, .. } => Ok(client.clone()),
            _ => Err(BrokerError::ClientNotInitialized),
        }
    }

    /// Compare `client_id` against the ready client.
    ///
    /// Returns `Ok(true)` when ready with the same identity, `Ok(false)` when
    /// no client is ready, and [`BrokerError::ClientIdentityConflict`] when
    /// ready with another identity.
    pub fn check_identity(&self, client_id: &str) -> Result<bool, BrokerError> {
        match &*self.slot.read() {
            Slot::Ready { config, .. } if config.client_id == client_id => Ok(true),
            Slot::Ready { config, .. } => Err(BrokerError::ClientIdentityConflict {
                active: config.client_id.clone(),
                requested: client_id.to_string(),
            }),
            _ => Ok(false),
        }
    }

    /// Create the client from `source`, or confirm the existing one.
    pub async fn initialize(&self, source: ConfigSource) -> Result<bool, BrokerError> {
        let client_id = source.client_id().to_string();
        self.initialize_with(&client_id, move || Ok(source)).await
    }

    /// Like [`initialize`](Self::initialize), but only builds the source once
    /// it is known that a client must be created.
    ///
    /// `prepare` runs on the blocking pool while the creation lock is held,
    /// so side effects such as persisting the configuration never race
    /// another initialization.
    pub async fn initialize_with<F>(&self, client_id: &str, prepare: F) -> Result<bool, BrokerError>
    where
        F: FnOnce() -> Result<ConfigSource, BrokerError> + Send + 'static,
    {
        if self.check_identity(client_id)? {
            debug!("Client {} already initialized", client_id);
            return Ok(true);
        }

        let creation = self.creation.clone().lock_owned().await;

        // Another caller may have finished while we waited.
        if self.check_identity(client_id)? {
            debug!("Client {} initialized by a concurrent caller", client_id);
            return Ok(true);
        }

        let task = tokio::spawn(create_client(
            self.platform.clone(),
            self.slot.clone(),
            client_id.to_string(),
            prepare,
            creation,
        ));

        task.await.map_err(|e| BrokerError::Internal {
            message: format!("client creation for {} did not complete: {}", client_id, e),
        })?
    }
}

/// Prepare the source and create the client, settling `slot` either way.
///
/// Holds the creation lock until the slot has left `Initializing`.
async fn create_client<F>(
    platform: Arc<dyn IdentityPlatform>,
    slot: Arc<RwLock<Slot>>,
    client_id: String,
    prepare: F,
    _creation: OwnedMutexGuard<()>,
) -> Result<bool, BrokerError>
where
    F: FnOnce() -> Result<ConfigSource, BrokerError> + Send + 'static,
{
    let source = tokio::task::spawn_blocking(prepare)
        .await
        .map_err(|e| BrokerError::Internal {
            message: format!("preparing the configuration for {} failed: {}", client_id, e),
        })??;
    if source.client_id() != client_id {
        return Err(BrokerError::config(format!(
            "prepared configuration is bound to {}, expected {}",
            source.client_id(),
            client_id
        )));
    }
    let config = source.config().clone();

    *slot.write() = Slot::Initializing;
    info!("Creating platform client for {}", client_id);

    let created = platform::call(|cb| platform.create_client(source, cb)).await;

    match created {
        Ok(client) => {
            *slot.write() = Slot::Ready { config, client };
            info!("Platform client for {} is ready", client_id);
            Ok(true)
        }
        Err(e) => {
            *slot.write() = Slot::Uninitialized;
            warn!("Platform client creation for {} failed: {}", client_id, e);
            Err(BrokerError::ClientCreationFailed(e))
        }
    }
}

impl fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("state", &self.state())
            .field("client_id", &self.client_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigDeriver;
    use crate::platform::{PlatformError, PlatformOp, SimulatedPlatform};
    use std::time::Duration;

    fn source(client_id: &str) -> ConfigSource {
        let config = ConfigDeriver::with_default_template()
            .unwrap()
            .derive(client_id, None, None)
            .unwrap();
        ConfigSource::Template(config)
    }

    #[tokio::test]
    async fn test_initialize_transitions_to_ready() {
        let platform = SimulatedPlatform::new();
        let registry = ClientRegistry::new(Arc::new(platform.clone()));
        assert_eq!(registry.state(), RegistryState::Uninitialized);
        assert!(matches!(registry.client(), Err(BrokerError::ClientNotInitialized)));

        assert!(registry.initialize(source("id1")).await.unwrap());

        assert_eq!(registry.state(), RegistryState::Ready);
        assert_eq!(registry.client_id().as_deref(), Some("id1"));
        assert_eq!(registry.client().unwrap().client_id(), "id1");
        assert_eq!(platform.clients_created(), 1);
    }

    #[tokio::test]
    async fn test_reinitialize_same_id_is_noop() {
        let platform = SimulatedPlatform::new();
        let registry = ClientRegistry::new(Arc::new(platform.clone()));

        registry.initialize(source("id1")).await.unwrap();
        let first = registry.client().unwrap();
        assert!(registry.initialize(source("id1")).await.unwrap());

        assert_eq!(platform.clients_created(), 1);
        assert!(Arc::ptr_eq(&first, &registry.client().unwrap()));
    }

    #[tokio::test]
    async fn test_reinitialize_other_id_conflicts() {
        let platform = SimulatedPlatform::new();
        let registry = ClientRegistry::new(Arc::new(platform.clone()));

        registry.initialize(source("id1")).await.unwrap();
        let err = registry.initialize(source("id2")).await.unwrap_err();

        assert!(matches!(err, BrokerError::ClientIdentityConflict { .. }));
        assert_eq!(registry.client_id().as_deref(), Some("id1"));
        assert_eq!(platform.clients_created(), 1);
    }

    #[tokio::test]
    async fn test_creation_failure_returns_to_uninitialized() {
        let platform = SimulatedPlatform::new();
        platform.fail_next(
            PlatformOp::CreateClient,
            PlatformError::new("invalid_client", "unknown application"),
        );
        let registry = ClientRegistry::new(Arc::new(platform.clone()));

        let err = registry.initialize(source("id1")).await.unwrap_err();
        assert!(matches!(err, BrokerError::ClientCreationFailed(_)));
        assert_eq!(registry.state(), RegistryState::Uninitialized);

        // A later attempt may succeed.
        assert!(registry.initialize(source("id1")).await.unwrap());
        assert_eq!(registry.state(), RegistryState::Ready);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_initialize_creates_one_client() {
        let platform = SimulatedPlatform::new().with_latency(Duration::from_millis(20));
        let registry = Arc::new(ClientRegistry::new(Arc::new(platform.clone())));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.initialize(source("id1")).await })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().unwrap());
        }
        assert_eq!(platform.clients_created(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_initialize_still_settles() {
        let platform = SimulatedPlatform::new().with_latency(Duration::from_millis(200));
        let registry = Arc::new(ClientRegistry::new(Arc::new(platform.clone())));

        let attempt =
            tokio::time::timeout(Duration::from_millis(20), registry.initialize(source("id1"))).await;
        assert!(attempt.is_err(), "creation should still be in flight");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(registry.state(), RegistryState::Ready);
        assert_eq!(registry.client_id().as_deref(), Some("id1"));

        assert!(registry.initialize(source("id1")).await.unwrap());
        assert_eq!(platform.clients_created(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_initialize_after_abandoned_attempt_waits_for_it() {
        let platform = SimulatedPlatform::new().with_latency(Duration::from_millis(100));
        let registry = Arc::new(ClientRegistry::new(Arc::new(platform.clone())));

        let attempt =
            tokio::time::timeout(Duration::from_millis(10), registry.initialize(source("id1"))).await;
        assert!(attempt.is_err());

        // Queues behind the abandoned creation instead of starting another.
        assert!(registry.initialize(source("id1")).await.unwrap());
        assert_eq!(registry.state(), RegistryState::Ready);
        assert_eq!(platform.clients_created(), 1);
    }

    #[tokio::test]
    async fn test_prepare_skipped_when_ready() {
        let registry = ClientRegistry::new(Arc::new(SimulatedPlatform::new()));
        registry.initialize(source("id1")).await.unwrap();

        let result = registry
            .initialize_with("id1", || panic!("prepare must not run"))
            .await;
        assert!(result.unwrap());
    }
}
