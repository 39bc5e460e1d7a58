//! In-memory identity platform.
//!
//! Behaves like the SDK from the session manager's point of view: every
//! request completes on a separate thread through its callback. Interactive
//! logins create a new account recorded against the client's default
//! authority, silent requests require a known account and a matching
//! authority. Every request is recorded, and the next request of a given
//! kind can be made to fail.

use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{
    Callback, IdentityPlatform, InteractiveParameters, PlatformClient, PlatformError,
    SilentParameters,
};
use crate::config::{ClientConfiguration, ConfigSource, DEFAULT_AUTHORITY_HOST};
use crate::model::{Account, AuthenticationResult, PresentationContext, Prompt};
use crate::secret::Secret;

/// Kinds of platform request, used for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformOp {
    CreateClient,
    ListAccounts,
    RemoveAccount,
    AcquireInteractive,
    AcquireSilent,
}

/// A request received by the simulated platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    CreateClient {
        client_id: String,
        persisted: bool,
    },
    ListAccounts,
    RemoveAccount {
        identifier: String,
    },
    AcquireInteractive {
        scopes: Vec<String>,
        prompt: Prompt,
        context: PresentationContext,
    },
    AcquireSilent {
        scopes: Vec<String>,
        account: String,
        authority: String,
    },
}

#[derive(Default)]
struct PlatformState {
    accounts: Vec<Account>,
    calls: Vec<PlatformCall>,
    failures: HashMap<PlatformOp, PlatformError>,
    next_username: Option<String>,
    clients_created: usize,
}

impl PlatformState {
    fn record(&mut self, op: PlatformOp, call: PlatformCall) -> Result<(), PlatformError> {
        self.calls.push(call);
        match self.failures.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// In-memory [`IdentityPlatform`].
///
/// Clones share state, so a test can keep a handle for inspection while the
/// session manager owns another.
#[derive(Clone, Default)]
pub struct SimulatedPlatform {
    state: Arc<Mutex<PlatformState>>,
    latency: Duration,
}

impl SimulatedPlatform {
    /// Create an empty platform that completes requests immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every completion by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Add an account as if a previous login had cached it.
    pub fn seed_account(&self, account: Account) {
        self.state.lock().accounts.push(account);
    }

    /// Accounts currently held by the platform.
    pub fn accounts(&self) -> Vec<Account> {
        self.state.lock().accounts.clone()
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().calls.clone()
    }

    /// Number of clients successfully created.
    pub fn clients_created(&self) -> usize {
        self.state.lock().clients_created
    }

    /// Make the next request of kind `op` fail with `err`.
    pub fn fail_next(&self, op: PlatformOp, err: PlatformError) {
        self.state.lock().failures.insert(op, err);
    }

    /// Username reported for the next interactive login.
    pub fn sign_in_as(&self, username: impl Into<String>) {
        self.state.lock().next_username = Some(username.into());
    }

    fn complete<T: Send + 'static>(&self, callback: Callback<T>, result: Result<T, PlatformError>) {
        let latency = self.latency;
        std::thread::spawn(move || {
            if !latency.is_zero() {
                std::thread::sleep(latency);
            }
            callback(result);
        });
    }

    fn load_source(source: &ConfigSource) -> Result<ClientConfiguration, PlatformError> {
        match source {
            ConfigSource::Template(config) => Ok(config.clone()),
            ConfigSource::Persisted { path, .. } => ClientConfiguration::load_from_path(path)
                .map_err(|e| PlatformError::new("invalid_configuration", e.to_string())),
        }
    }
}

impl IdentityPlatform for SimulatedPlatform {
    fn create_client(&self, source: ConfigSource, on_created: Callback<Arc<dyn PlatformClient>>) {
        let result = {
            let mut state = self.state.lock();
            state
                .record(
                    PlatformOp::CreateClient,
                    PlatformCall::CreateClient {
                        client_id: source.client_id().to_string(),
                        persisted: matches!(source, ConfigSource::Persisted { .. }),
                    },
                )
                .and_then(|_| Self::load_source(&source))
                .map(|config| {
                    state.clients_created += 1;
                    debug!("Simulated platform created client {}", config.client_id);
                    Arc::new(SimulatedClient {
                        config,
                        platform: self.clone(),
                    }) as Arc<dyn PlatformClient>
                })
        };
        self.complete(on_created, result);
    }
}

struct SimulatedClient {
    config: ClientConfiguration,
    platform: SimulatedPlatform,
}

impl SimulatedClient {
    fn default_authority(&self) -> String {
        self.config
            .default_authority()
            .map(|a| a.authority_url())
            .unwrap_or_else(|| format!("{}/common", DEFAULT_AUTHORITY_HOST))
    }

    fn issue(account: Account, scopes: Vec<String>) -> AuthenticationResult {
        AuthenticationResult {
            access_token: Secret::new(format!("sim-at-{}", Uuid::new_v4())),
            id_token: Some(Secret::new(format!("sim-id-{}", Uuid::new_v4()))),
            account,
            scopes,
            expires_on: Some(Utc::now() + ChronoDuration::hours(1)),
        }
    }
}

impl PlatformClient for SimulatedClient {
    fn client_id(&self) -> &str {
        &self.config.client_id
    }

    fn list_accounts(&self, callback: Callback<Vec<Account>>) {
        let result = {
            let mut state = self.platform.state.lock();
            state
                .record(PlatformOp::ListAccounts, PlatformCall::ListAccounts)
                .map(|_| state.accounts.clone())
        };
        self.platform.complete(callback, result);
    }

    fn remove_account(&self, account: &Account, callback: Callback<()>) {
        let result = {
            let mut state = self.platform.state.lock();
            state
                .record(
                    PlatformOp::RemoveAccount,
                    PlatformCall::RemoveAccount {
                        identifier: account.identifier.clone(),
                    },
                )
                .and_then(|_| {
                    let before = state.accounts.len();
                    state.accounts.retain(|a| a.identifier != account.identifier);
                    if state.accounts.len() == before {
                        return Err(PlatformError::new(
                            "account_not_found",
                            format!("account {} is not known", account.identifier),
                        ));
                    }
                    Ok(())
                })
        };
        self.platform.complete(callback, result);
    }

    fn acquire_token_interactive(
        &self,
        params: InteractiveParameters,
        callback: Callback<AuthenticationResult>,
    ) {
        let authority = self.default_authority();
        let result = {
            let mut state = self.platform.state.lock();
            state
                .record(
                    PlatformOp::AcquireInteractive,
                    PlatformCall::AcquireInteractive {
                        scopes: params.scopes.clone(),
                        prompt: params.prompt,
                        context: params.context.clone(),
                    },
                )
                .map(|_| {
                    let username = state
                        .next_username
                        .take()
                        .unwrap_or_else(|| "user@example.com".to_string());
                    let account =
                        Account::new(Uuid::new_v4().to_string(), authority).with_username(username);
                    state.accounts.push(account.clone());
                    Self::issue(account, params.scopes)
                })
        };
        self.platform.complete(callback, result);
    }

    fn acquire_token_silent(&self, params: SilentParameters, callback: Callback<AuthenticationResult>) {
        let result = {
            let mut state = self.platform.state.lock();
            state
                .record(
                    PlatformOp::AcquireSilent,
                    PlatformCall::AcquireSilent {
                        scopes: params.scopes.clone(),
                        account: params.account.identifier.clone(),
                        authority: params.authority.clone(),
                    },
                )
                .and_then(|_| {
                    let account = state
                        .accounts
                        .iter()
                        .find(|a| a.identifier == params.account.identifier)
                        .cloned()
                        .ok_or_else(|| {
                            PlatformError::new("no_account_found", "account is not in the cache")
                        })?;
                    if account.authority != params.authority {
                        return Err(PlatformError::new(
                            "authority_mismatch",
                            format!(
                                "account was issued by {}, request targets {}",
                                account.authority, params.authority
                            ),
                        ));
                    }
                    Ok(Self::issue(account, params.scopes))
                })
        };
        self.platform.complete(callback, result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigDeriver;
    use crate::platform::call;

    async fn client(platform: &SimulatedPlatform) -> Arc<dyn PlatformClient> {
        let config = ConfigDeriver::with_default_template()
            .unwrap()
            .derive("id1", None, None)
            .unwrap();
        call(|cb| platform.create_client(ConfigSource::Template(config), cb))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_interactive_login_adds_account() {
        let platform = SimulatedPlatform::new();
        let client = client(&platform).await;
        platform.sign_in_as("ada@example.com");

        let params = InteractiveParameters {
            scopes: vec!["User.Read".to_string()],
            prompt: Prompt::Login,
            context: PresentationContext::Headless,
        };
        let result = call(|cb| client.acquire_token_interactive(params, cb))
            .await
            .unwrap();

        assert_eq!(result.account.username.as_deref(), Some("ada@example.com"));
        assert_eq!(result.account.authority, "https://login.microsoftonline.com/0000-default");
        assert_eq!(platform.accounts().len(), 1);
    }

    #[tokio::test]
    async fn test_silent_requires_matching_authority() {
        let platform = SimulatedPlatform::new();
        let client = client(&platform).await;
        let account = Account::new("acc-1", "https://login.example.com/tenant-a");
        platform.seed_account(account.clone());

        let params = SilentParameters {
            scopes: vec!["user.read".to_string()],
            account: account.clone(),
            authority: "https://login.example.com/other".to_string(),
        };
        let err = call(|cb| client.acquire_token_silent(params, cb))
            .await
            .unwrap_err();
        assert_eq!(err.code, "authority_mismatch");
    }

    #[tokio::test]
    async fn test_fail_next_applies_once() {
        let platform = SimulatedPlatform::new();
        let client = client(&platform).await;
        platform.fail_next(PlatformOp::ListAccounts, PlatformError::new("offline", "no network"));

        assert!(call(|cb| client.list_accounts(cb)).await.is_err());
        assert!(call(|cb| client.list_accounts(cb)).await.is_ok());
    }

    #[tokio::test]
    async fn test_remove_unknown_account_fails() {
        let platform = SimulatedPlatform::new();
        let client = client(&platform).await;
        let err = call(|cb| client.remove_account(&Account::new("ghost", "a"), cb))
            .await
            .unwrap_err();
        assert_eq!(err.code, "account_not_found");
    }
}
