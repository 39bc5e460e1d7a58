//! Interactive and silent token acquisition, and logout.
//!
//! Preconditions are checked in a fixed order and the first failure wins:
//!
//! 1. a client must be ready ([`BrokerError::ClientNotInitialized`])
//! 2. scopes must be non-empty ([`BrokerError::MissingScope`])
//! 3. silent acquisition and logout need a known account
//!    ([`BrokerError::NoAccount`])
//!
//! Platform failures are surfaced as they are reported; nothing is retried.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::accounts::AccountStore;
use crate::error::BrokerError;
use crate::model::{Account, PresentationContext, TokenRequest, TokenResult, require_scopes};
use crate::platform::{self, InteractiveParameters, PlatformClient, PlatformError, SilentParameters};
use crate::registry::ClientRegistry;

/// Drives token requests against the registry's client.
#[derive(Debug, Clone)]
pub struct TokenAcquisitionCoordinator {
    registry: Arc<ClientRegistry>,
    accounts: Arc<AccountStore>,
}

impl TokenAcquisitionCoordinator {
    pub fn new(registry: Arc<ClientRegistry>, accounts: Arc<AccountStore>) -> Self {
        Self { registry, accounts }
    }

    fn require_account(&self) -> Result<Account, BrokerError> {
        self.accounts.default_account().ok_or(BrokerError::NoAccount)
    }

    /// Acquire a token through a fresh interactive login.
    ///
    /// Every account the platform holds is signed out first, then the login
    /// is forced to prompt for credentials.
    pub async fn acquire_interactive(
        &self,
        scopes: Vec<String>,
        context: PresentationContext,
    ) -> TokenResult {
        let client = self.registry.client()?;
        let request = TokenRequest::interactive(scopes)?;

        self.ensure_clean_account_state(&client).await?;

        let params = InteractiveParameters::from_request(request, context)
            .ok_or_else(|| BrokerError::Internal {
                message: "interactive acquisition built a non-interactive request".to_string(),
            })?;
        info!("Starting interactive login for scopes {:?}", params.scopes);

        let result = platform::call(|cb| client.acquire_token_interactive(params, cb)).await?;
        info!("Interactive login completed for {}", result.account);
        Ok(result)
    }

    /// Acquire a token for the default account without user interaction.
    ///
    /// The request targets the authority the account was issued from.
    pub async fn acquire_silent(&self, scopes: Vec<String>) -> TokenResult {
        let client = self.registry.client()?;
        require_scopes(&scopes)?;
        let account = self.require_account()?;
        let request = TokenRequest::silent(scopes, account)?;

        let params = SilentParameters::from_request(request).ok_or_else(|| BrokerError::Internal {
            message: "silent acquisition built a request without an account".to_string(),
        })?;
        debug!(
            "Acquiring token silently for {} from {}",
            params.account, params.authority
        );

        let result = platform::call(|cb| client.acquire_token_silent(params, cb)).await?;
        Ok(result)
    }

    /// Sign out the default account and return the accounts that remain.
    pub async fn logout(&self) -> Result<Vec<Account>, BrokerError> {
        let client = self.registry.client()?;
        let account = self.require_account()?;

        info!("Signing out {}", account);
        platform::call(|cb| client.remove_account(&account, cb))
            .await
            .map_err(|e| {
                warn!("Failed to sign out {}: {}", account, e);
                BrokerError::Platform(e)
            })?;

        self.accounts.refresh(&self.registry).await
    }

    /// Remove every account the platform holds, one at a time.
    ///
    /// Interactive login always starts from zero accounts. The account
    /// snapshot is refreshed afterwards; any account still present is an
    /// error and aborts the login.
    pub async fn ensure_clean_account_state(
        &self,
        client: &Arc<dyn PlatformClient>,
    ) -> Result<(), BrokerError> {
        let existing = platform::call(|cb| client.list_accounts(cb)).await?;

        for account in &existing {
            debug!("Removing prior account {}", account);
            platform::call(|cb| client.remove_account(account, cb))
                .await
                .map_err(|e| {
                    warn!("Failed to remove prior account {}: {}", account, e);
                    BrokerError::Platform(e)
                })?;
        }

        let remaining = self.accounts.refresh(&self.registry).await?;
        if !remaining.is_empty() {
            return Err(BrokerError::Platform(PlatformError::new(
                "sign_out_incomplete",
                format!("{} account(s) remained after sign-out", remaining.len()),
            )));
        }

        if !existing.is_empty() {
            info!("Signed out {} prior account(s)", existing.len());
        }
        Ok(())
    }
}
