//! JSON-RPC API handlers for the daemon.

use anyhow::Result;
use authbroker_core::{
    BrokerError, ErrorKind, IdentityPlatform, InitializeParams, SessionManager, SimulatedPlatform,
};
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObject;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{AccountInfo, TokenResponse};
use crate::config::DaemonConfig;

/// State shared across RPC handlers.
pub struct ApiState {
    /// The session manager every call is dispatched to
    pub session: SessionManager,
}

impl ApiState {
    /// Create API state from the daemon configuration and a platform.
    pub fn new(config: &DaemonConfig, platform: Arc<dyn IdentityPlatform>) -> Result<Self> {
        let session = SessionManager::new(
            platform,
            config.deriver()?,
            Arc::new(config.config_store()),
        );
        Ok(Self { session })
    }

    /// Create API state backed by the simulated platform.
    pub fn simulated(config: &DaemonConfig) -> Result<Self> {
        warn!(
            "No native identity platform is linked; using the simulated platform. \
             Tokens it issues are not valid for any service."
        );
        Self::new(config, Arc::new(SimulatedPlatform::new()))
    }

    /// Create API state around an existing session (useful for tests).
    pub fn with_session(session: SessionManager) -> Self {
        Self { session }
    }
}

/// JSON-RPC API trait definition.
#[rpc(server)]
pub trait AuthBrokerApi {
    /// Create the platform client.
    ///
    /// # Parameters
    ///
    /// - `client_id`: Application id (required)
    /// - `authority`: Authority URL ending in the tenant id
    /// - `redirect_uri`: Redirect URI override
    ///
    /// # Returns
    ///
    /// `true` once the client is ready.
    #[method(name = "initialize")]
    async fn initialize(
        &self,
        client_id: Option<String>,
        authority: Option<String>,
        redirect_uri: Option<String>,
    ) -> RpcResult<bool>;

    /// Refresh and list the known accounts.
    #[method(name = "loadAccounts")]
    async fn load_accounts(&self) -> RpcResult<Vec<AccountInfo>>;

    /// Acquire a token through interactive login.
    ///
    /// # Parameters
    ///
    /// - `scopes`: Scopes to request, kept exactly as given
    #[method(name = "acquireToken")]
    async fn acquire_token(&self, scopes: Option<Vec<String>>) -> RpcResult<TokenResponse>;

    /// Acquire a token silently for the first known account.
    ///
    /// # Parameters
    ///
    /// - `scopes`: Scopes to request, folded to lowercase
    #[method(name = "acquireTokenSilent")]
    async fn acquire_token_silent(&self, scopes: Option<Vec<String>>) -> RpcResult<TokenResponse>;

    /// Sign out the first known account.
    ///
    /// # Returns
    ///
    /// The accounts that remain.
    #[method(name = "logout")]
    async fn logout(&self) -> RpcResult<Vec<AccountInfo>>;
}

/// Implementation of the authbroker API.
pub struct AuthBrokerApiImpl {
    state: ApiState,
}

impl AuthBrokerApiImpl {
    /// Create a new API implementation with the given state.
    pub fn new(state: ApiState) -> Self {
        Self { state }
    }
}

#[async_trait::async_trait]
impl AuthBrokerApiServer for AuthBrokerApiImpl {
    async fn initialize(
        &self,
        client_id: Option<String>,
        authority: Option<String>,
        redirect_uri: Option<String>,
    ) -> RpcResult<bool> {
        info!(
            "RPC: initialize({:?}, authority: {:?}, redirect_uri: {:?})",
            client_id, authority, redirect_uri
        );

        let params = InitializeParams {
            client_id,
            authority,
            redirect_uri,
        };
        self.state
            .session
            .initialize(params)
            .await
            .map_err(broker_error)
    }

    async fn load_accounts(&self) -> RpcResult<Vec<AccountInfo>> {
        debug!("RPC: loadAccounts()");

        let accounts = self.state.session.load_accounts().await.map_err(broker_error)?;
        Ok(accounts.into_iter().map(AccountInfo::from).collect())
    }

    async fn acquire_token(&self, scopes: Option<Vec<String>>) -> RpcResult<TokenResponse> {
        info!("RPC: acquireToken({:?})", scopes);

        let result = self
            .state
            .session
            .acquire_token(scopes.unwrap_or_default())
            .await
            .map_err(broker_error)?;
        Ok(result.into())
    }

    async fn acquire_token_silent(&self, scopes: Option<Vec<String>>) -> RpcResult<TokenResponse> {
        debug!("RPC: acquireTokenSilent({:?})", scopes);

        let result = self
            .state
            .session
            .acquire_token_silent(scopes.unwrap_or_default())
            .await
            .map_err(broker_error)?;
        Ok(result.into())
    }

    async fn logout(&self) -> RpcResult<Vec<AccountInfo>> {
        info!("RPC: logout()");

        let accounts = self.state.session.logout().await.map_err(broker_error)?;
        Ok(accounts.into_iter().map(AccountInfo::from).collect())
    }
}

/// JSON-RPC error code for each error kind.
pub fn error_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NoClientId => -32010,
        ErrorKind::ChangedClientId => -32011,
        ErrorKind::ConfigError => -32012,
        ErrorKind::ClientCreationFailed => -32013,
        ErrorKind::NoClient => -32020,
        ErrorKind::NoScope => -32021,
        ErrorKind::NoAccount => -32022,
        ErrorKind::PlatformError => -32030,
        ErrorKind::Internal => -32603,
    }
}

/// Convert a session error into a JSON-RPC error.
///
/// `data.kind` carries the machine-readable kind and `data.details` the
/// platform's diagnostic payload, if any.
pub fn broker_error(err: BrokerError) -> ErrorObject<'static> {
    let kind = err.kind();
    let details = err.platform_details().map(|d| json!(d));
    ErrorObject::owned(
        error_code(kind),
        err.to_string(),
        Some(json!({
            "kind": kind.code(),
            "details": details,
        })),
    )
}
