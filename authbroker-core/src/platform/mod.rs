//! Boundary to the identity platform SDK.
//!
//! This module provides:
//! - [`IdentityPlatform`] - Creates the single client from a [`ConfigSource`]
//! - [`PlatformClient`] - Account and token capabilities of a created client
//! - [`Callback`] / [`call`] - Adapter turning the SDK's completion callbacks
//!   into a single awaited result
//! - [`SimulatedPlatform`] - In-memory platform for tests and development
//!
//! The SDK reports completion by invoking a callback, possibly from a thread
//! of its own. Every callback handed out here is an `FnOnce` wrapped around a
//! one-shot channel, so each request resolves exactly once. A callback that
//! is dropped without being invoked resolves as [`PlatformError::dropped`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::config::ConfigSource;
use crate::model::{
    Account, AuthenticationResult, PresentationContext, Prompt, RequestMode, TokenRequest,
};

mod simulated;

pub use simulated::{PlatformCall, PlatformOp, SimulatedPlatform};

/// Failure reported by the platform, with its own diagnostic payload.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct PlatformError {
    /// Platform error code (e.g. `invalid_grant`).
    pub code: String,

    /// Platform diagnostic message.
    pub message: String,
}

impl PlatformError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// The platform dropped a completion callback without invoking it.
    pub fn dropped() -> Self {
        Self::new("callback_dropped", "platform released the request without completing it")
    }
}

/// Completion callback handed to the platform.
pub type Callback<T> = Box<dyn FnOnce(Result<T, PlatformError>) + Send + 'static>;

/// Issue a callback-style platform request and wait for its completion.
///
/// `start` receives the callback and must hand it to the platform.
pub async fn call<T, F>(start: F) -> Result<T, PlatformError>
where
    T: Send + 'static,
    F: FnOnce(Callback<T>),
{
    let (tx, rx) = oneshot::channel();
    let callback: Callback<T> = Box::new(move |result| {
        // The receiver is gone only if the waiting operation was dropped.
        let _ = tx.send(result);
    });
    start(callback);
    rx.await.unwrap_or_else(|_| Err(PlatformError::dropped()))
}

/// Parameters for an interactive token request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractiveParameters {
    pub scopes: Vec<String>,
    pub prompt: Prompt,
    pub context: PresentationContext,
}

/// Parameters for a silent token request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SilentParameters {
    pub scopes: Vec<String>,
    pub account: Account,
    /// Authority the request is issued against.
    pub authority: String,
}

impl InteractiveParameters {
    /// Parameters for an interactive `request`. Login is always prompted.
    ///
    /// Returns `None` unless `request` is interactive.
    pub fn from_request(request: TokenRequest, context: PresentationContext) -> Option<Self> {
        match request.mode {
            RequestMode::Interactive => Some(Self {
                scopes: request.scopes,
                prompt: Prompt::Login,
                context,
            }),
            RequestMode::Silent => None,
        }
    }
}

impl SilentParameters {
    /// Parameters for a silent `request`, issued against the authority of
    /// the account it is bound to.
    ///
    /// Returns `None` unless `request` is silent and bound to an account.
    pub fn from_request(request: TokenRequest) -> Option<Self> {
        match (request.mode, request.account) {
            (RequestMode::Silent, Some(account)) => Some(Self {
                scopes: request.scopes,
                authority: account.authority.clone(),
                account,
            }),
            _ => None,
        }
    }
}

/// Factory for the platform client.
pub trait IdentityPlatform: Send + Sync {
    /// Create a client bound to the configuration in `source`.
    fn create_client(&self, source: ConfigSource, on_created: Callback<Arc<dyn PlatformClient>>);
}

/// Capabilities of a created platform client.
pub trait PlatformClient: Send + Sync {
    /// The client id this client was created with.
    fn client_id(&self) -> &str;

    /// List the accounts the platform holds for this client.
    fn list_accounts(&self, callback: Callback<Vec<Account>>);

    /// Remove `account` from the platform.
    fn remove_account(&self, account: &Account, callback: Callback<()>);

    /// Acquire a token through the interactive login UI.
    fn acquire_token_interactive(
        &self,
        params: InteractiveParameters,
        callback: Callback<AuthenticationResult>,
    );

    /// Acquire a token from the cached session of an account.
    fn acquire_token_silent(&self, params: SilentParameters, callback: Callback<AuthenticationResult>);
}
