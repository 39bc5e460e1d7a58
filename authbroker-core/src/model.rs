//! Domain model types for the session manager.
//!
//! This module defines the values that flow between the components:
//! - [`Account`] - An account known to the identity platform
//! - [`TokenRequest`] - A token request before it is handed to the platform
//! - [`PresentationContext`] - Where interactive login UI is shown
//! - [`AuthenticationResult`] - The opaque payload of a successful acquisition

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BrokerError;
use crate::secret::Secret;

/// An account known to the identity platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Platform-assigned account identifier.
    pub identifier: String,

    /// The authority the account was issued from.
    pub authority: String,

    /// Display name of the signed-in user, if the platform reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Account {
    /// Create an account without a username.
    pub fn new(identifier: impl Into<String>, authority: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            authority: authority.into(),
            username: None,
        }
    }

    /// Attach a username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.username {
            Some(username) => write!(f, "{} ({})", username, self.identifier),
            None => write!(f, "{}", self.identifier),
        }
    }
}

/// How a token is requested from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Live user interaction through the login UI.
    Interactive,
    /// Served from the platform's cached session without interaction.
    Silent,
}

/// Login prompt behavior for interactive requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Always ask for credentials, never reuse a cached session.
    Login,
}

/// Where interactive login is presented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PresentationContext {
    /// No host window is attached; the platform picks its own surface.
    #[default]
    Headless,
    /// A host window identified by an opaque handle.
    Window { handle: String },
}

/// A validated token request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// Requested scopes, in caller order.
    pub scopes: Vec<String>,

    /// The account the request is bound to (silent requests only).
    pub account: Option<Account>,

    /// Interactive or silent.
    pub mode: RequestMode,
}

impl TokenRequest {
    /// Build an interactive request. Scopes are kept exactly as given.
    pub fn interactive(scopes: Vec<String>) -> Result<Self, BrokerError> {
        require_scopes(&scopes)?;
        Ok(Self {
            scopes,
            account: None,
            mode: RequestMode::Interactive,
        })
    }

    /// Build a silent request bound to `account`.
    ///
    /// Scopes are folded to lowercase since platform token caches key on the
    /// exact scope string.
    pub fn silent(scopes: Vec<String>, account: Account) -> Result<Self, BrokerError> {
        require_scopes(&scopes)?;
        Ok(Self {
            scopes: normalize_scopes(scopes),
            account: Some(account),
            mode: RequestMode::Silent,
        })
    }
}

/// Fail with [`BrokerError::MissingScope`] when no scope was given.
pub fn require_scopes(scopes: &[String]) -> Result<(), BrokerError> {
    if scopes.is_empty() {
        return Err(BrokerError::MissingScope);
    }
    Ok(())
}

/// Lowercase every scope, preserving order.
pub fn normalize_scopes(scopes: Vec<String>) -> Vec<String> {
    scopes.into_iter().map(|s| s.to_lowercase()).collect()
}

/// Payload of a successful token acquisition.
///
/// The session manager hands this through without inspecting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResult {
    /// The access token.
    pub access_token: Secret,

    /// The ID token, if the platform issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<Secret>,

    /// The account the token was issued for.
    pub account: Account,

    /// Scopes granted for the token.
    pub scopes: Vec<String>,

    /// When the access token expires.
    pub expires_on: Option<DateTime<Utc>>,
}

/// Outward result of a token acquisition.
pub type TokenResult = Result<AuthenticationResult, BrokerError>;
