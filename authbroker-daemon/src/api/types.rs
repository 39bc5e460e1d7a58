//! API request/response types for the daemon JSON-RPC interface.

use authbroker_core::{Account, AuthenticationResult};
use serde::{Deserialize, Serialize};

/// Parameters of `initialize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    /// Application (client) id registered with the identity platform
    pub client_id: Option<String>,
    /// Authority URL whose last path segment is the tenant id
    pub authority: Option<String>,
    /// Redirect URI registered for the application
    pub redirect_uri: Option<String>,
}

/// Parameters of `acquireToken` and `acquireTokenSilent`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenRequestParams {
    /// Scopes to request
    pub scopes: Option<Vec<String>>,
}

/// An account known to the identity platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    /// Platform account identifier
    pub identifier: String,
    /// Authority the account was issued from
    pub authority: String,
    /// Signed-in user name, if known
    pub username: Option<String>,
}

impl From<Account> for AccountInfo {
    fn from(account: Account) -> Self {
        Self {
            identifier: account.identifier,
            authority: account.authority,
            username: account.username,
        }
    }
}

/// Result of a successful token acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// The access token value
    pub access_token: String,
    /// The ID token, if issued
    pub id_token: Option<String>,
    /// Account the token was issued for
    pub account: AccountInfo,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Expiration timestamp (ISO 8601)
    pub expires_on: Option<String>,
}

impl From<AuthenticationResult> for TokenResponse {
    fn from(result: AuthenticationResult) -> Self {
        Self {
            access_token: result.access_token.expose().to_string(),
            id_token: result.id_token.as_ref().map(|t| t.expose().to_string()),
            account: result.account.clone().into(),
            scopes: result.scopes.clone(),
            expires_on: result.expires_on.map(|dt| dt.to_rfc3339()),
        }
    }
}
