//! Daemon client for communicating with authbrokerd.
//!
//! Requests are newline-delimited JSON-RPC 2.0 over a Unix socket.

use anyhow::{Context, Result};
use authbroker_daemon::api::{AccountInfo, TokenResponse};
use directories::ProjectDirs;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

/// Error object returned by the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RpcError {
    /// Session error kind such as `NO_ACCOUNT`, if the daemon sent one.
    pub fn kind(&self) -> Option<&str> {
        self.data.as_ref()?.get("kind")?.as_str()
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{} ({})", self.message, kind),
            None => write!(f, "{} ({})", self.message, self.code),
        }
    }
}

impl std::error::Error for RpcError {}

/// Client for communicating with the authbroker daemon.
pub struct DaemonClient {
    stream: UnixStream,
    next_id: u64,
}

impl DaemonClient {
    /// Connect to the daemon at the given socket path.
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        debug!("Connecting to daemon at {:?}", socket_path);

        let stream = UnixStream::connect(socket_path).await.with_context(|| {
            format!(
                "Failed to connect to daemon at {:?}. Is `authbroker daemon` running?",
                socket_path
            )
        })?;

        Ok(Self { stream, next_id: 1 })
    }

    /// Send a JSON-RPC request and receive a response.
    async fn send_request<T: for<'de> Deserialize<'de>>(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<T> {
        let id = self.next_id;
        self.next_id += 1;

        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let request_str = serde_json::to_string(&request)?;
        debug!("Sending request: {}", request_str);

        self.stream.write_all(request_str.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;

        let mut reader = BufReader::new(&mut self.stream);
        let mut response_str = String::new();
        if reader.read_line(&mut response_str).await? == 0 {
            anyhow::bail!("Daemon closed the connection");
        }

        debug!("Received response: {}", response_str.trim());

        let response: Value = serde_json::from_str(&response_str)?;

        if let Some(error) = response.get("error") {
            let error: RpcError = serde_json::from_value(error.clone())?;
            return Err(error.into());
        }

        let result = response
            .get("result")
            .ok_or_else(|| anyhow::anyhow!("No result in response"))?;

        Ok(serde_json::from_value(result.clone())?)
    }

    /// Create the platform client in the daemon.
    pub async fn initialize(
        &mut self,
        client_id: &str,
        authority: Option<&str>,
        redirect_uri: Option<&str>,
    ) -> Result<bool> {
        self.send_request(
            "initialize",
            json!({
                "clientId": client_id,
                "authority": authority,
                "redirectUri": redirect_uri,
            }),
        )
        .await
    }

    /// Refresh and list the known accounts.
    pub async fn load_accounts(&mut self) -> Result<Vec<AccountInfo>> {
        self.send_request("loadAccounts", json!({})).await
    }

    /// Interactive login for `scopes`.
    pub async fn acquire_token(&mut self, scopes: &[String]) -> Result<TokenResponse> {
        self.send_request("acquireToken", json!({ "scopes": scopes }))
            .await
    }

    /// Silent token for the first known account.
    pub async fn acquire_token_silent(&mut self, scopes: &[String]) -> Result<TokenResponse> {
        self.send_request("acquireTokenSilent", json!({ "scopes": scopes }))
            .await
    }

    /// Sign out the first known account.
    pub async fn logout(&mut self) -> Result<Vec<AccountInfo>> {
        self.send_request("logout", json!({})).await
    }
}

/// Get the default socket path for the daemon.
pub fn default_socket_path() -> PathBuf {
    ProjectDirs::from("com", "raibid-labs", "authbroker")
        .map(|d| d.runtime_dir().unwrap_or(d.data_dir()).join("authbroker.sock"))
        .unwrap_or_else(|| PathBuf::from("/tmp/authbroker.sock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_kind() {
        let error: RpcError = serde_json::from_value(json!({
            "code": -32022,
            "message": "no account is signed in",
            "data": {"kind": "NO_ACCOUNT", "details": null}
        }))
        .unwrap();
        assert_eq!(error.kind(), Some("NO_ACCOUNT"));
        assert_eq!(error.to_string(), "no account is signed in (NO_ACCOUNT)");
    }

    #[test]
    fn test_rpc_error_without_data() {
        let error: RpcError = serde_json::from_value(json!({
            "code": -32601,
            "message": "Method not found: x"
        }))
        .unwrap();
        assert_eq!(error.kind(), None);
        assert_eq!(error.to_string(), "Method not found: x (-32601)");
    }

    #[test]
    fn test_default_socket_path() {
        assert!(default_socket_path().ends_with("authbroker.sock"));
    }
}
