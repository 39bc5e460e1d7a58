//! JSON-RPC server implementation with Unix socket support.
//!
//! Requests and responses are newline-delimited JSON-RPC 2.0 messages.
//! Parameters may be passed by name (an object) or by position (an array).

use super::handlers::{ApiState, AuthBrokerApiImpl, AuthBrokerApiServer};
use super::types::{InitializeRequest, TokenRequestParams};
use anyhow::{Context, Result};
use jsonrpsee::types::ErrorObject;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Standard JSON-RPC error codes.
const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

/// Handle to a running RPC server
pub struct ServerHandle {
    shutdown: Arc<Mutex<Option<tokio::sync::mpsc::Sender<()>>>>,
    join_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

/// Start the JSON-RPC server on a Unix socket.
///
/// # Parameters
///
/// - `socket_path`: Path to the Unix socket file
/// - `state`: API state shared across handlers
///
/// # Returns
///
/// A handle to the running server that can be used to stop it.
pub async fn start_server(socket_path: &Path, state: ApiState) -> Result<ServerHandle> {
    if socket_path.exists() {
        warn!("Removing stale socket at {:?}", socket_path);
        std::fs::remove_file(socket_path)
            .with_context(|| format!("Failed to remove existing socket at {:?}", socket_path))?;
    }

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create socket directory {:?}", parent))?;
    }

    info!("Starting JSON-RPC server on {:?}", socket_path);

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind Unix socket at {:?}", socket_path))?;

    let api = Arc::new(AuthBrokerApiImpl::new(state));

    let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(1);

    let server_task: JoinHandle<()> = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = rx.recv() => {
                    debug!("Server shutdown signal received");
                    break;
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let api = api.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, api).await {
                                    warn!("Connection handler error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }
    });

    info!("JSON-RPC server listening");

    Ok(ServerHandle {
        shutdown: Arc::new(Mutex::new(Some(tx))),
        join_handle: Arc::new(Mutex::new(Some(server_task))),
    })
}

/// Handle a single connection
async fn handle_connection(mut stream: UnixStream, api: Arc<AuthBrokerApiImpl>) -> Result<()> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        debug!("Received request: {}", line.trim());

        let response = match serde_json::from_str::<Value>(&line) {
            Ok(request) => process_request(request, &api).await,
            Err(e) => error_response(
                Value::Null,
                ErrorObject::owned(PARSE_ERROR, format!("Parse error: {}", e), None::<()>),
            ),
        };

        writer.write_all(response.to_string().as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Process a JSON-RPC request
async fn process_request(request: Value, api: &AuthBrokerApiImpl) -> Value {
    let id = request.get("id").cloned().unwrap_or(Value::Null);

    if !request.is_object() {
        return error_response(
            id,
            ErrorObject::owned(INVALID_REQUEST, "Invalid Request: not an object", None::<()>),
        );
    }

    let method = match request.get("method").and_then(|m| m.as_str()) {
        Some(m) => m,
        None => {
            return error_response(
                id,
                ErrorObject::owned(INVALID_REQUEST, "Invalid Request: missing method", None::<()>),
            );
        }
    };

    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let result = match method {
        "initialize" => match initialize_params(params) {
            Ok(p) => to_result(api.initialize(p.client_id, p.authority, p.redirect_uri).await),
            Err(e) => Err(e),
        },
        "loadAccounts" => to_result(api.load_accounts().await),
        "acquireToken" => match scope_params(params) {
            Ok(scopes) => to_result(api.acquire_token(scopes).await),
            Err(e) => Err(e),
        },
        "acquireTokenSilent" => match scope_params(params) {
            Ok(scopes) => to_result(api.acquire_token_silent(scopes).await),
            Err(e) => Err(e),
        },
        "logout" => to_result(api.logout().await),
        other => {
            debug!("Unknown method: {}", other);
            Err(ErrorObject::owned(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
                None::<()>,
            ))
        }
    };

    match result {
        Ok(value) => json!({
            "jsonrpc": "2.0",
            "result": value,
            "id": id
        }),
        Err(error) => error_response(id, error),
    }
}

fn error_response(id: Value, error: ErrorObject<'_>) -> Value {
    let mut body = json!({
        "code": error.code(),
        "message": error.message(),
    });
    if let Some(data) = error.data() {
        if let Ok(data) = serde_json::from_str::<Value>(data.get()) {
            body["data"] = data;
        }
    }
    json!({
        "jsonrpc": "2.0",
        "error": body,
        "id": id
    })
}

fn to_result<T: Serialize>(
    result: Result<T, ErrorObject<'static>>,
) -> Result<Value, ErrorObject<'static>> {
    let value = result?;
    serde_json::to_value(value).map_err(|e| {
        ErrorObject::owned(
            INTERNAL_ERROR,
            format!("Failed to serialize result: {}", e),
            None::<()>,
        )
    })
}

fn invalid_params(message: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(INVALID_PARAMS, message.into(), None::<()>)
}

/// `initialize` params: `{clientId, authority, redirectUri}` or
/// `[clientId, authority, redirectUri]`.
fn initialize_params(params: Value) -> Result<InitializeRequest, ErrorObject<'static>> {
    match params {
        Value::Null => Ok(InitializeRequest::default()),
        Value::Object(_) => serde_json::from_value(params)
            .map_err(|e| invalid_params(format!("Invalid params: {}", e))),
        Value::Array(items) => {
            let mut fields = items.into_iter().map(optional_string);
            Ok(InitializeRequest {
                client_id: fields.next().transpose()?.flatten(),
                authority: fields.next().transpose()?.flatten(),
                redirect_uri: fields.next().transpose()?.flatten(),
            })
        }
        _ => Err(invalid_params("Invalid params: expected object or array")),
    }
}

fn optional_string(value: Value) -> Result<Option<String>, ErrorObject<'static>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(invalid_params(format!(
            "Invalid params: expected string, got {}",
            other
        ))),
    }
}

/// Token params: `{scopes: [...]}` or `[[...]]`.
fn scope_params(params: Value) -> Result<Option<Vec<String>>, ErrorObject<'static>> {
    let scopes = match params {
        Value::Null => return Ok(None),
        Value::Object(_) => {
            serde_json::from_value::<TokenRequestParams>(params)
                .map_err(|e| invalid_params(format!("Invalid params: {}", e)))?
                .scopes
        }
        Value::Array(items) => match items.into_iter().next() {
            None | Some(Value::Null) => None,
            Some(first) => Some(
                serde_json::from_value::<Vec<String>>(first)
                    .map_err(|e| invalid_params(format!("Invalid params: {}", e)))?,
            ),
        },
        _ => return Err(invalid_params("Invalid params: expected object or array")),
    };
    Ok(scopes)
}

impl ServerHandle {
    /// Stop the server and wait for the accept loop to exit.
    pub async fn stop(&self) -> Result<()> {
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.join_handle.lock().await.take() {
            handle.await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_params_by_name() {
        let p = initialize_params(json!({"clientId": "id1", "redirectUri": "msauth://x"})).unwrap();
        assert_eq!(p.client_id.as_deref(), Some("id1"));
        assert_eq!(p.authority, None);
        assert_eq!(p.redirect_uri.as_deref(), Some("msauth://x"));
    }

    #[test]
    fn test_initialize_params_by_position() {
        let p = initialize_params(json!(["id1", "https://login.example.com/t1"])).unwrap();
        assert_eq!(p.client_id.as_deref(), Some("id1"));
        assert_eq!(p.authority.as_deref(), Some("https://login.example.com/t1"));
        assert_eq!(p.redirect_uri, None);
    }

    #[test]
    fn test_initialize_params_rejects_non_string() {
        let err = initialize_params(json!([42])).unwrap_err();
        assert_eq!(err.code(), INVALID_PARAMS);
    }

    #[test]
    fn test_scope_params() {
        assert_eq!(
            scope_params(json!({"scopes": ["a", "B"]})).unwrap(),
            Some(vec!["a".to_string(), "B".to_string()])
        );
        assert_eq!(
            scope_params(json!([["a"]])).unwrap(),
            Some(vec!["a".to_string()])
        );
        assert_eq!(scope_params(Value::Null).unwrap(), None);
        assert_eq!(scope_params(json!({})).unwrap(), None);
        assert!(scope_params(json!({"scopes": [1]})).is_err());
    }

    #[test]
    fn test_error_response_keeps_data() {
        let response = error_response(
            json!(7),
            ErrorObject::owned(-32021, "no scope", Some(json!({"kind": "NO_SCOPE"}))),
        );
        assert_eq!(response["id"], 7);
        assert_eq!(response["error"]["code"], -32021);
        assert_eq!(response["error"]["data"]["kind"], "NO_SCOPE");
    }
}
