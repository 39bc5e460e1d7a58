//! JSON-RPC API for daemon IPC.
//!
//! The `authbroker` CLI and other local clients talk to `authbrokerd`
//! through this interface.

pub mod handlers;
pub mod server;
pub mod types;

pub use handlers::{broker_error, error_code, ApiState, AuthBrokerApiImpl, AuthBrokerApiServer};
pub use server::{start_server, ServerHandle};
pub use types::*;
