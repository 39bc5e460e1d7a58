//! Authbroker Daemon Library
//!
//! Exposes the daemon's API, configuration and run loop so the CLI can
//! host it in-process and tests can drive it over a socket.

pub mod api;
pub mod config;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub use api::{start_server, ApiState, ServerHandle};
pub use config::{load_config, DaemonConfig};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_level` when set.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Serve the API on the configured socket until Ctrl+C.
pub async fn run_daemon(config: DaemonConfig) -> Result<()> {
    info!("Daemon starting on {:?}", config.socket_path);

    let state = ApiState::simulated(&config)?;
    let server_handle = start_server(&config.socket_path, state).await?;

    info!("Daemon running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping server...");

    server_handle.stop().await?;

    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
        info!("Socket file removed");
    }

    info!("Daemon stopped");
    Ok(())
}
