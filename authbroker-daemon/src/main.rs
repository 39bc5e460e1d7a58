//! Authbroker Daemon
//!
//! Background service that owns the identity platform client and serves
//! token requests to local clients.
//!
//! # Running
//!
//! ```bash
//! cargo run -p authbroker-daemon
//! # or after install:
//! authbrokerd
//! ```

use anyhow::Result;
use authbroker_daemon::{init_logging, load_config, run_daemon};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_logging(&config.log_level);

    info!("Starting authbroker daemon...");
    info!("Loaded configuration from {:?}", config.config_path);

    run_daemon(config).await
}
