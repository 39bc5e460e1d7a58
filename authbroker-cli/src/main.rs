//! Authbroker CLI
//!
//! Command-line front end for the authbroker daemon.
//!
//! # Usage
//!
//! ```bash
//! # Run the daemon in the foreground
//! authbroker daemon
//!
//! # Create the platform client
//! authbroker init 11111111-2222-3333-4444-555555555555
//!
//! # Sign in interactively, then fetch tokens silently
//! authbroker login --scopes User.Read
//! authbroker token --scopes User.Read --format json
//!
//! # List and sign out accounts
//! authbroker accounts
//! authbroker logout
//! ```

mod client;

use anyhow::Result;
use authbroker_daemon::api::{AccountInfo, TokenResponse};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::FmtSubscriber;

use crate::client::{default_socket_path, DaemonClient};

#[derive(Parser)]
#[command(name = "authbroker")]
#[command(about = "Identity platform token broker")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Daemon socket path
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the platform client for an application
    Init {
        /// Application (client) id
        client_id: String,

        /// Authority URL; its last path segment is the tenant id
        #[arg(short, long)]
        authority: Option<String>,

        /// Redirect URI registered for the application
        #[arg(short, long)]
        redirect_uri: Option<String>,
    },

    /// List signed-in accounts
    Accounts,

    /// Sign in interactively and print the access token
    Login {
        /// Scopes to request (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        scopes: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Get a token silently for the signed-in account
    Token {
        /// Scopes to request (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        scopes: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Sign out the signed-in account
    Logout,

    /// Run the daemon in the foreground
    Daemon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        FmtSubscriber::builder()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    let socket = cli.socket.unwrap_or_else(default_socket_path);

    match cli.command {
        Commands::Daemon => run_daemon_foreground(socket).await,
        Commands::Init {
            client_id,
            authority,
            redirect_uri,
        } => {
            let mut client = DaemonClient::connect(&socket).await?;
            client
                .initialize(&client_id, authority.as_deref(), redirect_uri.as_deref())
                .await?;
            println!("Client {} is ready", client_id);
            Ok(())
        }
        Commands::Accounts => {
            let mut client = DaemonClient::connect(&socket).await?;
            print_accounts(&client.load_accounts().await?);
            Ok(())
        }
        Commands::Login { scopes, format } => {
            let mut client = DaemonClient::connect(&socket).await?;
            let token = client.acquire_token(&scopes).await?;
            print_token(&token, format)
        }
        Commands::Token { scopes, format } => {
            let mut client = DaemonClient::connect(&socket).await?;
            let token = client.acquire_token_silent(&scopes).await?;
            print_token(&token, format)
        }
        Commands::Logout => {
            let mut client = DaemonClient::connect(&socket).await?;
            let remaining = client.logout().await?;
            println!("Signed out");
            if !remaining.is_empty() {
                print_accounts(&remaining);
            }
            Ok(())
        }
    }
}

fn print_accounts(accounts: &[AccountInfo]) {
    if accounts.is_empty() {
        println!("No accounts signed in");
        return;
    }

    println!("Accounts:");
    for account in accounts {
        println!(
            "  {} {} ({})",
            account.identifier,
            account.username.as_deref().unwrap_or("-"),
            account.authority
        );
    }
}

fn print_token(token: &TokenResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(token)?),
        OutputFormat::Text => println!("{}", token.access_token),
    }
    Ok(())
}

async fn run_daemon_foreground(socket: PathBuf) -> Result<()> {
    let mut config = authbroker_daemon::load_config()?;
    config.socket_path = socket;
    authbroker_daemon::init_logging(&config.log_level);
    authbroker_daemon::run_daemon(config).await
}
