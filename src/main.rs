//! vpnbridge - VPN client to browser proxy bridge
//!
//! Talks to a locally running VPN client through its native messaging
//! bridge and shows how browser requests would be routed.

use clap::{Parser, Subcommand};
use vpnbridge_core::{error::BridgeError, init_logging};

mod cli;

#[derive(Parser)]
#[command(name = "vpnbridge")]
#[command(about = "Reconcile VPN client state with per-site browser proxy decisions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
    /// Show VPN client and extension state
    Status,
    /// Follow state changes until interrupted
    Watch,
    /// Turn the extension on or off
    Toggle,
    /// Manage per-site overrides
    Site {
        #[command(subcommand)]
        action: SiteCommands,
    },
    /// Show how a request to a URL would be proxied
    Resolve {
        url: String,
        /// Manual proxy configured in the browser, e.g. http://proxy:3128
        #[arg(long)]
        browser_proxy: Option<String>,
        /// Resolve for a private window
        #[arg(long)]
        private: bool,
    },
}

#[derive(Subcommand)]
enum SiteCommands {
    /// Route an origin through an exit location
    Add {
        origin: String,
        country_code: String,
        city_code: String,
    },
    /// Keep an origin out of the tunnel
    Exclude { origin: String },
    /// Remove an origin's override
    Remove { origin: String },
    /// List all overrides
    List,
}

/// Exit code for a failed command: 2 for configuration problems, 1 otherwise
fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<BridgeError>() {
        Some(BridgeError::Config(_) | BridgeError::Toml(_) | BridgeError::TomlSerialize(_)) => 2,
        Some(
            BridgeError::Transport(_)
            | BridgeError::Protocol(_)
            | BridgeError::Storage(_)
            | BridgeError::Override(_)
            | BridgeError::Tab(_)
            | BridgeError::Io(_),
        ) => 1,
        None => 1,
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(2);
    }

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { force } => cli::init::run_init(force),
        Commands::Status => cli::status::run_status().await,
        Commands::Watch => cli::status::run_watch().await,
        Commands::Toggle => cli::toggle::run_toggle().await,
        Commands::Site { action } => match action {
            SiteCommands::Add {
                origin,
                country_code,
                city_code,
            } => cli::site::run_site_add(&origin, &country_code, &city_code).await,
            SiteCommands::Exclude { origin } => cli::site::run_site_exclude(&origin).await,
            SiteCommands::Remove { origin } => cli::site::run_site_remove(&origin).await,
            SiteCommands::List => cli::site::run_site_list().await,
        },
        Commands::Resolve {
            url,
            browser_proxy,
            private,
        } => cli::resolve::run_resolve(&url, browser_proxy.as_deref(), private).await,
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(exit_code(&e));
    }
}
