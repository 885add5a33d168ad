//! CLI command implementations
//!
//! This module contains the implementation of all CLI subcommands.

pub mod init;
pub mod resolve;
pub mod site;
pub mod status;
pub mod toggle;

use chrono::{DateTime, Utc};
use colored::Colorize;
use std::time::Duration;
use vpnbridge_core::client::{ClientKind, ClientState};
use vpnbridge_core::config::toml_config::load_config;
use vpnbridge_core::engine::Engine;
use vpnbridge_core::extension::{ExtensionKind, ExtensionState};

/// How long commands wait for the VPN client to answer
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Load the configuration and start the engine
pub async fn start_engine() -> anyhow::Result<Engine> {
    let config = load_config()?;
    Ok(Engine::start(&config).await?)
}

/// Wait until the client snapshot satisfies `ready`, or the timeout passes
///
/// Returns the last snapshot either way.
pub async fn wait_for_client<F>(engine: &Engine, timeout: Duration, ready: F) -> ClientState
where
    F: FnMut(&ClientState) -> bool,
{
    let mut client_rx = engine.link().subscribe();
    let satisfied = tokio::time::timeout(timeout, client_rx.wait_for(ready))
        .await
        .map(|result| result.is_ok())
        .unwrap_or(false);
    if !satisfied {
        tracing::debug!("Timed out waiting for the VPN client");
    }
    engine.link().current()
}

pub fn format_client(client: &ClientState) -> String {
    let kind = client.kind.to_string();
    match &client.kind {
        ClientKind::Enabled(_) => kind.green().to_string(),
        ClientKind::OnPartial(_) => kind.yellow().to_string(),
        ClientKind::Disabled | ClientKind::Closed => kind.normal().to_string(),
        ClientKind::Unavailable | ClientKind::SubscriptionNeeded | ClientKind::NeedsUpdate => {
            kind.red().to_string()
        }
    }
}

pub fn format_extension(state: &ExtensionState) -> String {
    let kind = state.kind.to_string();
    let kind = match state.kind {
        ExtensionKind::Enabled => kind.green().bold().to_string(),
        ExtensionKind::Connecting => kind.yellow().to_string(),
        ExtensionKind::Disabled => kind.red().to_string(),
        ExtensionKind::Idle => kind.dimmed().to_string(),
    };

    let mut details = Vec::new();
    if state.use_exit_relays {
        details.push("exit relays".to_string());
    }
    if state.bypass_tunnel {
        details.push("bypassing tunnel".to_string());
    }
    if let Some(since) = state.connected_since {
        details.push(format!("for {}", format_elapsed(since, Utc::now())));
    }

    if details.is_empty() {
        kind
    } else {
        format!("{} ({})", kind, details.join(", "))
    }
}

fn format_elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - since).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m {}s", s / 60, s % 60),
        s => format!("{}h {}m", s / 3600, (s % 3600) / 60),
    }
}
