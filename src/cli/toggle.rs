//! Toggle command

use super::{format_extension, start_engine, wait_for_client, CLIENT_TIMEOUT};
use colored::Colorize;
use vpnbridge_core::client::ClientState;
use vpnbridge_core::extension::ExtensionKind;

/// Flip the extension as the toolbar switch would
pub async fn run_toggle() -> anyhow::Result<()> {
    let engine = start_engine().await?;
    let client = wait_for_client(&engine, CLIENT_TIMEOUT, ClientState::is_ready).await;
    if !client.installed() {
        println!("{}", "VPN client is not reachable; activation will be requested anyway".yellow());
    }

    // The controller task may not have seen this snapshot yet
    engine.normal().handle_client_state(&client).await;

    let mut extension_rx = engine.normal().subscribe();
    let state = engine.normal().toggle_connectivity().await;
    let state = if state.kind == ExtensionKind::Connecting {
        println!("Waiting for the VPN client to connect...");
        let settled = tokio::time::timeout(
            CLIENT_TIMEOUT,
            extension_rx.wait_for(|state| state.kind != ExtensionKind::Connecting),
        )
        .await
        .map(|result| result.is_ok())
        .unwrap_or(false);
        if !settled {
            println!("{}", "VPN client did not confirm in time".yellow());
        }
        engine.normal().current()
    } else {
        state
    };

    println!("Extension: {}", format_extension(&state));
    engine.shutdown().await;
    Ok(())
}
