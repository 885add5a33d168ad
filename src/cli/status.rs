//! Status and watch commands

use super::{format_client, format_extension, start_engine, wait_for_client, CLIENT_TIMEOUT};
use colored::Colorize;
use vpnbridge_core::client::ClientState;

/// Print the client and extension state once
pub async fn run_status() -> anyhow::Result<()> {
    let engine = start_engine().await?;
    let client = wait_for_client(&engine, CLIENT_TIMEOUT, ClientState::installed).await;

    print_client(&client);
    println!("Extension: {}", format_extension(&engine.normal().current()));

    engine.shutdown().await;
    Ok(())
}

/// Print every state change until interrupted
pub async fn run_watch() -> anyhow::Result<()> {
    let engine = start_engine().await?;
    let mut client_rx = engine.link().subscribe();
    let mut extension_rx = engine.normal().subscribe();
    println!("Watching VPN client (Ctrl+C to stop)");

    loop {
        tokio::select! {
            changed = client_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let client = client_rx.borrow_and_update().clone();
                print_client(&client);
            }
            changed = extension_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = extension_rx.borrow_and_update().clone();
                println!("Extension: {}", format_extension(&state));
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}

fn print_client(client: &ClientState) {
    println!("VPN client: {}", format_client(client));
    if let Some(exit) = client.exit() {
        println!("  Exit location: {}", exit.to_string().bold());
    }
    if let Some(loophole) = client.loophole() {
        println!("  Bypass proxy: {}", loophole);
    }
    if !client.disabled_apps.is_empty() {
        println!("  Split tunnelled apps: {}", client.disabled_apps.len());
    }
    println!("  Server countries: {}", client.servers.len());
}
