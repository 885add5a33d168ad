//! Site override commands

use super::{start_engine, wait_for_client, CLIENT_TIMEOUT};
use colored::Colorize;
use vpnbridge_core::engine::Engine;
use vpnbridge_core::overrides::SiteContext;

/// Pin an origin to an exit location
pub async fn run_site_add(origin: &str, country_code: &str, city_code: &str) -> anyhow::Result<()> {
    let engine = start_engine().await?;
    // Cached servers are enough; otherwise give the client a chance to send them
    wait_for_client(&engine, CLIENT_TIMEOUT, |client| !client.servers.is_empty()).await;

    let result = engine
        .overrides()
        .set_override(origin, country_code, city_code)
        .await;
    finish(engine, result.map(|context| print_context(&context))).await
}

/// Keep an origin out of the tunnel
pub async fn run_site_exclude(origin: &str) -> anyhow::Result<()> {
    let engine = start_engine().await?;
    let result = engine.overrides().exclude_origin(origin).await;
    finish(engine, result.map(|context| print_context(&context))).await
}

/// Remove an origin's override
pub async fn run_site_remove(origin: &str) -> anyhow::Result<()> {
    let engine = start_engine().await?;
    let result = engine.overrides().remove_override(origin).await.map(|removed| {
        if removed {
            println!("{} {}", "Removed".green(), origin);
        } else {
            println!("No override for {}", origin);
        }
    });
    finish(engine, result).await
}

/// List all overrides
pub async fn run_site_list() -> anyhow::Result<()> {
    let engine = start_engine().await?;
    let sites = engine.overrides().snapshot();
    if sites.is_empty() {
        println!("No site overrides");
    }
    for context in sites.values() {
        print_context(context);
    }
    finish(engine, Ok::<(), vpnbridge_core::error::BridgeError>(())).await
}

async fn finish<E>(engine: Engine, result: Result<(), E>) -> anyhow::Result<()>
where
    E: Into<vpnbridge_core::error::BridgeError>,
{
    engine.shutdown().await;
    result.map_err(|e| anyhow::Error::from(e.into()))
}

fn print_context(context: &SiteContext) {
    if context.excluded {
        println!("{}  {}", context.origin.bold(), "excluded".yellow());
        return;
    }

    let location = match (&context.country_code, &context.city_code) {
        (Some(country), Some(city)) => format!("{}/{}", country, city),
        _ => "unknown location".to_string(),
    };
    println!("{}  {}", context.origin.bold(), location.cyan());
    for proxy in &context.proxy_info {
        println!("    {}", proxy);
    }
}
