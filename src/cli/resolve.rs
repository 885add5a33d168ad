//! Resolve command

use super::{format_extension, start_engine, wait_for_client, CLIENT_TIMEOUT};
use anyhow::bail;
use colored::Colorize;
use vpnbridge_core::client::ClientState;
use vpnbridge_core::extension::BrowsingMode;
use vpnbridge_core::proxy::{BrowserProxyConfig, ProxyDecision, ProxyMode};
use vpnbridge_core::types::{parse_proxy, ParsedProxy};

/// Show how a request to `url` would be routed
pub async fn run_resolve(url: &str, browser_proxy: Option<&str>, private: bool) -> anyhow::Result<()> {
    let browser = match browser_proxy {
        Some(proxy) => match parse_proxy(proxy) {
            ParsedProxy::Endpoint(endpoint) => BrowserProxyConfig {
                mode: ProxyMode::Manual,
                manual: Some(endpoint),
                ..BrowserProxyConfig::default()
            },
            ParsedProxy::Unparseable => bail!("Not a proxy URL: {}", proxy),
        },
        None => BrowserProxyConfig::default(),
    };

    let engine = start_engine().await?;
    let client = wait_for_client(&engine, CLIENT_TIMEOUT, ClientState::installed).await;

    let (mode, controller) = if private {
        (BrowsingMode::Private, engine.private().controller())
    } else {
        (BrowsingMode::Normal, engine.normal())
    };
    controller.handle_client_state(&client).await;

    let router = engine.router(mode);
    router.set_browser_config(browser);
    let routed = router.route(url);

    println!("Extension ({}): {}", mode, format_extension(&controller.current()));
    let decision = match &routed.decision {
        ProxyDecision::Direct => routed.decision.to_string().green().to_string(),
        ProxyDecision::Proxies(_) => routed.decision.to_string().cyan().to_string(),
    };
    println!("{} -> {}", url, decision);
    println!("Isolation key: {}", routed.isolation_key);

    engine.shutdown().await;
    Ok(())
}
