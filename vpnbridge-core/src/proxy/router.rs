//! Request router
//!
//! The registration point the browser asks once per outbound request.
//! Combines the latest published snapshots and stamps each decision with
//! the current isolation key.

use crate::client::{ClientState, IsolationKey};
use crate::extension::{ExtensionState, ProxyRule};
use crate::overrides::{normalize_origin, SiteMap};
use crate::proxy::{resolve, BrowserProxyConfig, ProxyDecision};
use crate::types::{find_city, relay_endpoints, ProxyEndpoint};
use std::sync::Arc;
use tokio::sync::watch;

/// A decision plus the connection-pool key it must be made under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedRequest {
    pub decision: ProxyDecision,
    pub isolation_key: u64,
}

#[derive(Clone)]
pub struct ProxyRouter {
    browser_tx: Arc<watch::Sender<BrowserProxyConfig>>,
    extension: watch::Receiver<ExtensionState>,
    client: watch::Receiver<ClientState>,
    sites: watch::Receiver<Arc<SiteMap>>,
    isolation_key: IsolationKey,
    relay_port: u16,
}

impl ProxyRouter {
    pub fn new(
        extension: watch::Receiver<ExtensionState>,
        client: watch::Receiver<ClientState>,
        sites: watch::Receiver<Arc<SiteMap>>,
        isolation_key: IsolationKey,
        relay_port: u16,
    ) -> Self {
        let (browser_tx, _) = watch::channel(BrowserProxyConfig::default());
        Self {
            browser_tx: Arc::new(browser_tx),
            extension,
            client,
            sites,
            isolation_key,
            relay_port,
        }
    }

    /// The browser reported new proxy settings
    pub fn set_browser_config(&self, config: BrowserProxyConfig) {
        tracing::debug!(mode = ?config.mode, level_of_control = ?config.level_of_control, "Browser proxy settings changed");
        self.browser_tx.send_replace(config);
    }

    pub fn browser_config(&self) -> BrowserProxyConfig {
        self.browser_tx.borrow().clone()
    }

    /// Decide how the request for `url` is proxied
    pub fn route(&self, url: &str) -> RoutedRequest {
        let browser = self.browser_tx.borrow().clone();
        let state = self.extension.borrow().clone();
        let relays = self.exit_relays(&state);
        let site = normalize_origin(url)
            .ok()
            .and_then(|origin| self.sites.borrow().get(&origin).cloned());

        RoutedRequest {
            decision: resolve(&browser, &state, &relays, site.as_ref()),
            isolation_key: self.isolation_key.current(),
        }
    }

    /// Relays of the client's current exit, else those captured with the state
    fn exit_relays(&self, state: &ExtensionState) -> Vec<ProxyEndpoint> {
        let client = self.client.borrow();
        let live = client
            .exit()
            .and_then(|exit| find_city(&client.servers, exit))
            .map(|city| relay_endpoints(city, self.relay_port))
            .filter(|relays| !relays.is_empty());

        match (live, &state.proxy_rule) {
            (Some(relays), _) => relays,
            (None, ProxyRule::UseExitRelays(relays)) => relays.clone(),
            (None, _) => Vec::new(),
        }
    }
}
