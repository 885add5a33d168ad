//! Per-request proxy resolution

use crate::extension::ExtensionState;
use crate::overrides::SiteContext;
use crate::types::ProxyEndpoint;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod router;

pub use router::{ProxyRouter, RoutedRequest};

/// Who controls the browser's proxy settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelOfControl {
    NotControllable,
    ControlledByOtherExtensions,
    #[default]
    ControllableByThisExtension,
    ControlledByThisExtension,
}

/// Browser proxy mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    #[default]
    None,
    System,
    AutoDetect,
    Autoconfig,
    Manual,
}

/// The browser's own proxy settings, read-only
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BrowserProxyConfig {
    pub level_of_control: LevelOfControl,
    pub mode: ProxyMode,
    pub manual: Option<ProxyEndpoint>,
}

impl BrowserProxyConfig {
    /// A manual proxy configured by the user or another extension
    pub fn manual_proxy(&self) -> Option<&ProxyEndpoint> {
        if self.mode != ProxyMode::Manual
            || self.level_of_control == LevelOfControl::ControlledByThisExtension
        {
            return None;
        }
        self.manual.as_ref()
    }
}

/// Where one request goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyDecision {
    Direct,
    /// Try these in order
    Proxies(Vec<ProxyEndpoint>),
}

impl ProxyDecision {
    fn from_list(proxies: &[ProxyEndpoint]) -> Self {
        if proxies.is_empty() {
            ProxyDecision::Direct
        } else {
            ProxyDecision::Proxies(proxies.to_vec())
        }
    }
}

impl fmt::Display for ProxyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyDecision::Direct => write!(f, "DIRECT"),
            ProxyDecision::Proxies(proxies) => {
                let list: Vec<String> = proxies.iter().map(ProxyEndpoint::to_string).collect();
                write!(f, "{}", list.join(", "))
            }
        }
    }
}

/// Decide how a single request is proxied
///
/// Precedence, highest first:
/// 1. a manual browser proxy, unless the extension routes through exit relays
/// 2. the loophole, when the user bypassed the tunnel
/// 3. direct, when the extension is not enabled
/// 4. the origin's own override
/// 5. the exit relays, when the extension routes through them
pub fn resolve(
    browser: &BrowserProxyConfig,
    state: &ExtensionState,
    exit_relays: &[ProxyEndpoint],
    site: Option<&SiteContext>,
) -> ProxyDecision {
    let routes_through_relays = state.enabled && state.use_exit_relays;

    if let Some(manual) = browser.manual_proxy() {
        if !routes_through_relays {
            return ProxyDecision::Proxies(vec![manual.clone()]);
        }
    }

    if !state.enabled {
        if state.bypass_tunnel {
            if let Some(bypass) = state.bypass_endpoint() {
                return ProxyDecision::Proxies(vec![bypass.clone()]);
            }
        }
        return ProxyDecision::Direct;
    }

    if let Some(site) = site {
        return ProxyDecision::from_list(&site.proxy_info);
    }

    if state.use_exit_relays {
        ProxyDecision::from_list(exit_relays)
    } else {
        ProxyDecision::Direct
    }
}
