//! Extension state values
//!
//! What the user sees: one of four kinds, plus the proxy rule the resolver
//! should follow while that state is current.

use crate::client::ClientState;
use crate::types::{find_city, parse_proxy, relay_endpoints, ProxyEndpoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// User-visible extension state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionKind {
    /// No opinion about the client yet
    Idle,
    /// Activation requested, waiting for the client to confirm
    Connecting,
    Enabled,
    Disabled,
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionKind::Idle => write!(f, "idle"),
            ExtensionKind::Connecting => write!(f, "connecting"),
            ExtensionKind::Enabled => write!(f, "enabled"),
            ExtensionKind::Disabled => write!(f, "disabled"),
        }
    }
}

/// How requests are routed while a state is current
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProxyRule {
    #[default]
    Direct,
    /// Skip the tunnel through the client's loophole
    BypassTunnel(ProxyEndpoint),
    /// Exit relays of the client's location, heaviest first
    UseExitRelays(Vec<ProxyEndpoint>),
}

/// Snapshot of the extension for one browsing mode
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionState {
    pub kind: ExtensionKind,
    pub enabled: bool,
    pub connected_since: Option<DateTime<Utc>>,
    /// Route through exit relays instead of relying on the tunnel
    pub use_exit_relays: bool,
    /// User turned the extension off while the client may still be on
    pub bypass_tunnel: bool,
    pub proxy_rule: ProxyRule,
}

impl ExtensionState {
    pub fn idle() -> Self {
        Self::with_kind(ExtensionKind::Idle)
    }

    pub fn connecting() -> Self {
        Self::with_kind(ExtensionKind::Connecting)
    }

    pub fn enabled(use_exit_relays: bool, connected_since: DateTime<Utc>) -> Self {
        Self {
            enabled: true,
            connected_since: Some(connected_since),
            use_exit_relays,
            ..Self::with_kind(ExtensionKind::Enabled)
        }
    }

    pub fn disabled(bypass_tunnel: bool) -> Self {
        Self {
            bypass_tunnel,
            ..Self::with_kind(ExtensionKind::Disabled)
        }
    }

    fn with_kind(kind: ExtensionKind) -> Self {
        Self {
            kind,
            enabled: false,
            connected_since: None,
            use_exit_relays: false,
            bypass_tunnel: false,
            proxy_rule: ProxyRule::Direct,
        }
    }

    /// Same from the user's point of view; timestamps and rules are ignored
    pub fn is_equivalent(&self, other: &ExtensionState) -> bool {
        self.kind == other.kind
            && self.enabled == other.enabled
            && self.use_exit_relays == other.use_exit_relays
    }

    /// Attach the proxy rule derived from the client snapshot
    pub(crate) fn with_rule_for(mut self, client: &ClientState, relay_port: u16) -> Self {
        self.proxy_rule = if self.enabled && self.use_exit_relays {
            let relays = client
                .exit()
                .and_then(|exit| find_city(&client.servers, exit))
                .map(|city| relay_endpoints(city, relay_port))
                .unwrap_or_default();
            ProxyRule::UseExitRelays(relays)
        } else if self.kind == ExtensionKind::Disabled && self.bypass_tunnel {
            client
                .loophole()
                .and_then(|url| parse_proxy(url).endpoint())
                .map(ProxyRule::BypassTunnel)
                .unwrap_or(ProxyRule::Direct)
        } else {
            ProxyRule::Direct
        };
        self
    }

    /// Loophole endpoint when the user bypasses the tunnel
    pub fn bypass_endpoint(&self) -> Option<&ProxyEndpoint> {
        match &self.proxy_rule {
            ProxyRule::BypassTunnel(endpoint) => Some(endpoint),
            _ => None,
        }
    }
}

impl Default for ExtensionState {
    fn default() -> Self {
        Self::idle()
    }
}
