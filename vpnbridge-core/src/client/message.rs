//! Native bridge wire messages
//!
//! Client messages carry a `t` discriminant. Frames without one are
//! bridge-level signals about the bridge itself.

use crate::client::state::{ActiveConnection, ClientKind};
use crate::error::ProtocolError;
use crate::types::{Location, ServerCountry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Requests sent to the VPN client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientCommand {
    Activate,
    Deactivate,
    Status,
    Servers,
    DisabledApps,
}

/// Requests addressed to the bridge rather than the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum BridgeRequest {
    /// Launch the client, optionally without showing its window
    Start { minimized: bool },
}

/// Anything that can be written to the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    Client(ClientCommand),
    Bridge(BridgeRequest),
}

impl From<ClientCommand> for Outbound {
    fn from(command: ClientCommand) -> Self {
        Outbound::Client(command)
    }
}

impl From<BridgeRequest> for Outbound {
    fn from(request: BridgeRequest) -> Self {
        Outbound::Bridge(request)
    }
}

/// Exit and entry location reported with a status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLocation {
    #[serde(default)]
    pub entry_country_code: Option<String>,
    #[serde(default)]
    pub entry_city_code: Option<String>,
    #[serde(default)]
    pub exit_country_code: Option<String>,
    #[serde(default)]
    pub exit_city_code: Option<String>,
}

impl StatusLocation {
    pub fn exit(&self) -> Option<Location> {
        match (&self.exit_country_code, &self.exit_city_code) {
            (Some(country), Some(city)) if !country.is_empty() && !city.is_empty() => {
                Some(Location::new(country.clone(), city.clone()))
            }
            _ => None,
        }
    }
}

/// Bypass proxy advertised by the client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalProxy {
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub url: Option<String>,
}

/// Body of a `status` message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    /// Raw client mode, e.g. `StateOn`
    pub vpn: String,
    #[serde(default)]
    pub location: StatusLocation,
    #[serde(default)]
    pub local_proxy: Option<LocalProxy>,
    #[serde(default)]
    pub connected_since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Body of a `servers` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServersPayload {
    #[serde(default)]
    pub countries: Vec<ServerCountry>,
}

/// Messages received from the VPN client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    Status { status: StatusPayload },
    Servers { servers: ServersPayload },
    DisabledApps { disabled_apps: Vec<String> },
}

/// Signals about the bridge process itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeSignal {
    Up,
    Down,
}

/// A classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Client(ClientMessage),
    Bridge(BridgeSignal),
}

const KNOWN_MESSAGES: [&str; 3] = ["status", "servers", "disabled_apps"];

/// Classify a raw inbound frame
pub fn classify(frame: Value) -> Result<Inbound, ProtocolError> {
    if let Some(kind) = frame.get("t").and_then(Value::as_str) {
        if !KNOWN_MESSAGES.contains(&kind) {
            return Err(ProtocolError::UnknownMessage {
                kind: kind.to_string(),
            });
        }
        let kind = kind.to_string();
        return serde_json::from_value(frame)
            .map(Inbound::Client)
            .map_err(|e| ProtocolError::MalformedPayload {
                kind,
                reason: e.to_string(),
            });
    }

    match frame.get("status").and_then(Value::as_str) {
        Some("vpn-client-up") => Ok(Inbound::Bridge(BridgeSignal::Up)),
        Some("vpn-client-down") => Ok(Inbound::Bridge(BridgeSignal::Down)),
        Some(other) => Err(ProtocolError::UnknownMessage {
            kind: other.to_string(),
        }),
        None => Err(ProtocolError::MissingDiscriminant),
    }
}

/// Dotted numeric client version, e.g. `2.24.1`
#[derive(Debug, Clone)]
pub struct ClientVersion(Vec<u32>);

impl ClientVersion {
    /// Parse `major.minor.patch`; trailing pre-release tags are ignored
    pub fn parse(input: &str) -> Option<Self> {
        let core = input.trim().split(|c: char| c == '-' || c == '+').next()?;
        let parts = core
            .split('.')
            .map(|part| part.parse::<u32>().ok())
            .collect::<Option<Vec<_>>>()?;
        if parts.is_empty() {
            return None;
        }
        Some(Self(parts))
    }
}

impl PartialEq for ClientVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ClientVersion {}

impl PartialOrd for ClientVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Missing components compare as zero, so `2.1` equals `2.1.0`.
impl Ord for ClientVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for ClientVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u32::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Map a status report to a client kind
///
/// `browser_split_tunneled` turns full protection into partial protection.
pub fn kind_from_status(
    status: &StatusPayload,
    minimum_version: &ClientVersion,
    browser_split_tunneled: bool,
) -> ClientKind {
    if let Some(version) = status.version.as_deref() {
        match ClientVersion::parse(version) {
            Some(version) if version < *minimum_version => {
                tracing::warn!(%version, minimum = %minimum_version, "VPN client is too old");
                return ClientKind::NeedsUpdate;
            }
            Some(_) => {}
            None => tracing::debug!(version, "Ignoring unparseable client version"),
        }
    }

    match status.vpn.as_str() {
        "StateOn" => {
            let connection = active_connection(status);
            if browser_split_tunneled {
                ClientKind::OnPartial(connection)
            } else {
                ClientKind::Enabled(connection)
            }
        }
        "StateOff" | "StateDisconnecting" => ClientKind::Disabled,
        "StateInitializing" | "StateAuthenticationNeeded" | "StateAuthenticating" => {
            ClientKind::Closed
        }
        "StateSubscriptionNeeded" => ClientKind::SubscriptionNeeded,
        "StateUpdateRequired" => ClientKind::NeedsUpdate,
        other => {
            tracing::warn!(mode = other, "Unknown VPN client mode, treating as closed");
            ClientKind::Closed
        }
    }
}

fn active_connection(status: &StatusPayload) -> ActiveConnection {
    let loophole = status
        .local_proxy
        .as_ref()
        .filter(|proxy| proxy.available)
        .and_then(|proxy| proxy.url.clone())
        .filter(|url| !url.is_empty());

    ActiveConnection {
        loophole,
        exit: status.location.exit(),
        connected_since: status.connected_since,
    }
}
