//! VPN client state snapshots
//!
//! A [`ClientState`] is an immutable picture of the external VPN client as
//! last reported over the native bridge. Fields that only make sense while
//! the tunnel is up live inside the active variants.

use crate::types::{Location, ServerCountry};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Details of an active tunnel
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActiveConnection {
    /// Bypass proxy URL exposed by the client, if it supports one
    pub loophole: Option<String>,
    /// Exit location the tunnel is routed through
    pub exit: Option<Location>,
    /// When the client reports the tunnel came up
    pub connected_since: Option<DateTime<Utc>>,
}

/// What the VPN client is currently doing
#[derive(Debug, Clone, PartialEq)]
pub enum ClientKind {
    /// No bridge, or the bridge cannot reach a client
    Unavailable,
    /// Client is running but not ready (starting, signed out)
    Closed,
    /// Client is ready and the tunnel is off
    Disabled,
    /// Tunnel is on but this browser is excluded through split tunnelling
    OnPartial(ActiveConnection),
    /// Tunnel is on and protects this browser
    Enabled(ActiveConnection),
    SubscriptionNeeded,
    NeedsUpdate,
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientKind::Unavailable => write!(f, "unavailable"),
            ClientKind::Closed => write!(f, "closed"),
            ClientKind::Disabled => write!(f, "disabled"),
            ClientKind::OnPartial(_) => write!(f, "on (partial)"),
            ClientKind::Enabled(_) => write!(f, "enabled"),
            ClientKind::SubscriptionNeeded => write!(f, "subscription needed"),
            ClientKind::NeedsUpdate => write!(f, "needs update"),
        }
    }
}

/// Snapshot of the VPN client
///
/// Server and split-tunnel lists are shared between successive snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientState {
    pub kind: ClientKind,
    pub servers: Arc<Vec<ServerCountry>>,
    pub disabled_apps: Arc<Vec<String>>,
}

impl ClientState {
    pub fn unavailable() -> Self {
        Self {
            kind: ClientKind::Unavailable,
            servers: Arc::new(Vec::new()),
            disabled_apps: Arc::new(Vec::new()),
        }
    }

    /// Successor snapshot with a new kind, carrying the lists forward
    pub fn with_kind(&self, kind: ClientKind) -> Self {
        Self {
            kind,
            servers: Arc::clone(&self.servers),
            disabled_apps: Arc::clone(&self.disabled_apps),
        }
    }

    pub fn with_servers(&self, servers: Vec<ServerCountry>) -> Self {
        Self {
            kind: self.kind.clone(),
            servers: Arc::new(servers),
            disabled_apps: Arc::clone(&self.disabled_apps),
        }
    }

    pub fn with_disabled_apps(&self, disabled_apps: Vec<String>) -> Self {
        Self {
            kind: self.kind.clone(),
            servers: Arc::clone(&self.servers),
            disabled_apps: Arc::new(disabled_apps),
        }
    }

    pub fn installed(&self) -> bool {
        !matches!(self.kind, ClientKind::Unavailable)
    }

    pub fn connected(&self) -> bool {
        self.connection().is_some()
    }

    /// Client can take an `activate` request right now
    pub fn is_ready(&self) -> bool {
        matches!(
            self.kind,
            ClientKind::Disabled | ClientKind::OnPartial(_) | ClientKind::Enabled(_)
        )
    }

    pub fn connection(&self) -> Option<&ActiveConnection> {
        match &self.kind {
            ClientKind::OnPartial(connection) | ClientKind::Enabled(connection) => Some(connection),
            _ => None,
        }
    }

    pub fn loophole(&self) -> Option<&str> {
        self.connection()?.loophole.as_deref()
    }

    pub fn exit(&self) -> Option<&Location> {
        self.connection()?.exit.as_ref()
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::unavailable()
    }
}

/// Counter that forces the browser onto fresh proxy connections
///
/// Bumped by the client link whenever connectivity changes; clones share
/// the same counter. It only ever grows.
#[derive(Debug, Clone, Default)]
pub struct IsolationKey(Arc<AtomicU64>);

impl IsolationKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Increment and return the new value
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}
