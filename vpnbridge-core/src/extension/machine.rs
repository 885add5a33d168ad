//! Extension state transitions
//!
//! Synchronous core of the extension: given the current client snapshot and
//! the time, compute the next state and whether `activate` must be sent.
//! Nothing in here awaits.

use crate::client::{ClientKind, ClientState};
use crate::extension::state::{ExtensionKind, ExtensionState};
use chrono::{DateTime, Utc};

/// Result of feeding an event to the machine
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transition {
    /// New state to publish; `None` when nothing visible changed
    pub published: Option<ExtensionState>,
    /// Equivalent state whose bypass flag or proxy rule moved; stored without notifying
    pub refreshed: Option<ExtensionState>,
    /// Send `activate` to the client
    pub activate: bool,
}

impl Transition {
    fn none() -> Self {
        Self::default()
    }
}

/// Extension state machine for one browsing mode
#[derive(Debug, Clone)]
pub struct ExtensionMachine {
    state: ExtensionState,
    keep_alive: bool,
    relay_port: u16,
}

impl ExtensionMachine {
    pub fn new(relay_port: u16) -> Self {
        Self {
            state: ExtensionState::idle(),
            keep_alive: false,
            relay_port,
        }
    }

    pub fn state(&self) -> &ExtensionState {
        &self.state
    }

    /// Whether an unexpected client disconnect re-activates it
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// User pressed the on/off switch
    pub fn toggle(&mut self, client: &ClientState, now: DateTime<Utc>) -> Transition {
        let aborting = self.state.kind == ExtensionKind::Connecting
            && client.kind == ClientKind::Disabled;

        if aborting || self.state.enabled {
            // The client may be shared with other apps; it is never told to deactivate
            self.keep_alive = false;
            return self.transition(ExtensionState::disabled(true), client, false);
        }

        self.keep_alive = true;
        match client.kind {
            ClientKind::Enabled(_) => {
                self.transition(ExtensionState::enabled(false, now), client, false)
            }
            ClientKind::OnPartial(_) => {
                self.transition(ExtensionState::enabled(true, now), client, false)
            }
            _ => self.transition(ExtensionState::connecting(), client, true),
        }
    }

    /// The client published a new snapshot
    pub fn on_client_state(&mut self, client: &ClientState, now: DateTime<Utc>) -> Transition {
        if self.state.kind == ExtensionKind::Connecting {
            return match client.kind {
                ClientKind::Enabled(_) => {
                    self.transition(ExtensionState::enabled(false, now), client, false)
                }
                ClientKind::OnPartial(_) => {
                    self.transition(ExtensionState::enabled(true, now), client, false)
                }
                ClientKind::Unavailable => {
                    self.transition(ExtensionState::idle(), client, false)
                }
                _ => Transition::none(),
            };
        }

        match client.kind {
            ClientKind::Enabled(_) => {
                if self.state.bypass_tunnel {
                    tracing::debug!("Client enabled but the user bypassed the tunnel");
                    return self.transition(self.state.clone(), client, false);
                }
                let since = self.preserved_since().unwrap_or(now);
                self.transition(ExtensionState::enabled(false, since), client, false)
            }
            ClientKind::Disabled => {
                if self.keep_alive {
                    tracing::info!("Client disconnected while kept alive, re-activating");
                    return Transition {
                        activate: true,
                        ..Transition::none()
                    };
                }
                self.transition(ExtensionState::disabled(false), client, false)
            }
            ClientKind::OnPartial(_) => {
                if self.state.enabled {
                    let since = self.preserved_since().unwrap_or(now);
                    self.transition(ExtensionState::enabled(true, since), client, false)
                } else {
                    let bypass = self.state.bypass_tunnel;
                    self.transition(ExtensionState::disabled(bypass), client, false)
                }
            }
            ClientKind::Unavailable
            | ClientKind::Closed
            | ClientKind::SubscriptionNeeded
            | ClientKind::NeedsUpdate => self.transition(ExtensionState::idle(), client, false),
        }
    }

    fn preserved_since(&self) -> Option<DateTime<Utc>> {
        if self.state.enabled {
            self.state.connected_since
        } else {
            None
        }
    }

    /// Adopt `next`, publishing it only when it is not equivalent to the current state
    ///
    /// An equivalent state still carries its bypass flag and a proxy rule
    /// recomputed from `client`; the timestamp is kept.
    fn transition(
        &mut self,
        next: ExtensionState,
        client: &ClientState,
        activate: bool,
    ) -> Transition {
        let next = next.with_rule_for(client, self.relay_port);
        if next.is_equivalent(&self.state) {
            let refreshed = ExtensionState {
                connected_since: self.state.connected_since,
                ..next
            };
            if refreshed == self.state {
                return Transition {
                    activate,
                    ..Transition::none()
                };
            }
            tracing::debug!(kind = %refreshed.kind, bypass_tunnel = refreshed.bypass_tunnel, rule = ?refreshed.proxy_rule, "Extension routing refreshed");
            self.state = refreshed.clone();
            return Transition {
                published: None,
                refreshed: Some(refreshed),
                activate,
            };
        }

        tracing::info!(from = %self.state.kind, to = %next.kind, use_exit_relays = next.use_exit_relays, "Extension state changed");
        self.state = next.clone();
        Transition {
            published: Some(next),
            refreshed: None,
            activate,
        }
    }
}
