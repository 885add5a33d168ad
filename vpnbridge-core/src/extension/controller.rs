//! Extension controller
//!
//! Owns an [`ExtensionMachine`], feeds it client snapshots and user toggles,
//! and publishes the resulting states.

use crate::client::{ClientCommand, ClientLink, ClientState};
use crate::extension::machine::{ExtensionMachine, Transition};
use crate::extension::state::ExtensionState;
use chrono::Utc;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, error};

/// Browsing mode a controller serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowsingMode {
    Normal,
    Private,
}

impl fmt::Display for BrowsingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowsingMode::Normal => write!(f, "normal"),
            BrowsingMode::Private => write!(f, "private"),
        }
    }
}

#[derive(Clone)]
pub struct ExtensionController {
    mode: BrowsingMode,
    link: ClientLink,
    machine: Arc<Mutex<ExtensionMachine>>,
    state_tx: Arc<watch::Sender<ExtensionState>>,
}

impl ExtensionController {
    pub fn new(mode: BrowsingMode, link: ClientLink, relay_port: u16) -> Self {
        let (state_tx, _) = watch::channel(ExtensionState::idle());
        Self {
            mode,
            link,
            machine: Arc::new(Mutex::new(ExtensionMachine::new(relay_port))),
            state_tx: Arc::new(state_tx),
        }
    }

    pub fn mode(&self) -> BrowsingMode {
        self.mode
    }

    /// Receiver that first yields the current state, then every published one
    pub fn subscribe(&self) -> watch::Receiver<ExtensionState> {
        self.state_tx.subscribe()
    }

    pub fn current(&self) -> ExtensionState {
        self.state_tx.borrow().clone()
    }

    pub fn keep_alive(&self) -> bool {
        self.machine
            .lock()
            .map(|machine| machine.keep_alive())
            .unwrap_or(false)
    }

    /// Flip the extension on or off, as the user's switch does
    #[tracing::instrument(skip(self), fields(mode = %self.mode))]
    pub async fn toggle_connectivity(&self) -> ExtensionState {
        let client = self.link.current();
        let transition = self.apply(|machine| machine.toggle(&client, Utc::now()));
        self.finish(transition).await;
        self.current()
    }

    /// Feed one client snapshot to the machine
    pub async fn handle_client_state(&self, client: &ClientState) {
        let transition = self.apply(|machine| machine.on_client_state(client, Utc::now()));
        self.finish(transition).await;
    }

    /// Run the transition and publish under the machine lock so states go out in order
    fn apply<F>(&self, step: F) -> Transition
    where
        F: FnOnce(&mut ExtensionMachine) -> Transition,
    {
        let mut machine = match self.machine.lock() {
            Ok(machine) => machine,
            Err(poisoned) => {
                error!(mode = %self.mode, "Extension machine lock poisoned, recovering");
                poisoned.into_inner()
            }
        };

        let transition = step(&mut *machine);
        if let Some(state) = &transition.published {
            self.state_tx.send_replace(state.clone());
        } else if let Some(state) = &transition.refreshed {
            // Readers see the new rule; subscribers are not woken for an equivalent state
            self.state_tx.send_if_modified(|current| {
                *current = state.clone();
                false
            });
        }
        transition
    }

    async fn finish(&self, transition: Transition) {
        if transition.activate {
            debug!(mode = %self.mode, "Requesting client activation");
            self.link.send(ClientCommand::Activate).await;
        }
    }

    /// Follow client snapshots for as long as the link publishes them
    pub async fn run(self) {
        let mut client_rx = self.link.subscribe();
        loop {
            let client = client_rx.borrow_and_update().clone();
            self.handle_client_state(&client).await;
            if client_rx.changed().await.is_err() {
                debug!(mode = %self.mode, "Client link closed");
                return;
            }
        }
    }
}
