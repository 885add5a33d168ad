//! Client link
//!
//! Owns the conversation with the VPN client: turns inbound frames into
//! [`ClientState`] snapshots, publishes them, and degrades to
//! `Unavailable` whenever the transport goes away.

use crate::client::message::{
    classify, kind_from_status, BridgeRequest, BridgeSignal, ClientCommand, ClientMessage,
    ClientVersion, Inbound, Outbound, StatusPayload,
};
use crate::client::state::{ClientKind, ClientState, IsolationKey};
use crate::client::transport::{NativeTransport, TransportEvent};
use crate::config::ClientConfig;
use crate::error::{ConfigError, TransportError};
use crate::storage::{get_typed, set_typed, KeyValueStore, SERVER_LIST_KEY};
use crate::types::ServerCountry;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Settings the link needs to interpret client messages
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub minimum_version: ClientVersion,
    /// Executable names identifying this browser in the split-tunnel list
    pub browser_executables: Vec<String>,
}

impl LinkSettings {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let minimum_version = ClientVersion::parse(&config.minimum_version).ok_or_else(|| {
            ConfigError::ValidationError {
                message: format!("Invalid minimum client version: {}", config.minimum_version),
            }
        })?;
        Ok(Self {
            minimum_version,
            browser_executables: config.browser_executables.clone(),
        })
    }

    /// Whether any split-tunnelled app is this browser
    pub fn browser_split_tunneled(&self, disabled_apps: &[String]) -> bool {
        disabled_apps.iter().any(|app| {
            let name = executable_name(app);
            self.browser_executables
                .iter()
                .any(|exe| exe.eq_ignore_ascii_case(&name))
        })
    }
}

/// `C:\Program Files\Firefox\firefox.exe` and `/usr/bin/firefox` both yield `firefox`
fn executable_name(path: &str) -> String {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let lower = file.to_ascii_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// Handle to the VPN client
///
/// Cheap to clone; every clone talks to the same transport and publishes
/// into the same state channel.
#[derive(Clone)]
pub struct ClientLink {
    transport: Arc<dyn NativeTransport>,
    storage: Arc<dyn KeyValueStore>,
    settings: Arc<LinkSettings>,
    state_tx: Arc<watch::Sender<ClientState>>,
    isolation_key: IsolationKey,
    /// Last status report, kept to re-derive the kind when split tunnelling changes
    last_status: Arc<Mutex<Option<StatusPayload>>>,
}

impl ClientLink {
    /// Create a link, seeding the server list from storage
    pub async fn new(
        transport: Arc<dyn NativeTransport>,
        storage: Arc<dyn KeyValueStore>,
        settings: LinkSettings,
    ) -> Self {
        let mut initial = ClientState::unavailable();
        match get_typed::<Vec<ServerCountry>>(storage.as_ref(), SERVER_LIST_KEY).await {
            Ok(Some(servers)) => {
                debug!(countries = servers.len(), "Restored cached server list");
                initial = initial.with_servers(servers);
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring unreadable cached server list: {}", e),
        }

        let (state_tx, _) = watch::channel(initial);
        Self {
            transport,
            storage,
            settings: Arc::new(settings),
            state_tx: Arc::new(state_tx),
            isolation_key: IsolationKey::new(),
            last_status: Arc::new(Mutex::new(None)),
        }
    }

    /// Receiver that first yields the current state, then every change
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state_tx.subscribe()
    }

    pub fn current(&self) -> ClientState {
        self.state_tx.borrow().clone()
    }

    pub fn isolation_key(&self) -> IsolationKey {
        self.isolation_key.clone()
    }

    /// Ask the client for everything the state machine needs
    pub async fn connect(&self) {
        for command in [
            ClientCommand::Status,
            ClientCommand::Servers,
            ClientCommand::DisabledApps,
        ] {
            if !self.send(command).await {
                break;
            }
        }
    }

    /// Send a command to the client
    ///
    /// Failures are logged and degrade the state to `Unavailable`; the
    /// return value only tells whether the message went out.
    #[tracing::instrument(skip(self))]
    pub async fn send(&self, command: ClientCommand) -> bool {
        self.send_outbound(command.into()).await
    }

    /// Ask the bridge to launch the client
    pub async fn request_start(&self, minimized: bool) -> bool {
        self.send_outbound(BridgeRequest::Start { minimized }.into())
            .await
    }

    async fn send_outbound(&self, message: Outbound) -> bool {
        match self.transport.send(message).await {
            Ok(()) => {
                debug!(?message, "Sent to native bridge");
                true
            }
            Err(e @ (TransportError::ChannelClosed | TransportError::NotInstalled { .. })) => {
                warn!(?message, "Native bridge unreachable: {}", e);
                self.mark_unavailable();
                false
            }
            Err(e) => {
                warn!(?message, "Failed to send to native bridge: {}", e);
                false
            }
        }
    }

    /// Process one transport event
    pub async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                info!("Native bridge connected");
                self.connect().await;
            }
            TransportEvent::Closed => {
                info!("Native bridge disconnected");
                self.mark_unavailable();
            }
            TransportEvent::Frame(frame) => match classify(frame) {
                Ok(Inbound::Client(message)) => self.handle_message(message).await,
                Ok(Inbound::Bridge(BridgeSignal::Up)) => {
                    info!("VPN client reachable");
                    self.connect().await;
                }
                Ok(Inbound::Bridge(BridgeSignal::Down)) => {
                    info!("VPN client unreachable");
                    self.mark_unavailable();
                }
                Err(e) => warn!("Dropping client message: {}", e),
            },
        }
    }

    async fn handle_message(&self, message: ClientMessage) {
        match message {
            ClientMessage::Servers { servers } => {
                let countries = servers.countries;
                if let Err(e) = set_typed(self.storage.as_ref(), SERVER_LIST_KEY, &countries).await
                {
                    warn!("Failed to cache server list: {}", e);
                }
                let next = self.current().with_servers(countries);
                self.publish(next);
            }
            ClientMessage::DisabledApps { disabled_apps } => {
                let current = self.current().with_disabled_apps(disabled_apps);
                let status = self.last_status();
                let next = match status {
                    Some(status) => {
                        let kind = self.kind_for(&status, &current.disabled_apps);
                        current.with_kind(kind)
                    }
                    None => current,
                };
                self.publish(next);
            }
            ClientMessage::Status { status } => {
                let current = self.current();
                let kind = self.kind_for(&status, &current.disabled_apps);
                self.set_last_status(Some(status));
                self.publish(current.with_kind(kind));
            }
        }
    }

    fn kind_for(&self, status: &StatusPayload, disabled_apps: &[String]) -> ClientKind {
        let split = self.settings.browser_split_tunneled(disabled_apps);
        kind_from_status(status, &self.settings.minimum_version, split)
    }

    fn last_status(&self) -> Option<StatusPayload> {
        self.last_status
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or(None)
    }

    fn set_last_status(&self, status: Option<StatusPayload>) {
        if let Ok(mut guard) = self.last_status.lock() {
            *guard = status;
        }
    }

    fn mark_unavailable(&self) {
        self.set_last_status(None);
        let next = self.current().with_kind(ClientKind::Unavailable);
        self.publish(next);
    }

    /// Publish a successor state; a kind change bumps the isolation key
    fn publish(&self, next: ClientState) {
        let previous_kind = self.state_tx.borrow().kind.clone();
        if previous_kind != next.kind {
            let key = self.isolation_key.bump();
            info!(from = %previous_kind, to = %next.kind, isolation_key = key, "VPN client state changed");
        }
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Drive the link from a transport's event stream until it ends
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        debug!("Transport event stream ended");
        self.mark_unavailable();
    }
}
