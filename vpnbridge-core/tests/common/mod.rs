//! Shared fakes and fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use vpnbridge_core::client::message::Outbound;
use vpnbridge_core::client::{
    ClientCommand, ClientLink, ClientVersion, LinkSettings, NativeTransport, TransportEvent,
};
use vpnbridge_core::error::{TabError, TransportError};
use vpnbridge_core::storage::MemoryStore;
use vpnbridge_core::tabs::{TabAction, TabApi, TabInfo, TabQuery};
use vpnbridge_core::types::{Server, ServerCity, ServerCountry};

/// Transport that records outbound messages instead of writing them
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Outbound>>,
    closed: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, command: ClientCommand) -> usize {
        self.sent()
            .into_iter()
            .filter(|message| *message == Outbound::Client(command))
            .count()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Make every later send fail as if the bridge went away
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl NativeTransport for RecordingTransport {
    async fn send(&self, message: Outbound) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ChannelClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

pub fn settings() -> LinkSettings {
    LinkSettings {
        minimum_version: ClientVersion::parse("2.20.0").unwrap(),
        browser_executables: vec!["firefox".to_string()],
    }
}

/// Link over a recording transport and an in-memory store
pub async fn link_harness() -> (ClientLink, Arc<RecordingTransport>, Arc<MemoryStore>) {
    let transport = RecordingTransport::new();
    let storage = Arc::new(MemoryStore::new());
    let link = ClientLink::new(transport.clone(), storage.clone(), settings()).await;
    (link, transport, storage)
}

pub fn frame(value: Value) -> TransportEvent {
    TransportEvent::Frame(value)
}

/// `status` message for a mode, optionally routed through an exit location
pub fn status(vpn: &str, exit: Option<(&str, &str)>) -> TransportEvent {
    let location = match exit {
        Some((country, city)) => json!({"exit_country_code": country, "exit_city_code": city}),
        None => json!({}),
    };
    frame(json!({
        "t": "status",
        "status": {
            "vpn": vpn,
            "location": location,
            "localProxy": {"available": true, "url": "socks://localhost:8123"},
            "connectedSince": "2026-10-16T08:00:00Z",
            "version": "2.24.0"
        }
    }))
}

pub fn servers_message() -> TransportEvent {
    frame(json!({
        "t": "servers",
        "servers": {"countries": serde_json::to_value(servers()).unwrap()}
    }))
}

pub fn disabled_apps(apps: &[&str]) -> TransportEvent {
    frame(json!({"t": "disabled_apps", "disabled_apps": apps}))
}

fn server(hostname: &str, weight: u32, socks_name: Option<&str>) -> Server {
    Server {
        hostname: hostname.to_string(),
        weight,
        socks_name: socks_name.map(str::to_string),
    }
}

/// Dallas with relays of weight 10 and 20 plus one relay-less server,
/// Berlin with one relay and Miami with none
pub fn servers() -> Vec<ServerCountry> {
    vec![
        ServerCountry {
            name: "United States".to_string(),
            code: "us".to_string(),
            cities: vec![
                ServerCity {
                    name: "Dallas, TX".to_string(),
                    code: "dal".to_string(),
                    latitude: 32.8,
                    longitude: -96.8,
                    servers: vec![
                        server("us-dal-wg-010", 10, Some("us-dal-wg-socks5-010.relays.example")),
                        server("us-dal-wg-020", 20, Some("us-dal-wg-socks5-020.relays.example")),
                        server("us-dal-wg-030", 30, None),
                    ],
                },
                ServerCity {
                    name: "Miami, FL".to_string(),
                    code: "mia".to_string(),
                    latitude: 25.8,
                    longitude: -80.2,
                    servers: vec![server("us-mia-wg-001", 5, None)],
                },
            ],
        },
        ServerCountry {
            name: "Germany".to_string(),
            code: "de".to_string(),
            cities: vec![ServerCity {
                name: "Berlin".to_string(),
                code: "ber".to_string(),
                latitude: 52.5,
                longitude: 13.4,
                servers: vec![server("de-ber-wg-001", 1, Some("de-ber-wg-socks5-001.relays.example"))],
            }],
        },
    ]
}

/// Wait for a watched value to satisfy `ready`, failing the test after a second
pub async fn wait_until<T, F>(rx: &mut watch::Receiver<T>, ready: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(1), rx.wait_for(ready))
        .await
        .expect("Timed out waiting for state")
        .expect("Publisher dropped")
        .clone()
}

/// Browser tabs held in memory; records every command
#[derive(Default)]
pub struct FakeTabs {
    tabs: Mutex<Vec<TabInfo>>,
    actions: Mutex<Vec<TabAction>>,
    failing: Mutex<Option<u64>>,
}

impl FakeTabs {
    pub fn with_tabs(tabs: Vec<TabInfo>) -> Arc<Self> {
        let fake = Self::default();
        *fake.tabs.lock().unwrap() = tabs;
        Arc::new(fake)
    }

    pub fn actions(&self) -> Vec<TabAction> {
        self.actions.lock().unwrap().clone()
    }

    /// Commands on this tab fail
    pub fn fail_on(&self, tab_id: u64) {
        *self.failing.lock().unwrap() = Some(tab_id);
    }

    fn check(&self, tab_id: u64) -> Result<(), TabError> {
        if *self.failing.lock().unwrap() == Some(tab_id) {
            return Err(TabError::CommandFailed {
                tab_id,
                reason: "tab is gone".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TabApi for FakeTabs {
    async fn query(&self, query: TabQuery) -> Result<Vec<TabInfo>, TabError> {
        Ok(self
            .tabs
            .lock()
            .unwrap()
            .iter()
            .filter(|tab| query.matches(tab))
            .cloned()
            .collect())
    }

    async fn reload(&self, tab_id: u64) -> Result<(), TabError> {
        self.check(tab_id)?;
        self.actions.lock().unwrap().push(TabAction::Reload(tab_id));
        Ok(())
    }

    async fn discard(&self, tab_id: u64) -> Result<(), TabError> {
        self.check(tab_id)?;
        self.actions.lock().unwrap().push(TabAction::Discard(tab_id));
        Ok(())
    }
}

pub fn tab(id: u64, url: &str, active: bool, audible: bool) -> TabInfo {
    TabInfo {
        id,
        url: url.to_string(),
        active,
        discarded: false,
        audible,
    }
}
