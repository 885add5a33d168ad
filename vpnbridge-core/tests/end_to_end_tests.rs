//! Engine wiring, driven end to end through a fake bridge

mod common;

use chrono::Utc;
use common::{servers_message, status, tab, wait_until, FakeTabs, RecordingTransport};
use std::sync::Arc;
use tokio::sync::mpsc;
use vpnbridge_core::client::{ClientCommand, TransportEvent};
use vpnbridge_core::config::BridgeConfig;
use vpnbridge_core::engine::Engine;
use vpnbridge_core::extension::{BrowsingMode, ExtensionKind};
use vpnbridge_core::proxy::ProxyDecision;
use vpnbridge_core::storage::{KeyValueStore, MemoryStore, SITE_CONTEXTS_KEY};
use vpnbridge_core::tabs::TabAction;

struct Harness {
    engine: Engine,
    transport: Arc<RecordingTransport>,
    events: mpsc::UnboundedSender<TransportEvent>,
    storage: Arc<MemoryStore>,
}

async fn start() -> Harness {
    let transport = RecordingTransport::new();
    let storage = Arc::new(MemoryStore::new());
    let (events, receiver) = mpsc::unbounded_channel();
    let engine = Engine::with_transport(
        &BridgeConfig::default(),
        transport.clone(),
        receiver,
        storage.clone(),
    )
    .await
    .unwrap();
    Harness {
        engine,
        transport,
        events,
        storage,
    }
}

#[tokio::test]
async fn test_toggle_connects_through_client() {
    let harness = start().await;
    let mut extension = harness.engine.normal().subscribe();

    harness.events.send(TransportEvent::Opened).unwrap();
    harness.events.send(status("StateOff", None)).unwrap();
    wait_until(&mut extension, |state| state.kind == ExtensionKind::Disabled).await;
    assert_eq!(harness.transport.count(ClientCommand::Status), 1);

    let state = harness.engine.normal().toggle_connectivity().await;
    assert_eq!(state.kind, ExtensionKind::Connecting);
    assert_eq!(harness.transport.count(ClientCommand::Activate), 1);

    let before = Utc::now();
    harness.events.send(status("StateOn", Some(("de", "ber")))).unwrap();
    let state = wait_until(&mut extension, |state| state.enabled).await;
    assert_eq!(state.kind, ExtensionKind::Enabled);
    assert!(!state.use_exit_relays);
    assert!(state.connected_since.unwrap() >= before);

    harness.engine.shutdown().await;
}

#[tokio::test]
async fn test_private_follows_client_independently() {
    let harness = start().await;
    let mut normal = harness.engine.normal().subscribe();
    let mut private = harness.engine.private().controller().subscribe();

    harness.events.send(status("StateOn", None)).unwrap();
    wait_until(&mut normal, |state| state.enabled).await;
    wait_until(&mut private, |state| state.enabled).await;

    // Disabling normal browsing leaves private windows connected
    harness.engine.normal().toggle_connectivity().await;
    assert!(!harness.engine.normal().current().enabled);
    assert!(harness.engine.private().controller().current().enabled);

    let normal_route = harness.engine.router(BrowsingMode::Normal).route("https://example.com/");
    let private_route = harness.engine.router(BrowsingMode::Private).route("https://example.com/");
    assert!(matches!(normal_route.decision, ProxyDecision::Proxies(_)));
    assert_eq!(private_route.decision, ProxyDecision::Direct);

    harness.engine.shutdown().await;
}

#[tokio::test]
async fn test_overrides_persist_and_refresh_tabs() {
    let mut harness = start().await;
    let tabs = FakeTabs::with_tabs(vec![
        tab(1, "https://news.example/", true, false),
        tab(2, "https://other.example/", false, false),
    ]);
    harness.engine.attach_tabs(BrowsingMode::Normal, tabs.clone());

    let mut client = harness.engine.link().subscribe();
    harness.events.send(servers_message()).unwrap();
    wait_until(&mut client, |client| !client.servers.is_empty()).await;
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    harness
        .engine
        .overrides()
        .set_override("https://news.example", "us", "dal")
        .await
        .unwrap();
    assert!(harness.storage.get(SITE_CONTEXTS_KEY).await.unwrap().is_some());

    tokio::time::timeout(std::time::Duration::from_secs(1), async {
        while tabs.actions().is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Tab was not refreshed");
    assert_eq!(tabs.actions(), vec![TabAction::Reload(1)]);

    harness.engine.shutdown().await;
}

#[tokio::test]
async fn test_bridge_loss_degrades_to_idle() {
    let harness = start().await;
    let mut extension = harness.engine.normal().subscribe();

    harness.events.send(status("StateOn", None)).unwrap();
    wait_until(&mut extension, |state| state.enabled).await;
    let key = harness.engine.link().isolation_key().current();

    harness.events.send(TransportEvent::Closed).unwrap();
    wait_until(&mut extension, |state| state.kind == ExtensionKind::Idle).await;
    assert!(harness.engine.link().isolation_key().current() > key);

    harness.engine.shutdown().await;
}

#[tokio::test]
async fn test_private_toggle_refreshes_private_tabs() {
    let mut harness = start().await;
    let normal_tabs = FakeTabs::with_tabs(vec![tab(1, "https://normal.example/", true, false)]);
    let private_tabs = FakeTabs::with_tabs(vec![tab(2, "https://private.example/", true, false)]);
    let mut normal = harness.engine.normal().subscribe();
    let mut private = harness.engine.private().controller().subscribe();

    harness.events.send(status("StateOn", None)).unwrap();
    wait_until(&mut normal, |state| state.enabled).await;
    wait_until(&mut private, |state| state.enabled).await;
    harness.engine.attach_tabs(BrowsingMode::Normal, normal_tabs.clone());
    harness.engine.attach_tabs(BrowsingMode::Private, private_tabs.clone());
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    harness.engine.private().controller().toggle_connectivity().await;
    tokio::time::timeout(std::time::Duration::from_secs(1), async {
        while private_tabs.actions().is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Private tab was not refreshed");
    assert_eq!(private_tabs.actions(), vec![TabAction::Reload(2)]);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(normal_tabs.actions().is_empty());
    assert!(harness.engine.normal().current().enabled);

    harness.engine.shutdown().await;
}
