//! Client link tests
//!
//! Drive the link with transport events and check the published snapshots,
//! the isolation key and the messages sent back to the bridge.

mod common;

use common::{disabled_apps, frame, link_harness, servers, servers_message, status, RecordingTransport};
use serde_json::json;
use std::sync::Arc;
use vpnbridge_core::client::message::{BridgeRequest, Outbound};
use vpnbridge_core::client::{ClientCommand, ClientKind, ClientLink, TransportEvent};
use vpnbridge_core::storage::{set_typed, KeyValueStore, MemoryStore, SERVER_LIST_KEY};
use vpnbridge_core::types::Location;

#[tokio::test]
async fn test_initial_state_is_unavailable() {
    let (link, transport, _) = link_harness().await;
    let state = link.current();
    assert_eq!(state.kind, ClientKind::Unavailable);
    assert!(!state.installed());
    assert!(state.servers.is_empty());
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn test_opened_requests_everything() {
    let (link, transport, _) = link_harness().await;
    link.handle_event(TransportEvent::Opened).await;

    assert_eq!(
        transport.sent(),
        vec![
            Outbound::Client(ClientCommand::Status),
            Outbound::Client(ClientCommand::Servers),
            Outbound::Client(ClientCommand::DisabledApps),
        ]
    );
}

#[tokio::test]
async fn test_status_on_with_exit() {
    let (link, _, _) = link_harness().await;
    link.handle_event(status("StateOn", Some(("de", "ber")))).await;

    let state = link.current();
    assert!(matches!(state.kind, ClientKind::Enabled(_)));
    assert!(state.connected());
    assert_eq!(state.exit(), Some(&Location::new("de", "ber")));
    assert_eq!(state.loophole(), Some("socks://localhost:8123"));
    assert!(state.connection().and_then(|c| c.connected_since).is_some());
}

#[tokio::test]
async fn test_isolation_key_bumps_on_kind_change_only() {
    let (link, _, _) = link_harness().await;
    let key = link.isolation_key();
    assert_eq!(key.current(), 0);

    link.handle_event(status("StateOff", None)).await;
    assert_eq!(key.current(), 1);

    // Same kind again: nothing changes
    link.handle_event(status("StateOff", None)).await;
    assert_eq!(key.current(), 1);

    link.handle_event(status("StateOn", Some(("de", "ber")))).await;
    assert_eq!(key.current(), 2);

    link.handle_event(TransportEvent::Closed).await;
    assert_eq!(link.current().kind, ClientKind::Unavailable);
    assert_eq!(key.current(), 3);
}

#[tokio::test]
async fn test_servers_are_published_and_cached() {
    let (link, _, storage) = link_harness().await;
    link.handle_event(servers_message()).await;

    assert_eq!(*link.current().servers, servers());
    let cached = storage.get(SERVER_LIST_KEY).await.unwrap();
    assert_eq!(cached, Some(serde_json::to_value(servers()).unwrap()));
}

#[tokio::test]
async fn test_servers_survive_state_changes() {
    let (link, _, _) = link_harness().await;
    link.handle_event(servers_message()).await;
    link.handle_event(status("StateOn", None)).await;
    link.handle_event(TransportEvent::Closed).await;

    let state = link.current();
    assert_eq!(state.kind, ClientKind::Unavailable);
    assert_eq!(state.servers.len(), 2);
}

#[tokio::test]
async fn test_cached_servers_restored_at_startup() {
    let storage = Arc::new(MemoryStore::new());
    set_typed(storage.as_ref(), SERVER_LIST_KEY, &servers()).await.unwrap();

    let link = ClientLink::new(RecordingTransport::new(), storage, common::settings()).await;
    let state = link.current();
    assert_eq!(state.kind, ClientKind::Unavailable);
    assert_eq!(*state.servers, servers());
}

#[tokio::test]
async fn test_split_tunnelled_browser_is_partial() {
    let (link, _, _) = link_harness().await;
    link.handle_event(status("StateOn", Some(("de", "ber")))).await;
    assert!(matches!(link.current().kind, ClientKind::Enabled(_)));

    link.handle_event(disabled_apps(&["/usr/lib/firefox/firefox"])).await;
    let state = link.current();
    assert!(matches!(state.kind, ClientKind::OnPartial(_)));
    assert_eq!(state.disabled_apps.len(), 1);
    assert_eq!(state.exit(), Some(&Location::new("de", "ber")));

    link.handle_event(disabled_apps(&["/usr/bin/thunderbird"])).await;
    assert!(matches!(link.current().kind, ClientKind::Enabled(_)));
}

#[tokio::test]
async fn test_old_client_needs_update() {
    let (link, _, _) = link_harness().await;
    link.handle_event(frame(json!({
        "t": "status",
        "status": {"vpn": "StateOn", "version": "2.19.0"}
    })))
    .await;
    assert_eq!(link.current().kind, ClientKind::NeedsUpdate);
}

#[tokio::test]
async fn test_protocol_errors_leave_state_untouched() {
    let (link, _, _) = link_harness().await;
    link.handle_event(status("StateOff", None)).await;
    let before = link.current();
    let key = link.isolation_key().current();

    link.handle_event(frame(json!({"t": "telemetry", "data": 1}))).await;
    link.handle_event(frame(json!({"t": "status"}))).await;
    link.handle_event(frame(json!([1, 2, 3]))).await;

    assert_eq!(link.current(), before);
    assert_eq!(link.isolation_key().current(), key);
}

#[tokio::test]
async fn test_bridge_signals() {
    let (link, transport, _) = link_harness().await;
    link.handle_event(status("StateOff", None)).await;

    link.handle_event(frame(json!({"status": "vpn-client-down"}))).await;
    assert_eq!(link.current().kind, ClientKind::Unavailable);

    transport.clear();
    link.handle_event(frame(json!({"status": "vpn-client-up"}))).await;
    assert_eq!(transport.count(ClientCommand::Status), 1);
    assert_eq!(transport.count(ClientCommand::Servers), 1);
}

#[tokio::test]
async fn test_send_on_closed_channel_degrades() {
    let (link, transport, _) = link_harness().await;
    link.handle_event(status("StateOn", None)).await;
    let key = link.isolation_key().current();

    transport.close();
    assert!(!link.send(ClientCommand::Activate).await);
    assert_eq!(link.current().kind, ClientKind::Unavailable);
    assert_eq!(link.isolation_key().current(), key + 1);
}

#[tokio::test]
async fn test_request_minimized_start() {
    let (link, transport, _) = link_harness().await;
    assert!(link.request_start(true).await);
    assert_eq!(
        transport.sent(),
        vec![Outbound::Bridge(BridgeRequest::Start { minimized: true })]
    );
}

#[tokio::test]
async fn test_subscribers_get_current_value_first() {
    let (link, _, _) = link_harness().await;
    link.handle_event(status("StateOff", None)).await;

    let rx = link.subscribe();
    assert_eq!(rx.borrow().kind, ClientKind::Disabled);
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn test_run_ends_unavailable() {
    let (link, _, _) = link_harness().await;
    let (events, receiver) = tokio::sync::mpsc::unbounded_channel();
    events.send(status("StateOff", None)).unwrap();
    drop(events);

    link.clone().run(receiver).await;
    assert_eq!(link.current().kind, ClientKind::Unavailable);
}
