//! Private browsing controller tests

mod common;

use common::{link_harness, status};
use serde_json::Value;
use std::sync::Arc;
use tokio_test::{assert_pending, task};
use vpnbridge_core::client::message::{BridgeRequest, Outbound};
use vpnbridge_core::client::{ClientCommand, ClientLink};
use vpnbridge_core::error::StorageError;
use vpnbridge_core::extension::{BrowsingMode, ExtensionController, ExtensionKind, PrivateBrowsingController};
use vpnbridge_core::storage::{KeyValueStore, MemoryStore, AUTO_CONNECT_KEY};

async fn private_controller(
    link: &ClientLink,
    storage: Arc<MemoryStore>,
) -> (PrivateBrowsingController, ExtensionController) {
    let normal = ExtensionController::new(BrowsingMode::Normal, link.clone(), 1080);
    let private = PrivateBrowsingController::new(link.clone(), normal.clone(), storage, 1080).await;
    (private, normal)
}

#[tokio::test]
async fn test_auto_connect_defaults_off_and_persists() {
    let (link, _, storage) = link_harness().await;
    let (private, _) = private_controller(&link, storage.clone()).await;
    assert!(!private.auto_connect().await);
    assert_eq!(private.controller().mode(), BrowsingMode::Private);

    assert!(private.toggle_auto_connect().await.unwrap());
    assert_eq!(storage.get(AUTO_CONNECT_KEY).await.unwrap(), Some(Value::Bool(true)));

    // A fresh controller restores the saved policy
    let (restored, _) = private_controller(&link, storage.clone()).await;
    assert!(restored.auto_connect().await);

    assert!(!restored.toggle_auto_connect().await.unwrap());
    assert_eq!(storage.get(AUTO_CONNECT_KEY).await.unwrap(), Some(Value::Bool(false)));
}

#[tokio::test]
async fn test_failed_write_keeps_policy() {
    let (link, _, storage) = link_harness().await;
    let (private, _) = private_controller(&link, storage.clone()).await;

    storage.reject_writes_to(AUTO_CONNECT_KEY);
    let result = private.toggle_auto_connect().await;
    assert!(matches!(result, Err(StorageError::Rejected { .. })));
    assert!(!private.auto_connect().await);
}

#[tokio::test]
async fn test_permission_revoked_forces_off() {
    let (link, _, storage) = link_harness().await;
    let (private, _) = private_controller(&link, storage.clone()).await;
    private.toggle_auto_connect().await.unwrap();

    private.on_permission_revoked().await.unwrap();
    assert!(!private.auto_connect().await);
    assert_eq!(storage.get(AUTO_CONNECT_KEY).await.unwrap(), Some(Value::Bool(false)));
}

#[tokio::test]
async fn test_first_window_auto_connects() {
    let (link, transport, storage) = link_harness().await;
    let (private, _) = private_controller(&link, storage).await;
    private.toggle_auto_connect().await.unwrap();
    link.handle_event(status("StateOff", None)).await;

    let state = private.on_window_created(7).await.unwrap();
    assert_eq!(state.kind, ExtensionKind::Connecting);
    assert_eq!(transport.count(ClientCommand::Activate), 1);

    // Only the first window triggers it
    assert!(private.on_window_created(8).await.is_none());
    assert_eq!(private.open_windows(), 2);
}

#[tokio::test]
async fn test_no_auto_connect_when_normal_enabled() {
    let (link, transport, storage) = link_harness().await;
    let (private, normal) = private_controller(&link, storage).await;
    private.toggle_auto_connect().await.unwrap();
    link.handle_event(status("StateOn", None)).await;
    normal.handle_client_state(&link.current()).await;
    assert!(normal.current().enabled);

    assert!(private.on_window_created(1).await.is_none());
    assert_eq!(transport.count(ClientCommand::Activate), 0);
}

#[tokio::test]
async fn test_waits_for_client_and_requests_minimized_start() {
    let (link, transport, storage) = link_harness().await;
    let (private, _) = private_controller(&link, storage).await;
    private.toggle_auto_connect().await.unwrap();

    let mut created = task::spawn(private.on_window_created(3));
    assert_pending!(created.poll());
    assert_eq!(
        transport.sent(),
        vec![Outbound::Bridge(BridgeRequest::Start { minimized: true })]
    );

    link.handle_event(status("StateOn", None)).await;
    assert!(created.is_woken());
    let state = created.await.unwrap();
    assert_eq!(state.kind, ExtensionKind::Enabled);
    assert_eq!(transport.count(ClientCommand::Activate), 0);
}

#[tokio::test]
async fn test_closing_last_window_keeps_state() {
    let (link, _, storage) = link_harness().await;
    let (private, _) = private_controller(&link, storage).await;
    private.toggle_auto_connect().await.unwrap();
    link.handle_event(status("StateOn", None)).await;

    private.on_window_created(1).await;
    assert!(private.controller().current().enabled);

    private.on_window_removed(1);
    assert_eq!(private.open_windows(), 0);
    assert!(private.controller().current().enabled);
    assert!(private.auto_connect().await);
}
