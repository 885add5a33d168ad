//! Private browsing
//!
//! A second controller for private windows, plus the "connect when the
//! first private window opens" policy.

use crate::client::ClientLink;
use crate::error::StorageError;
use crate::extension::controller::{BrowsingMode, ExtensionController};
use crate::extension::state::ExtensionState;
use crate::storage::{get_typed, set_typed, KeyValueStore, AUTO_CONNECT_KEY};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct PrivateBrowsingController {
    controller: ExtensionController,
    /// Controller of normal windows; auto-connect stays out of its way
    normal: ExtensionController,
    link: ClientLink,
    storage: Arc<dyn KeyValueStore>,
    auto_connect: Arc<tokio::sync::Mutex<bool>>,
    windows: Arc<Mutex<HashSet<u64>>>,
}

impl PrivateBrowsingController {
    /// Create the private controller and restore the auto-connect policy
    pub async fn new(
        link: ClientLink,
        normal: ExtensionController,
        storage: Arc<dyn KeyValueStore>,
        relay_port: u16,
    ) -> Self {
        let auto_connect = match get_typed::<bool>(storage.as_ref(), AUTO_CONNECT_KEY).await {
            Ok(value) => value.unwrap_or(false),
            Err(e) => {
                warn!("Ignoring unreadable auto-connect setting: {}", e);
                false
            }
        };
        debug!(auto_connect, "Private browsing controller ready");

        Self {
            controller: ExtensionController::new(BrowsingMode::Private, link.clone(), relay_port),
            normal,
            link,
            storage,
            auto_connect: Arc::new(tokio::sync::Mutex::new(auto_connect)),
            windows: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The underlying private-mode controller
    pub fn controller(&self) -> &ExtensionController {
        &self.controller
    }

    pub async fn auto_connect(&self) -> bool {
        *self.auto_connect.lock().await
    }

    pub fn open_windows(&self) -> usize {
        self.windows.lock().map(|windows| windows.len()).unwrap_or(0)
    }

    /// Flip and persist the auto-connect policy, returning the new value
    pub async fn toggle_auto_connect(&self) -> Result<bool, StorageError> {
        let mut auto_connect = self.auto_connect.lock().await;
        let next = !*auto_connect;
        set_typed(self.storage.as_ref(), AUTO_CONNECT_KEY, &next).await?;
        *auto_connect = next;
        info!(auto_connect = next, "Private browsing auto-connect changed");
        Ok(next)
    }

    /// Private browsing permission was withdrawn
    pub async fn on_permission_revoked(&self) -> Result<(), StorageError> {
        let mut auto_connect = self.auto_connect.lock().await;
        set_typed(self.storage.as_ref(), AUTO_CONNECT_KEY, &false).await?;
        if *auto_connect {
            info!("Private browsing permission revoked, auto-connect off");
        }
        *auto_connect = false;
        Ok(())
    }

    /// A private window opened
    ///
    /// For the first window with auto-connect on this waits until the client
    /// is ready, so callers normally spawn it. Returns the state published
    /// by the auto-connect toggle, if one happened.
    #[tracing::instrument(skip(self))]
    pub async fn on_window_created(&self, window_id: u64) -> Option<ExtensionState> {
        let first = match self.windows.lock() {
            Ok(mut windows) => {
                let was_empty = windows.is_empty();
                windows.insert(window_id) && was_empty
            }
            Err(_) => false,
        };

        if !first || !self.should_auto_connect().await {
            return None;
        }

        self.wait_for_client().await?;

        // Things may have moved on while waiting
        if !self.should_auto_connect().await || self.open_windows() == 0 {
            debug!("Auto-connect no longer wanted after waiting for the client");
            return None;
        }
        if self.controller.current().enabled {
            return None;
        }

        info!("Auto-connecting private browsing");
        Some(self.controller.toggle_connectivity().await)
    }

    /// A private window closed; the extension state is left as it is
    pub fn on_window_removed(&self, window_id: u64) {
        if let Ok(mut windows) = self.windows.lock() {
            windows.remove(&window_id);
            if windows.is_empty() {
                debug!("Last private window closed");
            }
        }
    }

    async fn should_auto_connect(&self) -> bool {
        self.auto_connect().await && !self.normal.current().enabled
    }

    /// Wait until the client can take an activation, starting it if needed
    ///
    /// Returns `None` if the link went away first.
    async fn wait_for_client(&self) -> Option<()> {
        let mut client_rx = self.link.subscribe();
        let unavailable = !client_rx.borrow().installed();
        if unavailable {
            info!("VPN client not running, requesting a minimized start");
            self.link.request_start(true).await;
        }

        client_rx
            .wait_for(|client| client.is_ready())
            .await
            .map(|_| ())
            .ok()
    }
}
