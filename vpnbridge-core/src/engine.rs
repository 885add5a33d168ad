//! Component wiring
//!
//! Builds the client link, both extension controllers, the override store
//! and the routers, and spawns the tasks that connect them.

use crate::client::{
    ClientLink, LinkSettings, NativeTransport, ProcessBridge, TransportEvent,
};
use crate::config::toml_config::state_path;
use crate::config::BridgeConfig;
use crate::error::{ConfigError, Result};
use crate::extension::{BrowsingMode, ExtensionController, PrivateBrowsingController};
use crate::overrides::OverrideStore;
use crate::proxy::ProxyRouter;
use crate::storage::{JsonFileStore, KeyValueStore};
use crate::tabs::{TabApi, TabEnforcer};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct Engine {
    link: ClientLink,
    normal: ExtensionController,
    private: PrivateBrowsingController,
    overrides: OverrideStore,
    normal_router: ProxyRouter,
    private_router: ProxyRouter,
    bridge: Option<Arc<ProcessBridge>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Start against the configured bridge executable and state file
    pub async fn start(config: &BridgeConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|message| ConfigError::ValidationError { message })?;

        let storage: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(state_path(config)?));
        let (bridge, events) = ProcessBridge::spawn(config.client.clone(), config.restart.clone());
        let bridge = Arc::new(bridge);

        let mut engine = Self::with_transport(config, bridge.clone(), events, storage).await?;
        engine.bridge = Some(bridge);
        Ok(engine)
    }

    /// Start against an arbitrary transport and store
    pub async fn with_transport(
        config: &BridgeConfig,
        transport: Arc<dyn NativeTransport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        storage: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let settings = LinkSettings::from_config(&config.client)?;
        let relay_port = config.proxy.relay_port;

        let link = ClientLink::new(transport, Arc::clone(&storage), settings).await;
        let normal = ExtensionController::new(BrowsingMode::Normal, link.clone(), relay_port);
        let private = PrivateBrowsingController::new(
            link.clone(),
            normal.clone(),
            Arc::clone(&storage),
            relay_port,
        )
        .await;

        let overrides = OverrideStore::new(
            storage,
            link.subscribe(),
            config.proxy.local_bypass_endpoint(),
            relay_port,
        );
        overrides.load().await?;

        let router_for = |controller: &ExtensionController| {
            ProxyRouter::new(
                controller.subscribe(),
                link.subscribe(),
                overrides.subscribe(),
                link.isolation_key(),
                relay_port,
            )
        };
        let normal_router = router_for(&normal);
        let private_router = router_for(private.controller());

        let tasks = vec![
            tokio::spawn(normal.clone().run()),
            tokio::spawn(private.controller().clone().run()),
            tokio::spawn(link.clone().run(events)),
        ];
        info!("Engine started");

        Ok(Self {
            link,
            normal,
            private,
            overrides,
            normal_router,
            private_router,
            bridge: None,
            tasks,
        })
    }

    /// Keep the tabs of one browsing mode consistent with its routing changes
    pub fn attach_tabs(&mut self, mode: BrowsingMode, tabs: Arc<dyn TabApi>) {
        let extension = match mode {
            BrowsingMode::Normal => self.normal.subscribe(),
            BrowsingMode::Private => self.private.controller().subscribe(),
        };
        let enforcer = TabEnforcer::new(tabs, extension, self.overrides.subscribe());
        self.tasks.push(tokio::spawn(enforcer.run()));
        debug!(%mode, "Tab enforcer attached");
    }

    pub fn link(&self) -> &ClientLink {
        &self.link
    }

    pub fn normal(&self) -> &ExtensionController {
        &self.normal
    }

    pub fn private(&self) -> &PrivateBrowsingController {
        &self.private
    }

    pub fn overrides(&self) -> &OverrideStore {
        &self.overrides
    }

    pub fn router(&self, mode: BrowsingMode) -> &ProxyRouter {
        match mode {
            BrowsingMode::Normal => &self.normal_router,
            BrowsingMode::Private => &self.private_router,
        }
    }

    /// Stop all tasks and the bridge process
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        if let Some(bridge) = &self.bridge {
            bridge.shutdown().await;
        }
        info!("Engine stopped");
    }
}
