//! Persistent override store
//!
//! Every mutation reads the full map, writes it back to storage and only
//! then publishes it. A failed write leaves the published map untouched.

use crate::client::ClientState;
use crate::error::{OverrideError, StorageError};
use crate::overrides::{get_proxies, normalize_origin, SiteContext, SiteMap};
use crate::storage::{get_typed, set_typed, KeyValueStore, SITE_CONTEXTS_KEY};
use crate::types::{Location, ProxyEndpoint};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct OverrideStore {
    storage: Arc<dyn KeyValueStore>,
    client: watch::Receiver<ClientState>,
    local_bypass: Option<ProxyEndpoint>,
    relay_port: u16,
    /// Serialises read-modify-write cycles
    writer: Arc<Mutex<()>>,
    sites_tx: Arc<watch::Sender<Arc<SiteMap>>>,
}

impl OverrideStore {
    /// Create an empty store; call [`OverrideStore::load`] to restore saved overrides
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        client: watch::Receiver<ClientState>,
        local_bypass: Option<ProxyEndpoint>,
        relay_port: u16,
    ) -> Self {
        let (sites_tx, _) = watch::channel(Arc::new(SiteMap::new()));
        Self {
            storage,
            client,
            local_bypass,
            relay_port,
            writer: Arc::new(Mutex::new(())),
            sites_tx: Arc::new(sites_tx),
        }
    }

    /// Restore the persisted map
    pub async fn load(&self) -> Result<usize, StorageError> {
        let _guard = self.writer.lock().await;
        let sites = get_typed::<SiteMap>(self.storage.as_ref(), SITE_CONTEXTS_KEY)
            .await?
            .unwrap_or_default();
        let count = sites.len();
        debug!(count, "Loaded site overrides");
        self.sites_tx.send_replace(Arc::new(sites));
        Ok(count)
    }

    /// Receiver that first yields the current map, then every new one
    pub fn subscribe(&self) -> watch::Receiver<Arc<SiteMap>> {
        self.sites_tx.subscribe()
    }

    pub fn snapshot(&self) -> Arc<SiteMap> {
        Arc::clone(&self.sites_tx.borrow())
    }

    /// Override for the origin of `url`, if any
    pub fn get(&self, url: &str) -> Option<SiteContext> {
        let origin = normalize_origin(url).ok()?;
        self.sites_tx.borrow().get(&origin).cloned()
    }

    /// Pin an origin to the relays of a location
    #[tracing::instrument(skip(self))]
    pub async fn set_override(
        &self,
        origin: &str,
        country_code: &str,
        city_code: &str,
    ) -> Result<SiteContext, OverrideError> {
        let origin = normalize_origin(origin)?;
        let servers = Arc::clone(&self.client.borrow().servers);
        let proxies = get_proxies(country_code, city_code, &servers, self.relay_port)
            .map_err(|e| {
                error!(%origin, "Cannot pin origin: {}", e);
                e
            })?;

        let location = Location::new(country_code, city_code);
        let context = SiteContext::pinned(origin, &location, proxies);
        self.put(context.clone()).await?;
        Ok(context)
    }

    /// Keep an origin out of the tunnel
    #[tracing::instrument(skip(self))]
    pub async fn exclude_origin(&self, origin: &str) -> Result<SiteContext, OverrideError> {
        let origin = normalize_origin(origin)?;
        let context = SiteContext::excluded(origin, self.local_bypass.clone());
        self.put(context.clone()).await?;
        Ok(context)
    }

    /// Drop an override; returns whether one existed
    #[tracing::instrument(skip(self))]
    pub async fn remove_override(&self, origin: &str) -> Result<bool, OverrideError> {
        let origin = normalize_origin(origin)?;
        let removed = self
            .mutate(|sites| sites.remove(&origin).is_some())
            .await?;
        if !removed {
            debug!(%origin, "No override to remove");
        }
        Ok(removed)
    }

    async fn put(&self, context: SiteContext) -> Result<(), OverrideError> {
        self.mutate(|sites| {
            if sites.get(&context.origin) == Some(&context) {
                return false;
            }
            sites.insert(context.origin.clone(), context);
            true
        })
        .await?;
        Ok(())
    }

    /// Apply `change` to a copy of the map; persist and publish if it reports a change
    async fn mutate<F>(&self, change: F) -> Result<bool, StorageError>
    where
        F: FnOnce(&mut SiteMap) -> bool,
    {
        let _guard = self.writer.lock().await;

        let mut next = SiteMap::clone(&self.sites_tx.borrow());
        if !change(&mut next) {
            return Ok(false);
        }

        if let Err(e) = set_typed(self.storage.as_ref(), SITE_CONTEXTS_KEY, &next).await {
            warn!("Failed to persist site overrides: {}", e);
            return Err(e);
        }

        info!(count = next.len(), "Site overrides updated");
        self.sites_tx.send_replace(Arc::new(next));
        Ok(true)
    }
}
