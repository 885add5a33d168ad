//! Tab consistency
//!
//! When routing changes, open tabs still hold connections made under the
//! old decision. Affected tabs are reloaded or discarded so they reconnect.

use crate::error::TabError;
use crate::extension::{ExtensionKind, ExtensionState};
use crate::overrides::{normalize_origin, SiteMap};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// An open browser tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: u64,
    pub url: String,
    pub active: bool,
    pub discarded: bool,
    /// Playing audio or video
    pub audible: bool,
}

/// Tab filter; `None` matches either way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TabQuery {
    pub active: Option<bool>,
    pub discarded: Option<bool>,
    pub audible: Option<bool>,
}

impl TabQuery {
    pub fn matches(&self, tab: &TabInfo) -> bool {
        self.active.map_or(true, |active| tab.active == active)
            && self.discarded.map_or(true, |discarded| tab.discarded == discarded)
            && self.audible.map_or(true, |audible| tab.audible == audible)
    }
}

/// Browser tab operations
#[async_trait]
pub trait TabApi: Send + Sync {
    async fn query(&self, query: TabQuery) -> Result<Vec<TabInfo>, TabError>;
    async fn reload(&self, tab_id: u64) -> Result<(), TabError>;
    async fn discard(&self, tab_id: u64) -> Result<(), TabError>;
}

/// Which tabs a change affects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshScope {
    All,
    Origins(BTreeSet<String>),
}

impl RefreshScope {
    fn contains(&self, tab: &TabInfo) -> bool {
        match self {
            RefreshScope::All => true,
            RefreshScope::Origins(origins) => normalize_origin(&tab.url)
                .map(|origin| origins.contains(&origin))
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabAction {
    Reload(u64),
    Discard(u64),
}

/// Decide what to do with each affected tab
///
/// Audible tabs are left alone. The active tab is reloaded, the rest are
/// discarded and reload when next focused.
pub fn plan_refresh(tabs: &[TabInfo], scope: &RefreshScope) -> Vec<TabAction> {
    tabs.iter()
        .filter(|tab| !tab.discarded && !tab.audible && scope.contains(tab))
        .map(|tab| {
            if tab.active {
                TabAction::Reload(tab.id)
            } else {
                TabAction::Discard(tab.id)
            }
        })
        .collect()
}

/// Origins whose override was added, removed or changed
pub fn changed_origins(previous: &SiteMap, current: &SiteMap) -> BTreeSet<String> {
    let removed_or_changed = previous
        .iter()
        .filter(|(origin, context)| current.get(*origin) != Some(*context))
        .map(|(origin, _)| origin.clone());
    let added = current
        .keys()
        .filter(|origin| !previous.contains_key(*origin))
        .cloned();
    removed_or_changed.chain(added).collect()
}

/// Keeps open tabs in line with the latest routing
pub struct TabEnforcer {
    tabs: Arc<dyn TabApi>,
    extension: watch::Receiver<ExtensionState>,
    sites: watch::Receiver<Arc<SiteMap>>,
}

impl TabEnforcer {
    pub fn new(
        tabs: Arc<dyn TabApi>,
        extension: watch::Receiver<ExtensionState>,
        sites: watch::Receiver<Arc<SiteMap>>,
    ) -> Self {
        Self {
            tabs,
            extension,
            sites,
        }
    }

    /// Watch both sources until either publisher goes away
    ///
    /// The values current at startup are the baseline, not a change. Tabs are
    /// refreshed when the extension settles on Enabled after Disabled or the
    /// other way round; a detour through Idle or Connecting is not a change.
    pub async fn run(mut self) {
        let mut enabled = self.extension.borrow_and_update().enabled;
        let mut sites = Arc::clone(&self.sites.borrow_and_update());

        loop {
            tokio::select! {
                changed = self.extension.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let (kind, now_enabled) = {
                        let state = self.extension.borrow_and_update();
                        (state.kind, state.enabled)
                    };
                    // Idle and Connecting pass through; only Enabled and Disabled settle routing
                    if !matches!(kind, ExtensionKind::Enabled | ExtensionKind::Disabled) {
                        continue;
                    }
                    if now_enabled != enabled {
                        enabled = now_enabled;
                        info!(enabled, "Extension toggled, refreshing tabs");
                        self.refresh(&RefreshScope::All).await;
                    }
                }
                changed = self.sites.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = Arc::clone(&self.sites.borrow_and_update());
                    let origins = changed_origins(&sites, &current);
                    sites = current;
                    if !origins.is_empty() {
                        info!(count = origins.len(), "Site overrides changed, refreshing tabs");
                        self.refresh(&RefreshScope::Origins(origins)).await;
                    }
                }
            }
        }
        debug!("Tab enforcer stopped");
    }

    /// Reload or discard the tabs in `scope`; returns how many commands succeeded
    pub async fn refresh(&self, scope: &RefreshScope) -> usize {
        let query = TabQuery {
            discarded: Some(false),
            ..TabQuery::default()
        };
        let tabs = match self.tabs.query(query).await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!("Failed to query tabs: {}", e);
                return 0;
            }
        };

        let mut done = 0;
        for action in plan_refresh(&tabs, scope) {
            let result = match action {
                TabAction::Reload(id) => self.tabs.reload(id).await,
                TabAction::Discard(id) => self.tabs.discard(id).await,
            };
            match result {
                Ok(()) => done += 1,
                Err(e) => warn!(?action, "Tab command failed: {}", e),
            }
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overrides::SiteContext;

    fn tab(id: u64, url: &str, active: bool, audible: bool) -> TabInfo {
        TabInfo {
            id,
            url: url.to_string(),
            active,
            discarded: false,
            audible,
        }
    }

    #[test]
    fn test_plan_refresh_all() {
        let tabs = vec![
            tab(1, "https://a.example/", true, false),
            tab(2, "https://b.example/", false, false),
            tab(3, "https://c.example/", false, true),
            TabInfo {
                discarded: true,
                ..tab(4, "https://d.example/", false, false)
            },
        ];
        assert_eq!(
            plan_refresh(&tabs, &RefreshScope::All),
            vec![TabAction::Reload(1), TabAction::Discard(2)]
        );
    }

    #[test]
    fn test_plan_refresh_by_origin() {
        let tabs = vec![
            tab(1, "https://a.example/page", true, false),
            tab(2, "https://b.example/", false, false),
            tab(3, "about:blank", false, false),
        ];
        let scope = RefreshScope::Origins(["https://b.example".to_string()].into());
        assert_eq!(plan_refresh(&tabs, &scope), vec![TabAction::Discard(2)]);
    }

    #[test]
    fn test_changed_origins() {
        let mut before = SiteMap::new();
        before.insert(
            "https://kept.example".to_string(),
            SiteContext::excluded("https://kept.example".to_string(), None),
        );
        before.insert(
            "https://gone.example".to_string(),
            SiteContext::excluded("https://gone.example".to_string(), None),
        );

        let mut after = before.clone();
        after.remove("https://gone.example");
        after.insert(
            "https://new.example".to_string(),
            SiteContext::excluded("https://new.example".to_string(), None),
        );

        let changed = changed_origins(&before, &after);
        assert_eq!(
            changed.into_iter().collect::<Vec<_>>(),
            vec!["https://gone.example".to_string(), "https://new.example".to_string()]
        );
        assert!(changed_origins(&after, &after).is_empty());
    }

    #[test]
    fn test_query_matches() {
        let query = TabQuery {
            active: Some(true),
            ..TabQuery::default()
        };
        assert!(query.matches(&tab(1, "https://a.example", true, false)));
        assert!(!query.matches(&tab(2, "https://a.example", false, false)));
    }
}
