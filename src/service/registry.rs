use crate::db::{KvStore, PluginData};
use crate::error::PilotError;
use crate::notify::Notifier;
use crate::plugins::{Plugin, PluginContext};
use crate::service::plugin_actor::{self, PluginHandle, PluginRuntime};
use crate::site::SiteRegistry;
use crate::types::{PluginStatus, TriggerAck, TriggerSource};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Shared collaborators for building plugin runtimes.
#[derive(Clone)]
pub struct RuntimeDeps {
    pub store: Arc<dyn KvStore>,
    pub sites: Arc<SiteRegistry>,
    pub proxy: Option<Url>,
    pub notifier: Arc<dyn Notifier>,
}

impl RuntimeDeps {
    pub fn runtime(&self, plugin: Arc<dyn Plugin>) -> PluginRuntime {
        let ctx = PluginContext {
            data: PluginData::new(self.store.clone(), plugin.id()),
            sites: self.sites.clone(),
            proxy: self.proxy.clone(),
        };
        PluginRuntime {
            plugin,
            ctx,
            notifier: self.notifier.clone(),
        }
    }
}

/// Plugin id to actor handle.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    handles: BTreeMap<&'static str, PluginHandle>,
}

impl PluginRegistry {
    pub async fn spawn_all(
        plugins: Vec<Arc<dyn Plugin>>,
        deps: &RuntimeDeps,
    ) -> Result<Self, PilotError> {
        let mut handles = BTreeMap::new();
        for plugin in plugins {
            let handle = plugin_actor::spawn(deps.runtime(plugin)).await?;
            handles.insert(handle.id(), handle);
        }
        info!(plugins = ?handles.keys().collect::<Vec<_>>(), "plugin actors spawned");
        Ok(Self { handles })
    }

    pub fn get(&self, id: &str) -> Result<&PluginHandle, PilotError> {
        self.handles
            .get(id)
            .ok_or_else(|| PilotError::UnknownPlugin(id.to_string()))
    }

    pub fn handles(&self) -> impl Iterator<Item = &PluginHandle> {
        self.handles.values()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub async fn trigger(&self, id: &str, source: TriggerSource) -> Result<TriggerAck, PilotError> {
        Ok(self.get(id)?.trigger(source).await)
    }

    pub async fn status(&self, id: &str) -> Result<PluginStatus, PilotError> {
        self.get(id)?.status().await
    }

    pub async fn statuses(&self) -> Result<Vec<PluginStatus>, PilotError> {
        let mut out = Vec::with_capacity(self.handles.len());
        for handle in self.handles.values() {
            out.push(handle.status().await?);
        }
        Ok(out)
    }

    /// Close every plugin and wait (in parallel) for in-flight runs.
    pub async fn shutdown_all(&self, grace: Duration) {
        join_all(self.handles.values().map(|h| h.shutdown(grace))).await;
        info!("all plugin actors stopped");
    }
}
