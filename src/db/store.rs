use crate::error::PilotError;
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;

/// Persistent JSON blobs addressed by `(plugin, key)`.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, plugin: &str, key: &str) -> Result<Option<Value>, PilotError>;

    async fn set(&self, plugin: &str, key: &str, value: &Value) -> Result<(), PilotError>;

    async fn delete(&self, plugin: &str, key: &str) -> Result<(), PilotError>;

    /// Keys stored for one plugin, sorted.
    async fn keys(&self, plugin: &str) -> Result<Vec<String>, PilotError>;
}

/// Typed view of the store bound to a single plugin id.
#[derive(Clone)]
pub struct PluginData {
    store: Arc<dyn KvStore>,
    plugin: String,
}

impl PluginData {
    pub fn new(store: Arc<dyn KvStore>, plugin: impl Into<String>) -> Self {
        Self {
            store,
            plugin: plugin.into(),
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PilotError> {
        match self.store.get(&self.plugin, key).await? {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    /// Load or fall back to `T::default()` for a key that was never written.
    pub async fn load_or_default<T: DeserializeOwned + Default>(
        &self,
        key: &str,
    ) -> Result<T, PilotError> {
        Ok(self.load(key).await?.unwrap_or_default())
    }

    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), PilotError> {
        let v = serde_json::to_value(value)?;
        self.store.set(&self.plugin, key, &v).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), PilotError> {
        self.store.delete(&self.plugin, key).await
    }

    pub async fn raw(&self, key: &str) -> Result<Option<Value>, PilotError> {
        self.store.get(&self.plugin, key).await
    }
}

/// Prepend `item` and keep at most `limit` entries.
pub fn push_capped<T>(list: &mut Vec<T>, item: T, limit: usize) {
    list.insert(0, item);
    list.truncate(limit.max(1));
}
