use crate::db::store::KvStore;
use crate::error::PilotError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Process-local store; contents vanish with the process.
#[derive(Default)]
pub struct MemoryKvStore {
    data: RwLock<BTreeMap<(String, String), Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, plugin: &str, key: &str) -> Result<Option<Value>, PilotError> {
        let data = self.data.read().await;
        Ok(data.get(&(plugin.to_string(), key.to_string())).cloned())
    }

    async fn set(&self, plugin: &str, key: &str, value: &Value) -> Result<(), PilotError> {
        self.data
            .write()
            .await
            .insert((plugin.to_string(), key.to_string()), value.clone());
        Ok(())
    }

    async fn delete(&self, plugin: &str, key: &str) -> Result<(), PilotError> {
        self.data
            .write()
            .await
            .remove(&(plugin.to_string(), key.to_string()));
        Ok(())
    }

    async fn keys(&self, plugin: &str) -> Result<Vec<String>, PilotError> {
        let data = self.data.read().await;
        Ok(data
            .keys()
            .filter(|(p, _)| p == plugin)
            .map(|(_, k)| k.clone())
            .collect())
    }
}
