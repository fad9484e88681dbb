//! In-process config store

use crate::{ConfigKey, ConfigStore, MeshError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone, Debug)]
struct StoredConfig {
    content: String,
    revision: u64,
}

/// InMemoryConfigStore holds config content for the lifetime of the process
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    configs: Arc<RwLock<HashMap<ConfigKey, StoredConfig>>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of publishes accepted for a key, 0 if never published
    pub async fn revision(&self, key: &ConfigKey) -> u64 {
        let configs = self.configs.read().await;
        configs.get(key).map(|c| c.revision).unwrap_or(0)
    }

    /// Remove a key
    pub async fn remove(&self, key: &ConfigKey) -> bool {
        let mut configs = self.configs.write().await;
        configs.remove(key).is_some()
    }
}

#[async_trait::async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn publish(&self, key: &ConfigKey, content: &str) -> Result<()> {
        if key.data_id.is_empty() || key.group.is_empty() {
            return Err(MeshError::PublishError(format!(
                "data id and group are required: {}",
                key
            )));
        }

        let mut configs = self.configs.write().await;
        let entry = configs.entry(key.clone()).or_insert(StoredConfig {
            content: String::new(),
            revision: 0,
        });
        entry.content = content.to_string();
        entry.revision += 1;

        debug!("Stored config {} revision {}", key, entry.revision);
        Ok(())
    }

    async fn fetch(&self, key: &ConfigKey) -> Result<String> {
        let configs = self.configs.read().await;
        configs
            .get(key)
            .map(|c| c.content.clone())
            .ok_or_else(|| MeshError::FetchError(format!("config not found: {}", key)))
    }
}
