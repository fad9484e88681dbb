//! Configuration entries, the config store capability and the publisher

use crate::{NamingService, Result, ServiceInstance};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Composite key of a configuration blob: (namespace, group, data-id)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigKey {
    #[serde(default)]
    pub namespace: String,
    pub group: String,
    pub data_id: String,
}

impl ConfigKey {
    /// Key in the default (empty) namespace
    pub fn new(data_id: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            namespace: String::new(),
            group: group.into(),
            data_id: data_id.into(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.group, self.data_id)
    }
}

/// Hex SHA-256 digest of config content
///
/// Change detection compares fingerprints only. Two different contents with
/// equal digests would go unnoticed; that risk is accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(content: &str) -> Self {
        let digest = Sha256::digest(content.as_bytes());
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell revisions apart in logs
        write!(f, "{}", self.0.get(..12).unwrap_or(&self.0))
    }
}

/// Last observed content of a config key together with its fingerprint
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigEntry {
    pub key: ConfigKey,
    pub content: String,
    pub fingerprint: Fingerprint,
    pub observed_at: DateTime<Utc>,
}

impl ConfigEntry {
    pub fn new(key: ConfigKey, content: String) -> Self {
        let fingerprint = Fingerprint::of(&content);
        Self {
            key,
            content,
            fingerprint,
            observed_at: Utc::now(),
        }
    }
}

/// Remote (or in-process) store holding config content by key
#[async_trait::async_trait]
pub trait ConfigStore: Send + Sync {
    /// Write content under a key
    async fn publish(&self, key: &ConfigKey, content: &str) -> Result<()>;

    /// Read the raw content under a key
    async fn fetch(&self, key: &ConfigKey) -> Result<String>;
}

/// ConfigPublisher pushes config a process owns to the store
///
/// It does not watch for changes; pair it with a `ChangePoller` for that.
#[derive(Clone)]
pub struct ConfigPublisher {
    store: Arc<dyn ConfigStore>,
}

impl ConfigPublisher {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Publish content. Identical content still round-trips to the store.
    pub async fn publish(&self, key: &ConfigKey, content: &str) -> Result<()> {
        debug!("Publishing config {} ({} bytes)", key, content.len());
        self.store.publish(key, content).await?;
        info!(
            "Config published: {} (fingerprint {})",
            key,
            Fingerprint::of(content)
        );
        Ok(())
    }

    /// Publish the config of a process that already registered `instance`
    ///
    /// On failure the instance is deregistered before the error is returned,
    /// so an aborted startup leaves nothing discoverable behind.
    pub async fn publish_registered(
        &self,
        naming: &dyn NamingService,
        instance: &ServiceInstance,
        key: &ConfigKey,
        content: &str,
    ) -> Result<()> {
        if let Err(e) = self.publish(key, content).await {
            warn!("Withdrawing {} after failed publish: {}", instance.key(), e);
            naming.deregister(instance).await;
            return Err(e);
        }
        Ok(())
    }

    /// Current content held by the store
    pub async fn current(&self, key: &ConfigKey) -> Result<String> {
        self.store.fetch(key).await
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }
}
