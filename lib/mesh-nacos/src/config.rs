//! Config publish and fetch against the Nacos config API

use crate::NacosClient;
use mesh_core::{ConfigKey, ConfigStore, MeshError, Result};
use reqwest::StatusCode;
use tracing::debug;

const CONFIG_PATH: &str = "/v1/cs/configs";

/// NacosConfigClient reads and writes config blobs
///
/// `fetch` is a plain `GET /v1/cs/configs?dataId=&group=&tenant=` returning
/// the raw content, which is what the change poller relies on.
#[derive(Clone, Debug)]
pub struct NacosConfigClient {
    client: NacosClient,
}

impl NacosConfigClient {
    pub fn new(client: NacosClient) -> Self {
        Self { client }
    }

    fn key_params(key: &ConfigKey) -> Vec<(&'static str, String)> {
        vec![
            ("dataId", key.data_id.clone()),
            ("group", key.group.clone()),
            ("tenant", key.namespace.clone()),
        ]
    }
}

#[async_trait::async_trait]
impl ConfigStore for NacosConfigClient {
    async fn publish(&self, key: &ConfigKey, content: &str) -> Result<()> {
        let mut params = Self::key_params(key);
        params.push(("content", content.to_string()));

        let response = self
            .client
            .inner()
            .post(self.client.url(CONFIG_PATH))
            .form(&params)
            .send()
            .await
            .map_err(|e| MeshError::PublishError(format!("{}: {}", key, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MeshError::PublishError(format!("{}: {}", key, e)))?;

        if !status.is_success() || body.trim() != "true" {
            return Err(MeshError::PublishError(format!(
                "{}: config server answered {} {}",
                key,
                status,
                body.trim()
            )));
        }

        debug!("Published {} bytes to {}", content.len(), key);
        Ok(())
    }

    async fn fetch(&self, key: &ConfigKey) -> Result<String> {
        let response = self
            .client
            .inner()
            .get(self.client.url(CONFIG_PATH))
            .query(&Self::key_params(key))
            .send()
            .await
            .map_err(|e| MeshError::FetchError(format!("{}: {}", key, e)))?;

        match response.status() {
            StatusCode::OK => response
                .text()
                .await
                .map_err(|e| MeshError::FetchError(format!("{}: {}", key, e))),
            StatusCode::NOT_FOUND => Err(MeshError::FetchError(format!(
                "config not found: {}",
                key
            ))),
            status => Err(MeshError::FetchError(format!(
                "{}: config server answered {}",
                key, status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_server::FakeNacos;
    use mesh_core::{ChangeDispatcher, ChangePoller, PollerConfig};
    use std::sync::Arc;
    use std::time::Duration;

    fn config_client(addr: &str) -> NacosConfigClient {
        let client = NacosClient::new(addr, "/nacos", "", Duration::from_secs(2)).unwrap();
        NacosConfigClient::new(client)
    }

    fn key() -> ConfigKey {
        ConfigKey::new("order.yaml", "DEFAULT_GROUP")
    }

    #[test]
    fn test_key_params() {
        let key = key().with_namespace("dev");
        let params = NacosConfigClient::key_params(&key);
        assert_eq!(
            params,
            vec![
                ("dataId", "order.yaml".to_string()),
                ("group", "DEFAULT_GROUP".to_string()),
                ("tenant", "dev".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_publish_then_fetch() {
        let server = FakeNacos::start().await;
        let client = config_client(&server.addr());

        client.publish(&key(), "timeout: 3s\n").await.expect("publish");
        assert_eq!(client.fetch(&key()).await.expect("fetch"), "timeout: 3s\n");
    }

    #[tokio::test]
    async fn test_fetch_missing_config() {
        let server = FakeNacos::start().await;
        let client = config_client(&server.addr());
        assert!(matches!(
            client.fetch(&key()).await,
            Err(MeshError::FetchError(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_to_unreachable_server() {
        let client = config_client("127.0.0.1:1");
        assert!(matches!(
            client.publish(&key(), "v1").await,
            Err(MeshError::PublishError(_))
        ));
    }

    #[tokio::test]
    async fn test_poller_over_http() {
        let server = FakeNacos::start().await;
        let store = Arc::new(config_client(&server.addr()));
        let dispatcher = Arc::new(ChangeDispatcher::new());
        store.publish(&key(), "v1").await.unwrap();

        let poller = ChangePoller::new(
            key(),
            store.clone(),
            dispatcher.clone(),
            PollerConfig::default(),
        );
        assert!(poller.poll_once().await.unwrap().is_none());

        // Another process updates the key
        server.config_store().publish(&key(), "v2").await.unwrap();

        let report = poller
            .poll_once()
            .await
            .unwrap()
            .expect("change detected")
            .join()
            .await;
        assert!(report.outcomes.is_empty());
        assert_eq!(dispatcher.current(&key()).await.as_deref(), Some("v2"));
    }
}
