//! HTTP client for the Nacos server

use mesh_core::settings::NacosSettings;
use mesh_core::{MeshError, Result};
use std::time::Duration;
use tracing::debug;

/// NacosClient wraps the HTTP client shared by naming and config operations
#[derive(Clone, Debug)]
pub struct NacosClient {
    http: reqwest::Client,
    base_url: String,
    namespace: String,
}

impl NacosClient {
    /// Create a client for `server_addr` (host:port or full URL)
    pub fn new(
        server_addr: &str,
        context_path: &str,
        namespace: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MeshError::InvalidConfiguration(format!("http client: {}", e)))?;

        let base_url = Self::base_url(server_addr, context_path);
        debug!("Nacos client for {} (timeout {:?})", base_url, timeout);

        Ok(Self {
            http,
            base_url,
            namespace: namespace.to_string(),
        })
    }

    pub fn from_settings(settings: &NacosSettings) -> Result<Self> {
        Self::new(
            &settings.server_addr,
            &settings.context_path,
            &settings.namespace,
            Duration::from_millis(settings.timeout_ms),
        )
    }

    /// Get the underlying HTTP client
    pub fn inner(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Absolute URL of an API path such as `/v1/ns/instance`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn base_url(server_addr: &str, context_path: &str) -> String {
        let addr = server_addr.trim_end_matches('/');
        let root = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{}", addr)
        };

        let context = context_path.trim_matches('/');
        if context.is_empty() {
            root
        } else {
            format!("{}/{}", root, context)
        }
    }
}
