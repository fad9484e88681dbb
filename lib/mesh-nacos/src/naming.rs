//! Instance registration and discovery against the Nacos naming API

use crate::model::InstanceList;
use crate::NacosClient;
use mesh_core::{MeshError, NamingService, Result, ServiceInstance};
use tracing::{debug, info, warn};

const INSTANCE_PATH: &str = "/v1/ns/instance";
const INSTANCE_LIST_PATH: &str = "/v1/ns/instance/list";

/// NacosNamingClient registers, deregisters and looks up service instances
#[derive(Clone, Debug)]
pub struct NacosNamingClient {
    client: NacosClient,
}

impl NacosNamingClient {
    pub fn new(client: NacosClient) -> Self {
        Self { client }
    }

    /// Form fields of a registration request
    pub fn register_params(&self, instance: &ServiceInstance) -> Result<Vec<(&'static str, String)>> {
        let metadata = serde_json::to_string(&instance.metadata)?;
        Ok(vec![
            ("serviceName", instance.service_name.clone()),
            ("groupName", instance.group_name.clone()),
            ("ip", instance.ip.clone()),
            ("port", instance.port.to_string()),
            ("weight", instance.weight.to_string()),
            ("enabled", instance.enabled.to_string()),
            ("healthy", instance.healthy.to_string()),
            ("ephemeral", instance.ephemeral.to_string()),
            ("metadata", metadata),
            ("namespaceId", self.client.namespace().to_string()),
        ])
    }

    /// Query of a deregistration request
    pub fn deregister_params(&self, instance: &ServiceInstance) -> Vec<(&'static str, String)> {
        vec![
            ("serviceName", instance.service_name.clone()),
            ("groupName", instance.group_name.clone()),
            ("ip", instance.ip.clone()),
            ("port", instance.port.to_string()),
            ("ephemeral", instance.ephemeral.to_string()),
            ("namespaceId", self.client.namespace().to_string()),
        ]
    }

    /// Query of a healthy-instance lookup
    pub fn select_params(&self, service_name: &str, group_name: &str) -> Vec<(&'static str, String)> {
        vec![
            ("serviceName", service_name.to_string()),
            ("groupName", group_name.to_string()),
            ("healthyOnly", "true".to_string()),
            ("namespaceId", self.client.namespace().to_string()),
        ]
    }

    async fn try_deregister(&self, instance: &ServiceInstance) -> anyhow::Result<()> {
        let response = self
            .client
            .inner()
            .delete(self.client.url(INSTANCE_PATH))
            .query(&self.deregister_params(instance))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() || body.trim() != "ok" {
            anyhow::bail!("status {}: {}", status, body.trim());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl NamingService for NacosNamingClient {
    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        let key = instance.key();
        let params = self.register_params(instance)?;

        let response = self
            .client
            .inner()
            .post(self.client.url(INSTANCE_PATH))
            .form(&params)
            .send()
            .await
            .map_err(|e| MeshError::RegistrationError(format!("{}: {}", key, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MeshError::RegistrationError(format!("{}: {}", key, e)))?;

        if !status.is_success() || body.trim() != "ok" {
            return Err(MeshError::RegistrationError(format!(
                "{}: registry answered {} {}",
                key,
                status,
                body.trim()
            )));
        }

        info!("Registered instance {}", key);
        Ok(())
    }

    async fn deregister(&self, instance: &ServiceInstance) {
        let key = instance.key();
        match self.try_deregister(instance).await {
            Ok(()) => info!("Deregistered instance {}", key),
            Err(e) => warn!("Failed to deregister instance {}: {}", key, e),
        }
    }

    async fn select_healthy(
        &self,
        service_name: &str,
        group_name: &str,
    ) -> Result<Vec<ServiceInstance>> {
        let service = mesh_core::instance::grouped_service_name(service_name, group_name);

        let response = self
            .client
            .inner()
            .get(self.client.url(INSTANCE_LIST_PATH))
            .query(&self.select_params(service_name, group_name))
            .send()
            .await
            .map_err(|e| MeshError::DiscoveryError(format!("{}: {}", service, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MeshError::DiscoveryError(format!("{}: {}", service, e)))?;

        if !status.is_success() {
            return Err(MeshError::DiscoveryError(format!(
                "{}: registry answered {} {}",
                service,
                status,
                body.trim()
            )));
        }

        let list: InstanceList = serde_json::from_str(&body)
            .map_err(|e| MeshError::DiscoveryError(format!("{}: bad instance list: {}", service, e)))?;

        let instances: Vec<ServiceInstance> = list
            .hosts
            .into_iter()
            .filter(|host| host.healthy)
            .map(|host| host.into_instance(service_name, group_name))
            .collect();

        debug!("Discovered {} healthy instances of {}", instances.len(), service);
        Ok(instances)
    }
}
