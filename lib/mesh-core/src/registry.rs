//! In-process service registry

use crate::instance::grouped_service_name;
use crate::{MeshError, NamingService, Result, ServiceInstance};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// InMemoryRegistry keeps service instances for the lifetime of the process
pub struct InMemoryRegistry {
    // Map of grouped service name (group@@name) to its instances
    services: Arc<RwLock<HashMap<String, ServiceEntry>>>,
}

/// Instances registered under one grouped service name
#[derive(Clone, Debug, Default)]
pub struct ServiceEntry {
    pub service_name: String,
    pub group_name: String,
    pub instances: Vec<ServiceInstance>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            services: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// All instances of a service, healthy or not
    pub async fn all_instances(
        &self,
        service_name: &str,
        group_name: &str,
    ) -> Result<Vec<ServiceInstance>> {
        let id = grouped_service_name(service_name, group_name);
        let services = self.services.read().await;
        services
            .get(&id)
            .map(|entry| entry.instances.clone())
            .ok_or_else(|| MeshError::DiscoveryError(format!("service not found: {}", id)))
    }

    /// Flip the health flag of a registered instance
    pub async fn set_healthy(&self, instance: &ServiceInstance, healthy: bool) -> Result<()> {
        let id = grouped_service_name(&instance.service_name, &instance.group_name);
        let key = instance.key();

        let mut services = self.services.write().await;
        let entry = services
            .get_mut(&id)
            .ok_or_else(|| MeshError::DiscoveryError(format!("service not found: {}", id)))?;

        match entry.instances.iter_mut().find(|i| i.key() == key) {
            Some(existing) => {
                existing.healthy = healthy;
                debug!("Instance {} healthy={}", key, healthy);
                Ok(())
            }
            None => Err(MeshError::DiscoveryError(format!("instance not found: {}", key))),
        }
    }

    /// List all known grouped service names
    pub async fn list_services(&self) -> Vec<String> {
        let services = self.services.read().await;
        let mut names: Vec<String> = services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get count of known services
    pub async fn service_count(&self) -> usize {
        let services = self.services.read().await;
        services.len()
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl NamingService for InMemoryRegistry {
    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        if instance.service_name.is_empty() {
            return Err(MeshError::RegistrationError(
                "service name must not be empty".to_string(),
            ));
        }

        let id = grouped_service_name(&instance.service_name, &instance.group_name);
        let key = instance.key();

        let mut services = self.services.write().await;
        let entry = services.entry(id).or_insert_with(|| ServiceEntry {
            service_name: instance.service_name.clone(),
            group_name: instance.group_name.clone(),
            instances: Vec::new(),
        });

        match entry.instances.iter_mut().find(|i| i.key() == key) {
            Some(existing) => *existing = instance.clone(),
            None => entry.instances.push(instance.clone()),
        }

        debug!("Registered instance: {}", key);
        Ok(())
    }

    async fn deregister(&self, instance: &ServiceInstance) {
        let id = grouped_service_name(&instance.service_name, &instance.group_name);
        let key = instance.key();

        let mut services = self.services.write().await;
        // The service stays known after its last instance leaves
        if let Some(entry) = services.get_mut(&id) {
            entry.instances.retain(|i| i.key() != key);
        }
        debug!("Deregistered instance: {}", key);
    }

    async fn select_healthy(
        &self,
        service_name: &str,
        group_name: &str,
    ) -> Result<Vec<ServiceInstance>> {
        let instances = self.all_instances(service_name, group_name).await?;
        Ok(instances
            .into_iter()
            .filter(|i| i.healthy && i.enabled)
            .collect())
    }
}
