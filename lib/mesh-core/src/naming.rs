//! Naming capability used for registration and discovery

use crate::{Result, ServiceInstance};

/// Registry operations a service needs to be discoverable and to find peers
///
/// An empty `select_healthy` result means the service is known but has no
/// healthy instances. An unknown service is a `DiscoveryError`.
#[async_trait::async_trait]
pub trait NamingService: Send + Sync {
    /// Register an instance. Registering the same identity twice refreshes it.
    async fn register(&self, instance: &ServiceInstance) -> Result<()>;

    /// Deregister an instance. Failures are logged by the implementation.
    async fn deregister(&self, instance: &ServiceInstance);

    /// Healthy instances of a service within a group
    async fn select_healthy(
        &self,
        service_name: &str,
        group_name: &str,
    ) -> Result<Vec<ServiceInstance>>;
}
