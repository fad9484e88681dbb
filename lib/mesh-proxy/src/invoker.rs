//! Discovery invoker: resolve a service by name, then call one healthy instance

use crate::forwarder::RequestForwarder;
use crate::http::build_target_url;
use crate::metrics::MetricsCollector;
use hyper::{body::Bytes, Method, Request, Response};
use mesh_core::{MeshError, NamingService, Result, ServiceInstance};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Outbound caller used by every service that talks to a peer
///
/// Instances are resolved through the naming service on every call, so a
/// re-registered peer at a new address is picked up on the next request.
/// The first healthy instance is used; weights are carried but not applied.
pub struct DiscoveryInvoker {
    naming: Arc<dyn NamingService>,
    forwarder: RequestForwarder,
    metrics: Option<MetricsCollector>,
}

impl DiscoveryInvoker {
    pub fn new(naming: Arc<dyn NamingService>, timeout: Duration) -> Self {
        Self {
            naming,
            forwarder: RequestForwarder::new(timeout),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.forwarder.timeout()
    }

    /// Pick the instance the next call would go to
    pub async fn resolve(&self, service: &str, group: &str) -> Result<ServiceInstance> {
        let instances = self.naming.select_healthy(service, group).await?;
        let instance = instances
            .into_iter()
            .next()
            .ok_or_else(|| MeshError::NoInstanceAvailable(format!("{}@@{}", group, service)))?;

        debug!("Selected instance for {}@@{}: {}:{}", group, service, instance.ip, instance.port);
        Ok(instance)
    }

    /// Send `request` to a healthy instance of `service` in `group`
    ///
    /// Method, path, query, headers and body are carried over; the upstream
    /// status, headers and body come back untouched.
    pub async fn invoke(
        &self,
        service: &str,
        group: &str,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>> {
        let started = Instant::now();
        let result = self.invoke_inner(service, group, request).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(MeshError::NoInstanceAvailable(_)) => "no_instance",
            Err(MeshError::DiscoveryError(_)) => "discovery_error",
            Err(MeshError::UpstreamUnavailable(_)) => "upstream_unavailable",
            Err(_) => "error",
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_invocation(service, outcome, started.elapsed());
        }
        if let Err(e) = &result {
            warn!("Invocation of {}@@{} failed: {}", group, service, e);
        }

        result
    }

    async fn invoke_inner(
        &self,
        service: &str,
        group: &str,
        request: Request<Bytes>,
    ) -> Result<Response<Bytes>> {
        let instance = self.resolve(service, group).await?;

        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target_url = build_target_url(&instance, path_and_query);

        info!("{} {} -> {}", request.method(), service, target_url);
        self.forwarder.forward(&target_url, request).await
    }

    /// Empty-bodied GET of `path_and_query` on `service`
    pub async fn get(
        &self,
        service: &str,
        group: &str,
        path_and_query: &str,
    ) -> Result<Response<Bytes>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path_and_query)
            .body(Bytes::new())
            .map_err(|e| MeshError::Internal(format!("invalid request path {}: {}", path_and_query, e)))?;
        self.invoke(service, group, request).await
    }
}
