//! Prometheus metrics for invocations and config changes

use anyhow::Result;
use mesh_core::{ConfigKey, ConfigListener};
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Prometheus metrics collector shared by the invoker and the gateway
#[derive(Clone)]
pub struct MetricsCollector {
    /// Invocations by target service and outcome
    pub invocations_total: CounterVec,
    /// Invocation latency in seconds, resolution included
    pub invocation_duration_seconds: HistogramVec,
    /// Config changes observed by the poller
    pub config_changes_total: CounterVec,
    /// Requests served by the gateway by route and status
    pub http_requests_total: CounterVec,
    pub registry: Arc<Registry>,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let invocations_total = CounterVec::new(
            Opts::new("mesh_invocations_total", "Discovery invocations by outcome"),
            &["service", "outcome"],
        )?;

        let invocation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "mesh_invocation_duration_seconds",
                "Discovery invocation latency in seconds",
            ),
            &["service"],
        )?;

        let config_changes_total = CounterVec::new(
            Opts::new("mesh_config_changes_total", "Observed config changes"),
            &["data_id"],
        )?;

        let http_requests_total = CounterVec::new(
            Opts::new("mesh_http_requests_total", "Gateway requests by route and status"),
            &["route", "status"],
        )?;

        registry.register(Box::new(invocations_total.clone()))?;
        registry.register(Box::new(invocation_duration_seconds.clone()))?;
        registry.register(Box::new(config_changes_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;

        Ok(Self {
            invocations_total,
            invocation_duration_seconds,
            config_changes_total,
            http_requests_total,
            registry,
        })
    }

    pub fn record_invocation(&self, service: &str, outcome: &str, elapsed: Duration) {
        self.invocations_total
            .with_label_values(&[service, outcome])
            .inc();
        self.invocation_duration_seconds
            .with_label_values(&[service])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_request(&self, route: &str, status: u16) {
        self.http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Listener that counts config changes per data id
pub struct ConfigChangeCounter {
    collector: MetricsCollector,
}

impl ConfigChangeCounter {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }
}

#[async_trait::async_trait]
impl ConfigListener for ConfigChangeCounter {
    fn name(&self) -> &str {
        "ConfigChangeCounter"
    }

    async fn on_change(&self, key: &ConfigKey, _content: &str) -> Result<()> {
        debug!("Counting config change for {}", key);
        self.collector
            .config_changes_total
            .with_label_values(&[&key.data_id])
            .inc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::ChangeDispatcher;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create collector");
        assert!(collector.gather().is_ok());
    }

    #[test]
    fn test_metrics_collector_clone_shares_registry() {
        let collector1 = MetricsCollector::new().expect("Failed to create collector");
        let collector2 = collector1.clone();

        collector2.record_invocation("user", "ok", Duration::from_millis(5));

        let metrics = collector1.gather().expect("Failed to gather metrics");
        assert!(metrics.contains("mesh_invocations_total{outcome=\"ok\",service=\"user\"} 1"));
    }

    #[test]
    fn test_metrics_text_format_structure() {
        let collector = MetricsCollector::new().expect("Failed to create collector");
        collector.record_invocation("user", "no_instance", Duration::from_millis(1));
        collector.record_request("/health", 200);

        let metrics = collector.gather().expect("Failed to gather metrics");

        assert!(metrics.contains("# HELP"));
        assert!(metrics.contains("# TYPE"));
        assert!(metrics.contains("mesh_invocation_duration_seconds_bucket"));
        assert!(metrics.contains("mesh_http_requests_total{route=\"/health\",status=\"200\"} 1"));
    }

    #[tokio::test]
    async fn test_config_change_counter_as_listener() {
        let collector = MetricsCollector::new().expect("Failed to create collector");
        let dispatcher = ChangeDispatcher::new();
        let key = ConfigKey::new("order.yaml", "DEFAULT_GROUP");
        dispatcher
            .subscribe(key.clone(), Arc::new(ConfigChangeCounter::new(collector.clone())))
            .await;

        dispatcher.notify(&key, "v2".to_string()).await.join().await;
        dispatcher.notify(&key, "v3".to_string()).await.join().await;

        let metrics = collector.gather().expect("Failed to gather metrics");
        assert!(metrics.contains("mesh_config_changes_total{data_id=\"order.yaml\"} 2"));
    }
}
