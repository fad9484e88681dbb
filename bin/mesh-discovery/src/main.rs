use anyhow::{Context, Result};
use mesh_core::{
    load_daemon_settings, ChangeDispatcher, ChangePoller, ConfigPublisher, NamingService,
    PollerConfig,
};
use mesh_nacos::{NacosClient, NacosConfigClient, NacosNamingClient};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::init as tracing_init;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    info!("Starting mesh-discovery daemon...");

    let settings = load_daemon_settings(std::env::args(), "deploy/discovery.yaml")
        .context("Failed to load settings")?;

    let client = NacosClient::from_settings(&settings.nacos)?;
    let naming = Arc::new(NacosNamingClient::new(client.clone()));
    let configs = Arc::new(NacosConfigClient::new(client));

    let instance = settings.instance();
    naming
        .register(&instance)
        .await
        .with_context(|| format!("Failed to register {}", instance.key()))?;
    info!("Registered {}", instance.key());

    let cancel = CancellationToken::new();
    let dispatcher = Arc::new(ChangeDispatcher::new());

    let poller = match settings.config_key() {
        Some(key) => {
            ConfigPublisher::new(configs.clone())
                .publish_registered(naming.as_ref(), &instance, &key, &settings.config.content)
                .await
                .with_context(|| format!("Failed to publish {}", key))?;

            let data_id = key.data_id.clone();
            dispatcher
                .subscribe_fn(key.clone(), "LogConfigChange", move |content: String| {
                    let data_id = data_id.clone();
                    async move {
                        info!("Config {} changed:\n{}", data_id, content);
                        anyhow::Ok(())
                    }
                })
                .await;

            let poller_config = PollerConfig {
                interval: settings.poll_interval(),
                ..PollerConfig::default()
            };
            Some(ChangePoller::new(key, configs.clone(), dispatcher.clone(), poller_config).spawn(&cancel))
        }
        None => {
            warn!("No config.data_id set - config watching disabled");
            None
        }
    };

    let service = settings.service.name.clone();
    let group = settings.service.group_name.clone();
    let mut ticker = tokio::time::interval(settings.poll_interval());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match discover_instances(naming.as_ref(), &service, &group).await {
                    Ok(count) => debug!("{} healthy instances of {}", count, service),
                    Err(e) => error!("Error discovering {}: {}", service, e),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    cancel.cancel();
    if let Some(poller) = poller {
        poller.join().await;
    }
    naming.deregister(&instance).await;
    info!("mesh-discovery stopped");

    Ok(())
}

/// Log the healthy instance set of `service` and return its size
async fn discover_instances(
    naming: &dyn NamingService,
    service: &str,
    group: &str,
) -> mesh_core::Result<usize> {
    let instances = naming.select_healthy(service, group).await?;
    let addresses: Vec<String> = instances
        .iter()
        .map(|i| format!("{}:{}", i.ip, i.port))
        .collect();
    info!("{}@@{} -> [{}]", group, service, addresses.join(", "));
    Ok(instances.len())
}
