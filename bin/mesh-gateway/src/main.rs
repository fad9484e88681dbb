use anyhow::{Context, Result};
use http_body_util::{BodyExt, Full};
use hyper::{
    body::{Bytes, Incoming},
    server::conn::http1,
    service::service_fn,
    Request, Response, StatusCode,
};
use hyper_util::rt::tokio::TokioIo;
use mesh_core::{
    load_daemon_settings, ChangeDispatcher, ChangePoller, ConfigPublisher, NamingService,
    PollerConfig,
};
use mesh_nacos::{NacosClient, NacosConfigClient, NacosNamingClient};
use mesh_proxy::{ConfigChangeCounter, DiscoveryInvoker, MetricsCollector};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::fmt::init as tracing_init;

mod gateway;
mod router;

use gateway::Gateway;
use router::Router;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    info!("Starting mesh-gateway...");

    let settings = load_daemon_settings(std::env::args(), "deploy/gateway.yaml")
        .context("Failed to load settings")?;

    let client = NacosClient::from_settings(&settings.nacos)?;
    let naming = Arc::new(NacosNamingClient::new(client.clone()));
    let configs = Arc::new(NacosConfigClient::new(client));
    info!("Nacos clients initialized for {}", settings.nacos.server_addr);

    let instance = settings.instance();
    naming
        .register(&instance)
        .await
        .with_context(|| format!("Failed to register {}", instance.key()))?;
    info!("Registered {}", instance.key());

    let config_key = settings.config_key();
    if let Some(key) = &config_key {
        ConfigPublisher::new(configs.clone())
            .publish_registered(naming.as_ref(), &instance, key, &settings.config.content)
            .await
            .with_context(|| format!("Failed to publish {}", key))?;
    }

    let metrics = MetricsCollector::new()?;
    let dispatcher = Arc::new(ChangeDispatcher::new());
    let cancel = CancellationToken::new();

    let poller = match &config_key {
        Some(key) => {
            dispatcher
                .subscribe_fn(key.clone(), "LogConfigChange", |content: String| async move {
                    info!("Gateway config is now:\n{}", content);
                    anyhow::Ok(())
                })
                .await;
            dispatcher
                .subscribe(key.clone(), Arc::new(ConfigChangeCounter::new(metrics.clone())))
                .await;

            let poller_config = PollerConfig {
                interval: settings.poll_interval(),
                ..PollerConfig::default()
            };
            let poller = ChangePoller::new(key.clone(), configs.clone(), dispatcher.clone(), poller_config);
            Some(poller.spawn(&cancel))
        }
        None => {
            warn!("No config.data_id set - config watching disabled");
            None
        }
    };

    let invoker = DiscoveryInvoker::new(naming.clone(), settings.upstream_timeout())
        .with_metrics(metrics.clone());
    let router = Router::new(settings.gateway.routes.clone());
    for route in router.routes() {
        info!("Route {} -> {}@@{}", route.prefix, route.group, route.service);
    }

    let gateway = Arc::new(Gateway::new(invoker, router, dispatcher, config_key, metrics));

    let addr: SocketAddr = ([0, 0, 0, 0], settings.service.port).into();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            cancel.cancel();
            naming.deregister(&instance).await;
            return Err(e).with_context(|| format!("Failed to bind {}", addr));
        }
    };
    info!("HTTP server listening on {}", addr);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Error accepting connection: {}", e);
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let gateway = gateway.clone();

                tokio::task::spawn(async move {
                    let service = service_fn(move |req| serve(req, gateway.clone()));
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("Error serving HTTP connection from {}: {}", peer_addr, e);
                    }
                });
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
    info!("mesh-gateway stopped");

    Ok(())
}

async fn serve(
    req: Request<Incoming>,
    gateway: Arc<Gateway>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let response = match body.collect().await {
        Ok(collected) => {
            gateway
                .handle(Request::from_parts(parts, collected.to_bytes()))
                .await
        }
        Err(e) => {
            debug!("Failed to read request body: {}", e);
            let mut response = Response::new(Bytes::from("Bad Request\n"));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            response
        }
    };
    Ok(response.map(Full::new))
}
